//! Graph stores: where the engine loads flows from.

use crate::core::error::AppError;
use crate::core::flow_graph::model::Flow;
use crate::core::flow_graph::validator::{FlowValidator, ReachabilityPolicy, ValidationError};
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("flow '{0}' not found")]
    NotFound(String),
    #[error("graph store unavailable: {0}")]
    Unavailable(String),
    #[error("flow '{flow_id}' is invalid: {reason}")]
    Invalid { flow_id: String, reason: String },
    #[error("flow failed validation: {0}")]
    Validation(#[from] ValidationError),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "STORE-001",
            StoreError::Unavailable(_) => "STORE-002",
            StoreError::Invalid { .. } => "STORE-003",
            StoreError::Validation(err) => err.code(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let category = match err {
            StoreError::Validation(_) => ErrorCategory::ValidationError,
            _ => ErrorCategory::StoreError,
        };
        let error = AppError::new(category, err.code(), err.to_string());
        match &err {
            StoreError::NotFound(flow_id) | StoreError::Invalid { flow_id, .. } => {
                error.with_context("flow_id", flow_id.clone())
            }
            _ => error,
        }
    }
}

/// Read side consumed by the engine. Implementations return fully materialised graphs.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn load_flow(&self, flow_id: &str) -> Result<Flow, StoreError>;
}

/// Listing entry for stored flows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowSummary {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub published: bool,
    pub node_count: usize,
    pub connection_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&Flow> for FlowSummary {
    fn from(flow: &Flow) -> Self {
        Self {
            id: flow.id.clone(),
            owner_id: flow.owner_id.clone(),
            name: flow.name.clone(),
            published: flow.published,
            node_count: flow.nodes.len(),
            connection_count: flow.connections.len(),
            updated_at: flow.updated_at,
        }
    }
}

/// Process-local store with draft/publish lifecycle.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    flows: DashMap<String, Flow>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `flow` as a draft, replacing any previous version. Drafts may be incomplete.
    pub fn save_draft(&self, mut flow: Flow) -> Flow {
        flow.adopt_children();
        flow.published = false;
        flow.updated_at = Utc::now();
        self.flows.insert(flow.id.clone(), flow.clone());
        flow
    }

    /// Validate the stored flow and mark it published.
    pub fn publish(&self, flow_id: &str, policy: ReachabilityPolicy) -> Result<Flow, StoreError> {
        let mut entry = self
            .flows
            .get_mut(flow_id)
            .ok_or_else(|| StoreError::NotFound(flow_id.to_string()))?;
        FlowValidator::new(policy).validate(&entry)?;
        entry.published = true;
        entry.updated_at = Utc::now();
        tracing::info!(flow_id = %flow_id, "flow published");
        Ok(entry.value().clone())
    }

    pub fn unpublish(&self, flow_id: &str) -> Result<Flow, StoreError> {
        let mut entry = self
            .flows
            .get_mut(flow_id)
            .ok_or_else(|| StoreError::NotFound(flow_id.to_string()))?;
        entry.published = false;
        entry.updated_at = Utc::now();
        Ok(entry.value().clone())
    }

    /// Remove a flow together with its nodes and connections.
    pub fn delete(&self, flow_id: &str) -> bool {
        self.flows.remove(flow_id).is_some()
    }

    pub fn list(&self) -> Vec<FlowSummary> {
        let mut summaries: Vec<FlowSummary> = self
            .flows
            .iter()
            .map(|entry| FlowSummary::from(entry.value()))
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        summaries
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn load_flow(&self, flow_id: &str) -> Result<Flow, StoreError> {
        self.flows
            .get(flow_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(flow_id.to_string()))
    }
}

const FLOW_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Loads flow documents named `<flow_id>.yaml|.yml|.json` from a directory.
#[derive(Debug, Clone)]
pub struct FileGraphStore {
    root: PathBuf,
}

impl FileGraphStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn check_id(flow_id: &str) -> Result<(), StoreError> {
        let valid = !flow_id.is_empty()
            && flow_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !flow_id.starts_with('.');
        if valid {
            Ok(())
        } else {
            Err(StoreError::Invalid {
                flow_id: flow_id.to_string(),
                reason: "flow id must be a plain file name".to_string(),
            })
        }
    }

    /// Write `flow` as `<root>/<id>.yaml`.
    pub async fn save(&self, flow: &Flow) -> Result<PathBuf, StoreError> {
        Self::check_id(&flow.id)?;
        let body = serde_yaml::to_string(flow).map_err(|err| StoreError::Invalid {
            flow_id: flow.id.clone(),
            reason: err.to_string(),
        })?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let path = self.root.join(format!("{}.yaml", flow.id));
        tokio::fs::write(&path, body)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(path)
    }

    fn parse(flow_id: &str, path: &Path, content: &str) -> Result<Flow, StoreError> {
        let invalid = |reason: String| StoreError::Invalid {
            flow_id: flow_id.to_string(),
            reason,
        };
        let flow: Flow = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(content).map_err(|err| invalid(err.to_string()))?,
            _ => serde_yaml::from_str(content).map_err(|err| invalid(err.to_string()))?,
        };
        if flow.id != flow_id {
            return Err(invalid(format!(
                "document declares id '{}' but was loaded as '{}'",
                flow.id, flow_id
            )));
        }
        Ok(flow)
    }
}

#[async_trait]
impl GraphStore for FileGraphStore {
    async fn load_flow(&self, flow_id: &str) -> Result<Flow, StoreError> {
        Self::check_id(flow_id)?;
        for ext in FLOW_EXTENSIONS {
            let path = self.root.join(format!("{}.{}", flow_id, ext));
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(StoreError::Unavailable(format!(
                        "failed to read {}: {}",
                        path.display(),
                        err
                    )))
                }
            };
            let mut flow = Self::parse(flow_id, &path, &content)?;
            flow.adopt_children();
            tracing::debug!(flow_id = %flow_id, path = %path.display(), "loaded flow document");
            return Ok(flow);
        }
        Err(StoreError::NotFound(flow_id.to_string()))
    }
}
