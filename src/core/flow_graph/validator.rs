use crate::core::error::AppError;
use crate::core::flow_graph::model::{Flow, NodeType};
use crate::core::types::ErrorCategory;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use thiserror::Error;

/// Structural defects reported by [`FlowValidator`], in rule order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("flow has no start node")]
    MissingStartNode,
    #[error("flow has {} start nodes: {}", .node_ids.len(), .node_ids.join(", "))]
    MultipleStartNodes { node_ids: Vec<String> },
    #[error("flow has no end node")]
    MissingEndNode,
    #[error("node id '{node_id}' is used more than once")]
    DuplicateNodeId { node_id: String },
    #[error("connection '{connection_id}' references missing node '{missing_node_id}'")]
    DanglingConnection {
        connection_id: String,
        missing_node_id: String,
    },
    #[error("end node(s) not reachable from start: {}", .node_ids.join(", "))]
    UnreachableEndNode { node_ids: Vec<String> },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MissingStartNode => "FLOW-VALID-001",
            ValidationError::MultipleStartNodes { .. } => "FLOW-VALID-002",
            ValidationError::MissingEndNode => "FLOW-VALID-003",
            ValidationError::DuplicateNodeId { .. } => "FLOW-VALID-004",
            ValidationError::DanglingConnection { .. } => "FLOW-VALID-005",
            ValidationError::UnreachableEndNode { .. } => "FLOW-VALID-006",
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::new(ErrorCategory::ValidationError, err.code(), err.to_string())
    }
}

/// Which end nodes must be reachable from the start node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReachabilityPolicy {
    /// Every end node must be reachable.
    #[default]
    All,
    /// At least one end node must be reachable.
    Any,
}

impl FromStr for ReachabilityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(ReachabilityPolicy::All),
            "any" => Ok(ReachabilityPolicy::Any),
            other => Err(format!(
                "invalid reachability policy '{}', expected 'all' or 'any'",
                other
            )),
        }
    }
}

/// Structural checker run at publish time and, optionally, before each run.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowValidator {
    policy: ReachabilityPolicy,
}

impl FlowValidator {
    pub fn new(policy: ReachabilityPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ReachabilityPolicy {
        self.policy
    }

    pub fn validate(&self, flow: &Flow) -> Result<(), ValidationError> {
        let start_ids: Vec<String> = flow
            .nodes_of_type(NodeType::Start)
            .map(|node| node.id.clone())
            .collect();
        let start_id = match start_ids.as_slice() {
            [] => return Err(ValidationError::MissingStartNode),
            [only] => only.clone(),
            _ => {
                return Err(ValidationError::MultipleStartNodes {
                    node_ids: start_ids,
                })
            }
        };

        let end_ids: Vec<&str> = flow
            .nodes_of_type(NodeType::End)
            .map(|node| node.id.as_str())
            .collect();
        if end_ids.is_empty() {
            return Err(ValidationError::MissingEndNode);
        }

        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut indices: HashMap<&str, NodeIndex> = HashMap::new();
        for node in &flow.nodes {
            if indices.contains_key(node.id.as_str()) {
                return Err(ValidationError::DuplicateNodeId {
                    node_id: node.id.clone(),
                });
            }
            indices.insert(node.id.as_str(), graph.add_node(node.id.as_str()));
        }

        for connection in &flow.connections {
            let lookup = |id: &str| {
                indices
                    .get(id)
                    .copied()
                    .ok_or_else(|| ValidationError::DanglingConnection {
                        connection_id: connection.id.clone(),
                        missing_node_id: id.to_string(),
                    })
            };
            let source = lookup(connection.source.as_str())?;
            let target = lookup(connection.target.as_str())?;
            graph.add_edge(source, target, ());
        }

        let mut reached: HashSet<&str> = HashSet::new();
        if let Some(start) = indices.get(start_id.as_str()) {
            let mut dfs = Dfs::new(&graph, *start);
            while let Some(index) = dfs.next(&graph) {
                reached.insert(graph[index]);
            }
        }

        let unreachable: Vec<String> = end_ids
            .iter()
            .filter(|id| !reached.contains(**id))
            .map(|id| id.to_string())
            .collect();
        let failed = match self.policy {
            ReachabilityPolicy::All => !unreachable.is_empty(),
            ReachabilityPolicy::Any => unreachable.len() == end_ids.len(),
        };
        if failed {
            return Err(ValidationError::UnreachableEndNode {
                node_ids: unreachable,
            });
        }

        Ok(())
    }
}

/// Validate `flow` with the default policy (every end node reachable).
pub fn validate(flow: &Flow) -> Result<(), ValidationError> {
    FlowValidator::default().validate(flow)
}
