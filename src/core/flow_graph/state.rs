use crate::core::flow_graph::context::RunTarget;
use crate::core::flow_graph::model::{NodeType, Variables};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Why a run stopped without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunErrorKind {
    FlowNotFound,
    StoreUnavailable,
    ValidationFailed,
    NodeNotFound,
    NoOutgoingConnection,
    CycleDetected,
    UnknownActionKind,
    MissingActionParameters,
    ActionFailed,
    DeliveryFailed,
    MediaResolutionFailed,
    Cancelled,
}

impl fmt::Display for RunErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// An end node was reached.
    Completed { end_node_id: String },
    /// A condition node had no branch for its result. Not an error.
    NoMatchingBranch { node_id: String },
    Error {
        kind: RunErrorKind,
        node_id: Option<String>,
        message: String,
    },
}

impl RunOutcome {
    pub fn error(kind: RunErrorKind, node_id: Option<&str>, message: impl Into<String>) -> Self {
        RunOutcome::Error {
            kind,
            node_id: node_id.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }

    pub fn error_kind(&self) -> Option<RunErrorKind> {
        match self {
            RunOutcome::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Completed { .. } => "completed",
            RunOutcome::NoMatchingBranch { .. } => "no_matching_branch",
            RunOutcome::Error { .. } => "error",
        }
    }
}

/// One node execution within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeVisit {
    pub node_id: String,
    pub node_type: NodeType,
    pub entered_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Non-fatal problem observed during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDiagnostic {
    pub code: String,
    pub node_id: String,
    pub message: String,
}

/// Everything a caller needs to inspect a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub flow_id: String,
    /// Content hash of the executed graph; empty when the flow could not be loaded.
    pub flow_hash: String,
    pub target: RunTarget,
    pub outcome: RunOutcome,
    pub visits: Vec<NodeVisit>,
    pub variables: Variables,
    pub diagnostics: Vec<RunDiagnostic>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn visited_node_ids(&self) -> Vec<&str> {
        self.visits.iter().map(|visit| visit.node_id.as_str()).collect()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Cloneable cancellation signal shared between a run and its owner.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`CancelToken::cancel`] has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}
