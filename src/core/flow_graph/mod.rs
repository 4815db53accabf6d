//! Flow definition, validation and execution for messaging automations.

pub mod action;
pub mod actions;
pub mod channel;
pub mod context;
pub mod executor;
pub mod expression;
pub mod lint;
pub mod model;
pub mod state;
pub mod store;
pub mod template;
pub mod validator;

pub use channel::{MediaResolver, MessagingChannel};
pub use context::{ExecutionContext, RunTarget, RunTrigger};
pub use executor::{EngineSettings, FlowEngine, RunHandle};
pub use model::{Connection, Flow, MediaKind, Node, NodeKind, NodeType, VarValue, Variables};
pub use state::{CancelToken, RunErrorKind, RunOutcome, RunReport};
pub use store::{FileGraphStore, GraphStore, InMemoryGraphStore, StoreError};
pub use validator::{validate, FlowValidator, ReachabilityPolicy, ValidationError};
