pub mod config;
pub mod error;
pub mod flow_graph;
pub mod types;

pub use config::{ChatflowConfig, ConfigLoader, ConfigValidator};
pub use error::AppError;
pub use types::*;
