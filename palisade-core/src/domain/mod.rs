pub mod context;
pub mod error;
pub mod rules;

// Re-exports pratiques pour simplifier les imports ailleurs
pub use context::{DqStage, RunContext, RunStats, StageStatus};
pub use error::DomainError;
