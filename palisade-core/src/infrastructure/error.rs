// palisade-core/src/infrastructure/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    #[error("DataFusion Engine Error: {0}")]
    #[diagnostic(
        code(palisade::infra::engine::datafusion),
        help("An error occurred inside the SQL engine.")
    )]
    DataFusion(#[from] datafusion::error::DataFusionError),

    #[error("Query did not return a single scalar value: {0}")]
    #[diagnostic(
        code(palisade::infra::engine::not_scalar),
        help("Aggregate and query expectations must collapse to one value.")
    )]
    NotScalar(String),
}

#[derive(Error, Debug, Diagnostic)]
pub enum InfrastructureError {
    // --- ENGINE (Abstracted) ---
    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),

    // --- FILESYSTEM (IO) ---
    #[error("File System Error: {0}")]
    #[diagnostic(
        code(palisade::infra::io),
        help("Check file permissions or path validity.")
    )]
    Io(#[from] std::io::Error),

    // --- CONFIG / YAML ---
    #[error("YAML Parsing Error: {0}")]
    #[diagnostic(
        code(palisade::infra::yaml),
        help("Check your YAML syntax (indentation, types).")
    )]
    Yaml(#[from] serde_yaml::Error),

    // --- STATS / JSON ---
    #[error("JSON Serialization Error: {0}")]
    #[diagnostic(code(palisade::infra::json))]
    Json(#[from] serde_json::Error),

    #[error("Configuration Error: {0}")]
    ConfigError(String),

    #[error("Project configuration not found at '{0}'")]
    #[diagnostic(code(palisade::infra::config_missing))]
    ConfigNotFound(String),
}

// Manual implementation for shortcuts (e.g. `?` operator on engine calls)
impl From<datafusion::error::DataFusionError> for InfrastructureError {
    fn from(err: datafusion::error::DataFusionError) -> Self {
        InfrastructureError::Engine(EngineError::DataFusion(err))
    }
}
