// palisade-core/src/error.rs

use crate::domain::error::DomainError;
use crate::infrastructure::error::InfrastructureError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PalisadeError {
    // --- ERREURS DU DOMAINE (Rules, Context, Configuration) ---
    #[error(transparent)]
    Domain(#[from] DomainError),

    // --- ERREURS D'INFRASTRUCTURE (Engine, IO, Parsing) ---
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    // --- ERREUR D'EVALUATION (malformed rule, not bad data) ---
    #[error("error occurred while evaluating rule '{rule}' in the {stage} stage")]
    RuleEvaluation {
        stage: String,
        rule: String,
        #[source]
        cause: Box<PalisadeError>,
    },

    // --- ERREURS GÉNÉRIQUES / APPLICATIVES ---
    #[error("Internal Error: {0}")]
    Internal(String),
}

// Manual implementation to avoid duplicate enum variant but keep ergonomics
impl From<std::io::Error> for PalisadeError {
    fn from(err: std::io::Error) -> Self {
        PalisadeError::Infrastructure(InfrastructureError::Io(err))
    }
}
