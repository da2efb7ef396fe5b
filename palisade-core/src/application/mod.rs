// palisade-core/src/application/mod.rs

pub mod evaluator;
pub mod gate;
pub mod regulator;

// --- RE-EXPORTS (FACADE PATTERN) ---
// Cela permet au CLI de faire :
// `use palisade_core::application::{QualityGate, GateOptions};`
// sans avoir à connaître la structure interne des fichiers.

pub use evaluator::StageEvaluator;
pub use gate::{GateOptions, GateOutcome, NotificationSettings, QualityGate};
pub use regulator::{FlowOutcome, FlowRegulator};
