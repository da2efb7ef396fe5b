pub mod engine;
pub mod rules;
pub mod sinks;

pub use engine::Engine;
pub use rules::RuleSource;
pub use sinks::{NotificationEvent, NotificationSink, OutputSink, StatsSink};
