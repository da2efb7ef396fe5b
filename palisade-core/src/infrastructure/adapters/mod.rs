// palisade-core/src/infrastructure/adapters/mod.rs

pub mod notify_log;
pub mod output_parquet;
pub mod rules_yaml;
pub mod stats_json;

// Re-exports
pub use notify_log::LogNotificationSink;
pub use output_parquet::ParquetOutputSink;
pub use rules_yaml::YamlRuleSource;
pub use stats_json::JsonStatsSink;
