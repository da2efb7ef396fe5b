// palisade-core/src/ports/rules.rs

use async_trait::async_trait;

use crate::domain::rules::{ExecutionSettings, RuleSet};
use crate::error::PalisadeError;

/// Where rules come from (a YAML file, a database table...). The core only
/// sees the loaded rule set plus the stage enablement flags derived from it.
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// Fails with a configuration error when the store is malformed or no
    /// rule targets the table.
    async fn get_rules(&self, table: &str)
    -> Result<(RuleSet, ExecutionSettings), PalisadeError>;
}
