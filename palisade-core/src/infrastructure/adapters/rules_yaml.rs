// palisade-core/src/infrastructure/adapters/rules_yaml.rs

// File-backed rule source. The store format mirrors the original rules
// table: one entry per rule, typed fields parsed and validated at load
// time so a malformed rule never reaches evaluation.

use async_trait::async_trait;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing::info;

use crate::domain::error::DomainError;
use crate::domain::rules::rule::{Action, Rule, RuleType};
use crate::domain::rules::rule_set::{ExecutionSettings, RuleSet};
use crate::error::PalisadeError;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::rules::RuleSource;

/// Raw rule entry as written in the YAML file; strings everywhere,
/// converted to the typed domain model by `into_rule`.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSpec {
    pub product_id: String,
    pub table_name: String,
    pub rule: String,
    pub rule_type: String,
    pub expectation: String,
    #[serde(default)]
    pub column_name: Option<String>,
    pub action_if_failed: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enable_for_source_dq_validation: bool,
    #[serde(default = "default_true")]
    pub enable_for_target_dq_validation: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub enable_error_drop_alert: bool,
    #[serde(default = "default_threshold")]
    pub error_drop_threshold: u8,
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> u8 {
    100
}

impl RuleSpec {
    fn into_rule(self) -> Result<Rule, DomainError> {
        let rule_type = RuleType::parse(&self.rule_type, &self.rule)?;
        let action_if_failed = Action::parse(&self.action_if_failed, &self.rule)?;
        Ok(Rule {
            product_id: self.product_id,
            table_name: self.table_name,
            name: self.rule,
            rule_type,
            expectation: self.expectation,
            column_name: self.column_name,
            action_if_failed,
            tag: self.tag,
            description: self.description,
            enable_for_source_dq_validation: self.enable_for_source_dq_validation,
            enable_for_target_dq_validation: self.enable_for_target_dq_validation,
            is_active: self.is_active,
            enable_error_drop_alert: self.enable_error_drop_alert,
            error_drop_threshold: self.error_drop_threshold,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RulesFile {
    rules: Vec<RuleSpec>,
}

pub struct YamlRuleSource {
    path: PathBuf,
}

impl YamlRuleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load and validate every rule in the file, without table filtering.
    /// Used by the CLI `rules` command.
    pub fn load_all(&self) -> Result<Vec<Rule>, PalisadeError> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            InfrastructureError::ConfigNotFound(format!(
                "Rules file {:?} could not be read: {}",
                self.path, e
            ))
        })?;
        let file: RulesFile =
            serde_yaml::from_str(&content).map_err(InfrastructureError::Yaml)?;

        let rules = file
            .rules
            .into_iter()
            .map(RuleSpec::into_rule)
            .collect::<Result<Vec<_>, _>>()?;
        for rule in &rules {
            rule.validate()?;
        }
        Ok(rules)
    }
}

#[async_trait]
impl RuleSource for YamlRuleSource {
    async fn get_rules(
        &self,
        table: &str,
    ) -> Result<(RuleSet, ExecutionSettings), PalisadeError> {
        let rules = self.load_all()?;
        let set = RuleSet::new(table, rules)?;
        let settings = ExecutionSettings::from_rule_set(&set);
        info!(count = set.rules().len(), table, "✅ Quality rules loaded");
        Ok((set, settings))
    }
}
