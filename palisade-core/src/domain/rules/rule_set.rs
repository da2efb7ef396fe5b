// palisade-core/src/domain/rules/rule_set.rs

use std::collections::HashSet;

use crate::domain::error::DomainError;
use crate::domain::rules::rule::{Rule, RuleType};

/// Which dataset a stage reads: the raw source or the row-filtered output.
/// Row rules run once and have no stage distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleStage {
    Source,
    Final,
}

/// Ordered collection of the active rules targeting one table.
#[derive(Debug, Clone)]
pub struct RuleSet {
    table: String,
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Build a rule set from the active rules of one table.
    ///
    /// Fails with a configuration error when no rule survives the filter or
    /// when two rules share a name. Every rule is structurally validated.
    pub fn new(table: &str, rules: Vec<Rule>) -> Result<Self, DomainError> {
        let rules: Vec<Rule> = rules
            .into_iter()
            .filter(|r| r.is_active && r.table_name == table)
            .collect();

        if rules.is_empty() {
            return Err(DomainError::MissingRules(table.to_string()));
        }

        let mut seen = HashSet::new();
        for rule in &rules {
            rule.validate()?;
            if !seen.insert(rule.name.clone()) {
                return Err(DomainError::DuplicateRule(rule.name.clone()));
            }
        }

        Ok(Self {
            table: table.to_string(),
            rules,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Row rules, in declaration order.
    pub fn row_rules(&self) -> Vec<&Rule> {
        self.rules
            .iter()
            .filter(|r| r.rule_type == RuleType::Row)
            .collect()
    }

    /// Agg rules routed to the given stage.
    pub fn agg_rules(&self, stage: RuleStage) -> Vec<&Rule> {
        self.typed_rules(RuleType::Agg, stage)
    }

    /// Query rules routed to the given stage.
    pub fn query_rules(&self, stage: RuleStage) -> Vec<&Rule> {
        self.typed_rules(RuleType::Query, stage)
    }

    fn typed_rules(&self, rule_type: RuleType, stage: RuleStage) -> Vec<&Rule> {
        self.rules
            .iter()
            .filter(|r| r.rule_type == rule_type)
            .filter(|r| match stage {
                RuleStage::Source => r.enable_for_source_dq_validation,
                RuleStage::Final => r.enable_for_target_dq_validation,
            })
            .collect()
    }
}

/// Stage enablement flags, derived from the rule set.
///
/// A stage only runs when rules exist for it: `source_agg_dq` is on iff at
/// least one agg rule is enabled for source validation, and so on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSettings {
    pub row_dq: bool,
    pub agg_dq: bool,
    pub source_agg_dq: bool,
    pub target_agg_dq: bool,
    pub query_dq: bool,
    pub source_query_dq: bool,
    pub target_query_dq: bool,
}

impl ExecutionSettings {
    pub fn from_rule_set(rule_set: &RuleSet) -> Self {
        let agg_source = !rule_set.agg_rules(RuleStage::Source).is_empty();
        let agg_target = !rule_set.agg_rules(RuleStage::Final).is_empty();
        let query_source = !rule_set.query_rules(RuleStage::Source).is_empty();
        let query_target = !rule_set.query_rules(RuleStage::Final).is_empty();

        Self {
            row_dq: !rule_set.row_rules().is_empty(),
            agg_dq: agg_source || agg_target,
            source_agg_dq: agg_source,
            target_agg_dq: agg_target,
            query_dq: query_source || query_target,
            source_query_dq: query_source,
            target_query_dq: query_target,
        }
    }
}
