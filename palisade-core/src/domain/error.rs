// palisade-core/src/domain/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    // --- CONFIGURATION (rule loading) ---
    #[error("No active data quality rules found for table '{0}'")]
    #[diagnostic(
        code(palisade::domain::missing_rules),
        help("Check the rules file: at least one active rule must target this table.")
    )]
    MissingRules(String),

    #[error("Duplicate rule name '{0}' in rule set")]
    #[diagnostic(code(palisade::domain::duplicate_rule))]
    DuplicateRule(String),

    #[error("Invalid action_if_failed '{value}' for rule '{rule}'")]
    #[diagnostic(
        code(palisade::domain::invalid_action),
        help("Allowed actions are: ignore, drop, fail.")
    )]
    InvalidAction { rule: String, value: String },

    #[error("Invalid rule_type '{value}' for rule '{rule}'")]
    #[diagnostic(
        code(palisade::domain::invalid_rule_type),
        help("Allowed rule types are: row, agg, query.")
    )]
    InvalidRuleType { rule: String, value: String },

    #[error("Invalid rule name '{0}'")]
    #[diagnostic(
        code(palisade::domain::invalid_rule_name),
        help("Rule names may only contain letters, digits and underscores.")
    )]
    InvalidRuleName(String),

    #[error("Invalid error_drop_threshold {value} for rule '{rule}'")]
    #[diagnostic(
        code(palisade::domain::invalid_threshold),
        help("The threshold is a percentage: it must be between 0 and 100.")
    )]
    InvalidThreshold { rule: String, value: i64 },

    #[error("Invalid expectation for rule '{rule}': {reason}")]
    #[diagnostic(
        code(palisade::domain::invalid_predicate),
        help("The expectation must be a valid SQL boolean expression.")
    )]
    InvalidPredicate { rule: String, reason: String },

    // --- CONFIGURATION (run wiring) ---
    #[error("View '{view}' is not published; the {stage} stage requires it")]
    #[diagnostic(
        code(palisade::domain::missing_view),
        help("Query-level rules run against a named view. Publish the dataset first.")
    )]
    MissingView { view: String, stage: String },

    // --- NUMERIC GUARDS ---
    #[error("Cannot compute {0}: the input dataset is empty")]
    #[diagnostic(code(palisade::domain::empty_input))]
    EmptyInput(String),

    // --- DATA CONTRACT ---
    #[error("The dataset producer did not return a dataframe: {0}")]
    #[diagnostic(
        code(palisade::domain::data_contract),
        help("The wrapped function must return a dataset handle, not an error.")
    )]
    DataContract(String),
}
