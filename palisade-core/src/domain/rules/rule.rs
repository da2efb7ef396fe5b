// palisade-core/src/domain/rules/rule.rs

use serde::Serialize;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::domain::error::DomainError;

/// Granularity of a data quality rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    /// Predicate evaluated independently per record.
    Row,
    /// Predicate evaluated once against an aggregate over the whole dataset.
    Agg,
    /// Predicate expressed as a query over named, addressable views.
    Query,
}

impl RuleType {
    /// Parse a configuration string. Invalid values are rejected at load
    /// time, never at evaluation time.
    pub fn parse(value: &str, rule: &str) -> Result<Self, DomainError> {
        match value {
            "row" => Ok(RuleType::Row),
            "agg" => Ok(RuleType::Agg),
            "query" => Ok(RuleType::Query),
            _ => Err(DomainError::InvalidRuleType {
                rule: rule.to_string(),
                value: value.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Row => "row",
            RuleType::Agg => "agg",
            RuleType::Query => "query",
        }
    }
}

impl std::fmt::Display for RuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remediation policy attached to a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Keep the record, only annotate it as failing.
    Ignore,
    /// Exclude the record from the output dataset.
    Drop,
    /// Mark the whole run as failed.
    Fail,
}

impl Action {
    pub fn parse(value: &str, rule: &str) -> Result<Self, DomainError> {
        match value {
            "ignore" => Ok(Action::Ignore),
            "drop" => Ok(Action::Drop),
            "fail" => Ok(Action::Fail),
            _ => Err(DomainError::InvalidAction {
                rule: rule.to_string(),
                value: value.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Ignore => "ignore",
            Action::Drop => "drop",
            Action::Fail => "fail",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One data quality check. Immutable once loaded for a run.
///
/// The `expectation` is a SQL boolean expression: per-record for row rules,
/// an aggregate expression for agg rules, a query expression over named
/// views for query rules.
#[derive(Debug, Clone, Serialize)]
pub struct Rule {
    pub product_id: String,
    pub table_name: String,
    pub name: String,
    pub rule_type: RuleType,
    pub expectation: String,
    pub column_name: Option<String>,
    pub action_if_failed: Action,
    pub tag: String,
    pub description: String,
    pub enable_for_source_dq_validation: bool,
    pub enable_for_target_dq_validation: bool,
    pub is_active: bool,
    pub enable_error_drop_alert: bool,
    pub error_drop_threshold: u8,
}

impl Rule {
    /// Structural validation, run once at load time.
    ///
    /// The rule name doubles as a SQL alias, so its charset is restricted.
    /// The expectation is parsed with sqlparser so that a malformed rule is
    /// surfaced as a configuration error instead of a mid-run surprise.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(DomainError::InvalidRuleName(self.name.clone()));
        }

        if self.error_drop_threshold > 100 {
            return Err(DomainError::InvalidThreshold {
                rule: self.name.clone(),
                value: i64::from(self.error_drop_threshold),
            });
        }

        if self.expectation.trim().is_empty() {
            return Err(DomainError::InvalidPredicate {
                rule: self.name.clone(),
                reason: "expectation is empty".to_string(),
            });
        }

        let dialect = GenericDialect {};
        Parser::new(&dialect)
            .try_with_sql(&self.expectation)
            .and_then(|mut parser| parser.parse_expr())
            .map_err(|e| DomainError::InvalidPredicate {
                rule: self.name.clone(),
                reason: e.to_string(),
            })?;

        Ok(())
    }
}
