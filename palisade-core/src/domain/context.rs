// palisade-core/src/domain/context.rs

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::error::DomainError;
use crate::domain::rules::rule::{Action, Rule, RuleType};

/// Status of one evaluation stage (and of the whole run).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum StageStatus {
    /// Placeholder before the run touches the stage.
    #[default]
    NotRun,
    Passed,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::NotRun => "NotRun",
            StageStatus::Passed => "Passed",
            StageStatus::Failed => "Failed",
            StageStatus::Skipped => "Skipped",
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five evaluation stages, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DqStage {
    SourceAgg,
    SourceQuery,
    Row,
    FinalAgg,
    FinalQuery,
}

impl DqStage {
    pub const ALL: [DqStage; 5] = [
        DqStage::SourceAgg,
        DqStage::SourceQuery,
        DqStage::Row,
        DqStage::FinalAgg,
        DqStage::FinalQuery,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            DqStage::SourceAgg => "source_agg_dq",
            DqStage::SourceQuery => "source_query_dq",
            DqStage::Row => "row_dq",
            DqStage::FinalAgg => "final_agg_dq",
            DqStage::FinalQuery => "final_query_dq",
        }
    }
}

impl std::fmt::Display for DqStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Status and timing of one stage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageState {
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl StageState {
    /// Wall-clock duration of the stage; stages that never ran report zero.
    pub fn duration_secs(&self) -> f64 {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => {
                (end - start).num_milliseconds().max(0) as f64 / 1000.0
            }
            _ => 0.0,
        }
    }
}

/// One failed agg/query rule, as recorded in the per-stage result collections.
#[derive(Debug, Clone, Serialize)]
pub struct DqRuleResult {
    pub rule: String,
    pub action_if_failed: Action,
    pub description: String,
    pub rule_type: RuleType,
}

impl DqRuleResult {
    pub fn from_rule(rule: &Rule) -> Self {
        Self {
            rule: rule.name.clone(),
            action_if_failed: rule.action_if_failed,
            description: rule.description.clone(),
            rule_type: rule.rule_type,
        }
    }
}

/// Per-rule failed-row tally from the row stage, in rule order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowRuleSummary {
    pub rule: String,
    pub action_if_failed: Action,
    pub failed_count: u64,
}

/// A row rule with error-drop alerting enabled, enriched with the observed
/// failure percentage. Filtering against the rule's own threshold is left
/// to the notification collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdFinding {
    pub rule: String,
    pub action_if_failed: Action,
    pub description: String,
    pub rule_type: RuleType,
    pub error_drop_threshold: u8,
    pub error_drop_percentage: f64,
}

/// Serializable snapshot of a completed run, handed to the stats sink.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub product_id: String,
    pub run_id: String,
    pub run_date: DateTime<Utc>,
    pub table_name: String,
    pub run_status: StageStatus,

    pub source_agg_dq: StageReport,
    pub source_query_dq: StageReport,
    pub row_dq: StageReport,
    pub final_agg_dq: StageReport,
    pub final_query_dq: StageReport,

    pub input_count: u64,
    pub error_count: u64,
    pub output_count: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_percentage: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_agg_dq_result: Option<Vec<DqRuleResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_agg_dq_result: Option<Vec<DqRuleResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_query_dq_result: Option<Vec<DqRuleResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_query_dq_result: Option<Vec<DqRuleResult>>,

    pub summarised_row_dq_result: Vec<RowRuleSummary>,
    pub rules_exceeds_threshold: Vec<ThresholdFinding>,

    pub error_drop_threshold: u8,
    pub notification_on_start: bool,
    pub notification_on_completion: bool,
    pub notification_on_fail: bool,
    pub notification_on_error_drop_breach: bool,
}

/// Status and duration of one stage in the snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: f64,
}

impl StageReport {
    fn from_state(state: &StageState) -> Self {
        Self {
            status: state.status,
            started_at: state.started_at,
            ended_at: state.ended_at,
            duration_secs: state.duration_secs(),
        }
    }
}

/// Mutable state of one engine run.
///
/// A context is constructed fresh per run, mutated exclusively by the flow
/// regulator and the stage evaluator while that run executes, and read-only
/// afterwards. It is never shared between concurrent runs.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub product_id: String,
    pub run_id: String,
    pub run_date: DateTime<Utc>,
    pub table_name: String,

    pub run_status: StageStatus,
    pub source_agg: StageState,
    pub source_query: StageState,
    pub row: StageState,
    pub final_agg: StageState,
    pub final_query: StageState,

    pub input_count: u64,
    pub error_count: u64,
    pub output_count: u64,

    pub source_agg_dq_result: Vec<DqRuleResult>,
    pub final_agg_dq_result: Vec<DqRuleResult>,
    pub source_query_dq_result: Vec<DqRuleResult>,
    pub final_query_dq_result: Vec<DqRuleResult>,

    pub summarised_row_dq_result: Vec<RowRuleSummary>,
    pub rules_exceeds_threshold: Vec<ThresholdFinding>,

    pub error_drop_threshold: u8,
    pub notification_on_start: bool,
    pub notification_on_completion: bool,
    pub notification_on_fail: bool,
    pub notification_on_error_drop_breach: bool,
}

impl RunContext {
    pub fn new(product_id: &str, table_name: &str) -> Self {
        let run_date = Utc::now();
        Self {
            product_id: product_id.to_string(),
            run_id: format!("{}_{}", product_id, run_date.format("%Y%m%d%H%M%S%3f")),
            run_date,
            table_name: table_name.to_string(),
            run_status: StageStatus::NotRun,
            source_agg: StageState::default(),
            source_query: StageState::default(),
            row: StageState::default(),
            final_agg: StageState::default(),
            final_query: StageState::default(),
            input_count: 0,
            error_count: 0,
            output_count: 0,
            source_agg_dq_result: Vec::new(),
            final_agg_dq_result: Vec::new(),
            source_query_dq_result: Vec::new(),
            final_query_dq_result: Vec::new(),
            summarised_row_dq_result: Vec::new(),
            rules_exceeds_threshold: Vec::new(),
            error_drop_threshold: 100,
            notification_on_start: false,
            notification_on_completion: false,
            notification_on_fail: true,
            notification_on_error_drop_breach: false,
        }
    }

    pub fn stage(&self, stage: DqStage) -> &StageState {
        match stage {
            DqStage::SourceAgg => &self.source_agg,
            DqStage::SourceQuery => &self.source_query,
            DqStage::Row => &self.row,
            DqStage::FinalAgg => &self.final_agg,
            DqStage::FinalQuery => &self.final_query,
        }
    }

    pub fn stage_mut(&mut self, stage: DqStage) -> &mut StageState {
        match stage {
            DqStage::SourceAgg => &mut self.source_agg,
            DqStage::SourceQuery => &mut self.source_query,
            DqStage::Row => &mut self.row,
            DqStage::FinalAgg => &mut self.final_agg,
            DqStage::FinalQuery => &mut self.final_query,
        }
    }

    /// Pessimistic default: the stage is `Failed` until the evaluator
    /// overwrites it with its real outcome.
    pub fn mark_stage_started(&mut self, stage: DqStage) {
        let state = self.stage_mut(stage);
        state.status = StageStatus::Failed;
        state.started_at = Some(Utc::now());
    }

    pub fn mark_stage_finished(&mut self, stage: DqStage, status: StageStatus) {
        let state = self.stage_mut(stage);
        state.status = status;
        state.ended_at = Some(Utc::now());
    }

    pub fn mark_stage_skipped(&mut self, stage: DqStage) {
        self.stage_mut(stage).status = StageStatus::Skipped;
    }

    /// `output_count / input_count * 100`, two decimals.
    pub fn output_percentage(&self) -> Result<f64, DomainError> {
        self.percentage_of(self.output_count, "output percentage")
    }

    /// `error_count / input_count * 100`, two decimals.
    pub fn error_percentage(&self) -> Result<f64, DomainError> {
        self.percentage_of(self.error_count, "error percentage")
    }

    /// `(input_count - error_count) / input_count * 100`, two decimals.
    pub fn success_percentage(&self) -> Result<f64, DomainError> {
        self.percentage_of(
            self.input_count.saturating_sub(self.error_count),
            "success percentage",
        )
    }

    fn percentage_of(&self, count: u64, what: &str) -> Result<f64, DomainError> {
        if self.input_count == 0 {
            return Err(DomainError::EmptyInput(what.to_string()));
        }
        Ok(round2(count as f64 / self.input_count as f64 * 100.0))
    }

    /// Overall verdict: `Failed` as soon as any stage failed, `Passed`
    /// otherwise.
    pub fn finalize_run_status(&mut self) -> StageStatus {
        let failed = DqStage::ALL
            .iter()
            .any(|s| self.stage(*s).status == StageStatus::Failed);
        self.run_status = if failed {
            StageStatus::Failed
        } else {
            StageStatus::Passed
        };
        self.run_status
    }

    /// Immutable snapshot for the stats sink. Result collections are absent
    /// for stages that did not run.
    pub fn snapshot(&self) -> RunStats {
        let ran = |stage: DqStage| {
            matches!(
                self.stage(stage).status,
                StageStatus::Passed | StageStatus::Failed
            )
        };

        RunStats {
            product_id: self.product_id.clone(),
            run_id: self.run_id.clone(),
            run_date: self.run_date,
            table_name: self.table_name.clone(),
            run_status: self.run_status,
            source_agg_dq: StageReport::from_state(&self.source_agg),
            source_query_dq: StageReport::from_state(&self.source_query),
            row_dq: StageReport::from_state(&self.row),
            final_agg_dq: StageReport::from_state(&self.final_agg),
            final_query_dq: StageReport::from_state(&self.final_query),
            input_count: self.input_count,
            error_count: self.error_count,
            output_count: self.output_count,
            output_percentage: self.output_percentage().ok(),
            error_percentage: self.error_percentage().ok(),
            success_percentage: self.success_percentage().ok(),
            source_agg_dq_result: ran(DqStage::SourceAgg)
                .then(|| self.source_agg_dq_result.clone()),
            final_agg_dq_result: ran(DqStage::FinalAgg)
                .then(|| self.final_agg_dq_result.clone()),
            source_query_dq_result: ran(DqStage::SourceQuery)
                .then(|| self.source_query_dq_result.clone()),
            final_query_dq_result: ran(DqStage::FinalQuery)
                .then(|| self.final_query_dq_result.clone()),
            summarised_row_dq_result: self.summarised_row_dq_result.clone(),
            rules_exceeds_threshold: self.rules_exceeds_threshold.clone(),
            error_drop_threshold: self.error_drop_threshold,
            notification_on_start: self.notification_on_start,
            notification_on_completion: self.notification_on_completion,
            notification_on_fail: self.notification_on_fail,
            notification_on_error_drop_breach: self.notification_on_error_drop_breach,
        }
    }
}

/// Round to two decimal places (percentages).
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Round to one decimal place (per-rule error drop percentages).
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
