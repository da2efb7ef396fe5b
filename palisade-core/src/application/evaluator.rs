// palisade-core/src/application/evaluator.rs

// Evaluates one rule type against a published view of the dataset. All
// checks are issued as set-based SQL: one combined pass for row rules, one
// scalar query per agg/query rule. The dataset itself is never mutated;
// each evaluation yields new (lazy) dataset values.

use datafusion::prelude::DataFrame;
use tracing::debug;

use crate::domain::context::{DqRuleResult, DqStage, RowRuleSummary, StageStatus};
use crate::domain::rules::action::{Disposition, resolve};
use crate::domain::rules::rule::Rule;
use crate::error::PalisadeError;
use crate::ports::engine::Engine;

/// Outcome of the row-level stage.
pub struct RowEvaluation {
    /// The dataset with records failing any `drop`-action rule excluded.
    pub retained: DataFrame,
    /// Records failing at least one rule, annotated with a
    /// `dq_failed_rules` column listing the failed rule names.
    pub errors: Option<DataFrame>,
    /// Per-rule failed-record tally, in rule order.
    pub summary: Vec<RowRuleSummary>,
    /// Distinct records failing at least one rule (dropped or annotated).
    pub error_count: u64,
    pub status: StageStatus,
}

/// Outcome of an agg- or query-level stage.
pub struct CheckEvaluation {
    /// The rules that failed, whatever their action.
    pub failures: Vec<DqRuleResult>,
    pub status: StageStatus,
}

pub struct StageEvaluator<'a> {
    engine: &'a dyn Engine,
}

impl<'a> StageEvaluator<'a> {
    pub fn new(engine: &'a dyn Engine) -> Self {
        Self { engine }
    }

    /// Row-level evaluation: one combined pass over the view.
    ///
    /// A record's disposition is the most severe outcome across the rules it
    /// fails (`abort` > `drop` > `keep`). A NULL predicate result counts as
    /// passing, deterministically.
    pub async fn evaluate_row(
        &self,
        view: &str,
        rules: &[&Rule],
    ) -> Result<RowEvaluation, PalisadeError> {
        if rules.is_empty() {
            let retained = self.engine.sql(&format!("SELECT * FROM \"{}\"", view)).await?;
            return Ok(RowEvaluation {
                retained,
                errors: None,
                summary: Vec::new(),
                error_count: 0,
                status: StageStatus::Skipped,
            });
        }

        // 1. Per-rule failed counts, in declaration order
        let counters: Vec<String> = rules
            .iter()
            .map(|r| {
                format!(
                    "coalesce(sum(case when {} then 1 else 0 end), 0) as \"{}\"",
                    failure_flag(r),
                    r.name
                )
            })
            .collect();
        let summary_sql = format!("SELECT {} FROM \"{}\"", counters.join(", "), view);
        let counts = match self.engine.query_counts(&summary_sql).await {
            Ok(counts) => counts,
            Err(cause) => return Err(self.locate_row_offender(view, rules, cause).await),
        };

        let summary: Vec<RowRuleSummary> = rules
            .iter()
            .zip(&counts)
            .map(|(rule, failed)| RowRuleSummary {
                rule: rule.name.clone(),
                action_if_failed: rule.action_if_failed,
                failed_count: *failed,
            })
            .collect();

        // 2. Distinct records failing at least one rule
        let any_failure = rules
            .iter()
            .map(|r| failure_flag(r))
            .collect::<Vec<_>>()
            .join(" OR ");
        let error_count = self
            .engine
            .query_scalar_u64(&format!(
                "SELECT count(*) FROM \"{}\" WHERE {}",
                view, any_failure
            ))
            .await?;

        // 3. Retained dataset: drop-action failures are excluded
        let drop_flags: Vec<String> = rules
            .iter()
            .filter(|r| resolve(r.action_if_failed, true) == Disposition::Drop)
            .map(|r| failure_flag(r))
            .collect();
        let retained_sql = if drop_flags.is_empty() {
            format!("SELECT * FROM \"{}\"", view)
        } else {
            format!(
                "SELECT * FROM \"{}\" WHERE NOT ({})",
                view,
                drop_flags.join(" OR ")
            )
        };
        let retained = self.engine.sql(&retained_sql).await?;

        // 4. Annotated error records
        let tags: Vec<String> = rules
            .iter()
            .map(|r| {
                format!(
                    "case when {} then '{};' else '' end",
                    failure_flag(r),
                    r.name
                )
            })
            .collect();
        let errors_sql = format!(
            "SELECT *, concat({}) AS dq_failed_rules FROM \"{}\" WHERE {}",
            tags.join(", "),
            view,
            any_failure
        );
        let errors = self.engine.sql(&errors_sql).await?;

        // 5. A breached fail-action rule fails the stage
        let disposition = rules
            .iter()
            .zip(&counts)
            .map(|(rule, failed)| resolve(rule.action_if_failed, *failed > 0))
            .fold(Disposition::Keep, Disposition::escalate);
        let status = if disposition == Disposition::Abort {
            StageStatus::Failed
        } else {
            StageStatus::Passed
        };

        debug!(view, error_count, %status, "row evaluation done");

        Ok(RowEvaluation {
            retained,
            errors: Some(errors),
            summary,
            error_count,
            status,
        })
    }

    /// Aggregate-level evaluation: one scalar check per rule over the whole
    /// view. No per-row granularity, so no record is ever removed here.
    pub async fn evaluate_agg(
        &self,
        view: &str,
        rules: &[&Rule],
        stage: DqStage,
    ) -> Result<CheckEvaluation, PalisadeError> {
        self.evaluate_checks(rules, stage, |rule| {
            format!("SELECT {} FROM \"{}\"", rule.expectation, view)
        })
        .await
    }

    /// Query-level evaluation: the expectation is an arbitrary boolean query
    /// over named views, evaluated standalone.
    pub async fn evaluate_query(
        &self,
        rules: &[&Rule],
        stage: DqStage,
    ) -> Result<CheckEvaluation, PalisadeError> {
        self.evaluate_checks(rules, stage, |rule| {
            format!("SELECT ({}) AS result", rule.expectation)
        })
        .await
    }

    async fn evaluate_checks(
        &self,
        rules: &[&Rule],
        stage: DqStage,
        to_sql: impl Fn(&Rule) -> String,
    ) -> Result<CheckEvaluation, PalisadeError> {
        if rules.is_empty() {
            return Ok(CheckEvaluation {
                failures: Vec::new(),
                status: StageStatus::Skipped,
            });
        }

        let mut failures = Vec::new();
        let mut disposition = Disposition::Keep;

        for rule in rules {
            let verdict = self
                .engine
                .query_scalar_bool(&to_sql(rule))
                .await
                .map_err(|cause| PalisadeError::RuleEvaluation {
                    stage: stage.key().to_string(),
                    rule: rule.name.clone(),
                    cause: Box::new(cause),
                })?;

            // NULL means the expected value is absent: the rule failed
            let failed = !verdict.unwrap_or(false);
            if failed {
                debug!(stage = stage.key(), rule = %rule.name, "expectation failed");
                failures.push(DqRuleResult::from_rule(rule));
            }
            disposition = disposition.escalate(resolve(rule.action_if_failed, failed));
        }

        let status = if disposition == Disposition::Abort {
            StageStatus::Failed
        } else {
            StageStatus::Passed
        };

        Ok(CheckEvaluation { failures, status })
    }

    /// The combined row pass cannot attribute an engine error to one rule;
    /// probe each predicate individually to name the offender.
    async fn locate_row_offender(
        &self,
        view: &str,
        rules: &[&Rule],
        cause: PalisadeError,
    ) -> PalisadeError {
        for rule in rules {
            let probe = format!(
                "SELECT count(*) FROM \"{}\" WHERE {}",
                view,
                failure_flag(rule)
            );
            if self.engine.query_scalar_u64(&probe).await.is_err() {
                return PalisadeError::RuleEvaluation {
                    stage: DqStage::Row.key().to_string(),
                    rule: rule.name.clone(),
                    cause: Box::new(cause),
                };
            }
        }
        PalisadeError::RuleEvaluation {
            stage: DqStage::Row.key().to_string(),
            rule: "<row rule set>".to_string(),
            cause: Box::new(cause),
        }
    }
}

/// TRUE iff the record fails the rule. NULL predicate results collapse to
/// "pass" so that counting, dropping and annotation stay consistent.
fn failure_flag(rule: &Rule) -> String {
    format!("coalesce(not ({}), false)", rule.expectation)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::domain::rules::rule::{Action, RuleType};
    use crate::infrastructure::engine::DataFusionEngine;
    use anyhow::Result;

    fn rule(name: &str, rule_type: RuleType, expectation: &str, action: Action) -> Rule {
        Rule {
            product_id: "product1".into(),
            table_name: "dq.employees".into(),
            name: name.into(),
            rule_type,
            expectation: expectation.into(),
            column_name: None,
            action_if_failed: action,
            tag: "validity".into(),
            description: format!("{} expectation", name),
            enable_for_source_dq_validation: true,
            enable_for_target_dq_validation: true,
            is_active: true,
            enable_error_drop_alert: false,
            error_drop_threshold: 0,
        }
    }

    /// 100 records with ids 1..=100, published as `src_view`.
    async fn engine_with_hundred_rows() -> Result<DataFusionEngine> {
        let engine = DataFusionEngine::new();
        let values: Vec<String> = (1..=100).map(|i| format!("({})", i)).collect();
        engine
            .session()
            .sql(&format!(
                "CREATE TABLE src (id INT) AS VALUES {}",
                values.join(", ")
            ))
            .await?;
        let df = engine.table("src").await?;
        engine.publish_view("src_view", df)?;
        Ok(engine)
    }

    #[tokio::test]
    async fn test_row_drop_and_ignore_scenario() -> Result<()> {
        let engine = engine_with_hundred_rows().await?;
        let evaluator = StageEvaluator::new(&engine);

        // R1 (drop) fails on ids 1..=10, R2 (ignore) fails on ids 1..=5
        let r1 = rule("r1", RuleType::Row, "id > 10", Action::Drop);
        let r2 = rule("r2", RuleType::Row, "id > 5", Action::Ignore);
        let eval = evaluator.evaluate_row("src_view", &[&r1, &r2]).await.unwrap();

        assert_eq!(eval.status, StageStatus::Passed);
        assert_eq!(eval.error_count, 10);
        assert_eq!(eval.summary.len(), 2);
        assert_eq!(eval.summary[0].rule, "r1");
        assert_eq!(eval.summary[0].failed_count, 10);
        assert_eq!(eval.summary[1].rule, "r2");
        assert_eq!(eval.summary[1].failed_count, 5);

        let output_count = engine.count(eval.retained.clone()).await.unwrap();
        assert_eq!(output_count, 90);

        let errors = eval.errors.unwrap();
        assert_eq!(engine.count(errors.clone()).await.unwrap(), 10);
        assert!(
            errors
                .schema()
                .fields()
                .iter()
                .any(|f| f.name() == "dq_failed_rules")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_row_ignore_only_keeps_every_record() -> Result<()> {
        let engine = engine_with_hundred_rows().await?;
        let evaluator = StageEvaluator::new(&engine);

        let r1 = rule("positive", RuleType::Row, "id > 20", Action::Ignore);
        let eval = evaluator.evaluate_row("src_view", &[&r1]).await.unwrap();

        assert_eq!(eval.status, StageStatus::Passed);
        assert_eq!(eval.error_count, 20);
        assert_eq!(engine.count(eval.retained.clone()).await.unwrap(), 100);
        Ok(())
    }

    #[tokio::test]
    async fn test_row_fail_action_fails_the_stage() -> Result<()> {
        let engine = engine_with_hundred_rows().await?;
        let evaluator = StageEvaluator::new(&engine);

        let hard = rule("no_small_ids", RuleType::Row, "id > 1", Action::Fail);
        let eval = evaluator.evaluate_row("src_view", &[&hard]).await.unwrap();

        assert_eq!(eval.status, StageStatus::Failed);
        assert_eq!(eval.error_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_row_unbreached_fail_rule_passes() -> Result<()> {
        let engine = engine_with_hundred_rows().await?;
        let evaluator = StageEvaluator::new(&engine);

        let hard = rule("ids_positive", RuleType::Row, "id > 0", Action::Fail);
        let eval = evaluator.evaluate_row("src_view", &[&hard]).await.unwrap();

        assert_eq!(eval.status, StageStatus::Passed);
        assert_eq!(eval.error_count, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_row_null_predicate_counts_as_passing() -> Result<()> {
        let engine = DataFusionEngine::new();
        engine
            .session()
            .sql(
                "CREATE TABLE src (id INT, dept VARCHAR) AS VALUES \
                 (1, NULL), (2, 'sales'), (3, 'hr')",
            )
            .await?;
        let df = engine.table("src").await?;
        engine.publish_view("src_view", df)?;

        let evaluator = StageEvaluator::new(&engine);
        let r = rule("known_dept", RuleType::Row, "dept <> 'finance'", Action::Drop);
        let eval = evaluator.evaluate_row("src_view", &[&r]).await.unwrap();

        // The NULL row neither fails nor gets dropped
        assert_eq!(eval.error_count, 0);
        assert_eq!(engine.count(eval.retained.clone()).await.unwrap(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_row_evaluation_is_idempotent() -> Result<()> {
        let engine = engine_with_hundred_rows().await?;
        let evaluator = StageEvaluator::new(&engine);

        let r1 = rule("r1", RuleType::Row, "id > 10", Action::Drop);
        let r2 = rule("r2", RuleType::Row, "id > 5", Action::Ignore);

        let first = evaluator.evaluate_row("src_view", &[&r1, &r2]).await.unwrap();
        let second = evaluator.evaluate_row("src_view", &[&r1, &r2]).await.unwrap();

        assert_eq!(first.summary, second.summary);
        assert_eq!(first.error_count, second.error_count);
        Ok(())
    }

    #[tokio::test]
    async fn test_row_empty_rule_list_is_skipped() -> Result<()> {
        let engine = engine_with_hundred_rows().await?;
        let evaluator = StageEvaluator::new(&engine);

        let eval = evaluator.evaluate_row("src_view", &[]).await.unwrap();
        assert_eq!(eval.status, StageStatus::Skipped);
        assert_eq!(eval.error_count, 0);
        assert!(eval.summary.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_row_malformed_predicate_names_the_offender() -> Result<()> {
        let engine = engine_with_hundred_rows().await?;
        let evaluator = StageEvaluator::new(&engine);

        let good = rule("good", RuleType::Row, "id > 0", Action::Ignore);
        let bad = rule("bad", RuleType::Row, "no_such_column > 0", Action::Ignore);
        let err = evaluator
            .evaluate_row("src_view", &[&good, &bad])
            .await
            .unwrap_err();

        match err {
            PalisadeError::RuleEvaluation { stage, rule, .. } => {
                assert_eq!(stage, "row_dq");
                assert_eq!(rule, "bad");
            }
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_agg_failures_recorded_without_dropping_rows() -> Result<()> {
        let engine = engine_with_hundred_rows().await?;
        let evaluator = StageEvaluator::new(&engine);

        let passing = rule("enough_rows", RuleType::Agg, "count(*) > 10", Action::Fail);
        let failing = rule("huge_table", RuleType::Agg, "count(*) > 1000", Action::Ignore);
        let eval = evaluator
            .evaluate_agg("src_view", &[&passing, &failing], DqStage::SourceAgg)
            .await
            .unwrap();

        // An ignore-action aggregate failure is recorded but does not fail the stage
        assert_eq!(eval.status, StageStatus::Passed);
        assert_eq!(eval.failures.len(), 1);
        assert_eq!(eval.failures[0].rule, "huge_table");
        assert_eq!(eval.failures[0].rule_type, RuleType::Agg);
        Ok(())
    }

    #[tokio::test]
    async fn test_agg_fail_action_breach_fails_the_stage() -> Result<()> {
        let engine = engine_with_hundred_rows().await?;
        let evaluator = StageEvaluator::new(&engine);

        let failing = rule("huge_table", RuleType::Agg, "count(*) > 1000", Action::Fail);
        let eval = evaluator
            .evaluate_agg("src_view", &[&failing], DqStage::SourceAgg)
            .await
            .unwrap();

        assert_eq!(eval.status, StageStatus::Failed);
        assert_eq!(eval.failures.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_agg_empty_rule_list_is_skipped() -> Result<()> {
        let engine = engine_with_hundred_rows().await?;
        let evaluator = StageEvaluator::new(&engine);

        let eval = evaluator
            .evaluate_agg("src_view", &[], DqStage::SourceAgg)
            .await
            .unwrap();
        assert_eq!(eval.status, StageStatus::Skipped);
        assert!(eval.failures.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_query_rules_run_against_published_views() -> Result<()> {
        let engine = engine_with_hundred_rows().await?;
        let evaluator = StageEvaluator::new(&engine);

        let q = rule(
            "view_not_empty",
            RuleType::Query,
            "(select count(*) from src_view) > 0",
            Action::Fail,
        );
        let eval = evaluator
            .evaluate_query(&[&q], DqStage::SourceQuery)
            .await
            .unwrap();
        assert_eq!(eval.status, StageStatus::Passed);
        assert!(eval.failures.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_query_rule_on_unknown_view_is_an_evaluation_error() -> Result<()> {
        let engine = engine_with_hundred_rows().await?;
        let evaluator = StageEvaluator::new(&engine);

        let q = rule(
            "ghost_view",
            RuleType::Query,
            "(select count(*) from not_published_view) > 0",
            Action::Ignore,
        );
        let err = evaluator
            .evaluate_query(&[&q], DqStage::SourceQuery)
            .await
            .unwrap_err();
        assert!(matches!(err, PalisadeError::RuleEvaluation { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_agg_null_aggregate_counts_as_failure() -> Result<()> {
        let engine = DataFusionEngine::new();
        engine
            .session()
            .sql("CREATE TABLE src (v INT) AS VALUES (1), (2)")
            .await?;
        let df = engine.table("src").await?;
        engine.publish_view("src_view", df)?;

        let evaluator = StageEvaluator::new(&engine);
        // sum over an empty selection is NULL: the expected value is absent
        let r = rule(
            "sum_of_nothing",
            RuleType::Agg,
            "sum(case when v > 100 then v end) > 0",
            Action::Ignore,
        );
        let eval = evaluator
            .evaluate_agg("src_view", &[&r], DqStage::SourceAgg)
            .await
            .unwrap();
        assert_eq!(eval.failures.len(), 1);
        Ok(())
    }
}
