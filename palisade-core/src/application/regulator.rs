// palisade-core/src/application/regulator.rs

// Drives the five evaluation stages in dependency order:
//   1. source_agg   (raw dataset)
//   2. source_query (raw dataset)
//   3. row          (raw dataset -> row-filtered output)
//   4. final_agg    (row-filtered dataset)
//   5. final_query  (row-filtered dataset, via the published target view)
//
// A Failed stage marks the run Failed but does not stop the stages that are
// still eligible; only hard errors (malformed rules, missing views) abort
// the run mid-flight.

use datafusion::prelude::DataFrame;
use tracing::{info, instrument, warn};

use crate::application::evaluator::StageEvaluator;
use crate::domain::context::{DqStage, RunContext, ThresholdFinding, round1, round2};
use crate::domain::error::DomainError;
use crate::domain::rules::rule::Rule;
use crate::domain::rules::rule_set::{ExecutionSettings, RuleSet, RuleStage};
use crate::error::PalisadeError;
use crate::ports::engine::Engine;
use crate::ports::sinks::{NotificationEvent, NotificationSink};

/// What one regulated run hands back to the orchestrator.
pub struct FlowOutcome {
    /// The row-filtered dataset, or the raw input when row dq did not run.
    pub dataset: DataFrame,
    /// Annotated error records from the row stage, when it ran.
    pub errors: Option<DataFrame>,
}

pub struct FlowRegulator<'a> {
    engine: &'a dyn Engine,
    notifier: &'a dyn NotificationSink,
}

impl<'a> FlowRegulator<'a> {
    pub fn new(engine: &'a dyn Engine, notifier: &'a dyn NotificationSink) -> Self {
        Self { engine, notifier }
    }

    #[instrument(skip_all, fields(table = %rule_set.table()))]
    pub async fn run(
        &self,
        ctx: &mut RunContext,
        dataset: DataFrame,
        rule_set: &RuleSet,
        settings: &ExecutionSettings,
        source_view: &str,
        target_view: &str,
    ) -> Result<FlowOutcome, PalisadeError> {
        let evaluator = StageEvaluator::new(self.engine);

        // 1. Agg expectations on the source dataset
        let source_agg_rules = rule_set.agg_rules(RuleStage::Source);
        if settings.agg_dq && settings.source_agg_dq && !source_agg_rules.is_empty() {
            info!("processing agg level expectations on the source dataset");
            ctx.mark_stage_started(DqStage::SourceAgg);
            let eval = evaluator
                .evaluate_agg(source_view, &source_agg_rules, DqStage::SourceAgg)
                .await?;
            ctx.source_agg_dq_result = eval.failures;
            ctx.mark_stage_finished(DqStage::SourceAgg, eval.status);
        } else {
            ctx.mark_stage_skipped(DqStage::SourceAgg);
        }

        // 2. Query expectations on the source dataset
        let source_query_rules = rule_set.query_rules(RuleStage::Source);
        if settings.query_dq && settings.source_query_dq && !source_query_rules.is_empty() {
            self.require_view(source_view, DqStage::SourceQuery)?;
            info!("processing query level expectations on the source dataset");
            ctx.mark_stage_started(DqStage::SourceQuery);
            let eval = evaluator
                .evaluate_query(&source_query_rules, DqStage::SourceQuery)
                .await?;
            ctx.source_query_dq_result = eval.failures;
            ctx.mark_stage_finished(DqStage::SourceQuery, eval.status);
        } else {
            ctx.mark_stage_skipped(DqStage::SourceQuery);
        }

        // 3. Row expectations: produce the externally visible output
        let row_rules = rule_set.row_rules();
        let mut row_output: Option<DataFrame> = None;
        let mut error_records: Option<DataFrame> = None;
        if settings.row_dq && !row_rules.is_empty() {
            info!("processing row level expectations");
            ctx.mark_stage_started(DqStage::Row);
            let eval = evaluator.evaluate_row(source_view, &row_rules).await?;
            ctx.error_count = eval.error_count;
            ctx.summarised_row_dq_result = eval.summary.clone();

            if !target_view.is_empty() {
                self.engine.publish_view(target_view, eval.retained.clone())?;
            }
            ctx.output_count = self.engine.count(eval.retained.clone()).await?;
            ctx.mark_stage_finished(DqStage::Row, eval.status);

            self.enrich_threshold_findings(ctx, &row_rules)?;
            self.detect_threshold_breach(ctx).await?;

            row_output = Some(eval.retained);
            error_records = eval.errors;
        } else {
            ctx.mark_stage_skipped(DqStage::Row);
        }

        // 4. Agg expectations on the row-filtered dataset
        let final_agg_rules = rule_set.agg_rules(RuleStage::Final);
        if settings.row_dq
            && settings.agg_dq
            && settings.target_agg_dq
            && row_output.is_some()
            && !final_agg_rules.is_empty()
        {
            self.require_view(target_view, DqStage::FinalAgg)?;
            info!("processing agg level expectations on the final dataset");
            ctx.mark_stage_started(DqStage::FinalAgg);
            let eval = evaluator
                .evaluate_agg(target_view, &final_agg_rules, DqStage::FinalAgg)
                .await?;
            ctx.final_agg_dq_result = eval.failures;
            ctx.mark_stage_finished(DqStage::FinalAgg, eval.status);
        } else {
            ctx.mark_stage_skipped(DqStage::FinalAgg);
        }

        // 5. Query expectations on the row-filtered dataset
        let final_query_rules = rule_set.query_rules(RuleStage::Final);
        if settings.row_dq
            && settings.query_dq
            && settings.target_query_dq
            && row_output.is_some()
            && !final_query_rules.is_empty()
        {
            self.require_view(target_view, DqStage::FinalQuery)?;
            info!("processing query level expectations on the final dataset");
            ctx.mark_stage_started(DqStage::FinalQuery);
            let eval = evaluator
                .evaluate_query(&final_query_rules, DqStage::FinalQuery)
                .await?;
            ctx.final_query_dq_result = eval.failures;
            ctx.mark_stage_finished(DqStage::FinalQuery, eval.status);
        } else {
            ctx.mark_stage_skipped(DqStage::FinalQuery);
        }

        ctx.finalize_run_status();
        info!(status = %ctx.run_status, "flow regulation finished");

        Ok(FlowOutcome {
            dataset: row_output.unwrap_or(dataset),
            errors: error_records,
        })
    }

    /// Query-level evaluation needs its view published beforehand; its
    /// absence is a configuration error, raised before any evaluation.
    fn require_view(&self, view: &str, stage: DqStage) -> Result<(), PalisadeError> {
        if view.is_empty() || !self.engine.has_view(view) {
            return Err(DomainError::MissingView {
                view: view.to_string(),
                stage: stage.key().to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Every alert-enabled row rule lands in `rules_exceeds_threshold` with
    /// its observed failure percentage; filtering against the per-rule
    /// threshold is the notification collaborator's call.
    fn enrich_threshold_findings(
        &self,
        ctx: &mut RunContext,
        rules: &[&Rule],
    ) -> Result<(), PalisadeError> {
        let alerting: Vec<&Rule> = rules
            .iter()
            .copied()
            .filter(|r| r.enable_error_drop_alert)
            .collect();
        if alerting.is_empty() {
            return Ok(());
        }
        if ctx.input_count == 0 {
            return Err(DomainError::EmptyInput("error drop percentage".to_string()).into());
        }

        for rule in alerting {
            let failed = ctx
                .summarised_row_dq_result
                .iter()
                .find(|s| s.rule == rule.name)
                .map(|s| s.failed_count)
                .unwrap_or(0);
            let percentage = round1(failed as f64 / ctx.input_count as f64 * 100.0);
            ctx.rules_exceeds_threshold.push(ThresholdFinding {
                rule: rule.name.clone(),
                action_if_failed: rule.action_if_failed,
                description: rule.description.clone(),
                rule_type: rule.rule_type,
                error_drop_threshold: rule.error_drop_threshold,
                error_drop_percentage: percentage,
            });
        }
        Ok(())
    }

    /// Run-level breach check, distinct from per-rule `fail` actions: it
    /// only signals the notification collaborator and never fails the run.
    async fn detect_threshold_breach(&self, ctx: &RunContext) -> Result<(), PalisadeError> {
        if !ctx.notification_on_error_drop_breach {
            return Ok(());
        }
        let dropped = round2(100.0 - ctx.output_percentage()?);
        if dropped >= f64::from(ctx.error_drop_threshold) {
            warn!(
                dropped,
                threshold = ctx.error_drop_threshold,
                "error drop threshold breached"
            );
            let event = NotificationEvent::threshold_breach(ctx, dropped);
            if let Err(e) = self.notifier.notify(&event).await {
                warn!(error = %e, "could not deliver threshold breach notification");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::domain::context::StageStatus;
    use crate::domain::rules::rule::{Action, RuleType};
    use crate::infrastructure::engine::DataFusionEngine;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    // --- MOCK NOTIFIER ---
    #[derive(Clone, Default)]
    struct MockNotifier {
        pub events: Arc<Mutex<Vec<NotificationEvent>>>,
    }

    #[async_trait]
    impl NotificationSink for MockNotifier {
        async fn notify(&self, event: &NotificationEvent) -> Result<(), PalisadeError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

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

    async fn engine_with_rows(n: u32) -> Result<DataFusionEngine> {
        let engine = DataFusionEngine::new();
        if n == 0 {
            engine.session().sql("CREATE TABLE src (id INT)").await?;
        } else {
            let values: Vec<String> = (1..=n).map(|i| format!("({})", i)).collect();
            engine
                .session()
                .sql(&format!(
                    "CREATE TABLE src (id INT) AS VALUES {}",
                    values.join(", ")
                ))
                .await?;
        }
        let df = engine.table("src").await?;
        engine.publish_view("src_view", df)?;
        Ok(engine)
    }

    async fn run_flow(
        engine: &DataFusionEngine,
        notifier: &MockNotifier,
        ctx: &mut RunContext,
        rules: Vec<Rule>,
        target_view: &str,
    ) -> Result<FlowOutcome, PalisadeError> {
        let rule_set = RuleSet::new("dq.employees", rules).unwrap();
        let settings = ExecutionSettings::from_rule_set(&rule_set);
        let dataset = engine.table("src").await?;
        let regulator = FlowRegulator::new(engine, notifier);
        regulator
            .run(ctx, dataset, &rule_set, &settings, "src_view", target_view)
            .await
    }

    #[tokio::test]
    async fn test_five_stage_flow_all_passing() -> Result<()> {
        let engine = engine_with_rows(100).await?;
        let notifier = MockNotifier::default();
        let mut ctx = RunContext::new("product1", "dq.employees");
        ctx.input_count = 100;

        let outcome = run_flow(
            &engine,
            &notifier,
            &mut ctx,
            vec![
                rule("agg_rows", RuleType::Agg, "count(*) > 10", Action::Fail),
                rule(
                    "query_rows",
                    RuleType::Query,
                    "(select count(*) from src_view) > 10",
                    Action::Fail,
                ),
                rule("row_ids", RuleType::Row, "id > 10", Action::Drop),
            ],
            "employees_view",
        )
        .await
        .unwrap();

        assert_eq!(ctx.source_agg.status, StageStatus::Passed);
        assert_eq!(ctx.source_query.status, StageStatus::Passed);
        assert_eq!(ctx.row.status, StageStatus::Passed);
        assert_eq!(ctx.final_agg.status, StageStatus::Passed);
        assert_eq!(ctx.final_query.status, StageStatus::Passed);
        assert_eq!(ctx.run_status, StageStatus::Passed);

        assert_eq!(ctx.error_count, 10);
        assert_eq!(ctx.output_count, 90);
        assert_eq!(ctx.error_percentage().unwrap(), 10.0);
        assert_eq!(engine.count(outcome.dataset.clone()).await.unwrap(), 90);
        assert!(outcome.errors.is_some());

        // The target view now serves the row-filtered dataset
        assert_eq!(
            engine
                .query_scalar_u64("SELECT count(*) FROM employees_view")
                .await
                .unwrap(),
            90
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_final_stages_skipped_without_row_dq() -> Result<()> {
        let engine = engine_with_rows(10).await?;
        let notifier = MockNotifier::default();
        let mut ctx = RunContext::new("product1", "dq.employees");
        ctx.input_count = 10;

        // Agg and query rules enabled for the target stage, but no row rule:
        // stages 4 and 5 must report Skipped regardless of their own flags.
        run_flow(
            &engine,
            &notifier,
            &mut ctx,
            vec![
                rule("agg_rows", RuleType::Agg, "count(*) > 0", Action::Fail),
                rule(
                    "query_rows",
                    RuleType::Query,
                    "(select count(*) from src_view) > 0",
                    Action::Fail,
                ),
            ],
            "employees_view",
        )
        .await
        .unwrap();

        assert_eq!(ctx.source_agg.status, StageStatus::Passed);
        assert_eq!(ctx.row.status, StageStatus::Skipped);
        assert_eq!(ctx.final_agg.status, StageStatus::Skipped);
        assert_eq!(ctx.final_query.status, StageStatus::Skipped);
        assert_eq!(ctx.run_status, StageStatus::Passed);
        Ok(())
    }

    #[tokio::test]
    async fn test_source_agg_failure_does_not_stop_the_row_stage() -> Result<()> {
        let engine = engine_with_rows(100).await?;
        let notifier = MockNotifier::default();
        let mut ctx = RunContext::new("product1", "dq.employees");
        ctx.input_count = 100;

        let outcome = run_flow(
            &engine,
            &notifier,
            &mut ctx,
            vec![
                rule("huge_table", RuleType::Agg, "count(*) > 1000", Action::Fail),
                rule("row_ids", RuleType::Row, "id > 10", Action::Drop),
            ],
            "employees_view",
        )
        .await
        .unwrap();

        assert_eq!(ctx.source_agg.status, StageStatus::Failed);
        assert_eq!(ctx.row.status, StageStatus::Passed);
        assert_eq!(ctx.run_status, StageStatus::Failed);
        // The row-filtered dataset still exists; persisting it is the
        // orchestrator's decision, and it will not for a failed run.
        assert_eq!(engine.count(outcome.dataset.clone()).await.unwrap(), 90);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_target_view_is_a_configuration_error() -> Result<()> {
        let engine = engine_with_rows(10).await?;
        let notifier = MockNotifier::default();
        let mut ctx = RunContext::new("product1", "dq.employees");
        ctx.input_count = 10;

        let mut target_query = rule(
            "target_not_empty",
            RuleType::Query,
            "(select count(*) from employees_view) > 0",
            Action::Fail,
        );
        target_query.enable_for_source_dq_validation = false;

        // Empty target view name: the row stage publishes nothing, so the
        // final query stage must refuse to run.
        let err = run_flow(
            &engine,
            &notifier,
            &mut ctx,
            vec![
                rule("row_ids", RuleType::Row, "id > 0", Action::Ignore),
                target_query,
            ],
            "",
        )
        .await
        .unwrap_err();

        match err {
            PalisadeError::Domain(DomainError::MissingView { stage, .. }) => {
                assert_eq!(stage, "final_query_dq");
            }
            other => panic!("unexpected error: {other}"),
        }
        // The configuration error surfaced before any final query evaluation
        assert_eq!(ctx.final_query.status, StageStatus::NotRun);
        Ok(())
    }

    #[tokio::test]
    async fn test_threshold_breach_emits_notification_and_continues() -> Result<()> {
        let engine = engine_with_rows(100).await?;
        let notifier = MockNotifier::default();
        let mut ctx = RunContext::new("product1", "dq.employees");
        ctx.input_count = 100;
        ctx.notification_on_error_drop_breach = true;
        ctx.error_drop_threshold = 10;

        // 20% of the records get dropped: 100 - 80 >= 10 -> breach
        run_flow(
            &engine,
            &notifier,
            &mut ctx,
            vec![rule("row_ids", RuleType::Row, "id > 20", Action::Drop)],
            "employees_view",
        )
        .await
        .unwrap();

        assert_eq!(ctx.run_status, StageStatus::Passed);
        let events = notifier.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            NotificationEvent::ThresholdBreach {
                error_drop_percentage,
                error_drop_threshold,
                ..
            } => {
                assert_eq!(*error_drop_percentage, 20.0);
                assert_eq!(*error_drop_threshold, 10);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_no_breach_event_below_threshold() -> Result<()> {
        let engine = engine_with_rows(100).await?;
        let notifier = MockNotifier::default();
        let mut ctx = RunContext::new("product1", "dq.employees");
        ctx.input_count = 100;
        ctx.notification_on_error_drop_breach = true;
        ctx.error_drop_threshold = 50;

        run_flow(
            &engine,
            &notifier,
            &mut ctx,
            vec![rule("row_ids", RuleType::Row, "id > 20", Action::Drop)],
            "employees_view",
        )
        .await
        .unwrap();

        assert!(notifier.events.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_alert_enabled_rules_always_enriched() -> Result<()> {
        let engine = engine_with_rows(100).await?;
        let notifier = MockNotifier::default();
        let mut ctx = RunContext::new("product1", "dq.employees");
        ctx.input_count = 100;

        let mut alerting = rule("row_ids", RuleType::Row, "id > 3", Action::Ignore);
        alerting.enable_error_drop_alert = true;
        alerting.error_drop_threshold = 90; // far above the observed 3%
        let silent = rule("row_other", RuleType::Row, "id > 50", Action::Ignore);

        run_flow(
            &engine,
            &notifier,
            &mut ctx,
            vec![alerting, silent],
            "employees_view",
        )
        .await
        .unwrap();

        // Included regardless of its own threshold; the silent rule is not.
        assert_eq!(ctx.rules_exceeds_threshold.len(), 1);
        let finding = &ctx.rules_exceeds_threshold[0];
        assert_eq!(finding.rule, "row_ids");
        assert_eq!(finding.error_drop_percentage, 3.0);
        assert_eq!(finding.error_drop_threshold, 90);
        Ok(())
    }

    #[tokio::test]
    async fn test_threshold_enrichment_refuses_empty_input() -> Result<()> {
        let engine = engine_with_rows(0).await?;
        let notifier = MockNotifier::default();
        let mut ctx = RunContext::new("product1", "dq.employees");
        ctx.input_count = 0;

        let mut alerting = rule("row_ids", RuleType::Row, "id > 3", Action::Ignore);
        alerting.enable_error_drop_alert = true;

        let err = run_flow(
            &engine,
            &notifier,
            &mut ctx,
            vec![alerting],
            "employees_view",
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            PalisadeError::Domain(DomainError::EmptyInput(_))
        ));
        Ok(())
    }
}
