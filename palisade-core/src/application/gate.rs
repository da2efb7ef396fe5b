// palisade-core/src/application/gate.rs

// The quality gate wraps a dataset-producing step with the five-stage rule
// pipeline: load rules, notify start, materialize the producer's dataset,
// regulate the flow, collect stats, notify completion/failure, and persist
// the row-filtered output when (and only when) the run passed.
//
// This is an explicit ordered pipeline driven by one orchestrator function;
// there is no implicit call-stack wrapping.

use std::collections::HashMap;
use std::future::Future;

use datafusion::prelude::DataFrame;
use tracing::{info, instrument, warn};

use crate::application::regulator::{FlowOutcome, FlowRegulator};
use crate::domain::context::{RunContext, RunStats, StageStatus};
use crate::domain::error::DomainError;
use crate::domain::rules::rule_set::{ExecutionSettings, RuleSet};
use crate::error::PalisadeError;
use crate::infrastructure::engine::sanitize_identifier;
use crate::ports::engine::Engine;
use crate::ports::rules::RuleSource;
use crate::ports::sinks::{NotificationEvent, NotificationSink, OutputSink, StatsSink};

/// Notification wiring for one run. Failure notifications default to on,
/// everything else to off.
#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub on_start: bool,
    pub on_completion: bool,
    pub on_fail: bool,
    pub on_error_drop_breach: bool,
    /// Run-level acceptable error drop, as a percentage.
    pub error_drop_threshold: u8,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            on_start: false,
            on_completion: false,
            on_fail: true,
            on_error_drop_breach: false,
            error_drop_threshold: 100,
        }
    }
}

/// Per-run options, the moral equivalent of the original decorator's
/// keyword arguments.
#[derive(Debug, Clone)]
pub struct GateOptions {
    pub product_id: String,
    pub table: String,
    /// View name under which the row-filtered dataset is published for the
    /// final agg/query stages. Defaults to `{table}_view`.
    pub target_table_view: Option<String>,
    pub write_to_table: bool,
    pub write_error_records: bool,
    /// Passed through unmodified to the output sink.
    pub write_options: HashMap<String, String>,
    pub error_table_options: HashMap<String, String>,
    pub notifications: NotificationSettings,
}

impl GateOptions {
    pub fn new(product_id: &str, table: &str) -> Self {
        Self {
            product_id: product_id.to_string(),
            table: table.to_string(),
            target_table_view: None,
            write_to_table: false,
            write_error_records: false,
            write_options: HashMap::new(),
            error_table_options: HashMap::new(),
            notifications: NotificationSettings::default(),
        }
    }
}

/// What a completed run hands back to the caller. A breached `fail`-action
/// rule is a normal outcome (`passed = false`), not an error.
pub struct GateOutcome {
    pub passed: bool,
    pub stats: RunStats,
    /// The row-filtered dataset, present when row dq ran.
    pub output: Option<DataFrame>,
}

pub struct QualityGate<'a> {
    engine: &'a dyn Engine,
    rules: &'a dyn RuleSource,
    stats: &'a dyn StatsSink,
    notifier: &'a dyn NotificationSink,
    output: &'a dyn OutputSink,
}

impl<'a> QualityGate<'a> {
    pub fn new(
        engine: &'a dyn Engine,
        rules: &'a dyn RuleSource,
        stats: &'a dyn StatsSink,
        notifier: &'a dyn NotificationSink,
        output: &'a dyn OutputSink,
    ) -> Self {
        Self {
            engine,
            rules,
            stats,
            notifier,
            output,
        }
    }

    /// Run the gate around a zero-argument dataset producer.
    ///
    /// A producer error is a data-contract violation: the caller's function
    /// is wrong, not their rules or their data.
    #[instrument(skip_all, fields(product_id = %options.product_id, table = %options.table))]
    pub async fn run<F, Fut>(
        &self,
        options: &GateOptions,
        producer: F,
    ) -> Result<GateOutcome, PalisadeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<DataFrame>>,
    {
        // Fresh context per run; a context is never reused across runs
        let mut ctx = RunContext::new(&options.product_id, &options.table);
        ctx.notification_on_start = options.notifications.on_start;
        ctx.notification_on_completion = options.notifications.on_completion;
        ctx.notification_on_fail = options.notifications.on_fail;
        ctx.notification_on_error_drop_breach = options.notifications.on_error_drop_breach;
        ctx.error_drop_threshold = options.notifications.error_drop_threshold;

        // Configuration errors surface here, before any stage executes
        let (rule_set, settings) = self.rules.get_rules(&options.table).await?;

        if ctx.notification_on_start {
            self.notify_best_effort(&NotificationEvent::started(&ctx)).await;
        }

        let result = self
            .execute(&mut ctx, options, &rule_set, &settings, producer)
            .await;

        match result {
            Ok(flow) => {
                let stats = ctx.snapshot();
                self.stats.collect(&stats).await?;

                let passed = ctx.run_status == StageStatus::Passed;
                if passed {
                    if ctx.notification_on_completion {
                        self.notify_best_effort(&NotificationEvent::completed(&ctx)).await;
                    }
                } else if ctx.notification_on_fail {
                    self.notify_best_effort(&NotificationEvent::failed(&ctx)).await;
                }

                if settings.row_dq
                    && options.write_error_records
                    && let Some(errors) = flow.errors
                {
                    info!("writing annotated error records to the output sink");
                    self.output
                        .write_errors(errors, &options.table, &options.error_table_options)
                        .await?;
                }

                if settings.row_dq && options.write_to_table {
                    if passed {
                        info!("writing the row-filtered dataset to the output sink");
                        self.output
                            .write(flow.dataset.clone(), &options.table, &options.write_options)
                            .await?;
                    } else {
                        info!("run failed: the row-filtered dataset is not persisted");
                    }
                }

                Ok(GateOutcome {
                    passed,
                    stats,
                    output: settings.row_dq.then(|| flow.dataset),
                })
            }
            Err(e) => {
                ctx.run_status = StageStatus::Failed;
                let stats = ctx.snapshot();
                if let Err(stats_err) = self.stats.collect(&stats).await {
                    warn!(error = %stats_err, "could not persist statistics for the failed run");
                }
                if ctx.notification_on_fail {
                    self.notify_best_effort(&NotificationEvent::failed(&ctx)).await;
                }
                Err(e)
            }
        }
    }

    async fn execute<F, Fut>(
        &self,
        ctx: &mut RunContext,
        options: &GateOptions,
        rule_set: &RuleSet,
        settings: &ExecutionSettings,
        producer: F,
    ) -> Result<FlowOutcome, PalisadeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<DataFrame>>,
    {
        info!("materializing the input dataset");
        let dataset = producer()
            .await
            .map_err(|e| DomainError::DataContract(e.to_string()))?;

        ctx.input_count = self.engine.count(dataset.clone()).await?;
        info!(input_count = ctx.input_count, "input dataset ready");

        let source_view = format!("{}_source_view", sanitize_identifier(&options.table));
        self.engine.publish_view(&source_view, dataset.clone())?;

        let target_view = options
            .target_table_view
            .clone()
            .unwrap_or_else(|| format!("{}_view", sanitize_identifier(&options.table)));

        let regulator = FlowRegulator::new(self.engine, self.notifier);
        regulator
            .run(ctx, dataset, rule_set, settings, &source_view, &target_view)
            .await
    }

    /// Notification delivery is opaque and never fails a run.
    async fn notify_best_effort(&self, event: &NotificationEvent) {
        if let Err(e) = self.notifier.notify(event).await {
            warn!(error = %e, "notification delivery failed");
        }
    }
}
