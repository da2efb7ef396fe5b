// palisade-core/src/ports/sinks.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use datafusion::prelude::DataFrame;
use serde::Serialize;

use crate::domain::context::{RunContext, RunStats, StageStatus, ThresholdFinding};
use crate::error::PalisadeError;

/// Discrete events emitted during a run. Delivery (email, chat, webhook...)
/// is entirely the sink's business.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    RunStarted {
        product_id: String,
        run_id: String,
        table_name: String,
        run_date: DateTime<Utc>,
    },
    RunCompleted {
        product_id: String,
        run_id: String,
        table_name: String,
        run_status: StageStatus,
        input_count: u64,
        error_count: u64,
        output_count: u64,
    },
    RunFailed {
        product_id: String,
        run_id: String,
        table_name: String,
        run_status: StageStatus,
        input_count: u64,
        error_count: u64,
        output_count: u64,
    },
    ThresholdBreach {
        product_id: String,
        run_id: String,
        table_name: String,
        error_drop_percentage: f64,
        error_drop_threshold: u8,
        rules_exceeds_threshold: Vec<ThresholdFinding>,
    },
}

impl NotificationEvent {
    pub fn started(ctx: &RunContext) -> Self {
        NotificationEvent::RunStarted {
            product_id: ctx.product_id.clone(),
            run_id: ctx.run_id.clone(),
            table_name: ctx.table_name.clone(),
            run_date: ctx.run_date,
        }
    }

    pub fn completed(ctx: &RunContext) -> Self {
        NotificationEvent::RunCompleted {
            product_id: ctx.product_id.clone(),
            run_id: ctx.run_id.clone(),
            table_name: ctx.table_name.clone(),
            run_status: ctx.run_status,
            input_count: ctx.input_count,
            error_count: ctx.error_count,
            output_count: ctx.output_count,
        }
    }

    pub fn failed(ctx: &RunContext) -> Self {
        NotificationEvent::RunFailed {
            product_id: ctx.product_id.clone(),
            run_id: ctx.run_id.clone(),
            table_name: ctx.table_name.clone(),
            run_status: ctx.run_status,
            input_count: ctx.input_count,
            error_count: ctx.error_count,
            output_count: ctx.output_count,
        }
    }

    pub fn threshold_breach(ctx: &RunContext, error_drop_percentage: f64) -> Self {
        NotificationEvent::ThresholdBreach {
            product_id: ctx.product_id.clone(),
            run_id: ctx.run_id.clone(),
            table_name: ctx.table_name.clone(),
            error_drop_percentage,
            error_drop_threshold: ctx.error_drop_threshold,
            rules_exceeds_threshold: ctx.rules_exceeds_threshold.clone(),
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), PalisadeError>;
}

/// Receives the final run snapshot for persistence.
#[async_trait]
pub trait StatsSink: Send + Sync {
    async fn collect(&self, stats: &RunStats) -> Result<(), PalisadeError>;
}

/// Receives the row-filtered dataset (and optionally the annotated error
/// records) for persistence. The option maps are passed through unmodified.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn write(
        &self,
        dataset: DataFrame,
        table: &str,
        options: &HashMap<String, String>,
    ) -> Result<(), PalisadeError>;

    async fn write_errors(
        &self,
        dataset: DataFrame,
        table: &str,
        options: &HashMap<String, String>,
    ) -> Result<(), PalisadeError>;
}
