// palisade-core/src/infrastructure/adapters/notify_log.rs

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::error::PalisadeError;
use crate::ports::sinks::{NotificationEvent, NotificationSink};

/// Tracing-backed notification sink: every event lands in the log stream.
/// Real delivery channels (email, chat, webhooks) plug in behind the same
/// port.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), PalisadeError> {
        match event {
            NotificationEvent::RunStarted {
                product_id,
                run_id,
                table_name,
                ..
            } => {
                info!(product_id, run_id, table_name, "🚀 Data quality run started");
            }
            NotificationEvent::RunCompleted {
                run_id,
                table_name,
                input_count,
                error_count,
                output_count,
                ..
            } => {
                info!(
                    run_id,
                    table_name,
                    input_count,
                    error_count,
                    output_count,
                    "✅ Data quality run completed"
                );
            }
            NotificationEvent::RunFailed {
                run_id,
                table_name,
                input_count,
                error_count,
                ..
            } => {
                error!(
                    run_id,
                    table_name, input_count, error_count, "❌ Data quality run failed"
                );
            }
            NotificationEvent::ThresholdBreach {
                run_id,
                table_name,
                error_drop_percentage,
                error_drop_threshold,
                ..
            } => {
                warn!(
                    run_id,
                    table_name,
                    error_drop_percentage,
                    error_drop_threshold,
                    "⚠️ Error drop threshold breached"
                );
            }
        }
        Ok(())
    }
}
