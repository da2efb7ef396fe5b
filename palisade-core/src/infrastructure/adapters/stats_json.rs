// palisade-core/src/infrastructure/adapters/stats_json.rs

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use crate::domain::context::RunStats;
use crate::error::PalisadeError;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::fs::atomic_write;
use crate::ports::sinks::StatsSink;

/// Persists each run snapshot as `stats_{run_id}.json` under the target
/// directory.
pub struct JsonStatsSink {
    target_dir: PathBuf,
}

impl JsonStatsSink {
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
        }
    }
}

#[async_trait]
impl StatsSink for JsonStatsSink {
    async fn collect(&self, stats: &RunStats) -> Result<(), PalisadeError> {
        if !self.target_dir.exists() {
            std::fs::create_dir_all(&self.target_dir).map_err(InfrastructureError::Io)?;
        }

        let content =
            serde_json::to_string_pretty(stats).map_err(InfrastructureError::Json)?;
        let path = self.target_dir.join(format!("stats_{}.json", stats.run_id));
        atomic_write(&path, content)?;

        info!(path = ?path, "📊 Run statistics persisted");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::context::RunContext;
    use anyhow::Result;

    #[tokio::test]
    async fn test_collect_writes_one_file_per_run() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let sink = JsonStatsSink::new(dir.path().join("target"));

        let mut ctx = RunContext::new("product1", "employees");
        ctx.input_count = 10;
        ctx.output_count = 9;
        ctx.error_count = 1;
        ctx.finalize_run_status();

        sink.collect(&ctx.snapshot()).await.unwrap();

        let path = dir
            .path()
            .join("target")
            .join(format!("stats_{}.json", ctx.run_id));
        assert!(path.exists());

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path)?)?;
        assert_eq!(parsed["run_status"], "Passed");
        assert_eq!(parsed["input_count"], 10);
        assert_eq!(parsed["output_percentage"], 90.0);
        // The stage never ran: its result collection is absent
        assert!(parsed.get("source_agg_dq_result").is_none());
        Ok(())
    }
}
