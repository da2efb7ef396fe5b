// palisade-core/src/infrastructure/adapters/output_parquet.rs

use async_trait::async_trait;
use datafusion::dataframe::DataFrameWriteOptions;
use datafusion::prelude::DataFrame;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

use crate::error::PalisadeError;
use crate::infrastructure::engine::sanitize_identifier;
use crate::infrastructure::error::{EngineError, InfrastructureError};
use crate::ports::sinks::OutputSink;

/// Persists the gated datasets as Parquet under `{target_dir}/data/`.
pub struct ParquetOutputSink {
    target_dir: PathBuf,
}

impl ParquetOutputSink {
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
        }
    }

    async fn write_file(
        &self,
        dataset: DataFrame,
        file_name: &str,
    ) -> Result<PathBuf, PalisadeError> {
        let data_dir = self.target_dir.join("data");
        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir).map_err(InfrastructureError::Io)?;
        }
        let path = data_dir.join(file_name);
        let path_str = path
            .to_str()
            .ok_or_else(|| PalisadeError::Internal("Invalid parquet path".into()))?;

        dataset
            .write_parquet(path_str, DataFrameWriteOptions::new(), None)
            .await
            .map_err(|e| {
                PalisadeError::Infrastructure(InfrastructureError::Engine(
                    EngineError::DataFusion(e),
                ))
            })?;

        Ok(path)
    }
}

#[async_trait]
impl OutputSink for ParquetOutputSink {
    async fn write(
        &self,
        dataset: DataFrame,
        table: &str,
        _options: &HashMap<String, String>,
    ) -> Result<(), PalisadeError> {
        let file = format!("{}.parquet", sanitize_identifier(table));
        let path = self.write_file(dataset, &file).await?;
        info!(path = ?path, table, "💾 Row-filtered dataset persisted");
        Ok(())
    }

    async fn write_errors(
        &self,
        dataset: DataFrame,
        table: &str,
        _options: &HashMap<String, String>,
    ) -> Result<(), PalisadeError> {
        let file = format!("{}_error.parquet", sanitize_identifier(table));
        let path = self.write_file(dataset, &file).await?;
        info!(path = ?path, table, "💾 Error records persisted");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::infrastructure::engine::DataFusionEngine;
    use anyhow::Result;
    use datafusion::prelude::*;

    #[tokio::test]
    async fn test_write_round_trip() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let engine = DataFusionEngine::new();
        engine
            .session()
            .sql("CREATE TABLE src (id INT) AS VALUES (1), (2), (3)")
            .await?;

        let sink = ParquetOutputSink::new(tmp.path());
        let df = engine.table("src").await?;
        sink.write(df, "dq.employees", &HashMap::new()).await.unwrap();

        let written = tmp.path().join("data").join("dq_employees.parquet");
        assert!(written.exists());

        // Read it back through a fresh session
        let ctx = SessionContext::new();
        let restored = ctx
            .read_parquet(written.to_str().unwrap(), ParquetReadOptions::default())
            .await?;
        assert_eq!(restored.count().await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_write_errors_uses_a_distinct_file() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let engine = DataFusionEngine::new();
        engine
            .session()
            .sql("CREATE TABLE src (id INT) AS VALUES (1)")
            .await?;

        let sink = ParquetOutputSink::new(tmp.path());
        let df = engine.table("src").await?;
        sink.write_errors(df, "employees", &HashMap::new())
            .await
            .unwrap();

        assert!(
            tmp.path()
                .join("data")
                .join("employees_error.parquet")
                .exists()
        );
        Ok(())
    }
}
