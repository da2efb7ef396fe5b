// palisade-core/src/infrastructure/engine.rs

use async_trait::async_trait;
use datafusion::prelude::*;
use std::sync::Arc;

use datafusion::arrow::array::{
    Array, ArrayRef, BooleanArray, Int32Array, Int64Array, UInt64Array,
};
use datafusion::arrow::record_batch::RecordBatch;

use crate::error::PalisadeError;
use crate::infrastructure::error::{EngineError, InfrastructureError};
use crate::ports::engine::Engine;

/// The DataFusion adapter behind the `Engine` port. One session per run
/// pipeline; published views live in the session catalog.
pub struct DataFusionEngine {
    ctx: Arc<SessionContext>,
}

impl DataFusionEngine {
    pub fn new() -> Self {
        Self {
            ctx: Arc::new(SessionContext::new()),
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.ctx
    }

    /// Register a CSV file as a named source table.
    pub async fn register_csv(&self, name: &str, path: &str) -> Result<(), PalisadeError> {
        self.ctx
            .register_csv(name, path, CsvReadOptions::default())
            .await
            .map_err(engine_err)
    }

    /// Register a Parquet file as a named source table.
    pub async fn register_parquet(&self, name: &str, path: &str) -> Result<(), PalisadeError> {
        self.ctx
            .register_parquet(name, path, ParquetReadOptions::default())
            .await
            .map_err(engine_err)
    }

    /// Resolve a registered table/view to a dataset handle.
    pub async fn table(&self, name: &str) -> Result<DataFrame, PalisadeError> {
        self.ctx.table(name).await.map_err(engine_err)
    }

    async fn single_row(&self, query: &str) -> Result<RecordBatch, PalisadeError> {
        let df = self.ctx.sql(query).await.map_err(engine_err)?;
        let batches = df.collect().await.map_err(engine_err)?;

        let total_rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
        if total_rows != 1 {
            return Err(not_scalar(format!(
                "expected 1 row, got {} (query: {})",
                total_rows, query
            )));
        }
        batches
            .into_iter()
            .find(|b| b.num_rows() == 1)
            .ok_or_else(|| not_scalar(format!("no row returned (query: {})", query)))
    }
}

impl Default for DataFusionEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Engine for DataFusionEngine {
    async fn sql(&self, query: &str) -> Result<DataFrame, PalisadeError> {
        self.ctx.sql(query).await.map_err(engine_err)
    }

    fn publish_view(&self, name: &str, dataset: DataFrame) -> Result<(), PalisadeError> {
        // Re-publishing the same name replaces the previous version
        self.ctx.deregister_table(name).map_err(engine_err)?;
        self.ctx
            .register_table(name, dataset.into_view())
            .map_err(engine_err)?;
        Ok(())
    }

    fn has_view(&self, name: &str) -> bool {
        self.ctx.table_exist(name).unwrap_or(false)
    }

    async fn count(&self, dataset: DataFrame) -> Result<u64, PalisadeError> {
        let count = dataset.count().await.map_err(engine_err)?;
        Ok(count as u64)
    }

    async fn query_counts(&self, query: &str) -> Result<Vec<u64>, PalisadeError> {
        let batch = self.single_row(query).await?;
        (0..batch.num_columns())
            .map(|i| column_as_u64(batch.column(i), query))
            .collect()
    }

    async fn query_scalar_u64(&self, query: &str) -> Result<u64, PalisadeError> {
        let batch = self.single_row(query).await?;
        column_as_u64(batch.column(0), query)
    }

    async fn query_scalar_bool(&self, query: &str) -> Result<Option<bool>, PalisadeError> {
        let batch = self.single_row(query).await?;
        let col = batch.column(0);
        if col.is_null(0) {
            return Ok(None);
        }
        col.as_any()
            .downcast_ref::<BooleanArray>()
            .map(|arr| Some(arr.value(0)))
            .ok_or_else(|| {
                not_scalar(format!(
                    "expected a boolean, got {:?} (query: {})",
                    col.data_type(),
                    query
                ))
            })
    }
}

/// Extract the first value of a column as a count. NULL (e.g. a sum over an
/// empty dataset) collapses to 0.
fn column_as_u64(col: &ArrayRef, query: &str) -> Result<u64, PalisadeError> {
    if col.is_null(0) {
        return Ok(0);
    }
    if let Some(arr) = col.as_any().downcast_ref::<Int64Array>() {
        Ok(arr.value(0).max(0) as u64)
    } else if let Some(arr) = col.as_any().downcast_ref::<Int32Array>() {
        Ok(arr.value(0).max(0) as u64)
    } else if let Some(arr) = col.as_any().downcast_ref::<UInt64Array>() {
        Ok(arr.value(0))
    } else {
        Err(not_scalar(format!(
            "expected an integer, got {:?} (query: {})",
            col.data_type(),
            query
        )))
    }
}

fn engine_err(err: datafusion::error::DataFusionError) -> PalisadeError {
    PalisadeError::Infrastructure(InfrastructureError::Engine(EngineError::DataFusion(err)))
}

fn not_scalar(detail: String) -> PalisadeError {
    PalisadeError::Infrastructure(InfrastructureError::Engine(EngineError::NotScalar(detail)))
}

/// Derive a SQL-safe view name from a (possibly dotted) table name.
pub fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
