// palisade-core/src/ports/engine.rs

// The dataframe substrate, seen from the application layer. The engine
// issues lazily-evaluated transformations; computation only happens at the
// materialization points below (counting, scalar collection).

use async_trait::async_trait;
use datafusion::prelude::DataFrame;

use crate::error::PalisadeError;

#[async_trait]
pub trait Engine: Send + Sync {
    /// Run a SQL query and return the (lazy) resulting dataset.
    async fn sql(&self, query: &str) -> Result<DataFrame, PalisadeError>;

    /// Make a dataset addressable by name for query-level rule evaluation.
    /// Replaces any previously published view of the same name.
    fn publish_view(&self, name: &str, dataset: DataFrame) -> Result<(), PalisadeError>;

    fn has_view(&self, name: &str) -> bool;

    /// Materialize the record count of a dataset.
    async fn count(&self, dataset: DataFrame) -> Result<u64, PalisadeError>;

    /// Run a query expected to yield exactly one row and return every
    /// column of that row as a count (NULL aggregates collapse to 0).
    async fn query_counts(&self, query: &str) -> Result<Vec<u64>, PalisadeError>;

    /// Run a query expected to yield exactly one numeric scalar.
    async fn query_scalar_u64(&self, query: &str) -> Result<u64, PalisadeError>;

    /// Run a query expected to yield exactly one boolean scalar.
    /// `None` means the value was NULL.
    async fn query_scalar_bool(&self, query: &str) -> Result<Option<bool>, PalisadeError>;
}
