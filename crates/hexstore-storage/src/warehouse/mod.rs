//! Access to the backing warehouse.

mod functions;
mod sqlite;

pub use sqlite::SqliteWarehouse;

use crate::config::InsertOptions;
use crate::error::Result;
use crate::schema::Dialect;
use hexstore_columnar::ColumnTable;
use std::fmt;

/// Round-trips issued by sessions. Implementations must be usable from several worker threads at
/// once.
pub trait Warehouse: Send + Sync + fmt::Debug {
    fn dialect(&self) -> Dialect;

    /// Runs `statements` in order, all or nothing.
    fn execute_all(&self, statements: &[String]) -> Result<()>;

    fn query(&self, sql: &str) -> Result<ColumnTable>;

    /// Appends every batch to its table, all or nothing, in statements of at most
    /// `options.max_rows_per_chunk` rows. Fails with [`crate::Error::Aborted`] when the abort
    /// flag is set before the write commits.
    fn insert_batches(
        &self,
        batches: &[(String, ColumnTable)],
        options: &InsertOptions,
    ) -> Result<()>;

    fn table_names(&self) -> Result<Vec<String>>;
}
