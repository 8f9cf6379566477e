#![forbid(unsafe_code)]

pub mod aggregate;
pub mod bitmap;
mod compact;
mod drain;
mod error;
mod parallel;
mod split;
pub mod stats;
pub mod table;
pub mod types;

pub use aggregate::{AggregationMethod, AggregationRules};
pub use bitmap::BitVec;
pub use drain::{ExternalArray, ExternalColumn};
pub use error::{ColumnarError, Result};
pub use stats::ColumnStats;
pub use table::{Column, ColumnSchema, ColumnTable, ColumnTableBuilder};
pub use types::{ColumnType, Value};

pub use hexstore_grid::CellId;
