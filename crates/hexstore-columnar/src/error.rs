use crate::types::ColumnType;
use hexstore_grid::{CellId, GridError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ColumnarError {
    #[error("table data has already been moved out")]
    AlreadyMoved,
    #[error("invalid cell id {raw:#x} in row {row}")]
    InvalidCellId { row: usize, raw: u64 },
    #[error("null cell id in row {0}")]
    NullCellId(usize),
    #[error("column {column:?} has unsupported type {column_type:?}")]
    UnsupportedColumnType {
        column: String,
        column_type: ColumnType,
    },
    #[error("missing column {0:?}")]
    MissingColumn(String),
    #[error("duplicate column {0:?}")]
    DuplicateColumn(String),
    #[error("expected {expected} values, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("value {value} does not fit column {column:?} of type {column_type:?}")]
    TypeMismatch {
        column: String,
        column_type: ColumnType,
        value: String,
    },
    #[error("column layouts of combined tables differ")]
    SchemaMismatch,
    #[error("cell {cell} is finer than target resolution {target}")]
    ResolutionTooFine { cell: CellId, target: u8 },
    #[error("timestamp {0} is out of range")]
    TimestampOutOfRange(i64),
    #[error(transparent)]
    Grid(#[from] GridError),
}

pub type Result<T> = std::result::Result<T, ColumnarError>;
