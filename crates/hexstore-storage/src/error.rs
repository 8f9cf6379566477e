use hexstore_columnar::ColumnarError;
use hexstore_grid::GridError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or incomplete table set definition.
    #[error("schema error: {0}")]
    Schema(String),
    #[error("table set not found: {0}")]
    TableSetNotFound(String),
    #[error("table data has already been moved out")]
    AlreadyMoved,
    #[error("invalid cell id: {0:#x}")]
    InvalidCellId(u64),
    #[error("column {column:?} has unsupported type {column_type}")]
    UnsupportedColumnType {
        column: String,
        column_type: String,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// Malformed value, e.g. a temporal partitioning period.
    #[error("value error: {0}")]
    Value(String),
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("no declared resolution supports resolution {0}")]
    UnsupportedResolution(u8),
    #[error("invalid query template: {0}")]
    InvalidQueryTemplate(String),
    #[error("background worker failed: {0}")]
    Worker(String),
    /// A window cursor whose existence probes already failed was asked to plan again.
    #[error("window cursor failed while planning")]
    PlanningFailed,
    /// The insert's abort flag was set before it committed.
    #[error("insert aborted")]
    Aborted,
    #[error(transparent)]
    Columnar(ColumnarError),
}

impl Error {
    /// Failures worth retrying unchanged: timeouts and warehouse communication.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout { .. } | Error::Transport(_) | Error::Io(_)
        ) || matches!(
            self,
            Error::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                )
        )
    }
}

impl From<ColumnarError> for Error {
    fn from(err: ColumnarError) -> Self {
        match err {
            ColumnarError::AlreadyMoved => Error::AlreadyMoved,
            ColumnarError::InvalidCellId { raw, .. } => Error::InvalidCellId(raw),
            ColumnarError::Grid(GridError::InvalidCellId(raw)) => Error::InvalidCellId(raw),
            ColumnarError::UnsupportedColumnType {
                column,
                column_type,
            } => Error::UnsupportedColumnType {
                column,
                column_type: column_type.to_string(),
            },
            other => Error::Columnar(other),
        }
    }
}

impl From<GridError> for Error {
    fn from(err: GridError) -> Self {
        match err {
            GridError::InvalidCellId(raw) => Error::InvalidCellId(raw),
            GridError::InvalidResolution(res) => Error::UnsupportedResolution(res),
            GridError::ParseCellId(s) => Error::Value(format!("cannot parse cell id {s:?}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
