//! Multi-resolution table sets over a SQL warehouse.
//!
//! One logical dataset keyed by hexagonal cell ids is stored as one physical table per declared
//! resolution. This crate exposes:
//! - Table set definitions and their DDL (SQLite and ClickHouse dialects)
//! - The aggregation engine building the resolution pyramid on insert
//! - Sessions running warehouse round-trips on a bounded background pool
//! - Windowed traversal with existence probing

#![forbid(unsafe_code)]

mod config;
mod engine;
mod error;
mod handle;
pub mod partition;
pub mod schema;
mod session;
pub mod tableset;
pub mod traversal;
pub mod warehouse;

pub use config::{InsertOptions, SessionConfig, TraversalOptions};
pub use engine::AggregationEngine;
pub use error::{Error, Result};
pub use handle::QueryHandle;
pub use schema::{
    Builder, ColumnDefinition, CompressionHint, Dialect, SpatialPartitioning, TableSetDefinition,
    TemporalPartitioning, TemporalResolution, TemporalUnit, INDEX_COLUMN,
};
pub use session::{InsertSummary, Session};
pub use tableset::TableSetInfo;
pub use traversal::{
    AreaCoverer, CursorState, QueryTemplate, TraversalArea, Window, WindowCursor, WindowRequest,
};
pub use warehouse::{SqliteWarehouse, Warehouse};

pub use hexstore_columnar::{AggregationMethod, ColumnSchema, ColumnTable, ColumnType, Value};
pub use hexstore_grid::CellId;
