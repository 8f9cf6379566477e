#![forbid(unsafe_code)]

//! Hexagonal hierarchical grid cell identifiers.
//!
//! Cells are 64-bit values laid out like H3 cell indexes: resolution, base cell and one 3-bit
//! digit per resolution. Every operation here is pure bit arithmetic, so cells are plain values
//! and the hierarchy needs no graph structure.

mod area;
mod cell;
mod set;

pub use area::{average_area_km2, child_area_ratio};
pub use cell::{res0_cells, CellId, BASE_CELL_COUNT, MAX_RESOLUTION, PENTAGON_BASE_CELLS};
pub use set::{change_resolution, compact_cells, is_compacted_set, uncompact_cells};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("invalid cell id: {0:#x}")]
    InvalidCellId(u64),
    #[error("invalid resolution: {0}")]
    InvalidResolution(u8),
    #[error("cannot parse cell id from {0:?}")]
    ParseCellId(String),
}

pub type Result<T> = std::result::Result<T, GridError>;
