use crate::error::Result;
use hexstore_grid::{change_resolution, CellId};
use std::fmt;

/// Reduces an external geometry to the cells covering it.
pub trait AreaCoverer: Send {
    /// Cells at `res` covering the area.
    fn cover(&self, res: u8) -> Result<Vec<CellId>>;
}

/// Area of interest of a traversal.
pub enum TraversalArea {
    /// Explicit cells at any resolution.
    Cells(Vec<CellId>),
    Covered(Box<dyn AreaCoverer>),
}

impl fmt::Debug for TraversalArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraversalArea::Cells(cells) => f.debug_tuple("Cells").field(&cells.len()).finish(),
            TraversalArea::Covered(_) => f.write_str("Covered"),
        }
    }
}

impl From<Vec<CellId>> for TraversalArea {
    fn from(cells: Vec<CellId>) -> Self {
        TraversalArea::Cells(cells)
    }
}

impl TraversalArea {
    /// The area as distinct cells at `res`, in first-seen order. Finer explicit cells are
    /// replaced by their ancestor.
    pub fn cells_at(&self, res: u8) -> Result<Vec<CellId>> {
        match self {
            TraversalArea::Cells(cells) => Ok(change_resolution(cells, res)?),
            TraversalArea::Covered(coverer) => Ok(change_resolution(&coverer.cover(res)?, res)?),
        }
    }
}
