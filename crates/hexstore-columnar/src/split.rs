use crate::error::{ColumnarError, Result};
use crate::table::ColumnTable;
use std::collections::BTreeMap;

impl ColumnTable {
    /// Partitions rows by the resolution embedded in their cell id, keeping row order.
    ///
    /// With `validate_indexes` every id must be a well-formed cell; otherwise the resolution bits
    /// are read as they are.
    pub fn split_by_resolution(
        &self,
        index_column: &str,
        validate_indexes: bool,
    ) -> Result<BTreeMap<u8, ColumnTable>> {
        if self.moved {
            return Err(ColumnarError::AlreadyMoved);
        }
        let mut rows_by_res: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
        for (row, cell) in self.cells(index_column, validate_indexes)?.into_iter().enumerate() {
            rows_by_res.entry(cell.resolution()).or_default().push(row);
        }
        Ok(rows_by_res
            .into_iter()
            .map(|(res, rows)| (res, self.take_rows(&rows)))
            .collect())
    }
}
