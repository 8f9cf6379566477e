//! Builds the per-resolution pyramid written by an insert.

use crate::error::{Error, Result};
use crate::partition::floor_timestamp;
use crate::schema::{TableSetDefinition, INDEX_COLUMN};
use hexstore_columnar::{AggregationRules, ColumnTable, Value};
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Computes every declared resolution's rows from one input batch.
///
/// Input values are per cell at the finest resolution present in the batch; coarser input rows
/// are compacted representations of such cells. Declared resolutions at or finer than that pass
/// through; coarser ones are rolled up from the next finer declared resolution. Every output is
/// compacted.
#[derive(Debug)]
pub struct AggregationEngine<'a> {
    schema: &'a TableSetDefinition,
    rules: AggregationRules,
    abort: Option<Arc<AtomicBool>>,
}

impl<'a> AggregationEngine<'a> {
    pub fn new(schema: &'a TableSetDefinition) -> Self {
        Self {
            schema,
            rules: schema.aggregation_rules(),
            abort: None,
        }
    }

    /// Stops [`AggregationEngine::build_pyramid`] with [`Error::Aborted`] before the next level
    /// once `flag` is set.
    pub fn with_abort(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = Some(flag);
        self
    }

    fn check_abort(&self) -> Result<()> {
        match &self.abort {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::Aborted),
            _ => Ok(()),
        }
    }

    /// Floors the temporal column to the definition's temporal resolution.
    pub fn bucket_timestamps(&self, table: &mut ColumnTable) -> Result<()> {
        let Some(column) = self.schema.temporal_column() else {
            return Ok(());
        };
        let resolution = self.schema.temporal_resolution();
        let Some(values) = table.column(&column.name) else {
            return Ok(());
        };
        let floored = values
            .values()
            .map(|value| match value {
                Value::DateTime(secs) => Ok(Value::DateTime(floor_timestamp(secs, resolution)?)),
                other => Ok(other),
            })
            .collect::<Result<Vec<_>>>()?;
        table.replace_column(&column.name, floored)?;
        Ok(())
    }

    /// One `(resolution, rows)` pair per declared resolution, finest first.
    pub fn build_pyramid(&self, table: &ColumnTable) -> Result<Vec<(u8, ColumnTable)>> {
        let mut table = table.clone();
        self.bucket_timestamps(&mut table)?;

        let cells = table.cells(INDEX_COLUMN, true)?;
        let finest_declared = self.schema.finest_resolution();
        let native = cells
            .iter()
            .map(|c| c.resolution())
            .max()
            .unwrap_or(finest_declared);
        if native > finest_declared {
            return Err(Error::UnsupportedResolution(native));
        }

        let mut pyramid = Vec::with_capacity(self.schema.base_resolutions().len());
        let mut current = table;
        let mut current_res = native;
        for &res in self.schema.base_resolutions().iter().rev() {
            self.check_abort()?;
            if res < current_res {
                current = current.rollup(INDEX_COLUMN, current_res, res, &self.rules)?;
                current_res = res;
            }
            let compacted = current.to_compacted(INDEX_COLUMN, &self.rules)?;
            debug!(
                "table set {}: resolution {res} holds {} rows",
                self.schema.name(),
                compacted.len()
            );
            pyramid.push((res, compacted));
        }
        Ok(pyramid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDefinition, TemporalResolution};
    use hexstore_columnar::{AggregationMethod, ColumnSchema, ColumnType};
    use hexstore_grid::CellId;
    use pretty_assertions::assert_eq;

    fn schema() -> TableSetDefinition {
        TableSetDefinition::builder("population")
            .add_base_resolutions([3, 5])
            .add_aggregated_column("people", ColumnType::Float64, AggregationMethod::Sum)
            .build()
            .expect("schema")
    }

    fn leaves(root: CellId, res: u8, value: f64) -> ColumnTable {
        ColumnTable::from_rows(
            vec![
                ColumnSchema::new(INDEX_COLUMN, ColumnType::UInt64),
                ColumnSchema::new("people", ColumnType::Float64),
            ],
            root.descendants(res)
                .into_iter()
                .map(|c| vec![Value::from(c), Value::Float(value)]),
        )
        .expect("table")
    }

    #[test]
    fn both_resolutions_are_persisted() {
        let schema = schema();
        let root = CellId::from_digits(2, &[1, 2, 3]).expect("cell");
        let pyramid = AggregationEngine::new(&schema)
            .build_pyramid(&leaves(root, 5, 1.0))
            .expect("pyramid");

        let resolutions: Vec<u8> = pyramid.iter().map(|(r, _)| *r).collect();
        assert_eq!(resolutions, vec![5, 3]);

        // uniform leaves compact to their common ancestor while keeping the per-cell value
        let fine = &pyramid[0].1;
        assert_eq!(fine.len(), 1);
        assert_eq!(fine.row(0), vec![Value::from(root), Value::Float(1.0)]);

        let coarse = &pyramid[1].1;
        assert_eq!(coarse.len(), 1);
        assert_eq!(coarse.row(0), vec![Value::from(root), Value::Float(49.0)]);
    }

    #[test]
    fn rows_finer_than_every_declared_resolution_are_rejected() {
        let schema = schema();
        let root = CellId::from_digits(2, &[1, 2, 3, 4, 5]).expect("cell");
        let err = AggregationEngine::new(&schema)
            .build_pyramid(&leaves(root, 6, 1.0))
            .expect_err("too fine");
        assert!(matches!(err, Error::UnsupportedResolution(6)));
    }

    #[test]
    fn integer_and_area_columns_roll_up() {
        let schema = TableSetDefinition::builder("land")
            .add_base_resolutions([4, 5])
            .add_aggregated_column("n", ColumnType::Int64, AggregationMethod::Sum)
            .add_aggregated_column("mean", ColumnType::UInt8, AggregationMethod::Avg)
            .add_aggregated_column(
                "forest",
                ColumnType::Float64,
                AggregationMethod::RelativeToCellArea,
            )
            .build()
            .expect("schema");
        let parent = CellId::from_digits(2, &[1, 2, 3, 4]).expect("cell");
        let table = ColumnTable::from_rows(
            vec![
                ColumnSchema::new(INDEX_COLUMN, ColumnType::UInt64),
                ColumnSchema::new("n", ColumnType::Int64),
                ColumnSchema::new("mean", ColumnType::UInt8),
                ColumnSchema::new("forest", ColumnType::Float64),
            ],
            parent.children().into_iter().zip(0i64..).map(|(cell, i)| {
                vec![
                    Value::from(cell),
                    Value::Int(100 + i),
                    Value::UInt(u64::try_from(i + 1).expect("small")),
                    Value::Float(0.5),
                ]
            }),
        )
        .expect("table");

        let pyramid = AggregationEngine::new(&schema)
            .build_pyramid(&table)
            .expect("pyramid");
        assert_eq!(pyramid[0].0, 5);
        assert_eq!(pyramid[0].1.len(), 7);

        let (res, coarse) = &pyramid[1];
        assert_eq!(*res, 4);
        assert_eq!(coarse.len(), 1);
        let row = coarse.row(0);
        assert_eq!(row[0], Value::from(parent));
        assert_eq!(row[1], Value::Int(721));
        assert_eq!(row[2], Value::UInt(4));
        let Value::Float(forest) = row[3] else {
            panic!("expected float, got {:?}", row[3]);
        };
        let ratio = hexstore_grid::child_area_ratio(5).expect("ratio");
        assert!((forest - 3.5 * ratio).abs() < 1e-12);
        assert!((forest - 0.5).abs() < 1e-3);
    }

    #[test]
    fn set_abort_flag_stops_the_pyramid() {
        let schema = schema();
        let root = CellId::from_digits(2, &[1, 2, 3]).expect("cell");
        let flag = Arc::new(AtomicBool::new(true));
        let err = AggregationEngine::new(&schema)
            .with_abort(Arc::clone(&flag))
            .build_pyramid(&leaves(root, 5, 1.0))
            .expect_err("aborted");
        assert!(matches!(err, Error::Aborted));

        flag.store(false, Ordering::Relaxed);
        let pyramid = AggregationEngine::new(&schema)
            .with_abort(flag)
            .build_pyramid(&leaves(root, 5, 1.0))
            .expect("pyramid");
        assert_eq!(pyramid.len(), 2);
    }

    #[test]
    fn timestamps_are_floored_before_aggregation() {
        let schema = TableSetDefinition::builder("events")
            .add_base_resolution(4)
            .add_column(ColumnDefinition::new("at", ColumnType::DateTime))
            .temporal_resolution(TemporalResolution::Hour)
            .build()
            .expect("schema");
        let cell = CellId::from_digits(2, &[1, 2, 3, 4]).expect("cell");
        let table = ColumnTable::from_rows(
            vec![
                ColumnSchema::new(INDEX_COLUMN, ColumnType::UInt64),
                ColumnSchema::new("at", ColumnType::DateTime),
            ],
            vec![vec![Value::from(cell), Value::DateTime(7_265)]],
        )
        .expect("table");
        let pyramid = AggregationEngine::new(&schema)
            .build_pyramid(&table)
            .expect("pyramid");
        assert_eq!(pyramid[0].1.row(0)[1], Value::DateTime(7_200));
    }
}
