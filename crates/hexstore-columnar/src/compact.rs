use crate::aggregate::{AggregationRules, LevelContext, Strategy};
use crate::error::{ColumnarError, Result};
use crate::parallel::map_level;
use crate::table::ColumnTable;
use crate::types::Value;
use hexstore_grid::{child_area_ratio, CellId, GridError, MAX_RESOLUTION};
use log::debug;
use std::collections::{BTreeMap, HashMap, HashSet};

/// One row while it moves through the pyramid.
#[derive(Debug)]
struct Row {
    cell: CellId,
    values: Vec<Value>,
    /// Position of the earliest input row it stems from.
    order: usize,
}

enum Merge {
    Merged(Row),
    Kept(Vec<Row>),
}

/// Strategy per column; `None` marks the index column.
type Strategies = Vec<Option<&'static Strategy>>;

fn group_by_parent(rows: Vec<Row>) -> Vec<(CellId, Vec<Row>)> {
    let mut slots: HashMap<CellId, usize> = HashMap::new();
    let mut groups: Vec<(CellId, Vec<Row>)> = Vec::new();
    for row in rows {
        let Some(parent) = row.cell.parent() else {
            groups.push((row.cell, vec![row]));
            continue;
        };
        match slots.get(&parent) {
            Some(&slot) => groups[slot].1.push(row),
            None => {
                slots.insert(parent, groups.len());
                groups.push((parent, vec![row]));
            }
        }
    }
    groups
}

fn bucket_by_resolution(rows: Vec<Row>) -> BTreeMap<u8, Vec<Row>> {
    let mut levels: BTreeMap<u8, Vec<Row>> = BTreeMap::new();
    for row in rows {
        levels.entry(row.cell.resolution()).or_default().push(row);
    }
    levels
}

fn merge_siblings(parent: CellId, rows: Vec<Row>, strategies: &Strategies) -> Merge {
    if rows.len() != parent.child_count() {
        return Merge::Kept(rows);
    }
    let distinct: HashSet<CellId> = rows.iter().map(|r| r.cell).collect();
    if distinct.len() != rows.len() {
        return Merge::Kept(rows);
    }

    let mut values = Vec::with_capacity(strategies.len());
    for (col, strategy) in strategies.iter().enumerate() {
        let Some(strategy) = strategy else {
            values.push(Value::from(parent));
            continue;
        };
        let column: Vec<&Value> = rows.iter().map(|r| &r.values[col]).collect();
        match (strategy.compact)(&column) {
            Some(v) => values.push(v),
            None => return Merge::Kept(rows),
        }
    }

    Merge::Merged(Row {
        cell: parent,
        values,
        order: rows.iter().map(|r| r.order).min().unwrap_or(0),
    })
}

fn rollup_group(parent: CellId, rows: Vec<Row>, strategies: &Strategies, area_ratio: f64) -> Row {
    let ctx = LevelContext {
        factor: parent.child_count(),
        area_ratio,
    };
    let values = strategies
        .iter()
        .enumerate()
        .map(|(col, strategy)| match strategy {
            Some(strategy) => {
                let column: Vec<&Value> = rows.iter().map(|r| &r.values[col]).collect();
                (strategy.rollup)(&column, ctx)
            }
            None => Value::from(parent),
        })
        .collect();
    Row {
        cell: parent,
        values,
        order: rows.iter().map(|r| r.order).min().unwrap_or(0),
    }
}

/// Re-expresses a compacted row, whose values are per cell at `level`, per cell at `level - 1`.
///
/// Pentagon rows coarser than `level - 1` are split first so that every produced row covers
/// cells with one uniform child count.
fn lift_row(row: Row, level: u8, strategies: &Strategies, area_ratio: f64, out: &mut Vec<Row>) {
    let res = row.cell.resolution();
    let factor = if res + 1 == level {
        row.cell.child_count()
    } else if row.cell.is_pentagon() {
        for child in row.cell.children() {
            let mut values = row.values.clone();
            for (value, strategy) in values.iter_mut().zip(strategies) {
                if strategy.is_none() {
                    *value = Value::from(child);
                }
            }
            let split = Row {
                cell: child,
                values,
                order: row.order,
            };
            lift_row(split, level, strategies, area_ratio, out);
        }
        return;
    } else {
        7
    };

    let ctx = LevelContext { factor, area_ratio };
    let values = row
        .values
        .iter()
        .zip(strategies)
        .map(|(value, strategy)| match strategy {
            Some(strategy) => (strategy.lift)(value, ctx),
            None => value.clone(),
        })
        .collect();
    out.push(Row {
        cell: row.cell,
        values,
        order: row.order,
    });
}

impl ColumnTable {
    fn indexed_rows(&self, index_column: &str) -> Result<(usize, Vec<Row>)> {
        if self.moved {
            return Err(ColumnarError::AlreadyMoved);
        }
        let index = self.index_position(index_column)?;
        let rows = self
            .cells(index_column, true)?
            .into_iter()
            .enumerate()
            .map(|(order, cell)| Row {
                cell,
                values: self.row(order),
                order,
            })
            .collect();
        Ok((index, rows))
    }

    fn strategies(&self, index: usize, rules: &AggregationRules) -> Strategies {
        self.columns
            .iter()
            .enumerate()
            .map(|(col, column)| (col != index).then(|| rules.strategy(column.name())))
            .collect()
    }

    fn finish_rows(&self, mut rows: Vec<Row>) -> Result<ColumnTable> {
        rows.sort_by_key(|r| r.order);
        self.with_rows(rows.into_iter().map(|r| r.values).collect())
    }

    /// Lossless compaction.
    ///
    /// Levels are processed finest first. A sibling group becomes one parent row only when it is
    /// the parent's complete child set and every column agrees on a representative value (see
    /// [`crate::AggregationMethod`]). Merged parents join the next coarser level. Rows keep the
    /// order of their earliest input row.
    pub fn to_compacted(
        &self,
        index_column: &str,
        rules: &AggregationRules,
    ) -> Result<ColumnTable> {
        let (index, rows) = self.indexed_rows(index_column)?;
        let strategies = self.strategies(index, rules);
        let mut levels = bucket_by_resolution(rows);
        let mut kept = Vec::new();

        for res in (1..=MAX_RESOLUTION).rev() {
            let Some(level) = levels.remove(&res) else {
                continue;
            };
            let groups = group_by_parent(level);
            let group_count = groups.len();
            let merges = map_level(groups, |(parent, rows)| {
                merge_siblings(parent, rows, &strategies)
            });

            let mut merged = 0usize;
            for merge in merges {
                match merge {
                    Merge::Merged(row) => {
                        merged += 1;
                        levels.entry(res - 1).or_default().push(row);
                    }
                    Merge::Kept(rows) => kept.extend(rows),
                }
            }
            debug!("compaction level {res}: {merged} of {group_count} sibling groups merged");
        }
        if let Some(level) = levels.remove(&0) {
            kept.extend(level);
        }
        self.finish_rows(kept)
    }

    /// Expands every row to its descendants at `target`, copying its values.
    pub fn to_decompacted(&self, index_column: &str, target: u8) -> Result<ColumnTable> {
        if target > MAX_RESOLUTION {
            return Err(GridError::InvalidResolution(target).into());
        }
        let (index, rows) = self.indexed_rows(index_column)?;
        let mut out = Vec::new();
        for row in rows {
            if row.cell.resolution() > target {
                return Err(ColumnarError::ResolutionTooFine {
                    cell: row.cell,
                    target,
                });
            }
            for cell in row.cell.descendants(target) {
                let mut values = row.values.clone();
                values[index] = Value::from(cell);
                out.push(values);
            }
        }
        self.with_rows(out)
    }

    /// Expands the rows of a table stored at `stored_resolution` to `target`, limited to `within`.
    ///
    /// Rows covering `within` are cut down to it and rows outside it are dropped. Down to the
    /// stored resolution values are copied. Below it each column's method spreads the value over
    /// the descendants: sums are divided with integer remainders going to the first descendants,
    /// everything else is copied as a representative.
    pub fn expand_within(
        &self,
        index_column: &str,
        within: CellId,
        stored_resolution: u8,
        target: u8,
        rules: &AggregationRules,
    ) -> Result<ColumnTable> {
        if target > MAX_RESOLUTION || stored_resolution > target {
            return Err(GridError::InvalidResolution(target).into());
        }
        if within.resolution() > target {
            return Err(ColumnarError::ResolutionTooFine {
                cell: within,
                target,
            });
        }
        let (index, rows) = self.indexed_rows(index_column)?;
        let strategies = self.strategies(index, rules);
        let mut out = Vec::new();

        for row in rows {
            let region = if row.cell.contains(within) {
                within
            } else if within.is_ancestor_of(row.cell) {
                row.cell
            } else {
                continue;
            };
            if region.resolution() > target {
                return Err(ColumnarError::ResolutionTooFine {
                    cell: region,
                    target,
                });
            }

            let base = stored_resolution.max(region.resolution());
            for base_cell in region.descendants(base) {
                let n = base_cell.descendant_count(target);
                for (position, cell) in base_cell.descendants(target).into_iter().enumerate() {
                    let values = row
                        .values
                        .iter()
                        .zip(&strategies)
                        .map(|(value, strategy)| match strategy {
                            Some(strategy) => (strategy.expand)(value, n, position),
                            None => Value::from(cell),
                        })
                        .collect();
                    out.push(values);
                }
            }
        }
        self.with_rows(out)
    }

    /// Aggregates rows up to `to_resolution`.
    ///
    /// Values are taken per cell at `from_resolution`; coarser rows are compacted representations
    /// of such cells. Sibling groups need not be complete here. The result is not compacted.
    pub fn rollup(
        &self,
        index_column: &str,
        from_resolution: u8,
        to_resolution: u8,
        rules: &AggregationRules,
    ) -> Result<ColumnTable> {
        let (index, rows) = self.indexed_rows(index_column)?;
        if let Some(row) = rows.iter().find(|r| r.cell.resolution() > from_resolution) {
            return Err(ColumnarError::ResolutionTooFine {
                cell: row.cell,
                target: from_resolution,
            });
        }
        if to_resolution >= from_resolution {
            return self.finish_rows(rows);
        }

        let strategies = self.strategies(index, rules);
        let (mut level_rows, mut pending): (Vec<Row>, Vec<Row>) = rows
            .into_iter()
            .partition(|r| r.cell.resolution() == from_resolution);

        for level in ((to_resolution + 1)..=from_resolution).rev() {
            let area_ratio = child_area_ratio(level).ok_or(GridError::InvalidResolution(level))?;
            let groups = group_by_parent(level_rows);
            let group_count = groups.len();
            let mut next = map_level(groups, |(parent, rows)| {
                rollup_group(parent, rows, &strategies, area_ratio)
            });

            let mut lifted = Vec::new();
            for row in pending {
                lift_row(row, level, &strategies, area_ratio, &mut lifted);
            }
            let (at_parent_level, coarser): (Vec<Row>, Vec<Row>) = lifted
                .into_iter()
                .partition(|r| r.cell.resolution() + 1 == level);
            next.extend(at_parent_level);
            level_rows = next;
            pending = coarser;
            debug!("rollup level {level}: {group_count} groups");
        }

        level_rows.extend(pending);
        self.finish_rows(level_rows)
    }
}
