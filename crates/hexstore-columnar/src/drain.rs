use crate::bitmap::BitVec;
use crate::error::{ColumnarError, Result};
use crate::table::{ColumnData, ColumnTable};
use crate::types::ColumnType;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Column buffers handed to an external table format.
#[derive(Clone, Debug, PartialEq)]
pub enum ExternalArray {
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Float64(Vec<f64>),
    Bool(BitVec),
    Utf8(Vec<Arc<str>>),
    Timestamp(Vec<DateTime<Utc>>),
}

impl ExternalArray {
    pub fn len(&self) -> usize {
        match self {
            ExternalArray::Int64(v) => v.len(),
            ExternalArray::UInt64(v) => v.len(),
            ExternalArray::Float64(v) => v.len(),
            ExternalArray::Bool(v) => v.len(),
            ExternalArray::Utf8(v) => v.len(),
            ExternalArray::Timestamp(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExternalColumn {
    pub name: String,
    pub column_type: ColumnType,
    pub values: ExternalArray,
    /// `None` when the column has no nulls.
    pub validity: Option<BitVec>,
}

impl ExternalColumn {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_valid(&self, row: usize) -> bool {
        self.validity.as_ref().map_or(true, |v| v.get(row))
    }
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

impl ColumnTable {
    /// Moves every column out, in column order, leaving this table with zero rows.
    ///
    /// Numeric buffers are handed over as they are. `DateTime` seconds become UTC timestamps.
    /// A second call fails with [`ColumnarError::AlreadyMoved`].
    pub fn drain(&mut self) -> Result<Vec<ExternalColumn>> {
        if self.moved {
            return Err(ColumnarError::AlreadyMoved);
        }
        for column in self.columns.iter().filter(|c| c.column_type().is_temporal()) {
            if let ColumnData::Int(secs) = &column.data {
                for (row, &s) in secs.iter().enumerate() {
                    if column.validity.get(row) && timestamp(s).is_none() {
                        return Err(ColumnarError::TimestampOutOfRange(s));
                    }
                }
            }
        }

        let mut out = Vec::with_capacity(self.columns.len());
        for column in &mut self.columns {
            let column_type = column.column_type();
            let validity = column.validity.take();
            let values = match column.data.take() {
                ColumnData::Int(secs) if column_type.is_temporal() => ExternalArray::Timestamp(
                    secs.into_iter()
                        .map(|s| timestamp(s).unwrap_or_default())
                        .collect(),
                ),
                ColumnData::Int(v) => ExternalArray::Int64(v),
                ColumnData::UInt(v) => ExternalArray::UInt64(v),
                ColumnData::Float(v) => ExternalArray::Float64(v),
                ColumnData::Bool(v) => ExternalArray::Bool(v),
                ColumnData::Utf8(v) => ExternalArray::Utf8(v),
            };
            out.push(ExternalColumn {
                name: column.name().to_string(),
                column_type,
                values,
                validity: (!validity.all_true()).then_some(validity),
            });
        }
        self.rows = 0;
        self.moved = true;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnSchema;
    use crate::types::Value;
    use chrono::TimeZone;

    fn table() -> ColumnTable {
        ColumnTable::from_rows(
            vec![
                ColumnSchema::new("h3index", ColumnType::UInt64),
                ColumnSchema::new("seen", ColumnType::DateTime),
                ColumnSchema::new("count", ColumnType::Int32),
            ],
            vec![
                vec![Value::UInt(1), Value::DateTime(86_400), Value::Int(3)],
                vec![Value::UInt(2), Value::Null, Value::Int(-4)],
            ],
        )
        .expect("table")
    }

    #[test]
    fn timestamps_are_rebuilt_from_seconds() {
        let mut table = table();
        let columns = table.drain().expect("drain");
        assert_eq!(columns.len(), 3);
        let seen = &columns[1];
        let ExternalArray::Timestamp(values) = &seen.values else {
            panic!("expected timestamps, got {:?}", seen.values);
        };
        assert_eq!(values[0], Utc.with_ymd_and_hms(1970, 1, 2, 0, 0, 0).unwrap());
        assert!(seen.is_valid(0));
        assert!(!seen.is_valid(1));
        assert_eq!(columns[2].values, ExternalArray::Int64(vec![3, -4]));
        assert_eq!(columns[2].validity, None);
    }

    #[test]
    fn out_of_range_timestamp_leaves_table_intact() {
        let mut table = ColumnTable::from_rows(
            vec![ColumnSchema::new("t", ColumnType::DateTime)],
            vec![vec![Value::DateTime(i64::MAX)]],
        )
        .expect("table");
        assert_eq!(
            table.drain().unwrap_err(),
            ColumnarError::TimestampOutOfRange(i64::MAX)
        );
        assert_eq!(table.len(), 1);
        assert!(!table.is_moved());
    }
}
