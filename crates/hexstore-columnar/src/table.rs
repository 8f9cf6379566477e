use crate::bitmap::BitVec;
use crate::error::{ColumnarError, Result};
use crate::stats::ColumnStats;
use crate::types::{ColumnType, Value};
use hexstore_grid::CellId;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Physical buffers. Null slots hold a placeholder and are masked by the validity bits.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ColumnData {
    Int(Vec<i64>),
    UInt(Vec<u64>),
    Float(Vec<f64>),
    Bool(BitVec),
    Utf8(Vec<Arc<str>>),
}

impl ColumnData {
    fn for_type(column_type: ColumnType, capacity: usize) -> Self {
        match column_type {
            t if t.is_unsigned_integer() => ColumnData::UInt(Vec::with_capacity(capacity)),
            t if t.is_float() => ColumnData::Float(Vec::with_capacity(capacity)),
            ColumnType::Bool => ColumnData::Bool(BitVec::with_capacity_bits(capacity)),
            ColumnType::String => ColumnData::Utf8(Vec::with_capacity(capacity)),
            _ => ColumnData::Int(Vec::with_capacity(capacity)),
        }
    }

    /// Moves the buffer out, leaving an empty one of the same kind.
    pub(crate) fn take(&mut self) -> ColumnData {
        match self {
            ColumnData::Int(v) => ColumnData::Int(std::mem::take(v)),
            ColumnData::UInt(v) => ColumnData::UInt(std::mem::take(v)),
            ColumnData::Float(v) => ColumnData::Float(std::mem::take(v)),
            ColumnData::Bool(v) => ColumnData::Bool(v.take()),
            ColumnData::Utf8(v) => ColumnData::Utf8(std::mem::take(v)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Column {
    schema: ColumnSchema,
    pub(crate) data: ColumnData,
    pub(crate) validity: BitVec,
}

impl Column {
    fn new(schema: ColumnSchema, capacity: usize) -> Self {
        let data = ColumnData::for_type(schema.column_type, capacity);
        Self {
            schema,
            data,
            validity: BitVec::with_capacity_bits(capacity),
        }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.schema.column_type
    }

    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.validity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validity.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.validity.count_zeros()
    }

    pub fn get(&self, row: usize) -> Value {
        if row >= self.len() || !self.validity.get(row) {
            return Value::Null;
        }
        match &self.data {
            ColumnData::Int(v) if self.schema.column_type.is_temporal() => Value::DateTime(v[row]),
            ColumnData::Int(v) => Value::Int(v[row]),
            ColumnData::UInt(v) => Value::UInt(v[row]),
            ColumnData::Float(v) => Value::Float(v[row]),
            ColumnData::Bool(v) => Value::Bool(v.get(row)),
            ColumnData::Utf8(v) => Value::String(v[row].clone()),
        }
    }

    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).map(move |row| self.get(row))
    }

    pub fn stats(&self) -> ColumnStats {
        ColumnStats::from_column(self)
    }

    fn coerce(&self, value: &Value) -> Result<Value> {
        self.schema
            .column_type
            .coerce(value)
            .ok_or_else(|| ColumnarError::TypeMismatch {
                column: self.schema.name.clone(),
                column_type: self.schema.column_type,
                value: value.to_string(),
            })
    }

    /// Appends an already coerced value.
    fn push_coerced(&mut self, value: Value) {
        self.validity.push(!value.is_null());
        match (&mut self.data, value) {
            (ColumnData::Int(v), Value::Int(x) | Value::DateTime(x)) => v.push(x),
            (ColumnData::UInt(v), Value::UInt(x)) => v.push(x),
            (ColumnData::Float(v), Value::Float(x)) => v.push(x),
            (ColumnData::Bool(v), Value::Bool(x)) => v.push(x),
            (ColumnData::Utf8(v), Value::String(x)) => v.push(x),
            (ColumnData::Int(v), _) => v.push(0),
            (ColumnData::UInt(v), _) => v.push(0),
            (ColumnData::Float(v), _) => v.push(0.0),
            (ColumnData::Bool(v), _) => v.push(false),
            (ColumnData::Utf8(v), _) => v.push(Arc::from("")),
        }
    }

    fn gather(&self, rows: &[usize]) -> Column {
        let data = match &self.data {
            ColumnData::Int(v) => ColumnData::Int(rows.iter().map(|&r| v[r]).collect()),
            ColumnData::UInt(v) => ColumnData::UInt(rows.iter().map(|&r| v[r]).collect()),
            ColumnData::Float(v) => ColumnData::Float(rows.iter().map(|&r| v[r]).collect()),
            ColumnData::Bool(v) => ColumnData::Bool(v.gather(rows)),
            ColumnData::Utf8(v) => ColumnData::Utf8(rows.iter().map(|&r| v[r].clone()).collect()),
        };
        Column {
            schema: self.schema.clone(),
            data,
            validity: self.validity.gather(rows),
        }
    }

    fn extend_from(&mut self, other: &Column) {
        match (&mut self.data, &other.data) {
            (ColumnData::Int(a), ColumnData::Int(b)) => a.extend_from_slice(b),
            (ColumnData::UInt(a), ColumnData::UInt(b)) => a.extend_from_slice(b),
            (ColumnData::Float(a), ColumnData::Float(b)) => a.extend_from_slice(b),
            (ColumnData::Bool(a), ColumnData::Bool(b)) => a.extend_from(b),
            (ColumnData::Utf8(a), ColumnData::Utf8(b)) => a.extend_from_slice(b),
            // Same schema implies same physical layout.
            _ => unreachable!("column layouts checked by caller"),
        }
        self.validity.extend_from(&other.validity);
    }
}

/// Row-wise builder, mirroring how external input arrives.
#[derive(Debug)]
pub struct ColumnTableBuilder {
    columns: Vec<Column>,
    rows: usize,
}

impl ColumnTableBuilder {
    pub fn new(schema: Vec<ColumnSchema>) -> Self {
        Self::with_capacity(schema, 0)
    }

    pub fn with_capacity(schema: Vec<ColumnSchema>, rows: usize) -> Self {
        Self {
            columns: schema.into_iter().map(|s| Column::new(s, rows)).collect(),
            rows: 0,
        }
    }

    /// Appends one row. Either every value is stored or none is.
    pub fn append_row(&mut self, row: &[Value]) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(ColumnarError::LengthMismatch {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        let coerced = self
            .columns
            .iter()
            .zip(row)
            .map(|(col, value)| col.coerce(value))
            .collect::<Result<Vec<_>>>()?;
        for (col, value) in self.columns.iter_mut().zip(coerced) {
            col.push_coerced(value);
        }
        self.rows += 1;
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn finish(self) -> Result<ColumnTable> {
        let mut seen = HashSet::new();
        for col in &self.columns {
            if !seen.insert(col.name()) {
                return Err(ColumnarError::DuplicateColumn(col.name().to_string()));
            }
        }
        Ok(ColumnTable {
            columns: self.columns,
            rows: self.rows,
            moved: false,
        })
    }
}

/// Named, equal-length typed columns in insertion order.
///
/// Draining moves the buffers out and leaves the column layout behind with zero rows; further
/// drains fail with [`ColumnarError::AlreadyMoved`].
#[derive(Clone, Debug)]
pub struct ColumnTable {
    pub(crate) columns: Vec<Column>,
    pub(crate) rows: usize,
    pub(crate) moved: bool,
}

impl ColumnTable {
    /// An empty table with the given layout.
    pub fn new(schema: Vec<ColumnSchema>) -> Result<Self> {
        ColumnTableBuilder::new(schema).finish()
    }

    pub fn from_rows<I>(schema: Vec<ColumnSchema>, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = Vec<Value>>,
    {
        let mut builder = ColumnTableBuilder::new(schema);
        for row in rows {
            builder.append_row(&row)?;
        }
        builder.finish()
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn is_moved(&self) -> bool {
        self.moved
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn schema(&self) -> Vec<ColumnSchema> {
        self.columns.iter().map(|c| c.schema.clone()).collect()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn column_stats(&self, name: &str) -> Option<ColumnStats> {
        self.column(name).map(Column::stats)
    }

    pub fn value(&self, row: usize, col: usize) -> Value {
        self.columns
            .get(col)
            .map(|c| c.get(row))
            .unwrap_or(Value::Null)
    }

    pub fn row(&self, row: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.get(row)).collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<Value>> + '_ {
        (0..self.rows).map(move |r| self.row(r))
    }

    /// Position of `index_column`, which must hold `UInt64` cell ids.
    pub(crate) fn index_position(&self, index_column: &str) -> Result<usize> {
        let idx = self
            .column_index(index_column)
            .ok_or_else(|| ColumnarError::MissingColumn(index_column.to_string()))?;
        let column_type = self.columns[idx].column_type();
        if column_type != ColumnType::UInt64 {
            return Err(ColumnarError::UnsupportedColumnType {
                column: index_column.to_string(),
                column_type,
            });
        }
        Ok(idx)
    }

    /// Cell ids of every row. Without validation, values are taken as-is.
    pub fn cells(&self, index_column: &str, validate: bool) -> Result<Vec<CellId>> {
        let idx = self.index_position(index_column)?;
        let column = &self.columns[idx];
        (0..self.rows)
            .map(|row| {
                let raw = column
                    .get(row)
                    .as_u64()
                    .ok_or(ColumnarError::NullCellId(row))?;
                if validate {
                    CellId::new(raw).map_err(|_| ColumnarError::InvalidCellId { row, raw })
                } else {
                    Ok(CellId::from_raw_unchecked(raw))
                }
            })
            .collect()
    }

    /// New table with the given rows, in the given order.
    pub fn take_rows(&self, rows: &[usize]) -> ColumnTable {
        ColumnTable {
            columns: self.columns.iter().map(|c| c.gather(rows)).collect(),
            rows: rows.len(),
            moved: false,
        }
    }

    /// Keeps the named columns in the given order.
    pub fn select(&self, names: &[&str]) -> Result<ColumnTable> {
        let columns = names
            .iter()
            .map(|name| {
                self.column(name)
                    .cloned()
                    .ok_or_else(|| ColumnarError::MissingColumn(name.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ColumnTable {
            columns,
            rows: self.rows,
            moved: self.moved,
        })
    }

    /// Replaces the values of one column, keeping its type.
    pub fn replace_column(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if self.moved {
            return Err(ColumnarError::AlreadyMoved);
        }
        if values.len() != self.rows {
            return Err(ColumnarError::LengthMismatch {
                expected: self.rows,
                actual: values.len(),
            });
        }
        let idx = self
            .column_index(name)
            .ok_or_else(|| ColumnarError::MissingColumn(name.to_string()))?;
        let mut column = Column::new(self.columns[idx].schema.clone(), values.len());
        for value in &values {
            let coerced = column.coerce(value)?;
            column.push_coerced(coerced);
        }
        self.columns[idx] = column;
        Ok(())
    }

    /// Union of tables with identical layouts, in argument order.
    pub fn concat(tables: &[ColumnTable]) -> Result<ColumnTable> {
        let Some(first) = tables.first() else {
            return ColumnTable::new(Vec::new());
        };
        let schema = first.schema();
        let mut out = ColumnTable {
            columns: schema
                .iter()
                .map(|s| Column::new(s.clone(), tables.iter().map(|t| t.rows).sum()))
                .collect(),
            rows: 0,
            moved: false,
        };
        for table in tables {
            if table.schema() != schema {
                return Err(ColumnarError::SchemaMismatch);
            }
            for (dst, src) in out.columns.iter_mut().zip(&table.columns) {
                dst.extend_from(src);
            }
            out.rows += table.rows;
        }
        Ok(out)
    }

    /// Builds a table with this table's layout from already typed rows.
    pub(crate) fn with_rows(&self, rows: Vec<Vec<Value>>) -> Result<ColumnTable> {
        let mut builder = ColumnTableBuilder::with_capacity(self.schema(), rows.len());
        for row in rows {
            builder.append_row(&row)?;
        }
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Vec<ColumnSchema> {
        vec![
            ColumnSchema::new("h3index", ColumnType::UInt64),
            ColumnSchema::new("label", ColumnType::String),
            ColumnSchema::new("flag", ColumnType::Bool),
        ]
    }

    #[test]
    fn append_is_all_or_nothing() {
        let mut builder = ColumnTableBuilder::new(schema());
        builder
            .append_row(&[Value::UInt(1), "a".into(), Value::Bool(true)])
            .expect("append");
        let err = builder
            .append_row(&[Value::UInt(2), "b".into(), Value::Int(1)])
            .unwrap_err();
        assert!(matches!(err, ColumnarError::TypeMismatch { .. }));

        let table = builder.finish().expect("finish");
        assert_eq!(table.len(), 1);
        assert_eq!(table.row(0), vec![Value::UInt(1), "a".into(), Value::Bool(true)]);
    }

    #[test]
    fn duplicate_columns_are_rejected() {
        let err = ColumnTable::new(vec![
            ColumnSchema::new("a", ColumnType::Int64),
            ColumnSchema::new("a", ColumnType::Float64),
        ])
        .unwrap_err();
        assert_eq!(err, ColumnarError::DuplicateColumn("a".to_string()));
    }

    #[test]
    fn nulls_round_trip_through_validity() {
        let table = ColumnTable::from_rows(
            schema(),
            vec![
                vec![Value::UInt(1), Value::Null, Value::Null],
                vec![Value::UInt(2), "x".into(), Value::Bool(false)],
            ],
        )
        .expect("table");
        assert_eq!(table.value(0, 1), Value::Null);
        assert_eq!(table.value(1, 2), Value::Bool(false));
        assert_eq!(table.column("label").map(Column::null_count), Some(1));
    }

    #[test]
    fn take_rows_and_concat() {
        let table = ColumnTable::from_rows(
            schema(),
            (0..5u64).map(|i| vec![Value::UInt(i), "r".into(), Value::Bool(i % 2 == 0)]),
        )
        .expect("table");
        let picked = table.take_rows(&[4, 0]);
        assert_eq!(picked.value(0, 0), Value::UInt(4));

        let joined = ColumnTable::concat(&[table.clone(), picked]).expect("concat");
        assert_eq!(joined.len(), 7);
        assert_eq!(joined.value(6, 0), Value::UInt(0));

        let other = ColumnTable::new(vec![ColumnSchema::new("x", ColumnType::Int64)]).unwrap();
        assert_eq!(
            ColumnTable::concat(&[table, other]).unwrap_err(),
            ColumnarError::SchemaMismatch
        );
    }

    #[test]
    fn cells_reject_invalid_values_when_validating() {
        let table =
            ColumnTable::from_rows(schema(), vec![vec![Value::UInt(5), "a".into(), Value::Null]])
                .expect("table");
        assert!(table.cells("h3index", false).is_ok());
        assert_eq!(
            table.cells("h3index", true).unwrap_err(),
            ColumnarError::InvalidCellId { row: 0, raw: 5 }
        );
        assert!(matches!(
            table.cells("label", true),
            Err(ColumnarError::UnsupportedColumnType { .. })
        ));
    }
}
