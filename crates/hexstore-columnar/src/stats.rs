use crate::table::Column;
use crate::types::{ColumnType, Value};
use std::cmp::Ordering;

/// Summary of one column's values. `sum` is only set for numeric columns.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnStats {
    pub column_type: ColumnType,
    pub row_count: u64,
    pub null_count: u64,
    pub min: Option<Value>,
    pub max: Option<Value>,
    pub sum: Option<f64>,
}

impl ColumnStats {
    pub(crate) fn from_column(column: &Column) -> Self {
        let column_type = column.column_type();
        let mut stats = ColumnStats {
            column_type,
            row_count: column.len() as u64,
            null_count: column.null_count() as u64,
            min: None,
            max: None,
            sum: column_type.is_numeric().then_some(0.0),
        };

        for value in column.values().filter(|v| !v.is_null()) {
            if let (Some(sum), Some(v)) = (stats.sum.as_mut(), value.as_f64()) {
                *sum += v;
            }
            if stats
                .min
                .as_ref()
                .map_or(true, |m| value.cmp_same_kind(m) == Some(Ordering::Less))
            {
                stats.min = Some(value.clone());
            }
            if stats
                .max
                .as_ref()
                .map_or(true, |m| value.cmp_same_kind(m) == Some(Ordering::Greater))
            {
                stats.max = Some(value);
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use crate::table::{ColumnSchema, ColumnTable};
    use crate::types::{ColumnType, Value};

    #[test]
    fn numeric_stats_skip_nulls() {
        let table = ColumnTable::from_rows(
            vec![ColumnSchema::new("v", ColumnType::Float64)],
            vec![
                vec![Value::Float(2.5)],
                vec![Value::Null],
                vec![Value::Float(-1.0)],
            ],
        )
        .expect("table");
        let stats = table.column_stats("v").expect("stats");
        assert_eq!(stats.row_count, 3);
        assert_eq!(stats.null_count, 1);
        assert_eq!(stats.min, Some(Value::Float(-1.0)));
        assert_eq!(stats.max, Some(Value::Float(2.5)));
        assert_eq!(stats.sum, Some(1.5));
    }

    #[test]
    fn strings_have_no_sum() {
        let table = ColumnTable::from_rows(
            vec![ColumnSchema::new("s", ColumnType::String)],
            vec![vec!["b".into()], vec!["a".into()]],
        )
        .expect("table");
        let stats = table.column_stats("s").expect("stats");
        assert_eq!(stats.sum, None);
        assert_eq!(stats.min, Some("a".into()));
    }
}
