use super::{functions, Warehouse};
use crate::config::InsertOptions;
use crate::error::{Error, Result};
use crate::schema::Dialect;
use hexstore_columnar::{ColumnSchema, ColumnTable, ColumnType, Value};
use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags, ToSql};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound parameters per statement allowed by the bundled SQLite.
const MAX_VARIABLES: usize = 32_766;

/// SQLite-backed warehouse; the reference implementation used by tests and embedded setups.
#[derive(Debug, Clone)]
pub struct SqliteWarehouse {
    conn: Arc<Mutex<Connection>>,
}

fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    functions::register(conn)
}

impl SqliteWarehouse {
    fn from_connection(conn: Connection) -> Result<Self> {
        init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn open_uri(uri: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI;
        Self::from_connection(Connection::open_with_flags(uri, flags)?)
    }

    /// How long statements wait on a locked database before failing with `SQLITE_BUSY`.
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        let conn = self.conn.lock().expect("warehouse mutex poisoned");
        conn.busy_timeout(timeout)?;
        Ok(())
    }

    /// Opens from a connection string: `:memory:`, a `file:` URI, or a path with an optional
    /// `sqlite://` prefix.
    pub fn open(connection_string: &str) -> Result<Self> {
        let s = connection_string.trim();
        if s.is_empty() || s == ":memory:" || s == "sqlite::memory:" {
            Self::open_in_memory()
        } else if s.starts_with("file:") {
            Self::open_uri(s)
        } else {
            Self::open_path(s.strip_prefix("sqlite://").unwrap_or(s))
        }
    }
}

/// Binds a [`Value`] as a statement parameter.
struct Param<'a>(&'a Value);

impl ToSql for Param<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Int(v) | Value::DateTime(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            Value::UInt(v) => {
                let v = i64::try_from(*v)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                ToSqlOutput::Owned(SqlValue::Integer(v))
            }
            Value::Float(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            Value::Bool(v) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*v))),
            Value::String(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

fn value_from_sql(column: &str, column_type: ColumnType, value: SqlValue) -> Result<Value> {
    let value = match value {
        SqlValue::Null => return Ok(Value::Null),
        SqlValue::Integer(i) if column_type == ColumnType::Bool => Value::Bool(i != 0),
        SqlValue::Integer(i) => Value::Int(i),
        SqlValue::Real(f) => Value::Float(f),
        SqlValue::Text(s) => Value::from(s.as_str()),
        SqlValue::Blob(_) => {
            return Err(Error::UnsupportedColumnType {
                column: column.to_string(),
                column_type: "Blob".to_string(),
            })
        }
    };
    column_type.coerce(&value).ok_or_else(|| {
        Error::Value(format!(
            "value {value} in column {column:?} does not fit {column_type}"
        ))
    })
}

/// Multi-row `INSERT` with numbered placeholders for `rows` rows.
fn insert_statement(table: &str, names: &[&str], rows: usize) -> String {
    let width = names.len();
    let tuples: Vec<String> = (0..rows)
        .map(|r| {
            let placeholders: Vec<String> =
                (1..=width).map(|c| format!("?{}", r * width + c)).collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();
    format!(
        "INSERT INTO {table} ({}) VALUES {}",
        names.join(", "),
        tuples.join(", ")
    )
}

fn infer_type<'a>(
    column: &str,
    values: impl Iterator<Item = Option<&'a SqlValue>>,
) -> Result<ColumnType> {
    for value in values.flatten() {
        match value {
            SqlValue::Null => continue,
            SqlValue::Integer(_) => return Ok(ColumnType::Int64),
            SqlValue::Real(_) => return Ok(ColumnType::Float64),
            SqlValue::Text(_) => return Ok(ColumnType::String),
            SqlValue::Blob(_) => {
                return Err(Error::UnsupportedColumnType {
                    column: column.to_string(),
                    column_type: "Blob".to_string(),
                })
            }
        }
    }
    Ok(ColumnType::Int64)
}

impl Warehouse for SqliteWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute_all(&self, statements: &[String]) -> Result<()> {
        let mut conn = self.conn.lock().expect("warehouse mutex poisoned");
        let tx = conn.transaction()?;
        for statement in statements {
            tx.execute_batch(statement)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn query(&self, sql: &str) -> Result<ColumnTable> {
        let conn = self.conn.lock().expect("warehouse mutex poisoned");
        let mut stmt = conn.prepare(sql)?;
        let declared: Vec<(String, Option<ColumnType>)> = stmt
            .columns()
            .iter()
            .map(|c| {
                (
                    c.name().to_string(),
                    c.decl_type().and_then(ColumnType::from_name),
                )
            })
            .collect();

        let width = declared.len();
        let mut raw_rows: Vec<Vec<SqlValue>> = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let values = (0..width)
                .map(|i| row.get::<_, SqlValue>(i))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            raw_rows.push(values);
        }

        let schema = declared
            .into_iter()
            .enumerate()
            .map(|(i, (name, column_type))| {
                let column_type = match column_type {
                    Some(t) => t,
                    None => infer_type(&name, raw_rows.iter().map(|r| r.get(i)))?,
                };
                Ok(ColumnSchema::new(name, column_type))
            })
            .collect::<Result<Vec<_>>>()?;

        let rows = raw_rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&schema)
                    .map(|(value, col)| value_from_sql(&col.name, col.column_type, value))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ColumnTable::from_rows(schema, rows)?)
    }

    fn insert_batches(
        &self,
        batches: &[(String, ColumnTable)],
        options: &InsertOptions,
    ) -> Result<()> {
        let mut conn = self.conn.lock().expect("warehouse mutex poisoned");
        // Dropping the transaction on any early return rolls it back.
        let tx = conn.transaction()?;
        for (table, data) in batches.iter().filter(|(_, data)| !data.is_empty()) {
            let names = data.column_names();
            let width = names.len().max(1);
            let chunk_rows = options
                .max_rows_per_chunk
                .clamp(1, (MAX_VARIABLES / width).max(1));
            let rows: Vec<Vec<Value>> = data.rows().collect();
            for chunk in rows.chunks(chunk_rows) {
                if options.is_aborted() {
                    return Err(Error::Aborted);
                }
                let sql = insert_statement(table, &names, chunk.len());
                let mut stmt = tx.prepare_cached(&sql)?;
                stmt.execute(params_from_iter(chunk.iter().flatten().map(Param)))?;
            }
        }
        if options.is_aborted() {
            return Err(Error::Aborted);
        }
        tx.commit()?;
        Ok(())
    }

    fn table_names(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().expect("warehouse mutex poisoned");
        let mut stmt =
            conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_types_survive_a_round_trip() {
        let warehouse = SqliteWarehouse::open_in_memory().expect("open");
        warehouse
            .execute_all(&[
                "CREATE TABLE t (h3index UInt64 NOT NULL, ok Bool, label Text, at DateTime)".to_string(),
            ])
            .expect("create");
        let data = ColumnTable::from_rows(
            vec![
                ColumnSchema::new("h3index", ColumnType::UInt64),
                ColumnSchema::new("ok", ColumnType::Bool),
                ColumnSchema::new("label", ColumnType::String),
                ColumnSchema::new("at", ColumnType::DateTime),
            ],
            vec![vec![
                Value::UInt(42),
                Value::Bool(true),
                Value::from("x"),
                Value::DateTime(60),
            ]],
        )
        .expect("table");
        warehouse
            .insert_batches(&[("t".to_string(), data)], &InsertOptions::default())
            .expect("insert");

        let back = warehouse.query("SELECT * FROM t").expect("query");
        assert_eq!(
            back.row(0),
            vec![
                Value::UInt(42),
                Value::Bool(true),
                Value::from("x"),
                Value::DateTime(60)
            ]
        );
        let counted = warehouse.query("SELECT count(*) AS n FROM t").expect("count");
        assert_eq!(counted.schema()[0].column_type, ColumnType::Int64);
        assert_eq!(counted.row(0), vec![Value::Int(1)]);
    }

    #[test]
    fn blobs_are_unsupported() {
        let warehouse = SqliteWarehouse::open_in_memory().expect("open");
        let err = warehouse.query("SELECT x'00ff' AS payload").unwrap_err();
        assert!(matches!(err, Error::UnsupportedColumnType { .. }), "{err}");
    }

    #[test]
    fn failed_batch_leaves_no_rows() {
        let warehouse = SqliteWarehouse::open_in_memory().expect("open");
        warehouse
            .execute_all(&["CREATE TABLE a (h3index UInt64 NOT NULL)".to_string()])
            .expect("create");
        let ok = ColumnTable::from_rows(
            vec![ColumnSchema::new("h3index", ColumnType::UInt64)],
            vec![vec![Value::UInt(1)]],
        )
        .expect("table");
        let err = warehouse.insert_batches(
            &[("a".to_string(), ok.clone()), ("missing".to_string(), ok)],
            &InsertOptions::default(),
        );
        assert!(err.is_err());
        let count = warehouse.query("SELECT count(*) AS n FROM a").expect("count");
        assert_eq!(count.row(0), vec![Value::Int(0)]);
    }

    fn numbered(n: u64) -> ColumnTable {
        ColumnTable::from_rows(
            vec![
                ColumnSchema::new("h3index", ColumnType::UInt64),
                ColumnSchema::new("n", ColumnType::Int64),
            ],
            (1..=n).map(|i| vec![Value::UInt(i), Value::Int(i as i64 * 10)]),
        )
        .expect("table")
    }

    #[test]
    fn chunked_insert_writes_every_row() {
        let warehouse = SqliteWarehouse::open_in_memory().expect("open");
        warehouse
            .execute_all(&["CREATE TABLE a (h3index UInt64 NOT NULL, n Int64)".to_string()])
            .expect("create");
        let options = InsertOptions {
            max_rows_per_chunk: 2,
            ..InsertOptions::default()
        };
        warehouse
            .insert_batches(&[("a".to_string(), numbered(5))], &options)
            .expect("insert");
        let back = warehouse
            .query("SELECT count(*) AS written, sum(n) AS total FROM a")
            .expect("count");
        assert_eq!(back.row(0), vec![Value::Int(5), Value::Int(150)]);
    }

    #[test]
    fn aborted_insert_leaves_no_rows() {
        let warehouse = SqliteWarehouse::open_in_memory().expect("open");
        warehouse
            .execute_all(&["CREATE TABLE a (h3index UInt64 NOT NULL, n Int64)".to_string()])
            .expect("create");
        let options = InsertOptions::default();
        options.abort.store(true, std::sync::atomic::Ordering::Relaxed);
        let err = warehouse
            .insert_batches(&[("a".to_string(), numbered(3))], &options)
            .unwrap_err();
        assert!(matches!(err, Error::Aborted), "{err}");
        let count = warehouse.query("SELECT count(*) AS n FROM a").expect("count");
        assert_eq!(count.row(0), vec![Value::Int(0)]);
    }

    #[test]
    fn insert_statement_numbers_placeholders_per_row() {
        assert_eq!(
            insert_statement("t", &["h3index", "n"], 2),
            "INSERT INTO t (h3index, n) VALUES (?1, ?2), (?3, ?4)"
        );
    }

    #[test]
    fn partition_functions_are_registered() {
        let warehouse = SqliteWarehouse::open_in_memory().expect("open");
        let cell = hexstore_grid::res0_cells()[3].children()[5];
        let parent = warehouse
            .query(&format!(
                "SELECT h3_parent({0}, 0) AS p, h3_resolution({0}) AS r, temporal_bucket(86400 * 14, 'week', 2) AS w",
                cell.raw()
            ))
            .expect("query");
        assert_eq!(
            parent.row(0),
            vec![
                Value::Int(hexstore_grid::res0_cells()[3].raw() as i64),
                Value::Int(1),
                Value::Int(1)
            ]
        );
    }
}
