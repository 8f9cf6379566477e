//! Sessions: schema registry, DDL lifecycle, inserts, and background round-trips.

use crate::config::{InsertOptions, SessionConfig, TraversalOptions};
use crate::engine::AggregationEngine;
use crate::error::{Error, Result};
use crate::handle::QueryHandle;
use crate::schema::{Dialect, TableSetDefinition, INDEX_COLUMN};
use crate::tableset::{drop_statements, find_tablesets, TableSetInfo};
use crate::traversal::{WindowCursor, WindowRequest};
use crate::warehouse::{SqliteWarehouse, Warehouse};
use hexstore_columnar::{ColumnTable, ColumnType};
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;

pub(crate) struct SessionInner {
    warehouse: Arc<dyn Warehouse>,
    runtime: Runtime,
    config: SessionConfig,
    registry: RwLock<HashMap<String, Arc<TableSetDefinition>>>,
}

impl SessionInner {
    pub(crate) fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Runs `f` against the warehouse on the blocking pool. The handle resolves to
    /// [`Error::Timeout`] once `timeout` elapses; the round-trip itself is not interrupted.
    pub(crate) fn dispatch<T, F>(
        &self,
        operation: &'static str,
        timeout: Duration,
        f: F,
    ) -> QueryHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Warehouse) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let warehouse = Arc::clone(&self.warehouse);
        self.runtime.spawn(async move {
            let task = tokio::task::spawn_blocking(move || f(warehouse.as_ref()));
            let result = match tokio::time::timeout(timeout, task).await {
                Ok(Ok(result)) => result,
                Ok(Err(err)) => Err(Error::Worker(err.to_string())),
                Err(_) => Err(Error::Timeout {
                    operation,
                    after: timeout,
                }),
            };
            // The receiver is gone when the caller abandoned the handle.
            let _ = tx.send(result);
        });
        QueryHandle::new(rx)
    }
}

/// Rows written per resolution by one insert.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InsertSummary {
    pub rows_per_resolution: BTreeMap<u8, usize>,
}

impl InsertSummary {
    pub fn total_rows(&self) -> usize {
        self.rows_per_resolution.values().sum()
    }
}

/// Connection to one warehouse. Cheap to clone; clones share the worker pool and the registry.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("warehouse", &self.inner.warehouse)
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Session {
    pub fn open(warehouse: Arc<dyn Warehouse>, config: SessionConfig) -> Result<Self> {
        let threads = config.worker_threads.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads)
            .max_blocking_threads(threads)
            .thread_name("hexstore-worker")
            .enable_time()
            .build()?;
        info!(
            "opened session on {:?} warehouse with {threads} workers",
            warehouse.dialect()
        );
        Ok(Self {
            inner: Arc::new(SessionInner {
                warehouse,
                runtime,
                config,
                registry: RwLock::new(HashMap::new()),
            }),
        })
    }

    /// Opens a SQLite warehouse from a connection string (see [`SqliteWarehouse::open`]).
    pub fn connect(connection_string: &str, config: SessionConfig) -> Result<Self> {
        let warehouse = SqliteWarehouse::open(connection_string)?;
        warehouse.set_busy_timeout(config.busy_timeout)?;
        Self::open(Arc::new(warehouse), config)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// DDL dialect: the configured override, else the warehouse's own.
    pub fn dialect(&self) -> Dialect {
        self.inner
            .config
            .dialect
            .unwrap_or_else(|| self.inner.warehouse.dialect())
    }

    /// Runs a statement in the background.
    pub fn execute(&self, sql: impl Into<String>) -> QueryHandle<()> {
        let sql = sql.into();
        self.inner
            .dispatch("execute", self.inner.config.fetch_timeout, move |w| {
                w.execute_all(&[sql])
            })
    }

    /// Runs a query in the background.
    pub fn query_fetch(&self, sql: impl Into<String>) -> QueryHandle<ColumnTable> {
        let sql = sql.into();
        self.inner
            .dispatch("query", self.inner.config.fetch_timeout, move |w| w.query(&sql))
    }

    /// Creates every physical table of `schema` in one transaction and registers it.
    pub fn create_tableset(&self, schema: &TableSetDefinition) -> Result<()> {
        let statements = schema.sql_statements(self.dialect());
        self.inner.warehouse.execute_all(&statements)?;
        self.inner
            .registry
            .write()
            .expect("schema registry lock poisoned")
            .insert(schema.name().to_string(), Arc::new(schema.clone()));
        info!(
            "created table set {} at resolutions {:?}",
            schema.name(),
            schema.base_resolutions()
        );
        Ok(())
    }

    /// Drops every physical table of the named table set.
    pub fn drop_tableset(&self, name: &str) -> Result<()> {
        let info = self
            .list_tablesets()?
            .into_iter()
            .find(|t| t.name == name)
            .ok_or_else(|| Error::TableSetNotFound(name.to_string()))?;
        let statements = drop_statements(&info.name, &info.resolutions, self.dialect());
        self.inner.warehouse.execute_all(&statements)?;
        self.inner
            .registry
            .write()
            .expect("schema registry lock poisoned")
            .remove(name);
        info!("dropped table set {name}");
        Ok(())
    }

    /// Table sets discovered from the warehouse's table names.
    pub fn list_tablesets(&self) -> Result<Vec<TableSetInfo>> {
        let tables = self.inner.warehouse.table_names()?;
        Ok(find_tablesets(tables.iter().map(String::as_str)))
    }

    /// Definition registered by [`Session::create_tableset`] in this session.
    pub fn schema(&self, name: &str) -> Option<Arc<TableSetDefinition>> {
        self.inner
            .registry
            .read()
            .expect("schema registry lock poisoned")
            .get(name)
            .cloned()
    }

    /// Validates `table` against `schema`, builds the resolution pyramid and writes every
    /// resolution in one transaction. Uses [`InsertOptions::default`].
    pub fn insert(
        &self,
        schema: &TableSetDefinition,
        table: &ColumnTable,
    ) -> Result<InsertSummary> {
        self.insert_with(schema, table, &InsertOptions::default())
    }

    /// [`Session::insert`] with explicit options. An insert aborted through
    /// [`InsertOptions::abort`] fails with [`Error::Aborted`] and writes nothing.
    pub fn insert_with(
        &self,
        schema: &TableSetDefinition,
        table: &ColumnTable,
        options: &InsertOptions,
    ) -> Result<InsertSummary> {
        validate_columns(schema, table)?;
        if options.create_schema {
            self.create_tableset(schema)?;
        }
        let names: Vec<String> = schema.table_layout().into_iter().map(|c| c.name).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let ordered = table.select(&names)?;

        let pyramid = AggregationEngine::new(schema)
            .with_abort(Arc::clone(&options.abort))
            .build_pyramid(&ordered)?;
        let mut summary = InsertSummary::default();
        let batches: Vec<(String, ColumnTable)> = pyramid
            .into_iter()
            .map(|(res, rows)| {
                summary.rows_per_resolution.insert(res, rows.len());
                (schema.table_name(res), rows)
            })
            .collect();
        if options.is_aborted() {
            return Err(Error::Aborted);
        }
        self.inner.warehouse.insert_batches(&batches, options)?;
        debug!(
            "inserted {} input rows into {}: {:?}",
            table.len(),
            schema.name(),
            summary.rows_per_resolution
        );
        Ok(summary)
    }

    /// Starts a windowed traversal. Planning happens on first use of the cursor.
    pub fn query(
        &self,
        schema: &TableSetDefinition,
        request: WindowRequest,
        options: TraversalOptions,
    ) -> Result<WindowCursor> {
        WindowCursor::new(
            Arc::clone(&self.inner),
            Arc::new(schema.clone()),
            request,
            options,
        )
    }
}

fn validate_columns(schema: &TableSetDefinition, table: &ColumnTable) -> Result<()> {
    if table.is_moved() {
        return Err(Error::AlreadyMoved);
    }
    match table.column(INDEX_COLUMN) {
        None => {
            return Err(Error::Schema(format!("missing index column {INDEX_COLUMN:?}")));
        }
        Some(c) if c.column_type() != ColumnType::UInt64 => {
            return Err(Error::Schema(format!(
                "index column {INDEX_COLUMN:?} must be UInt64, found {}",
                c.column_type()
            )));
        }
        Some(c) if c.null_count() > 0 => {
            return Err(Error::Schema(format!("index column {INDEX_COLUMN:?} contains nulls")));
        }
        Some(_) => {}
    }

    for column in table.columns() {
        if column.name() != INDEX_COLUMN && schema.column(column.name()).is_none() {
            return Err(Error::Schema(format!(
                "column {:?} is not part of table set {}",
                column.name(),
                schema.name()
            )));
        }
    }
    for definition in schema.columns() {
        let column = table
            .column(&definition.name)
            .ok_or_else(|| Error::Schema(format!("missing column {:?}", definition.name)))?;
        if column.column_type() != definition.column_type {
            return Err(Error::Schema(format!(
                "column {:?} has type {}, expected {}",
                definition.name,
                column.column_type(),
                definition.column_type
            )));
        }
        if !definition.nullable && column.null_count() > 0 {
            return Err(Error::Schema(format!(
                "column {:?} is not nullable but contains {} nulls",
                definition.name,
                column.null_count()
            )));
        }
    }
    Ok(())
}
