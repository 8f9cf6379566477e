use crate::schema::Dialect;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Session settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Upper bound on concurrent warehouse round-trips.
    pub worker_threads: usize,
    /// Lock wait applied to warehouses opened through [`crate::Session::connect`].
    pub busy_timeout: Duration,
    /// Existence probes are cut off after this long and treated as non-empty.
    pub prefetch_timeout: Duration,
    /// Primary fetches and ad-hoc queries fail with a retryable timeout after this long.
    pub fetch_timeout: Duration,
    /// DDL dialect; `None` uses the warehouse's own.
    pub dialect: Option<Dialect>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            busy_timeout: Duration::from_secs(5),
            prefetch_timeout: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(120),
            dialect: None,
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|&n| n > 0)
}

impl SessionConfig {
    /// Defaults overridden by `HEXSTORE_WORKER_THREADS`, `HEXSTORE_PREFETCH_TIMEOUT_MS` and
    /// `HEXSTORE_FETCH_TIMEOUT_MS`. Unparsable or zero values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_u64("HEXSTORE_WORKER_THREADS") {
            config.worker_threads = n as usize;
        }
        if let Some(ms) = env_u64("HEXSTORE_PREFETCH_TIMEOUT_MS") {
            config.prefetch_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("HEXSTORE_FETCH_TIMEOUT_MS") {
            config.fetch_timeout = Duration::from_millis(ms);
        }
        config
    }
}

/// Traversal settings of one cursor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraversalOptions {
    /// Most fetch-resolution cells one window may cover; picks the traversal resolution.
    pub max_cells_per_fetch: usize,
    /// Primary fetches kept in flight ahead of the consumer.
    pub concurrency: usize,
    /// Frontier cells per existence probe.
    pub prefetch_batch_size: usize,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            max_cells_per_fetch: 500,
            concurrency: 3,
            prefetch_batch_size: 50,
        }
    }
}

/// Settings of one insert.
#[derive(Clone, Debug)]
pub struct InsertOptions {
    /// Creates the table set's tables (if missing) before writing.
    pub create_schema: bool,
    /// Most rows bound into one insert statement.
    pub max_rows_per_chunk: usize,
    /// Set from any thread to stop the insert. Checked between pyramid levels and between
    /// chunks; an aborted insert writes nothing.
    pub abort: Arc<AtomicBool>,
}

impl Default for InsertOptions {
    fn default() -> Self {
        Self {
            create_schema: false,
            max_rows_per_chunk: 10_000,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl InsertOptions {
    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }
}
