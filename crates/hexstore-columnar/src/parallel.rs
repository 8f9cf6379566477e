#[cfg(feature = "parallel")]
use rayon::prelude::*;
#[cfg(feature = "parallel")]
use rayon::ThreadPool;
#[cfg(feature = "parallel")]
use std::sync::OnceLock;

/// Levels smaller than this are processed on the calling thread.
#[cfg(feature = "parallel")]
const PARALLEL_MIN_GROUPS: usize = 256;

/// Crate-local pool for per-level work.
///
/// The global Rayon pool panics on first use when it cannot be created (e.g. thread limits on a
/// crowded host). A local pool lets callers fall back to sequential execution instead.
#[cfg(feature = "parallel")]
static RAYON_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

#[cfg(feature = "parallel")]
fn desired_rayon_threads() -> usize {
    let from_env = std::env::var("RAYON_NUM_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0);
    from_env.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    })
}

#[cfg(feature = "parallel")]
fn build_rayon_pool() -> Option<ThreadPool> {
    let requested = desired_rayon_threads().max(1);
    let try_build = |n| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .thread_name(|i| format!("hexstore-level-{i}"))
            .build()
    };

    match try_build(requested) {
        Ok(pool) => Some(pool),
        Err(_) if requested > 1 => try_build(1).ok(),
        Err(_) => None,
    }
}

#[cfg(feature = "parallel")]
fn rayon_pool() -> Option<&'static ThreadPool> {
    RAYON_POOL.get_or_init(build_rayon_pool).as_ref()
}

/// Maps every group of one level, preserving order. Groups must be independent of each other;
/// the caller provides the barrier between levels by collecting the result.
#[cfg(feature = "parallel")]
pub(crate) fn map_level<T, R, F>(groups: Vec<T>, f: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Send + Sync,
{
    if groups.len() < PARALLEL_MIN_GROUPS {
        return groups.into_iter().map(f).collect();
    }
    match rayon_pool() {
        Some(pool) => pool.install(|| groups.into_par_iter().map(|g| f(g)).collect()),
        None => groups.into_iter().map(f).collect(),
    }
}

#[cfg(not(feature = "parallel"))]
pub(crate) fn map_level<T, R, F>(groups: Vec<T>, f: F) -> Vec<R>
where
    F: Fn(T) -> R,
{
    groups.into_iter().map(f).collect()
}
