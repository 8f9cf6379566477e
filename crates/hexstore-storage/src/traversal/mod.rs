//! Windowed traversal of a table set.
//!
//! A cursor enumerates the area of interest at a coarse traversal resolution, drops cells
//! without stored rows using a cheap existence probe, then fetches one window per surviving cell
//! from the table at the fetch resolution and expands it to the target resolution.

mod area;
mod template;

pub use area::{AreaCoverer, TraversalArea};
pub use template::QueryTemplate;

use crate::config::TraversalOptions;
use crate::error::{Error, Result};
use crate::handle::QueryHandle;
use crate::schema::{TableSetDefinition, INDEX_COLUMN};
use crate::session::SessionInner;
use hexstore_columnar::{AggregationRules, ColumnTable};
use hexstore_grid::{CellId, MAX_RESOLUTION};
use log::{debug, warn};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Lifecycle of a [`WindowCursor`]. `Exhausted` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorState {
    Init,
    Planning,
    Fetching,
    Exhausted,
    Failed,
}

/// What to traverse and how to fetch it.
#[derive(Debug)]
pub struct WindowRequest {
    area: TraversalArea,
    target_resolution: u8,
    template: QueryTemplate,
    prefetch: Option<QueryTemplate>,
}

impl WindowRequest {
    /// Fetches every column at `target_resolution`, probing existence first.
    pub fn new(area: impl Into<TraversalArea>, target_resolution: u8) -> Self {
        Self {
            area: area.into(),
            target_resolution,
            template: QueryTemplate::select_all(),
            prefetch: None,
        }
    }

    pub fn with_template(mut self, template: QueryTemplate) -> Self {
        self.template = template;
        self
    }

    /// Cheaper query deciding whether a frontier batch has rows. Defaults to
    /// [`QueryTemplate::existence_probe`].
    pub fn with_prefetch(mut self, template: QueryTemplate) -> Self {
        self.prefetch = Some(template);
        self
    }
}

/// Rows fetched for one traversal cell.
#[derive(Debug)]
pub struct Window {
    pub cell: CellId,
    pub table: ColumnTable,
}

/// Coarsest declared resolution at or above `fetch` whose cells hold at most `max_cells` cells at
/// `fetch`.
fn choose_traversal_resolution(declared: &[u8], fetch: u8, max_cells: usize) -> u8 {
    declared
        .iter()
        .copied()
        .filter(|&r| r <= fetch)
        .find(|&r| 7usize.checked_pow(u32::from(fetch - r)).is_some_and(|n| n <= max_cells))
        .unwrap_or(fetch)
}

/// Ids a stored row covering part of `cell` may carry: the cell, its ancestors, and its
/// descendants down to `fetch`.
fn fetch_cells(cell: CellId, fetch: u8) -> Vec<CellId> {
    let mut cells: Vec<CellId> = cell.ancestors().collect();
    for res in cell.resolution()..=fetch {
        cells.extend(cell.descendants(res));
    }
    cells
}

/// Frontier cells of `batch` the probe result says have rows.
fn surviving(batch: &[CellId], found: &ColumnTable) -> Vec<CellId> {
    let Some(column) = found.column(INDEX_COLUMN) else {
        return if found.is_empty() {
            Vec::new()
        } else {
            batch.to_vec()
        };
    };
    let present: HashSet<u64> = column.values().filter_map(|v| v.as_u64()).collect();
    batch
        .iter()
        .copied()
        .filter(|c| {
            present.contains(&c.raw()) || c.ancestors().any(|a| present.contains(&a.raw()))
        })
        .collect()
}

/// Forward-only stream of non-empty windows.
///
/// Planning runs on first iteration (or [`WindowCursor::plan`]). Up to `concurrency` primary
/// fetches run ahead of the consumer. A cursor abandoned before exhaustion should be closed so
/// errors of in-flight fetches are not lost.
pub struct WindowCursor {
    session: Arc<SessionInner>,
    schema: Arc<TableSetDefinition>,
    rules: AggregationRules,
    area: Option<TraversalArea>,
    template: QueryTemplate,
    prefetch: QueryTemplate,
    options: TraversalOptions,
    target_resolution: u8,
    fetch_resolution: u8,
    traversal_resolution: u8,
    state: CursorState,
    planned: Option<usize>,
    frontier: VecDeque<CellId>,
    in_flight: VecDeque<(CellId, QueryHandle<ColumnTable>)>,
    closed: bool,
}

impl fmt::Debug for WindowCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowCursor")
            .field("tableset", &self.schema.name())
            .field("target_resolution", &self.target_resolution)
            .field("traversal_resolution", &self.traversal_resolution)
            .field("state", &self.state)
            .field("planned", &self.planned)
            .finish()
    }
}

impl WindowCursor {
    pub(crate) fn new(
        session: Arc<SessionInner>,
        schema: Arc<TableSetDefinition>,
        request: WindowRequest,
        options: TraversalOptions,
    ) -> Result<Self> {
        let target = request.target_resolution;
        if target > MAX_RESOLUTION {
            return Err(Error::UnsupportedResolution(target));
        }
        let fetch_resolution = schema
            .base_resolutions()
            .iter()
            .rev()
            .copied()
            .find(|&r| r <= target)
            .ok_or(Error::UnsupportedResolution(target))?;
        let traversal_resolution = choose_traversal_resolution(
            schema.base_resolutions(),
            fetch_resolution,
            options.max_cells_per_fetch,
        );
        Ok(Self {
            rules: schema.aggregation_rules(),
            session,
            schema,
            area: Some(request.area),
            template: request.template,
            prefetch: request.prefetch.unwrap_or_else(QueryTemplate::existence_probe),
            options,
            target_resolution: target,
            fetch_resolution,
            traversal_resolution,
            state: CursorState::Init,
            planned: None,
            frontier: VecDeque::new(),
            in_flight: VecDeque::new(),
            closed: false,
        })
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Number of frontier cells that survived planning; `None` before planning.
    pub fn len(&self) -> Option<usize> {
        self.planned
    }

    pub fn target_resolution(&self) -> u8 {
        self.target_resolution
    }

    /// Declared resolution whose table the windows are read from.
    pub fn fetch_resolution(&self) -> u8 {
        self.fetch_resolution
    }

    /// Resolution of the window cells.
    pub fn traversal_resolution(&self) -> u8 {
        self.traversal_resolution
    }

    /// Runs the existence probes. Returns the number of surviving frontier cells; later calls
    /// return the same count without probing again, or [`Error::PlanningFailed`] when planning
    /// did not complete.
    pub fn plan(&mut self) -> Result<usize> {
        if self.state != CursorState::Init {
            return self.planned.ok_or(Error::PlanningFailed);
        }
        self.state = CursorState::Planning;
        match self.probe_frontier() {
            Ok(cells) => {
                let planned = cells.len();
                self.planned = Some(planned);
                self.frontier = cells.into();
                self.state = CursorState::Fetching;
                self.fill();
                Ok(planned)
            }
            Err(err) => {
                self.state = CursorState::Failed;
                Err(err)
            }
        }
    }

    fn probe_frontier(&mut self) -> Result<Vec<CellId>> {
        let area = self
            .area
            .take()
            .unwrap_or(TraversalArea::Cells(Vec::new()));
        let candidates = area.cells_at(self.traversal_resolution)?;
        let table = self.schema.table_name(self.traversal_resolution);
        let timeout = self.session.config().prefetch_timeout;

        let probes: Vec<(&[CellId], QueryHandle<ColumnTable>)> = candidates
            .chunks(self.options.prefetch_batch_size.max(1))
            .map(|batch| {
                let mut seen: HashSet<CellId> = batch.iter().copied().collect();
                let mut ids = batch.to_vec();
                for cell in batch {
                    ids.extend(cell.ancestors().filter(|a| seen.insert(*a)));
                }
                let sql = self.prefetch.render(&table, &ids);
                let handle = self
                    .session
                    .dispatch("existence probe", timeout, move |w| w.query(&sql));
                (batch, handle)
            })
            .collect();

        let mut survivors = Vec::new();
        for (batch, handle) in probes {
            match handle.wait() {
                Ok(found) => survivors.extend(surviving(batch, &found)),
                Err(Error::Timeout { after, .. }) => {
                    warn!(
                        "existence probe on {table} timed out after {after:?}; keeping {} cells",
                        batch.len()
                    );
                    survivors.extend_from_slice(batch);
                }
                Err(err) => return Err(err),
            }
        }
        debug!(
            "traversal of {} at resolution {}: {} of {} cells have rows",
            self.schema.name(),
            self.traversal_resolution,
            survivors.len(),
            candidates.len()
        );
        Ok(survivors)
    }

    fn dispatch_fetch(&self, cell: CellId) -> QueryHandle<ColumnTable> {
        let sql = self.template.render(
            &self.schema.table_name(self.fetch_resolution),
            &fetch_cells(cell, self.fetch_resolution),
        );
        let rules = self.rules.clone();
        let stored = self.fetch_resolution;
        let target = self.target_resolution;
        self.session
            .dispatch("fetch", self.session.config().fetch_timeout, move |w| {
                let rows = w.query(&sql)?;
                if rows.column(INDEX_COLUMN).is_none() {
                    return Ok(rows);
                }
                Ok(rows.expand_within(INDEX_COLUMN, cell, stored, target, &rules)?)
            })
    }

    fn fill(&mut self) {
        while self.in_flight.len() < self.options.concurrency.max(1) {
            let Some(cell) = self.frontier.pop_front() else {
                break;
            };
            let handle = self.dispatch_fetch(cell);
            self.in_flight.push_back((cell, handle));
        }
    }

    /// Stops the traversal. Waits for in-flight fetches and returns the first error among them;
    /// later calls return `Ok(())`.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.frontier.clear();

        let mut first = None;
        for (cell, handle) in self.in_flight.drain(..) {
            if let Err(err) = handle.wait() {
                if first.is_none() {
                    first = Some(err);
                } else {
                    debug!("discarding later fetch error for {cell}: {err}");
                }
            }
        }
        match first {
            Some(err) => {
                self.state = CursorState::Failed;
                Err(err)
            }
            None => {
                if self.state != CursorState::Failed {
                    self.state = CursorState::Exhausted;
                }
                Ok(())
            }
        }
    }
}

impl Iterator for WindowCursor {
    type Item = Result<Window>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == CursorState::Init {
            if let Err(err) = self.plan() {
                return Some(Err(err));
            }
        }
        while self.state == CursorState::Fetching {
            let Some((cell, handle)) = self.in_flight.pop_front() else {
                self.state = CursorState::Exhausted;
                break;
            };
            self.fill();
            match handle.wait() {
                Ok(table) if table.is_empty() => continue,
                Ok(table) => return Some(Ok(Window { cell, table })),
                Err(err) => {
                    self.state = CursorState::Failed;
                    self.frontier.clear();
                    self.in_flight.clear();
                    return Some(Err(err));
                }
            }
        }
        None
    }
}

impl Drop for WindowCursor {
    fn drop(&mut self) {
        let pending = self.frontier.len() + self.in_flight.len();
        if !self.closed && pending > 0 {
            warn!(
                "window cursor over {} dropped with {pending} windows pending; call close() to observe their errors",
                self.schema.name()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexstore_grid::res0_cells;

    #[test]
    fn traversal_resolution_bounds_cells_per_fetch() {
        assert_eq!(choose_traversal_resolution(&[2, 5, 8], 8, 500), 5);
        assert_eq!(choose_traversal_resolution(&[2, 5, 8], 8, 343), 5);
        assert_eq!(choose_traversal_resolution(&[2, 5, 8], 8, 342), 8);
        assert_eq!(choose_traversal_resolution(&[2, 5, 8], 5, 10_000), 2);
        assert_eq!(choose_traversal_resolution(&[0, 15], 15, usize::MAX), 0);
    }

    #[test]
    fn fetch_cells_cover_ancestors_and_descendants() {
        let cell = res0_cells()[2].children()[3];
        let cells = fetch_cells(cell, 3);
        assert_eq!(cells.len(), 1 + 1 + 7 + 49);
        assert!(cells.contains(&res0_cells()[2]));
        assert!(cells.iter().all(|c| c.contains(cell) || cell.contains(*c)));
    }

    #[test]
    fn probe_hits_on_ancestors_count() {
        let parent = res0_cells()[2].children()[0];
        let batch = parent.children();
        let found = ColumnTable::from_rows(
            vec![hexstore_columnar::ColumnSchema::new(
                INDEX_COLUMN,
                hexstore_columnar::ColumnType::UInt64,
            )],
            vec![vec![hexstore_columnar::Value::from(parent)]],
        )
        .expect("table");
        assert_eq!(surviving(&batch, &found), batch);
        let empty = ColumnTable::from_rows(
            vec![hexstore_columnar::ColumnSchema::new(
                INDEX_COLUMN,
                hexstore_columnar::ColumnType::UInt64,
            )],
            Vec::<Vec<hexstore_columnar::Value>>::new(),
        )
        .expect("table");
        assert!(surviving(&batch, &empty).is_empty());
    }
}
