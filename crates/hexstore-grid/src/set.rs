use crate::{CellId, GridError, Result, MAX_RESOLUTION};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Replaces every complete sibling set with its parent, recursively.
///
/// Duplicates are dropped first. The output is sorted and contains no ancestor/descendant pairs
/// as long as the input didn't.
pub fn compact_cells(cells: &[CellId]) -> Vec<CellId> {
    let mut by_res: BTreeMap<u8, HashSet<CellId>> = BTreeMap::new();
    for &cell in cells {
        by_res.entry(cell.resolution()).or_default().insert(cell);
    }

    let mut out = Vec::new();
    for res in (1..=MAX_RESOLUTION).rev() {
        let Some(level) = by_res.remove(&res) else {
            continue;
        };
        let mut groups: HashMap<CellId, usize> = HashMap::new();
        for cell in &level {
            if let Some(parent) = cell.parent() {
                *groups.entry(parent).or_default() += 1;
            }
        }
        for cell in level {
            match cell.parent() {
                Some(parent) if groups.get(&parent) == Some(&parent.child_count()) => {
                    by_res.entry(res - 1).or_default().insert(parent);
                }
                _ => out.push(cell),
            }
        }
    }
    if let Some(level) = by_res.remove(&0) {
        out.extend(level);
    }
    out.sort_unstable();
    out
}

/// Expands every cell to its descendants at `res`.
pub fn uncompact_cells(cells: &[CellId], res: u8) -> Result<Vec<CellId>> {
    if res > MAX_RESOLUTION {
        return Err(GridError::InvalidResolution(res));
    }
    let mut out = Vec::new();
    for &cell in cells {
        if cell.resolution() > res {
            return Err(GridError::InvalidResolution(res));
        }
        out.extend(cell.descendants(res));
    }
    Ok(out)
}

/// Moves every cell to `res`, taking ancestors of finer cells and descendants of coarser ones.
///
/// The output keeps first-seen order and has no duplicates.
pub fn change_resolution(cells: &[CellId], res: u8) -> Result<Vec<CellId>> {
    if res > MAX_RESOLUTION {
        return Err(GridError::InvalidResolution(res));
    }
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for &cell in cells {
        let moved = match cell.ancestor(res) {
            Some(ancestor) => vec![ancestor],
            None => cell.descendants(res),
        };
        for c in moved {
            if seen.insert(c) {
                out.push(c);
            }
        }
    }
    Ok(out)
}

/// True when no member repeats or is an ancestor of another member.
pub fn is_compacted_set(cells: &[CellId]) -> bool {
    let mut members = HashSet::with_capacity(cells.len());
    if !cells.iter().all(|&c| members.insert(c)) {
        return false;
    }
    cells
        .iter()
        .all(|c| c.ancestors().all(|a| !members.contains(&a)))
}
