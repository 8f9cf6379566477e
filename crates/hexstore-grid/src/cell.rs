use crate::{GridError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Finest resolution of the grid.
pub const MAX_RESOLUTION: u8 = 15;

/// Number of resolution 0 cells.
pub const BASE_CELL_COUNT: u8 = 122;

/// Base cells whose center cell is a pentagon at every resolution.
pub const PENTAGON_BASE_CELLS: [u8; 12] = [4, 14, 24, 38, 49, 58, 63, 72, 83, 97, 107, 117];

const MODE_CELL: u64 = 1;
const MODE_OFFSET: u32 = 59;
const RESERVED_OFFSET: u32 = 56;
const RES_OFFSET: u32 = 52;
const BASE_CELL_OFFSET: u32 = 45;
const DIGIT_BITS: u32 = 3;
const DIGIT_MASK: u64 = 0b111;
const UNUSED_DIGIT: u64 = 7;
const ALL_DIGITS_UNUSED: u64 = (1u64 << 45) - 1;

/// The digit deleted from pentagon child sets.
const K_AXIS_DIGIT: u64 = 1;

/// A validated grid cell identifier.
///
/// Ordering follows the raw integer, which groups cells by base cell first and keeps siblings
/// adjacent within one resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct CellId(u64);

fn digit_offset(res: u8) -> u32 {
    (u32::from(MAX_RESOLUTION) - u32::from(res)) * DIGIT_BITS
}

fn is_pentagon_base_cell(base_cell: u8) -> bool {
    PENTAGON_BASE_CELLS.binary_search(&base_cell).is_ok()
}

impl CellId {
    /// Validates `raw` and wraps it.
    pub fn new(raw: u64) -> Result<Self> {
        if Self::is_valid_raw(raw) {
            Ok(Self(raw))
        } else {
            Err(GridError::InvalidCellId(raw))
        }
    }

    /// Wraps `raw` without validation.
    ///
    /// Accessors on an invalid value return garbage but never panic.
    pub fn from_raw_unchecked(raw: u64) -> Self {
        Self(raw)
    }

    /// Builds a cell from its base cell and digit path (one digit per resolution).
    pub fn from_digits(base_cell: u8, digits: &[u8]) -> Result<Self> {
        if digits.len() > usize::from(MAX_RESOLUTION) {
            return Err(GridError::InvalidResolution(digits.len() as u8));
        }
        let res = digits.len() as u8;
        let mut raw = (MODE_CELL << MODE_OFFSET)
            | (u64::from(res) << RES_OFFSET)
            | ((u64::from(base_cell) & 0x7f) << BASE_CELL_OFFSET)
            | ALL_DIGITS_UNUSED;
        for (i, &d) in digits.iter().enumerate() {
            raw = set_digit(raw, i as u8 + 1, u64::from(d) & DIGIT_MASK);
        }
        if base_cell >= BASE_CELL_COUNT || digits.iter().any(|&d| d > 6) {
            return Err(GridError::InvalidCellId(raw));
        }
        Self::new(raw)
    }

    pub fn is_valid_raw(raw: u64) -> bool {
        if raw >> 63 != 0 {
            return false;
        }
        if (raw >> MODE_OFFSET) & 0xf != MODE_CELL {
            return false;
        }
        if (raw >> RESERVED_OFFSET) & 0x7 != 0 {
            return false;
        }
        let res = ((raw >> RES_OFFSET) & 0xf) as u8;
        let base_cell = ((raw >> BASE_CELL_OFFSET) & 0x7f) as u8;
        if base_cell >= BASE_CELL_COUNT {
            return false;
        }

        let pentagon_base = is_pentagon_base_cell(base_cell);
        let mut leading_zeros = true;
        for r in 1..=MAX_RESOLUTION {
            let digit = (raw >> digit_offset(r)) & DIGIT_MASK;
            if r <= res {
                if digit == UNUSED_DIGIT {
                    return false;
                }
                if pentagon_base && leading_zeros && digit != 0 {
                    if digit == K_AXIS_DIGIT {
                        return false;
                    }
                    leading_zeros = false;
                }
            } else if digit != UNUSED_DIGIT {
                return false;
            }
        }
        true
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn resolution(self) -> u8 {
        ((self.0 >> RES_OFFSET) & 0xf) as u8
    }

    pub fn base_cell(self) -> u8 {
        ((self.0 >> BASE_CELL_OFFSET) & 0x7f) as u8
    }

    /// Digit at resolution `res` (1-based), if the cell is at least that fine.
    pub fn digit(self, res: u8) -> Option<u8> {
        if res == 0 || res > self.resolution() {
            return None;
        }
        Some(((self.0 >> digit_offset(res)) & DIGIT_MASK) as u8)
    }

    pub fn is_pentagon(self) -> bool {
        is_pentagon_base_cell(self.base_cell())
            && (1..=self.resolution()).all(|r| self.digit(r) == Some(0))
    }

    pub fn parent(self) -> Option<CellId> {
        let res = self.resolution();
        if res == 0 {
            return None;
        }
        self.ancestor(res - 1)
    }

    /// Ancestor at `res`, or the cell itself when `res` equals its resolution.
    pub fn ancestor(self, res: u8) -> Option<CellId> {
        let own = self.resolution();
        if res > own {
            return None;
        }
        let mut raw = set_resolution(self.0, res);
        for r in (res + 1)..=own {
            raw = set_digit(raw, r, UNUSED_DIGIT);
        }
        Some(CellId(raw))
    }

    /// All strict ancestors, nearest first.
    pub fn ancestors(self) -> impl Iterator<Item = CellId> {
        (0..self.resolution())
            .rev()
            .filter_map(move |res| self.ancestor(res))
    }

    pub fn child_count(self) -> usize {
        match self.resolution() {
            MAX_RESOLUTION => 0,
            _ if self.is_pentagon() => 6,
            _ => 7,
        }
    }

    /// Children at the next resolution. Pentagons skip the deleted K-axis digit.
    pub fn children(self) -> Vec<CellId> {
        let res = self.resolution();
        if res == MAX_RESOLUTION {
            return Vec::new();
        }
        let pentagon = self.is_pentagon();
        let base = set_resolution(self.0, res + 1);
        (0..7u64)
            .filter(|&d| !(pentagon && d == K_AXIS_DIGIT))
            .map(|d| CellId(set_digit(base, res + 1, d)))
            .collect()
    }

    /// Descendants at `res`; the cell itself when `res` is its own resolution.
    pub fn descendants(self, res: u8) -> Vec<CellId> {
        let own = self.resolution();
        if res < own || res > MAX_RESOLUTION {
            return Vec::new();
        }
        let mut level = vec![self];
        for _ in own..res {
            level = level.into_iter().flat_map(CellId::children).collect();
        }
        level
    }

    /// Number of descendants at `res` without materializing them.
    pub fn descendant_count(self, res: u8) -> usize {
        let own = self.resolution();
        if res < own || res > MAX_RESOLUTION {
            return 0;
        }
        let steps = u32::from(res - own);
        if !self.is_pentagon() {
            return 7usize.pow(steps);
        }
        // One pentagon per level, every other descendant is a hexagon.
        let mut hexagons = 0usize;
        for _ in 0..steps {
            hexagons = hexagons * 7 + 5;
        }
        hexagons + 1
    }

    pub fn is_ancestor_of(self, other: CellId) -> bool {
        other.resolution() > self.resolution() && other.ancestor(self.resolution()) == Some(self)
    }

    /// True when `other` is this cell or one of its descendants.
    pub fn contains(self, other: CellId) -> bool {
        self == other || self.is_ancestor_of(other)
    }
}

fn set_resolution(raw: u64, res: u8) -> u64 {
    (raw & !(0xf << RES_OFFSET)) | (u64::from(res) << RES_OFFSET)
}

fn set_digit(raw: u64, res: u8, digit: u64) -> u64 {
    let offset = digit_offset(res);
    (raw & !(DIGIT_MASK << offset)) | (digit << offset)
}

/// All 122 resolution 0 cells in base cell order.
pub fn res0_cells() -> Vec<CellId> {
    (0..BASE_CELL_COUNT)
        .map(|bc| {
            CellId(
                (MODE_CELL << MODE_OFFSET)
                    | (u64::from(bc) << BASE_CELL_OFFSET)
                    | ALL_DIGITS_UNUSED,
            )
        })
        .collect()
}

impl TryFrom<u64> for CellId {
    type Error = GridError;

    fn try_from(raw: u64) -> Result<Self> {
        CellId::new(raw)
    }
}

impl From<CellId> for u64 {
    fn from(cell: CellId) -> u64 {
        cell.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl FromStr for CellId {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let raw = u64::from_str_radix(digits, 16)
            .map_err(|_| GridError::ParseCellId(s.to_string()))?;
        CellId::new(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE_CELL_0: u64 = 0x0800_1fff_ffff_ffff;

    #[test]
    fn res0_layout_matches_index_format() {
        let cells = res0_cells();
        assert_eq!(cells.len(), 122);
        assert_eq!(cells[0].raw(), BASE_CELL_0);
        assert!(cells.iter().all(|c| CellId::is_valid_raw(c.raw())));
        assert_eq!(cells.iter().filter(|c| c.is_pentagon()).count(), 12);
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(CellId::new(0).is_err());
        assert!(CellId::new(u64::MAX).is_err());
        // Resolution 1 with the digit left unused.
        assert!(CellId::new(set_resolution(BASE_CELL_0, 1)).is_err());
        // Base cell 122 does not exist.
        assert!(CellId::new(BASE_CELL_0 | (122 << BASE_CELL_OFFSET)).is_err());
    }

    #[test]
    fn pentagon_rejects_k_axis_digit() {
        assert!(CellId::from_digits(4, &[1]).is_err());
        assert!(CellId::from_digits(4, &[0, 1]).is_err());
        assert!(CellId::from_digits(4, &[2, 1]).is_ok());
        assert!(CellId::from_digits(5, &[1]).is_ok());
    }

    #[test]
    fn children_point_back_to_parent() {
        let hex = CellId::from_digits(5, &[3, 2]).unwrap();
        let pent = CellId::from_digits(14, &[0, 0]).unwrap();
        assert!(pent.is_pentagon());

        for (cell, expected) in [(hex, 7), (pent, 6)] {
            let children = cell.children();
            assert_eq!(children.len(), expected);
            assert_eq!(cell.child_count(), expected);
            for child in children {
                assert_eq!(child.parent(), Some(cell));
                assert!(CellId::is_valid_raw(child.raw()));
            }
        }
    }

    #[test]
    fn descendant_count_matches_enumeration() {
        let pent = res0_cells()[4];
        for res in 0..=4 {
            assert_eq!(pent.descendant_count(res), pent.descendants(res).len());
        }
        let hex = res0_cells()[0];
        assert_eq!(hex.descendant_count(3), 343);
    }

    #[test]
    fn ancestors_are_nearest_first() {
        let cell = CellId::from_digits(20, &[1, 2, 3]).unwrap();
        let res: Vec<u8> = cell.ancestors().map(CellId::resolution).collect();
        assert_eq!(res, vec![2, 1, 0]);
        assert!(cell.ancestors().all(|a| a.is_ancestor_of(cell)));
        assert!(!cell.is_ancestor_of(cell));
        assert!(cell.contains(cell));
    }

    #[test]
    fn display_and_parse_agree() {
        let cell = CellId::from_digits(33, &[6, 5, 4, 3]).unwrap();
        let text = cell.to_string();
        assert_eq!(text.parse::<CellId>().unwrap(), cell);
        assert_eq!(format!("0x{text}").parse::<CellId>().unwrap(), cell);
        assert!(matches!("zz".parse::<CellId>(), Err(GridError::ParseCellId(_))));
    }
}
