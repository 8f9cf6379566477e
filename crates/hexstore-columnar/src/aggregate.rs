//! Per-column aggregation methods and their strategy table.
//!
//! Every method maps to one [`Strategy`]; the table is indexed by the method's discriminant and
//! each function matches on the value variant it receives. Columns without a method use
//! [`NO_METHOD`].

use crate::types::{ColumnType, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    Sum,
    Min,
    Max,
    Avg,
    /// The value is a fraction of the row's own cell area.
    RelativeToCellArea,
    /// Keeps a value shared by all children and null otherwise.
    SetNullOnConflict,
}

impl AggregationMethod {
    pub const ALL: [AggregationMethod; 6] = [
        AggregationMethod::Sum,
        AggregationMethod::Min,
        AggregationMethod::Max,
        AggregationMethod::Avg,
        AggregationMethod::RelativeToCellArea,
        AggregationMethod::SetNullOnConflict,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AggregationMethod::Sum => "sum",
            AggregationMethod::Min => "min",
            AggregationMethod::Max => "max",
            AggregationMethod::Avg => "avg",
            AggregationMethod::RelativeToCellArea => "relative_to_cell_area",
            AggregationMethod::SetNullOnConflict => "set_null_on_conflict",
        }
    }

    /// Sums need 64-bit integers or floats: rolled-up totals outgrow narrower integer types.
    pub fn is_applicable_to(self, column_type: ColumnType) -> bool {
        match self {
            AggregationMethod::Sum => {
                column_type.is_float()
                    || matches!(column_type, ColumnType::Int64 | ColumnType::UInt64)
            }
            AggregationMethod::Avg | AggregationMethod::RelativeToCellArea => {
                column_type.is_numeric()
            }
            AggregationMethod::Min | AggregationMethod::Max => {
                column_type.is_numeric() || column_type.is_temporal()
            }
            AggregationMethod::SetNullOnConflict => true,
        }
    }

    pub(crate) fn strategy(self) -> &'static Strategy {
        &STRATEGIES[self as usize]
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How one level of the pyramid relates to the next.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LevelContext {
    /// Child count of the parent being produced.
    pub factor: usize,
    /// Average child area over average parent area.
    pub area_ratio: f64,
}

pub(crate) struct Strategy {
    /// Combines the children present under one parent.
    pub rollup: fn(&[&Value], LevelContext) -> Value,
    /// Representative for a complete sibling set, or `None` when the set must stay expanded.
    pub compact: fn(&[&Value]) -> Option<Value>,
    /// Re-expresses a per-child value of a compacted row as a per-parent value.
    pub lift: fn(&Value, LevelContext) -> Value,
    /// Value of descendant `position` when a cell's value is spread over `n` descendants.
    pub expand: fn(&Value, usize, usize) -> Value,
}

static STRATEGIES: [Strategy; 6] = [
    // Sum
    Strategy {
        rollup: sum,
        compact: all_equal,
        lift: scale_by_factor,
        expand: divide_evenly,
    },
    // Min
    Strategy {
        rollup: min,
        compact: all_equal,
        lift: keep,
        expand: copy,
    },
    // Max
    Strategy {
        rollup: max,
        compact: all_equal,
        lift: keep,
        expand: copy,
    },
    // Avg
    Strategy {
        rollup: avg,
        compact: all_equal,
        lift: keep,
        expand: copy,
    },
    // RelativeToCellArea
    Strategy {
        rollup: area_weighted,
        compact: all_equal,
        lift: area_weighted_lift,
        expand: copy,
    },
    // SetNullOnConflict
    Strategy {
        rollup: null_on_conflict,
        compact: null_on_conflict_compact,
        lift: keep,
        expand: copy,
    },
];

pub(crate) static NO_METHOD: Strategy = Strategy {
    rollup: null_on_conflict,
    compact: all_equal,
    lift: keep,
    expand: copy,
};

fn non_null<'a>(values: &'a [&'a Value]) -> impl Iterator<Item = &'a Value> + 'a {
    values.iter().copied().filter(|v| !v.is_null())
}

fn round_to_i64(v: f64) -> i64 {
    v.round() as i64
}

fn round_to_u64(v: f64) -> u64 {
    v.round().max(0.0) as u64
}

/// Rebuilds a float result in the variant of `like`.
fn same_kind(like: &Value, v: f64) -> Value {
    match like {
        Value::Int(_) => Value::Int(round_to_i64(v)),
        Value::UInt(_) => Value::UInt(round_to_u64(v)),
        Value::DateTime(_) => Value::DateTime(round_to_i64(v)),
        _ => Value::Float(v),
    }
}

fn sum(values: &[&Value], _: LevelContext) -> Value {
    let mut acc: Option<Value> = None;
    for v in non_null(values) {
        acc = Some(match (acc, v) {
            (None, v) => v.clone(),
            (Some(Value::Int(a)), Value::Int(b)) => Value::Int(a.saturating_add(*b)),
            (Some(Value::UInt(a)), Value::UInt(b)) => Value::UInt(a.saturating_add(*b)),
            (Some(a), b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Value::Float(x + y),
                _ => a,
            },
        });
    }
    acc.unwrap_or(Value::Null)
}

fn extreme(values: &[&Value], wanted: Ordering) -> Value {
    let mut best: Option<&Value> = None;
    for v in non_null(values) {
        match best {
            Some(b) if v.cmp_same_kind(b) != Some(wanted) => {}
            _ => best = Some(v),
        }
    }
    best.cloned().unwrap_or(Value::Null)
}

fn min(values: &[&Value], _: LevelContext) -> Value {
    extreme(values, Ordering::Less)
}

fn max(values: &[&Value], _: LevelContext) -> Value {
    extreme(values, Ordering::Greater)
}

fn avg(values: &[&Value], _: LevelContext) -> Value {
    let mut first: Option<&Value> = None;
    let mut total = 0.0;
    let mut n = 0usize;
    for v in non_null(values) {
        if let Some(x) = v.as_f64() {
            first.get_or_insert(v);
            total += x;
            n += 1;
        }
    }
    match first {
        Some(like) => same_kind(like, total / n as f64),
        None => Value::Null,
    }
}

fn area_weighted(values: &[&Value], ctx: LevelContext) -> Value {
    let mut first: Option<&Value> = None;
    let mut total = 0.0;
    for v in non_null(values) {
        if let Some(x) = v.as_f64() {
            first.get_or_insert(v);
            total += x * ctx.area_ratio;
        }
    }
    match first {
        Some(like) => same_kind(like, total),
        None => Value::Null,
    }
}

fn null_on_conflict(values: &[&Value], _: LevelContext) -> Value {
    match values.split_first() {
        Some((first, rest)) if rest.iter().all(|v| v.same_as(first)) => (*first).clone(),
        _ => Value::Null,
    }
}

fn all_equal(values: &[&Value]) -> Option<Value> {
    let (first, rest) = values.split_first()?;
    rest.iter()
        .all(|v| v.same_as(first))
        .then(|| (*first).clone())
}

fn null_on_conflict_compact(values: &[&Value]) -> Option<Value> {
    Some(null_on_conflict(
        values,
        LevelContext {
            factor: values.len(),
            area_ratio: 1.0,
        },
    ))
}

fn scale_by_factor(value: &Value, ctx: LevelContext) -> Value {
    match *value {
        Value::Int(v) => Value::Int(v.saturating_mul(ctx.factor as i64)),
        Value::UInt(v) => Value::UInt(v.saturating_mul(ctx.factor as u64)),
        Value::Float(v) => Value::Float(v * ctx.factor as f64),
        _ => value.clone(),
    }
}

fn area_weighted_lift(value: &Value, ctx: LevelContext) -> Value {
    match value.as_f64() {
        Some(v) => same_kind(value, v * ctx.factor as f64 * ctx.area_ratio),
        None => value.clone(),
    }
}

fn keep(value: &Value, _: LevelContext) -> Value {
    value.clone()
}

/// Integer remainders go to the first descendants so the shares add up to `value`.
fn divide_evenly(value: &Value, n: usize, position: usize) -> Value {
    if n <= 1 {
        return value.clone();
    }
    match *value {
        Value::Int(v) => {
            let n = n as i64;
            let extra = i64::from((position as i64) < v.rem_euclid(n));
            Value::Int(v.div_euclid(n) + extra)
        }
        Value::UInt(v) => {
            let n = n as u64;
            let extra = u64::from((position as u64) < v % n);
            Value::UInt(v / n + extra)
        }
        Value::Float(v) => Value::Float(v / n as f64),
        _ => value.clone(),
    }
}

fn copy(value: &Value, _: usize, _: usize) -> Value {
    value.clone()
}

/// Aggregation method per column name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AggregationRules {
    methods: BTreeMap<String, AggregationMethod>,
}

impl AggregationRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, method: AggregationMethod) -> Self {
        self.insert(column, method);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, method: AggregationMethod) {
        self.methods.insert(column.into(), method);
    }

    pub fn method(&self, column: &str) -> Option<AggregationMethod> {
        self.methods.get(column).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, AggregationMethod)> {
        self.methods.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub(crate) fn strategy(&self, column: &str) -> &'static Strategy {
        self.method(column)
            .map(AggregationMethod::strategy)
            .unwrap_or(&NO_METHOD)
    }
}

impl<S: Into<String>> FromIterator<(S, AggregationMethod)> for AggregationRules {
    fn from_iter<I: IntoIterator<Item = (S, AggregationMethod)>>(iter: I) -> Self {
        let mut rules = AggregationRules::new();
        for (column, method) in iter {
            rules.insert(column, method);
        }
        rules
    }
}
