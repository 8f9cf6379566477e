use hexstore_grid::CellId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Primitive column types.
///
/// Integers are stored widened to 64 bits and range-checked on append. `DateTime` holds whole
/// seconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    UInt64,
    #[default]
    Int64,
    Float32,
    Float64,
    Bool,
    String,
    DateTime,
}

impl ColumnType {
    pub const ALL: [ColumnType; 13] = [
        ColumnType::UInt8,
        ColumnType::Int8,
        ColumnType::UInt16,
        ColumnType::Int16,
        ColumnType::UInt32,
        ColumnType::Int32,
        ColumnType::UInt64,
        ColumnType::Int64,
        ColumnType::Float32,
        ColumnType::Float64,
        ColumnType::Bool,
        ColumnType::String,
        ColumnType::DateTime,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ColumnType::UInt8 => "UInt8",
            ColumnType::Int8 => "Int8",
            ColumnType::UInt16 => "UInt16",
            ColumnType::Int16 => "Int16",
            ColumnType::UInt32 => "UInt32",
            ColumnType::Int32 => "Int32",
            ColumnType::UInt64 => "UInt64",
            ColumnType::Int64 => "Int64",
            ColumnType::Float32 => "Float32",
            ColumnType::Float64 => "Float64",
            ColumnType::Bool => "Bool",
            ColumnType::String => "String",
            ColumnType::DateTime => "DateTime",
        }
    }

    /// Case-insensitive lookup by name. `Text` is accepted for `String`.
    pub fn from_name(name: &str) -> Option<ColumnType> {
        let name = name.trim();
        if name.eq_ignore_ascii_case("text") {
            return Some(ColumnType::String);
        }
        ColumnType::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }

    pub fn is_signed_integer(self) -> bool {
        matches!(
            self,
            ColumnType::Int8 | ColumnType::Int16 | ColumnType::Int32 | ColumnType::Int64
        )
    }

    pub fn is_unsigned_integer(self) -> bool {
        matches!(
            self,
            ColumnType::UInt8 | ColumnType::UInt16 | ColumnType::UInt32 | ColumnType::UInt64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, ColumnType::Float32 | ColumnType::Float64)
    }

    pub fn is_numeric(self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer() || self.is_float()
    }

    pub fn is_temporal(self) -> bool {
        self == ColumnType::DateTime
    }

    fn signed_range(self) -> (i64, i64) {
        match self {
            ColumnType::Int8 => (i8::MIN.into(), i8::MAX.into()),
            ColumnType::Int16 => (i16::MIN.into(), i16::MAX.into()),
            ColumnType::Int32 => (i32::MIN.into(), i32::MAX.into()),
            _ => (i64::MIN, i64::MAX),
        }
    }

    fn unsigned_max(self) -> u64 {
        match self {
            ColumnType::UInt8 => u8::MAX.into(),
            ColumnType::UInt16 => u16::MAX.into(),
            ColumnType::UInt32 => u32::MAX.into(),
            _ => u64::MAX,
        }
    }

    /// Converts `value` into the canonical variant for this type, or `None` when it does not fit.
    pub fn coerce(self, value: &Value) -> Option<Value> {
        if value.is_null() {
            return Some(Value::Null);
        }
        match self {
            t if t.is_signed_integer() => {
                let (min, max) = t.signed_range();
                let v = match *value {
                    Value::Int(v) => v,
                    Value::UInt(v) => i64::try_from(v).ok()?,
                    _ => return None,
                };
                (min..=max).contains(&v).then_some(Value::Int(v))
            }
            t if t.is_unsigned_integer() => {
                let v = match *value {
                    Value::UInt(v) => v,
                    Value::Int(v) => u64::try_from(v).ok()?,
                    _ => return None,
                };
                (v <= t.unsigned_max()).then_some(Value::UInt(v))
            }
            ColumnType::Float32 => value.as_f64().map(|v| Value::Float(v as f32 as f64)),
            ColumnType::Float64 => value.as_f64().map(Value::Float),
            ColumnType::Bool => match value {
                Value::Bool(b) => Some(Value::Bool(*b)),
                _ => None,
            },
            ColumnType::String => match value {
                Value::String(s) => Some(Value::String(s.clone())),
                _ => None,
            },
            ColumnType::DateTime => match *value {
                Value::DateTime(v) | Value::Int(v) => Some(Value::DateTime(v)),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single cell value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    String(Arc<str>),
    /// Seconds since the Unix epoch, UTC.
    DateTime(i64),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Int(v) | Value::DateTime(v) => Some(v as f64),
            Value::UInt(v) => Some(v as f64),
            Value::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::UInt(v) => Some(v),
            Value::Int(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Equality where two NaNs compare equal, used when deciding whether siblings agree.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => self == other,
        }
    }

    /// Ordering between two values of the same variant. Nulls and mixed variants don't compare.
    pub fn cmp_same_kind(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) | (Value::DateTime(a), Value::DateTime(b)) => {
                Some(a.cmp(b))
            }
            (Value::UInt(a), Value::UInt(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v:?}"),
            Value::DateTime(v) => write!(f, "@{v}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(Arc::from(v))
    }
}

impl From<CellId> for Value {
    fn from(cell: CellId) -> Self {
        Value::UInt(cell.raw())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
