use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Granularity timestamps are floored to before they are stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalResolution {
    #[default]
    Second,
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TemporalUnit {
    Day,
    Week,
    Month,
    Year,
}

impl TemporalUnit {
    pub fn name(self) -> &'static str {
        match self {
            TemporalUnit::Day => "day",
            TemporalUnit::Week => "week",
            TemporalUnit::Month => "month",
            TemporalUnit::Year => "year",
        }
    }

    fn parse(s: &str) -> Option<TemporalUnit> {
        let lower = s.to_ascii_lowercase();
        let singular = lower.strip_suffix('s').unwrap_or(&lower);
        match singular {
            "day" => Some(TemporalUnit::Day),
            "week" => Some(TemporalUnit::Week),
            "month" => Some(TemporalUnit::Month),
            "year" => Some(TemporalUnit::Year),
            _ => None,
        }
    }
}

/// Period of the physical temporal partitions: `{count} {unit}`.
///
/// Parsing accepts a bare unit (count 1) and singular or plural unit names; it is the only place
/// the grammar is checked, so a value that exists is always valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TemporalPartitioning {
    count: u32,
    unit: TemporalUnit,
}

impl TemporalPartitioning {
    pub fn new(count: u32, unit: TemporalUnit) -> Result<Self> {
        if count == 0 {
            return Err(Error::Value(
                "temporal partitioning count must be positive".to_string(),
            ));
        }
        Ok(Self { count, unit })
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn unit(&self) -> TemporalUnit {
        self.unit
    }
}

impl Default for TemporalPartitioning {
    /// One partition per month.
    fn default() -> Self {
        Self {
            count: 1,
            unit: TemporalUnit::Month,
        }
    }
}

impl FromStr for TemporalPartitioning {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Value(format!("invalid temporal partitioning {s:?}"));
        let parts: Vec<&str> = s.split_whitespace().collect();
        let (count, unit) = match parts.as_slice() {
            [unit] => (1, *unit),
            [count, unit] => (count.parse::<u32>().map_err(|_| invalid())?, *unit),
            _ => return Err(invalid()),
        };
        let unit = TemporalUnit::parse(unit).ok_or_else(invalid)?;
        TemporalPartitioning::new(count, unit)
    }
}

impl fmt::Display for TemporalPartitioning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = if self.count == 1 { "" } else { "s" };
        write!(f, "{} {}{}", self.count, self.unit.name(), plural)
    }
}

impl TryFrom<String> for TemporalPartitioning {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<TemporalPartitioning> for String {
    fn from(tp: TemporalPartitioning) -> String {
        tp.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_unit_means_one() {
        let bare: TemporalPartitioning = "month".parse().unwrap();
        let explicit: TemporalPartitioning = "1 month".parse().unwrap();
        assert_eq!(bare, explicit);
        assert_eq!(bare.to_string(), "1 month");
    }

    #[test]
    fn plural_and_case_are_accepted() {
        let tp: TemporalPartitioning = " 3 Years ".parse().unwrap();
        assert_eq!(tp.count(), 3);
        assert_eq!(tp.unit(), TemporalUnit::Year);
        assert_eq!(tp.to_string(), "3 years");
    }

    #[test]
    fn bad_periods_are_value_errors() {
        for input in ["0 years", "z years", "-1 month", "2 fortnights", "", "1 2 month"] {
            let err = input.parse::<TemporalPartitioning>().unwrap_err();
            assert!(matches!(err, Error::Value(_)), "{input:?}: {err}");
        }
    }
}
