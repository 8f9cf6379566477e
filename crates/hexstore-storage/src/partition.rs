//! Partition keys, computed the same way client-side and inside the warehouse.
//!
//! Day and week buckets count from the Unix epoch, month buckets count months since
//! January 1970 and year buckets use the calendar year.

use crate::error::{Error, Result};
use crate::schema::{SpatialPartitioning, TemporalPartitioning, TemporalResolution, TemporalUnit};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use hexstore_grid::CellId;

const SECONDS_PER_DAY: i64 = 86_400;

fn datetime(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| Error::Value(format!("timestamp {secs} is out of range")))
}

fn start_of(year: i32, month: u32) -> Result<i64> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
        .ok_or_else(|| Error::Value(format!("no such month {year}-{month}")))
}

/// The ancestor a row is grouped under for physical segmentation.
pub fn spatial_partition_key(cell: CellId, partitioning: SpatialPartitioning) -> CellId {
    let res = cell.resolution();
    let target = match partitioning {
        SpatialPartitioning::AncestorResolution(r) => r.min(res),
        SpatialPartitioning::ResolutionOffset(n) => res.saturating_sub(n),
    };
    cell.ancestor(target).unwrap_or(cell)
}

/// Index of the temporal partition holding `secs`.
pub fn temporal_partition_key(secs: i64, partitioning: TemporalPartitioning) -> Result<i64> {
    temporal_bucket(secs, partitioning.unit(), i64::from(partitioning.count()))
}

pub(crate) fn temporal_bucket(secs: i64, unit: TemporalUnit, count: i64) -> Result<i64> {
    if count <= 0 {
        return Err(Error::Value(format!("bucket count {count} must be positive")));
    }
    let units = match unit {
        TemporalUnit::Day => secs.div_euclid(SECONDS_PER_DAY),
        TemporalUnit::Week => secs.div_euclid(SECONDS_PER_DAY * 7),
        TemporalUnit::Month => {
            let dt = datetime(secs)?;
            i64::from(dt.year() - 1970) * 12 + i64::from(dt.month0())
        }
        TemporalUnit::Year => i64::from(datetime(secs)?.year()),
    };
    Ok(units.div_euclid(count))
}

/// Floors `secs` to the start of its `resolution` interval.
pub fn floor_timestamp(secs: i64, resolution: TemporalResolution) -> Result<i64> {
    let step = match resolution {
        TemporalResolution::Second => return Ok(secs),
        TemporalResolution::Minute => 60,
        TemporalResolution::Hour => 3_600,
        TemporalResolution::Day => SECONDS_PER_DAY,
        TemporalResolution::Month => {
            let dt = datetime(secs)?;
            return start_of(dt.year(), dt.month());
        }
        TemporalResolution::Year => return start_of(datetime(secs)?.year(), 1),
    };
    Ok(secs - secs.rem_euclid(step))
}

pub(crate) fn unit_from_name(name: &str) -> Option<TemporalUnit> {
    [
        TemporalUnit::Day,
        TemporalUnit::Week,
        TemporalUnit::Month,
        TemporalUnit::Year,
    ]
    .into_iter()
    .find(|u| u.name() == name)
}
