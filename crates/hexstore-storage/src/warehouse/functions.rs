use crate::partition::{temporal_bucket, unit_from_name};
use hexstore_grid::{CellId, MAX_RESOLUTION};
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

fn cell(raw: i64) -> CellId {
    CellId::from_raw_unchecked(raw as u64)
}

/// Registers the partition-key functions referenced by the generated indexes.
///
/// They are deterministic so SQLite accepts them in index expressions; every connection that
/// touches a table set must have them.
pub(crate) fn register(conn: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8
        | FunctionFlags::SQLITE_DETERMINISTIC
        | FunctionFlags::SQLITE_INNOCUOUS;

    conn.create_scalar_function("h3_parent", 2, flags, |ctx| {
        let raw: Option<i64> = ctx.get(0)?;
        let res: i64 = ctx.get(1)?;
        let res = res.clamp(0, i64::from(MAX_RESOLUTION)) as u8;
        Ok(raw.map(|raw| {
            let cell = cell(raw);
            cell.ancestor(res).unwrap_or(cell).raw() as i64
        }))
    })?;

    conn.create_scalar_function("h3_resolution", 1, flags, |ctx| {
        let raw: Option<i64> = ctx.get(0)?;
        Ok(raw.map(|raw| i64::from(cell(raw).resolution())))
    })?;

    conn.create_scalar_function("temporal_bucket", 3, flags, |ctx| {
        let secs: Option<i64> = ctx.get(0)?;
        let unit: String = ctx.get(1)?;
        let count: i64 = ctx.get(2)?;
        let Some(secs) = secs else {
            return Ok(None);
        };
        let unit = unit_from_name(&unit).ok_or_else(|| {
            rusqlite::Error::UserFunctionError(format!("unknown temporal unit {unit:?}").into())
        })?;
        temporal_bucket(secs, unit, count)
            .map(Some)
            .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))
    })?;

    Ok(())
}
