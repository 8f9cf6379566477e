use crate::schema::Dialect;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// A table set as found in the warehouse, from its physical table names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSetInfo {
    pub name: String,
    /// Resolutions with a physical table, ascending.
    pub resolutions: Vec<u8>,
}

pub fn table_name(tableset: &str, res: u8) -> String {
    format!("{tableset}_{res:02}")
}

/// Splits `{tableset}_{rr}` into its parts.
pub fn parse_table_name(table: &str) -> Option<(&str, u8)> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^([a-zA-Z][a-zA-Z0-9_]*)_([0-9]{2})$").expect("valid table name regex")
    });
    let caps = pattern.captures(table)?;
    let res: u8 = caps.get(2)?.as_str().parse().ok()?;
    if res > hexstore_grid::MAX_RESOLUTION {
        return None;
    }
    Some((caps.get(1)?.as_str(), res))
}

/// Groups physical table names into table sets, sorted by name.
pub fn find_tablesets<'a>(tables: impl IntoIterator<Item = &'a str>) -> Vec<TableSetInfo> {
    let mut sets: BTreeMap<&str, Vec<u8>> = BTreeMap::new();
    for table in tables {
        if let Some((name, res)) = parse_table_name(table) {
            sets.entry(name).or_default().push(res);
        }
    }
    sets.into_iter()
        .map(|(name, mut resolutions)| {
            resolutions.sort_unstable();
            resolutions.dedup();
            TableSetInfo {
                name: name.to_string(),
                resolutions,
            }
        })
        .collect()
}

pub(crate) fn drop_statements(tableset: &str, resolutions: &[u8], dialect: Dialect) -> Vec<String> {
    resolutions
        .iter()
        .map(|&res| {
            let table = table_name(tableset, res);
            match dialect {
                Dialect::Sqlite => format!("DROP TABLE IF EXISTS {table}"),
                Dialect::ClickHouse => format!("DROP TABLE IF EXISTS {table} SYNC"),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn names_round_trip() {
        assert_eq!(table_name("water", 3), "water_03");
        assert_eq!(parse_table_name("water_03"), Some(("water", 3)));
        assert_eq!(parse_table_name("snow_depth_12"), Some(("snow_depth", 12)));
        assert_eq!(parse_table_name("water_16"), None);
        assert_eq!(parse_table_name("water_3"), None);
        assert_eq!(parse_table_name("sqlite_sequence"), None);
    }

    #[test]
    fn tables_group_into_sets() {
        let found = find_tablesets(["b_07", "a_02", "b_03", "misc", "a_02"]);
        assert_eq!(
            found,
            vec![
                TableSetInfo {
                    name: "a".to_string(),
                    resolutions: vec![2],
                },
                TableSetInfo {
                    name: "b".to_string(),
                    resolutions: vec![3, 7],
                },
            ]
        );
    }
}
