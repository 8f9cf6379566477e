use super::{ColumnDefinition, SpatialPartitioning, TableSetDefinition, TemporalUnit, INDEX_COLUMN};
use hexstore_columnar::ColumnType;

/// SQL flavour of the backing warehouse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Embedded reference warehouse. Partition keys become expression indexes over the
    /// functions registered by the SQLite warehouse.
    #[default]
    Sqlite,
    ClickHouse,
}

impl Dialect {
    fn type_name(self, column_type: ColumnType) -> &'static str {
        match (self, column_type) {
            (Dialect::Sqlite, ColumnType::String) => "Text",
            _ => column_type.name(),
        }
    }

    fn column_sql(self, column: &ColumnDefinition) -> String {
        let type_name = self.type_name(column.column_type);
        let codec = column.compression.map(|c| c.codec());
        match self {
            Dialect::Sqlite => {
                let mut sql = format!("{} {}", column.name, type_name);
                if !column.nullable {
                    sql.push_str(" NOT NULL");
                }
                if let Some(codec) = codec {
                    sql.push_str(&format!(" /* CODEC({codec}) */"));
                }
                sql
            }
            Dialect::ClickHouse => {
                let mut sql = if column.nullable {
                    format!("{} Nullable({})", column.name, type_name)
                } else {
                    format!("{} {}", column.name, type_name)
                };
                if let Some(codec) = codec {
                    sql.push_str(&format!(" CODEC({codec})"));
                }
                sql
            }
        }
    }
}

fn spatial_key(dialect: Dialect, partitioning: SpatialPartitioning, table_res: u8) -> String {
    match (dialect, partitioning) {
        (Dialect::Sqlite, SpatialPartitioning::AncestorResolution(r)) => {
            format!("h3_parent({INDEX_COLUMN}, {})", r.min(table_res))
        }
        (Dialect::Sqlite, SpatialPartitioning::ResolutionOffset(n)) => {
            format!("h3_parent({INDEX_COLUMN}, max(h3_resolution({INDEX_COLUMN}) - {n}, 0))")
        }
        (Dialect::ClickHouse, SpatialPartitioning::AncestorResolution(r)) => {
            format!("h3ToParent({INDEX_COLUMN}, {})", r.min(table_res))
        }
        (Dialect::ClickHouse, SpatialPartitioning::ResolutionOffset(n)) => format!(
            "h3ToParent({INDEX_COLUMN}, greatest(h3GetResolution({INDEX_COLUMN}) - {n}, 0))"
        ),
    }
}

fn temporal_key(dialect: Dialect, schema: &TableSetDefinition) -> Option<String> {
    let column = &schema.temporal_column()?.name;
    let tp = schema.temporal_partitioning();
    let count = tp.count();
    Some(match dialect {
        Dialect::Sqlite => format!("temporal_bucket({column}, '{}', {count})", tp.unit().name()),
        Dialect::ClickHouse => {
            let unit_expr = match tp.unit() {
                TemporalUnit::Day => format!("intDiv(toUnixTimestamp({column}), 86400)"),
                TemporalUnit::Week => format!("intDiv(toUnixTimestamp({column}), 604800)"),
                TemporalUnit::Month => {
                    format!("(toYear({column}) - 1970) * 12 + toMonth({column}) - 1")
                }
                TemporalUnit::Year => format!("toYear({column})"),
            };
            format!("intDiv({unit_expr}, {count})")
        }
    })
}

impl TableSetDefinition {
    /// DDL creating every physical table, ascending by resolution, each followed by its
    /// secondary structures.
    pub fn sql_statements(&self, dialect: Dialect) -> Vec<String> {
        let mut statements = Vec::new();
        for &res in self.base_resolutions() {
            let table = self.table_name(res);
            let mut columns = vec![match dialect {
                Dialect::Sqlite => format!("{INDEX_COLUMN} UInt64 NOT NULL"),
                Dialect::ClickHouse => format!("{INDEX_COLUMN} UInt64"),
            }];
            columns.extend(self.columns().iter().map(|c| dialect.column_sql(c)));
            let body = columns.join(",\n    ");
            let spatial = spatial_key(dialect, self.spatial_partitioning(), res);
            let temporal = temporal_key(dialect, self);

            match dialect {
                Dialect::Sqlite => {
                    statements.push(format!("CREATE TABLE IF NOT EXISTS {table} (\n    {body}\n)"));
                    statements.push(format!(
                        "CREATE INDEX IF NOT EXISTS {table}_{INDEX_COLUMN} ON {table} ({INDEX_COLUMN})"
                    ));
                    statements.push(format!(
                        "CREATE INDEX IF NOT EXISTS {table}_spatial ON {table} ({spatial})"
                    ));
                    if let Some(temporal) = temporal {
                        statements.push(format!(
                            "CREATE INDEX IF NOT EXISTS {table}_temporal ON {table} ({temporal})"
                        ));
                    }
                }
                Dialect::ClickHouse => {
                    let partition = match temporal {
                        Some(temporal) => format!("({spatial}, {temporal})"),
                        None => format!("({spatial})"),
                    };
                    statements.push(format!(
                        "CREATE TABLE IF NOT EXISTS {table} (\n    {body}\n) ENGINE = ReplacingMergeTree() PARTITION BY {partition} ORDER BY ({INDEX_COLUMN})"
                    ));
                }
            }
        }
        statements
    }

    pub fn drop_statements(&self, dialect: Dialect) -> Vec<String> {
        crate::tableset::drop_statements(&self.name, self.base_resolutions(), dialect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CompressionHint, TemporalPartitioning};
    use hexstore_columnar::AggregationMethod;

    fn schema() -> TableSetDefinition {
        TableSetDefinition::builder("traffic")
            .add_base_resolutions([8, 4])
            .add_column(
                ColumnDefinition::new("vehicles", ColumnType::UInt64)
                    .with_aggregation(AggregationMethod::Sum)
                    .with_compression(CompressionHint::T64),
            )
            .add_column(
                ColumnDefinition::new("observed", ColumnType::DateTime)
                    .with_aggregation(AggregationMethod::Max)
                    .with_compression(CompressionHint::DoubleDelta),
            )
            .add_column(
                ColumnDefinition::new("road", ColumnType::String)
                    .with_aggregation(AggregationMethod::SetNullOnConflict)
                    .nullable(true),
            )
            .temporal_partitioning("2 months".parse::<TemporalPartitioning>().unwrap())
            .spatial_partitioning(SpatialPartitioning::ResolutionOffset(3))
            .build()
            .expect("build")
    }

    #[test]
    fn sqlite_statements_per_resolution_ascending() {
        let statements = schema().sql_statements(Dialect::Sqlite);
        assert_eq!(statements.len(), 8);
        assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS traffic_04 ("));
        assert!(statements[4].starts_with("CREATE TABLE IF NOT EXISTS traffic_08 ("));
        assert!(statements[0].contains("vehicles UInt64 NOT NULL /* CODEC(T64) */"));
        assert!(statements[0].contains("road Text,") || statements[0].contains("road Text\n"));
        assert_eq!(
            statements[3],
            "CREATE INDEX IF NOT EXISTS traffic_04_temporal ON traffic_04 (temporal_bucket(observed, 'month', 2))"
        );
    }

    #[test]
    fn clickhouse_statement_carries_engine_and_codecs() {
        let statements = schema().sql_statements(Dialect::ClickHouse);
        assert_eq!(statements.len(), 2);
        let create = &statements[1];
        assert!(create.contains("observed DateTime CODEC(DoubleDelta)"));
        assert!(create.contains("road Nullable(String)"));
        assert!(create.ends_with(
            "PARTITION BY (h3ToParent(h3index, greatest(h3GetResolution(h3index) - 3, 0)), intDiv((toYear(observed) - 1970) * 12 + toMonth(observed) - 1, 2)) ORDER BY (h3index)"
        ));
    }

    #[test]
    fn ancestor_partitioning_is_clamped_to_table_resolution() {
        let schema = TableSetDefinition::builder("t")
            .add_base_resolutions([2, 6])
            .add_aggregated_column("v", ColumnType::Float64, AggregationMethod::Sum)
            .spatial_partitioning(SpatialPartitioning::AncestorResolution(4))
            .build()
            .expect("build");
        let statements = schema.sql_statements(Dialect::Sqlite);
        assert!(statements[2].ends_with("(h3_parent(h3index, 2))"));
        assert!(statements[5].ends_with("(h3_parent(h3index, 4))"));
    }
}
