use hexstore_storage::{
    AggregationMethod, ColumnDefinition, ColumnType, CompressionHint, Dialect, Error,
    SpatialPartitioning, TableSetDefinition, TemporalPartitioning, TemporalResolution,
    TemporalUnit,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// Column shapes that are valid in multi-resolution table sets.
fn column_shape() -> impl Strategy<Value = (ColumnType, AggregationMethod, Option<CompressionHint>)>
{
    prop_oneof![
        Just((ColumnType::Float64, AggregationMethod::Sum, Some(CompressionHint::Gorilla))),
        Just((ColumnType::Float32, AggregationMethod::Avg, None)),
        (1u8..=22).prop_map(|level| (
            ColumnType::Int64,
            AggregationMethod::Max,
            Some(CompressionHint::Zstd(level))
        )),
        Just((ColumnType::UInt32, AggregationMethod::Min, Some(CompressionHint::T64))),
        Just((ColumnType::Float64, AggregationMethod::RelativeToCellArea, None)),
        Just((
            ColumnType::String,
            AggregationMethod::SetNullOnConflict,
            Some(CompressionHint::Lz4)
        )),
        Just((ColumnType::DateTime, AggregationMethod::Max, Some(CompressionHint::DoubleDelta))),
    ]
}

fn unit() -> impl Strategy<Value = TemporalUnit> {
    prop_oneof![
        Just(TemporalUnit::Day),
        Just(TemporalUnit::Week),
        Just(TemporalUnit::Month),
        Just(TemporalUnit::Year),
    ]
}

fn temporal_resolution() -> impl Strategy<Value = TemporalResolution> {
    prop_oneof![
        Just(TemporalResolution::Second),
        Just(TemporalResolution::Minute),
        Just(TemporalResolution::Hour),
        Just(TemporalResolution::Day),
        Just(TemporalResolution::Month),
        Just(TemporalResolution::Year),
    ]
}

fn spatial() -> impl Strategy<Value = SpatialPartitioning> {
    prop_oneof![
        (0u8..=15).prop_map(SpatialPartitioning::AncestorResolution),
        (0u8..=15).prop_map(SpatialPartitioning::ResolutionOffset),
    ]
}

fn definition() -> impl Strategy<Value = TableSetDefinition> {
    (
        "[a-z][a-z0-9_]{0,8}",
        prop::collection::btree_set(0u8..=15, 1..4),
        prop::collection::vec((column_shape(), any::<bool>()), 0..5),
        temporal_resolution(),
        (1u32..12, unit()),
        spatial(),
    )
        .prop_map(|(name, resolutions, columns, temporal, (count, unit), spatial)| {
            let mut builder = TableSetDefinition::builder(name)
                .add_base_resolutions(resolutions)
                .temporal_resolution(temporal)
                .temporal_partitioning(TemporalPartitioning::new(count, unit).expect("count"))
                .spatial_partitioning(spatial);
            let mut has_datetime = false;
            for (i, ((column_type, method, hint), nullable)) in columns.into_iter().enumerate() {
                if column_type == ColumnType::DateTime {
                    if has_datetime {
                        continue;
                    }
                    has_datetime = true;
                }
                let mut column = ColumnDefinition::new(format!("c{i}"), column_type)
                    .with_aggregation(method)
                    .nullable(nullable);
                if let Some(hint) = hint {
                    column = column.with_compression(hint);
                }
                builder = builder.add_column(column);
            }
            builder.build().expect("valid definition")
        })
}

proptest! {
    #[test]
    fn ddl_survives_a_json_round_trip(schema in definition()) {
        let json = schema.to_json().expect("to json");
        let back = TableSetDefinition::from_json(&json).expect("from json");
        for dialect in [Dialect::Sqlite, Dialect::ClickHouse] {
            prop_assert_eq!(schema.sql_statements(dialect), back.sql_statements(dialect));
        }
        prop_assert_eq!(back, schema);
    }
}

#[test]
fn bare_unit_means_one() {
    let bare: TemporalPartitioning = "month".parse().expect("parse");
    let explicit: TemporalPartitioning = "1 month".parse().expect("parse");
    assert_eq!(bare, explicit);
    assert_eq!(bare.to_string(), "1 month");
}

#[test]
fn bad_periods_are_value_errors() {
    for text in ["0 years", "z years", "3 fortnights", "-2 days", ""] {
        assert!(
            matches!(text.parse::<TemporalPartitioning>(), Err(Error::Value(_))),
            "{text:?} should be rejected"
        );
    }
}

#[test]
fn invalid_documents_fail_on_load() {
    let missing_method = r#"{
        "name": "pop",
        "base_resolutions": [3, 5],
        "columns": [{"name": "people", "type": "Float64"}]
    }"#;
    assert!(matches!(
        TableSetDefinition::from_json(missing_method),
        Err(Error::Schema(_))
    ));

    let bad_period = r#"{
        "name": "pop",
        "base_resolutions": [5],
        "columns": [],
        "temporal_partitioning": "0 years"
    }"#;
    assert!(matches!(
        TableSetDefinition::from_json(bad_period),
        Err(Error::Value(_))
    ));
}

#[test]
fn document_fields_are_read() {
    let json = r#"{
        "name": "landuse",
        "base_resolutions": [8, 4],
        "columns": [
            {"name": "share", "type": "Float64", "aggregation": "relative_to_cell_area"},
            {"name": "kind", "type": "String", "aggregation": "set_null_on_conflict",
             "compression": {"codec": "zstd", "level": 3}, "nullable": true}
        ],
        "temporal_resolution": "day",
        "temporal_partitioning": "2 weeks",
        "spatial_partitioning": {"resolution_offset": 2}
    }"#;
    let schema = TableSetDefinition::from_json(json).expect("load");
    assert_eq!(schema.base_resolutions(), &[4, 8]);
    assert_eq!(schema.temporal_resolution(), TemporalResolution::Day);
    assert_eq!(
        schema.temporal_partitioning(),
        TemporalPartitioning::new(2, TemporalUnit::Week).expect("period")
    );
    assert_eq!(
        schema.spatial_partitioning(),
        SpatialPartitioning::ResolutionOffset(2)
    );
    let kind = schema.column("kind").expect("kind");
    assert_eq!(kind.compression, Some(CompressionHint::Zstd(3)));
    assert!(kind.nullable);
}
