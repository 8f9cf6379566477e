//! Table set definitions.
//!
//! A table set is one logical dataset stored as one physical table per declared resolution.
//! Definitions are immutable once built and serialize to a JSON document that fully determines
//! the emitted DDL.

mod ddl;
mod temporal;

pub use ddl::Dialect;
pub use temporal::{TemporalPartitioning, TemporalResolution, TemporalUnit};

use crate::error::{Error, Result};
use hexstore_columnar::{AggregationMethod, AggregationRules, ColumnSchema, ColumnType};
use hexstore_grid::MAX_RESOLUTION;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

/// Name of the implicit cell id column of every physical table.
pub const INDEX_COLUMN: &str = "h3index";

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]*$").expect("valid identifier regex"))
}

fn check_identifier(kind: &str, name: &str) -> Result<()> {
    if identifier_pattern().is_match(name) {
        Ok(())
    } else {
        Err(Error::Schema(format!(
            "{kind} name {name:?} must start with a letter and contain only letters, digits and underscores"
        )))
    }
}

/// Physical layout of the whole table set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialPartitioning {
    /// One segment per ancestor at this resolution (clamped to the table's resolution).
    AncestorResolution(u8),
    /// One segment per ancestor this many resolutions coarser than each row's own cell.
    ResolutionOffset(u8),
}

impl Default for SpatialPartitioning {
    /// Segments by base cell.
    fn default() -> Self {
        SpatialPartitioning::AncestorResolution(0)
    }
}

/// On-disk encoding directive for one column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "codec", content = "level", rename_all = "snake_case")]
pub enum CompressionHint {
    Lz4,
    Lz4hc(u8),
    Zstd(u8),
    /// Delta encoding over values of this byte width.
    Delta(u8),
    DoubleDelta,
    Gorilla,
    T64,
}

impl CompressionHint {
    pub fn codec(&self) -> String {
        match self {
            CompressionHint::Lz4 => "LZ4".to_string(),
            CompressionHint::Lz4hc(level) => format!("LZ4HC({level})"),
            CompressionHint::Zstd(level) => format!("ZSTD({level})"),
            CompressionHint::Delta(width) => format!("Delta({width})"),
            CompressionHint::DoubleDelta => "DoubleDelta".to_string(),
            CompressionHint::Gorilla => "Gorilla".to_string(),
            CompressionHint::T64 => "T64".to_string(),
        }
    }

    fn validate(&self, column: &str, column_type: ColumnType) -> Result<()> {
        let integral = column_type.is_signed_integer()
            || column_type.is_unsigned_integer()
            || column_type.is_temporal();
        let problem = match *self {
            CompressionHint::Lz4hc(level) if !(1..=9).contains(&level) => {
                Some(format!("LZ4HC level {level} is outside 1..=9"))
            }
            CompressionHint::Zstd(level) if !(1..=22).contains(&level) => {
                Some(format!("ZSTD level {level} is outside 1..=22"))
            }
            CompressionHint::Delta(width) if ![1, 2, 4, 8].contains(&width) => {
                Some(format!("Delta width {width} must be 1, 2, 4 or 8"))
            }
            CompressionHint::Delta(_) | CompressionHint::DoubleDelta | CompressionHint::T64
                if !integral =>
            {
                Some(format!("{} needs an integer or DateTime column", self.codec()))
            }
            CompressionHint::Gorilla if !column_type.is_float() => {
                Some("Gorilla needs a float column".to_string())
            }
            _ => None,
        };
        match problem {
            Some(problem) => Err(Error::Schema(format!("column {column:?}: {problem}"))),
            None => Ok(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub aggregation: Option<AggregationMethod>,
    #[serde(default)]
    pub compression: Option<CompressionHint>,
    #[serde(default)]
    pub nullable: bool,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            aggregation: None,
            compression: None,
            nullable: false,
        }
    }

    pub fn with_aggregation(mut self, method: AggregationMethod) -> Self {
        self.aggregation = Some(method);
        self
    }

    pub fn with_compression(mut self, hint: CompressionHint) -> Self {
        self.compression = Some(hint);
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

/// Validated, immutable table set definition. Create one with [`TableSetDefinition::builder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TableSetDocument")]
pub struct TableSetDefinition {
    name: String,
    base_resolutions: Vec<u8>,
    columns: Vec<ColumnDefinition>,
    temporal_resolution: TemporalResolution,
    temporal_partitioning: TemporalPartitioning,
    spatial_partitioning: SpatialPartitioning,
}

/// Unvalidated shape of the JSON document.
#[derive(Deserialize)]
struct TableSetDocument {
    name: String,
    base_resolutions: Vec<u8>,
    columns: Vec<ColumnDefinition>,
    #[serde(default)]
    temporal_resolution: TemporalResolution,
    #[serde(default)]
    temporal_partitioning: Option<String>,
    #[serde(default)]
    spatial_partitioning: SpatialPartitioning,
}

impl TryFrom<TableSetDocument> for TableSetDefinition {
    type Error = Error;

    fn try_from(doc: TableSetDocument) -> Result<Self> {
        let temporal_partitioning = match doc.temporal_partitioning {
            Some(s) => s.parse()?,
            None => TemporalPartitioning::default(),
        };
        let mut builder = Builder::new(doc.name)
            .add_base_resolutions(doc.base_resolutions)
            .temporal_resolution(doc.temporal_resolution)
            .temporal_partitioning(temporal_partitioning)
            .spatial_partitioning(doc.spatial_partitioning);
        for column in doc.columns {
            builder = builder.add_column(column);
        }
        builder.build()
    }
}

impl TableSetDefinition {
    pub fn builder(name: impl Into<String>) -> Builder {
        Builder::new(name)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let doc: TableSetDocument = serde_json::from_str(json)?;
        doc.try_into()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared resolutions, ascending.
    pub fn base_resolutions(&self) -> &[u8] {
        &self.base_resolutions
    }

    pub fn has_resolution(&self, res: u8) -> bool {
        self.base_resolutions.binary_search(&res).is_ok()
    }

    pub fn finest_resolution(&self) -> u8 {
        self.base_resolutions.last().copied().unwrap_or(0)
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn temporal_resolution(&self) -> TemporalResolution {
        self.temporal_resolution
    }

    pub fn temporal_partitioning(&self) -> TemporalPartitioning {
        self.temporal_partitioning
    }

    pub fn spatial_partitioning(&self) -> SpatialPartitioning {
        self.spatial_partitioning
    }

    /// The `DateTime` column, if any. Temporal bucketing and partitioning apply to it.
    pub fn temporal_column(&self) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.column_type.is_temporal())
    }

    pub fn table_name(&self, res: u8) -> String {
        crate::tableset::table_name(&self.name, res)
    }

    pub fn aggregation_rules(&self) -> AggregationRules {
        self.columns
            .iter()
            .filter_map(|c| c.aggregation.map(|m| (c.name.clone(), m)))
            .collect()
    }

    /// Column layout of every physical table: the index column followed by the declared columns.
    pub fn table_layout(&self) -> Vec<ColumnSchema> {
        std::iter::once(ColumnSchema::new(INDEX_COLUMN, ColumnType::UInt64))
            .chain(
                self.columns
                    .iter()
                    .map(|c| ColumnSchema::new(c.name.clone(), c.column_type)),
            )
            .collect()
    }
}

/// Accumulates a table set definition. Problems surface as [`Error::Schema`] from
/// [`Builder::build`].
#[derive(Clone, Debug)]
pub struct Builder {
    name: String,
    base_resolutions: Vec<u8>,
    columns: Vec<ColumnDefinition>,
    temporal_resolution: TemporalResolution,
    temporal_partitioning: TemporalPartitioning,
    spatial_partitioning: SpatialPartitioning,
}

impl Builder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_resolutions: Vec::new(),
            columns: Vec::new(),
            temporal_resolution: TemporalResolution::default(),
            temporal_partitioning: TemporalPartitioning::default(),
            spatial_partitioning: SpatialPartitioning::default(),
        }
    }

    pub fn add_base_resolution(mut self, res: u8) -> Self {
        self.base_resolutions.push(res);
        self
    }

    pub fn add_base_resolutions(mut self, res: impl IntoIterator<Item = u8>) -> Self {
        self.base_resolutions.extend(res);
        self
    }

    pub fn add_column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    pub fn add_aggregated_column(
        self,
        name: impl Into<String>,
        column_type: ColumnType,
        method: AggregationMethod,
    ) -> Self {
        self.add_column(ColumnDefinition::new(name, column_type).with_aggregation(method))
    }

    pub fn temporal_resolution(mut self, resolution: TemporalResolution) -> Self {
        self.temporal_resolution = resolution;
        self
    }

    pub fn temporal_partitioning(mut self, partitioning: TemporalPartitioning) -> Self {
        self.temporal_partitioning = partitioning;
        self
    }

    pub fn spatial_partitioning(mut self, partitioning: SpatialPartitioning) -> Self {
        self.spatial_partitioning = partitioning;
        self
    }

    pub fn build(self) -> Result<TableSetDefinition> {
        check_identifier("table set", &self.name)?;

        let mut base_resolutions = self.base_resolutions;
        base_resolutions.sort_unstable();
        base_resolutions.dedup();
        if base_resolutions.is_empty() {
            return Err(Error::Schema("at least one base resolution is required".to_string()));
        }
        if let Some(&res) = base_resolutions.iter().find(|&&r| r > MAX_RESOLUTION) {
            return Err(Error::Schema(format!("resolution {res} exceeds {MAX_RESOLUTION}")));
        }

        let multi_resolution = base_resolutions.len() > 1;
        let mut seen = HashSet::new();
        for column in &self.columns {
            check_identifier("column", &column.name)?;
            if column.name == INDEX_COLUMN {
                return Err(Error::Schema(format!("column name {INDEX_COLUMN:?} is reserved")));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(Error::Schema(format!("duplicate column {:?}", column.name)));
            }
            match column.aggregation {
                Some(method) if !method.is_applicable_to(column.column_type) => {
                    return Err(Error::Schema(format!(
                        "aggregation {method} does not apply to column {:?} of type {}",
                        column.name, column.column_type
                    )));
                }
                None if multi_resolution => {
                    return Err(Error::Schema(format!(
                        "column {:?} needs an aggregation method because several resolutions are declared",
                        column.name
                    )));
                }
                _ => {}
            }
            if let Some(hint) = &column.compression {
                hint.validate(&column.name, column.column_type)?;
            }
        }

        let temporal_columns = self
            .columns
            .iter()
            .filter(|c| c.column_type.is_temporal())
            .count();
        if temporal_columns > 1 {
            return Err(Error::Schema(
                "at most one DateTime column is supported for temporal partitioning".to_string(),
            ));
        }

        match self.spatial_partitioning {
            SpatialPartitioning::AncestorResolution(r) | SpatialPartitioning::ResolutionOffset(r)
                if r > MAX_RESOLUTION =>
            {
                return Err(Error::Schema(format!(
                    "spatial partitioning resolution {r} exceeds {MAX_RESOLUTION}"
                )));
            }
            _ => {}
        }

        Ok(TableSetDefinition {
            name: self.name,
            base_resolutions,
            columns: self.columns,
            temporal_resolution: self.temporal_resolution,
            temporal_partitioning: self.temporal_partitioning,
            spatial_partitioning: self.spatial_partitioning,
        })
    }
}
