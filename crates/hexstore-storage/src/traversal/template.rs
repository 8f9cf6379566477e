use crate::error::{Error, Result};
use crate::schema::INDEX_COLUMN;
use hexstore_grid::CellId;

const TABLE: &str = "{table}";
const CELL_ID_LIST: &str = "{cell_id_list}";

/// SQL text with `{table}` and `{cell_id_list}` placeholders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryTemplate {
    sql: String,
}

impl QueryTemplate {
    pub fn new(sql: impl Into<String>) -> Result<Self> {
        let sql = sql.into();
        for placeholder in [TABLE, CELL_ID_LIST] {
            if !sql.contains(placeholder) {
                return Err(Error::InvalidQueryTemplate(format!(
                    "missing {placeholder} placeholder in {sql:?}"
                )));
            }
        }
        Ok(Self { sql })
    }

    /// Every column of the rows stored for the listed cells.
    pub fn select_all() -> Self {
        Self {
            sql: format!("SELECT * FROM {TABLE} WHERE {INDEX_COLUMN} IN ({CELL_ID_LIST})"),
        }
    }

    /// Ids of the listed cells that have stored rows.
    pub fn existence_probe() -> Self {
        Self {
            sql: format!(
                "SELECT DISTINCT {INDEX_COLUMN} FROM {TABLE} WHERE {INDEX_COLUMN} IN ({CELL_ID_LIST})"
            ),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.sql
    }

    /// Substitutes the placeholders. Cell ids are written as decimal integers.
    pub fn render(&self, table: &str, cells: &[CellId]) -> String {
        let list = cells
            .iter()
            .map(|c| c.raw().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        self.sql.replace(TABLE, table).replace(CELL_ID_LIST, &list)
    }
}
