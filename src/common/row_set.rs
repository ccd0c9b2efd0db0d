use crate::common::database::Row;

/// Rows captured from one source table. Immutable once captured.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    table: String,
    rows: Vec<Row>,
}

impl RowSet {
    pub fn new(table: impl Into<String>, rows: Vec<Row>) -> Self {
        RowSet {
            table: table.into(),
            rows,
        }
    }

    pub fn empty(table: impl Into<String>) -> Self {
        Self::new(table, Vec::new())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
