use std::collections::HashSet;

use serde_json::Value;

use crate::common::database::Row;
use crate::common::row_set::RowSet;
use crate::plan::TransformRule;

/// Rows ready for insert: every row carries exactly `columns`.
#[derive(Debug, Clone, Default)]
pub struct PreparedRows {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl PreparedRows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub struct RowTransformer<'a> {
    rule: Option<&'a TransformRule>,
}

impl<'a> RowTransformer<'a> {
    pub fn new(rule: Option<&'a TransformRule>) -> Self {
        RowTransformer { rule }
    }

    pub fn transform(&self, row_set: &RowSet) -> PreparedRows {
        let columns = self.column_list(row_set);

        let rows = row_set
            .rows()
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|column| {
                        let value = row.get(column).cloned().unwrap_or(Value::Null);
                        (column.clone(), value)
                    })
                    .collect::<Row>()
            })
            .collect();

        PreparedRows { columns, rows }
    }

    /// Union of the keys of all rows in first-seen order, minus dropped fields.
    fn column_list(&self, row_set: &RowSet) -> Vec<String> {
        let dropped: HashSet<&str> = self
            .rule
            .map(|rule| rule.drop_fields.iter().map(String::as_str).collect())
            .unwrap_or_default();

        let mut seen = HashSet::new();
        let mut columns = Vec::new();

        for row in row_set.rows() {
            for key in row.keys() {
                if !dropped.contains(key.as_str()) && seen.insert(key.as_str()) {
                    columns.push(key.clone());
                }
            }
        }

        columns
    }
}
