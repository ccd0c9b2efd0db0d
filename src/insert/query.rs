use serde_json::Value;

use crate::common::database::Row;
use crate::common::helpers::quote_ident;
use crate::plan::ColumnPatch;

pub fn build_select_all_query(table_name: &str) -> String {
    format!("SELECT to_jsonb(t) FROM {} AS t", quote_ident(table_name))
}

pub fn build_count_query(table_name: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", quote_ident(table_name))
}

/// Multi-row insert with the whole batch bound as one JSONB array (`$1`).
/// Values are coerced to the destination column types by
/// `jsonb_populate_recordset`; keys absent from an object become NULL.
pub fn build_insert_statement(table_name: &str, columns: &[String]) -> String {
    let table = quote_ident(table_name);
    let column_names_string = columns
        .iter()
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {table} ({columns}) SELECT {columns} FROM jsonb_populate_recordset(NULL::{table}, $1) ON CONFLICT DO NOTHING",
        table = table,
        columns = column_names_string
    )
}

/// Column name and owned sequence of every serial or identity column; `$1` is
/// the quoted table name.
pub const SERIAL_COLUMNS_QUERY: &str = "SELECT a.attname::text, pg_get_serial_sequence($1, a.attname)::text \
     FROM pg_attribute a \
     WHERE a.attrelid = $1::regclass AND a.attnum > 0 AND NOT a.attisdropped \
     AND pg_get_serial_sequence($1, a.attname) IS NOT NULL";

/// Sets the sequence bound as `$1` to the column maximum. Empty tables are
/// left alone.
pub fn build_set_sequence_query(table_name: &str, column: &str) -> String {
    format!(
        "SELECT setval($1::regclass, m.max_value) FROM (SELECT MAX({})::bigint AS max_value FROM {}) AS m WHERE m.max_value IS NOT NULL",
        quote_ident(column),
        quote_ident(table_name)
    )
}

pub fn build_add_column_query(patch: &ColumnPatch) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
        quote_ident(&patch.table),
        quote_ident(&patch.column),
        patch.definition
    )
}

pub fn rows_to_json_array(rows: &[Row]) -> Value {
    Value::Array(rows.iter().cloned().map(Value::Object).collect())
}
