use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// A single exported row: column name to JSON value.
pub type Row = Map<String, Value>;

pub type DbResult<T> = Result<T, DbError>;

/// Classification of a database failure, derived from the SQLSTATE code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// Duplicate table, column, schema or other object.
    AlreadyExists,
    /// The referenced relation does not exist.
    UndefinedTable,
    Other,
}

#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct DbError {
    pub kind: DbErrorKind,
    pub message: String,
}

impl DbError {
    pub fn new(kind: DbErrorKind, message: impl Into<String>) -> Self {
        DbError {
            kind,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(DbErrorKind::Other, message)
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind == DbErrorKind::AlreadyExists
    }

    pub fn is_undefined_table(&self) -> bool {
        self.kind == DbErrorKind::UndefinedTable
    }
}

pub fn classify_sqlstate(code: Option<&str>) -> DbErrorKind {
    match code {
        // duplicate_table, duplicate_column, duplicate_object, duplicate_schema,
        // duplicate_function, duplicate_database, duplicate_prepared_statement,
        // duplicate_cursor, duplicate_alias
        Some("42P07" | "42701" | "42710" | "42P06" | "42723" | "42P04" | "42P05" | "42P03"
        | "42712") => DbErrorKind::AlreadyExists,
        Some("42P01") => DbErrorKind::UndefinedTable,
        _ => DbErrorKind::Other,
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::Database(db_err) => classify_sqlstate(db_err.code().as_deref()),
            _ => DbErrorKind::Other,
        };

        DbError::new(kind, err.to_string())
    }
}

/// Operations the migration needs from one database endpoint.
#[async_trait]
pub trait Database: Send + Sync {
    /// Executes raw SQL text, possibly holding several statements.
    async fn execute_script(&self, sql: &str) -> DbResult<()>;

    async fn select_all(&self, table: &str) -> DbResult<Vec<Row>>;

    /// Inserts `rows` into `table`, skipping rows that conflict with existing
    /// keys. Every row carries exactly `columns`. Returns the inserted count.
    async fn insert_batch(&self, table: &str, columns: &[String], rows: &[Row]) -> DbResult<u64>;

    async fn count_rows(&self, table: &str) -> DbResult<i64>;

    /// Moves every sequence owned by a column of `table` to the column's
    /// largest value. Returns the number of sequences found.
    async fn sync_sequences(&self, table: &str) -> DbResult<usize>;

    async fn close(&self);
}
