//! In-memory database double used by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::common::database::{Database, DbError, DbErrorKind, DbResult, Row};
use crate::config::DatabaseConfig;
use crate::connection::{ConnectionFactory, Endpoint};

pub fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

#[derive(Default)]
struct State {
    tables: HashMap<String, Vec<Row>>,
    added_columns: HashMap<String, Vec<String>>,
    scripts: Vec<String>,
    objects: HashSet<String>,
    batches: HashMap<String, Vec<usize>>,
    insert_columns: HashMap<String, Vec<Vec<String>>>,
    insert_log: Vec<String>,
    script_failures: Vec<(String, DbError)>,
    select_failures: HashMap<String, DbError>,
    insert_failures: HashMap<String, DbError>,
    count_failures: HashMap<String, DbError>,
    sequence_syncs: Vec<String>,
    sequence_failures: HashMap<String, DbError>,
    closed: bool,
}

/// Tables keyed by name; rows conflict on their `id` field.
#[derive(Clone, Default)]
pub struct FakeDatabase {
    state: Arc<Mutex<State>>,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn seed(&self, table: &str, rows: Vec<Row>) {
        self.state().tables.insert(table.to_string(), rows);
    }

    pub fn fail_script(&self, prefix: &str, err: DbError) {
        self.state().script_failures.push((prefix.to_string(), err));
    }

    pub fn fail_select(&self, table: &str, err: DbError) {
        self.state().select_failures.insert(table.to_string(), err);
    }

    pub fn fail_insert(&self, table: &str, err: DbError) {
        self.state().insert_failures.insert(table.to_string(), err);
    }

    pub fn fail_count(&self, table: &str, err: DbError) {
        self.state().count_failures.insert(table.to_string(), err);
    }

    pub fn fail_sequences(&self, table: &str, err: DbError) {
        self.state().sequence_failures.insert(table.to_string(), err);
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state().tables.get(table).map_or(0, Vec::len)
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state().tables.get(table).cloned().unwrap_or_default()
    }

    /// True when the table was seeded or created by a script.
    pub fn has_table(&self, table: &str) -> bool {
        let state = self.state();
        state.tables.contains_key(table) || state.objects.contains(table)
    }

    /// Tables whose sequences were synced, in call order.
    pub fn sequence_syncs(&self) -> Vec<String> {
        self.state().sequence_syncs.clone()
    }

    pub fn batch_sizes(&self, table: &str) -> Vec<usize> {
        self.state().batches.get(table).cloned().unwrap_or_default()
    }

    pub fn insert_columns(&self, table: &str) -> Vec<Vec<String>> {
        self.state()
            .insert_columns
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Table of every insert call, in call order.
    pub fn insert_log(&self) -> Vec<String> {
        self.state().insert_log.clone()
    }

    pub fn columns(&self, table: &str) -> Vec<String> {
        self.state()
            .added_columns
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.state().scripts.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

fn undefined_table(table: &str) -> DbError {
    DbError::new(
        DbErrorKind::UndefinedTable,
        format!("relation \"{}\" does not exist", table),
    )
}

/// `CREATE TABLE|INDEX [IF NOT EXISTS] name ...` as (name, is_table, if_not_exists).
fn created_object(statement: &str) -> Option<(String, bool, bool)> {
    let words: Vec<&str> = statement.split_whitespace().collect();
    if words.len() < 3 || !words[0].eq_ignore_ascii_case("CREATE") {
        return None;
    }
    let is_table = words[1].eq_ignore_ascii_case("TABLE");
    if !is_table && !words[1].eq_ignore_ascii_case("INDEX") {
        return None;
    }

    let if_not_exists =
        words.len() > 5 && words[2..5].join(" ").eq_ignore_ascii_case("IF NOT EXISTS");
    let name = if if_not_exists { words[5] } else { words[2] };
    let name = name.split('(').next().unwrap_or(name).trim_matches('"');

    Some((name.to_string(), is_table, if_not_exists))
}

/// Runs a script the way PostgreSQL runs a multi-statement simple query: as
/// one implicit transaction, so a duplicate object rolls back the objects
/// the script created before it.
fn apply_script(state: &mut State, sql: &str) -> DbResult<()> {
    let mut created: Vec<(String, bool)> = Vec::new();

    for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((name, is_table, if_not_exists)) = created_object(statement) else {
            continue;
        };

        let exists = state.objects.contains(&name)
            || state.tables.contains_key(&name)
            || created.iter().any(|(other, _)| *other == name);
        if exists {
            if if_not_exists {
                continue;
            }
            return Err(DbError::new(
                DbErrorKind::AlreadyExists,
                format!("relation \"{}\" already exists", name),
            ));
        }

        created.push((name, is_table));
    }

    for (name, is_table) in created {
        if is_table {
            state.tables.entry(name.clone()).or_default();
        }
        state.objects.insert(name);
    }

    Ok(())
}

#[async_trait]
impl Database for FakeDatabase {
    async fn execute_script(&self, sql: &str) -> DbResult<()> {
        let mut state = self.state();
        state.scripts.push(sql.to_string());

        if let Some((_, err)) = state
            .script_failures
            .iter()
            .find(|(prefix, _)| sql.starts_with(prefix.as_str()))
        {
            return Err(err.clone());
        }

        if sql.contains("ADD COLUMN IF NOT EXISTS") {
            // ALTER TABLE "t" ADD COLUMN IF NOT EXISTS "c" ...
            let parts: Vec<&str> = sql.split('"').collect();
            let (table, column) = (parts[1].to_string(), parts[3].to_string());
            if !state.tables.contains_key(&table) {
                return Err(undefined_table(&table));
            }
            let columns = state.added_columns.entry(table).or_default();
            if !columns.contains(&column) {
                columns.push(column);
            }
            return Ok(());
        }

        apply_script(&mut state, sql)
    }

    async fn select_all(&self, table: &str) -> DbResult<Vec<Row>> {
        let state = self.state();
        if let Some(err) = state.select_failures.get(table) {
            return Err(err.clone());
        }
        state
            .tables
            .get(table)
            .cloned()
            .ok_or_else(|| undefined_table(table))
    }

    async fn insert_batch(&self, table: &str, columns: &[String], rows: &[Row]) -> DbResult<u64> {
        let mut state = self.state();
        if let Some(err) = state.insert_failures.get(table) {
            return Err(err.clone());
        }
        if !state.tables.contains_key(table) {
            return Err(undefined_table(table));
        }

        state.insert_log.push(table.to_string());
        state
            .batches
            .entry(table.to_string())
            .or_default()
            .push(rows.len());
        state
            .insert_columns
            .entry(table.to_string())
            .or_default()
            .push(columns.to_vec());

        let existing = state.tables.entry(table.to_string()).or_default();
        let mut inserted = 0;
        for row in rows {
            let conflict = row.get("id").map_or(false, |id| {
                existing.iter().any(|other| other.get("id") == Some(id))
            });
            if !conflict {
                existing.push(row.clone());
                inserted += 1;
            }
        }

        Ok(inserted)
    }

    async fn count_rows(&self, table: &str) -> DbResult<i64> {
        let state = self.state();
        if let Some(err) = state.count_failures.get(table) {
            return Err(err.clone());
        }
        state
            .tables
            .get(table)
            .map(|rows| rows.len() as i64)
            .ok_or_else(|| undefined_table(table))
    }

    async fn sync_sequences(&self, table: &str) -> DbResult<usize> {
        let mut state = self.state();
        if let Some(err) = state.sequence_failures.get(table) {
            return Err(err.clone());
        }
        if !state.tables.contains_key(table) {
            return Err(undefined_table(table));
        }

        state.sequence_syncs.push(table.to_string());
        Ok(1)
    }

    async fn close(&self) {
        self.state().closed = true;
    }
}

/// Hands out the two fakes; `failing` makes one endpoint refuse to connect.
#[derive(Default)]
pub struct FakeConnectionFactory {
    pub source: FakeDatabase,
    pub destination: FakeDatabase,
    pub failing: Option<Endpoint>,
    opened: Mutex<Vec<Endpoint>>,
}

impl FakeConnectionFactory {
    pub fn new(source: FakeDatabase, destination: FakeDatabase) -> Self {
        FakeConnectionFactory {
            source,
            destination,
            ..Default::default()
        }
    }

    pub fn opened(&self) -> Vec<Endpoint> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectionFactory for FakeConnectionFactory {
    type Connection = FakeDatabase;

    async fn connect(&self, endpoint: Endpoint, _config: &DatabaseConfig) -> Result<FakeDatabase> {
        if self.failing == Some(endpoint) {
            return Err(anyhow!("Cannot open {} database: connection refused", endpoint));
        }

        self.opened.lock().unwrap().push(endpoint);

        Ok(match endpoint {
            Endpoint::Source => self.source.clone(),
            Endpoint::Destination => self.destination.clone(),
        })
    }
}
