use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::common::database::Database;

/// One DDL script from the migrations directory.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationUnit {
    pub name: String,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaStatus {
    Applied,
    AlreadyApplied,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaOutcome {
    pub name: String,
    pub status: SchemaStatus,
}

/// Lists the `*.sql` files of `dir` sorted by file name. A missing directory
/// yields no units.
pub fn load_migration_units(dir: &Path) -> Result<Vec<MigrationUnit>> {
    if !dir.is_dir() {
        warn!(
            "Migrations directory {} not found, no scripts to apply",
            dir.display()
        );
        return Ok(Vec::new());
    }

    let mut paths = fs::read_dir(dir)
        .with_context(|| format!("Failed to list migrations directory {}", dir.display()))?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()?;

    paths.retain(|path| path.is_file() && path.extension().map_or(false, |ext| ext == "sql"));
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    paths
        .into_iter()
        .map(|path| {
            let sql = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read migration {}", path.display()))?;
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            Ok(MigrationUnit { name, sql })
        })
        .collect()
}

pub struct SchemaApplier<'a, D: Database> {
    destination: &'a D,
}

impl<'a, D: Database> SchemaApplier<'a, D> {
    pub fn new(destination: &'a D) -> Self {
        SchemaApplier { destination }
    }

    /// Runs every unit in order. Failures never stop the sequence.
    pub async fn apply(&self, units: &[MigrationUnit]) -> Vec<SchemaOutcome> {
        let mut outcomes = Vec::with_capacity(units.len());

        for unit in units {
            let status = match self.destination.execute_script(&unit.sql).await {
                Ok(()) => {
                    info!("Applied migration {}", unit.name);
                    SchemaStatus::Applied
                }
                Err(err) if err.is_already_exists() => {
                    debug!("Migration {} already applied: {}", unit.name, err);
                    SchemaStatus::AlreadyApplied
                }
                Err(err) => {
                    warn!("Migration {} failed, continuing: {}", unit.name, err);
                    SchemaStatus::Failed(err.to_string())
                }
            };

            outcomes.push(SchemaOutcome {
                name: unit.name.clone(),
                status,
            });
        }

        outcomes
    }
}
