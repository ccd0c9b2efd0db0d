use std::collections::HashSet;
use std::fmt;

use anyhow::{Context, Result};
use tokio::time::Instant;

use crate::common::database::Database;
use crate::common::helpers::print_error_chain;
use crate::common::row_set::RowSet;
use crate::config::Config;
use crate::connection::{ConnectionFactory, Endpoint};
use crate::extract::exporter::{ExportStatus, TableExporter};
use crate::extract::transform::RowTransformer;
use crate::insert::loader::BatchLoader;
use crate::migrate::outcome::{
    ExportOutcome, LoadOutcome, LoadStatus, MigrationReport, VerificationResult,
};
use crate::migrate::verifier::Verifier;
use crate::schema::applier::{load_migration_units, SchemaApplier, SchemaOutcome};
use crate::schema::reconciler::ColumnReconciler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    SchemaPhase,
    ExportPhase,
    LoadPhase,
    VerifyPhase,
    Done,
    Aborted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::SchemaPhase => "schema",
            Phase::ExportPhase => "export",
            Phase::LoadPhase => "load",
            Phase::VerifyPhase => "verify",
            Phase::Done => "done",
            Phase::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

pub struct DatabaseMigrator<F: ConnectionFactory> {
    factory: F,
    config: Config,
    phase: Phase,
}

impl<F: ConnectionFactory> DatabaseMigrator<F> {
    pub fn new(factory: F, config: Config) -> Self {
        DatabaseMigrator {
            factory,
            config,
            phase: Phase::Idle,
        }
    }

    /// Runs every phase. Only a connection failure is returned as an error;
    /// table-level failures end up in the report.
    pub async fn run(&mut self) -> Result<MigrationReport> {
        let start_time = Instant::now();
        self.phase = Phase::Idle;

        info!("Initializing connections...");

        let source = match self
            .factory
            .connect(Endpoint::Source, self.config.source())
            .await
        {
            Ok(source) => source,
            Err(err) => {
                self.enter(Phase::Aborted);
                return Err(err).context("Migration aborted");
            }
        };

        let destination = match self
            .factory
            .connect(Endpoint::Destination, self.config.destination())
            .await
        {
            Ok(destination) => destination,
            Err(err) => {
                source.close().await;
                self.enter(Phase::Aborted);
                return Err(err).context("Migration aborted");
            }
        };

        let report = self.run_phases(&source, &destination, start_time).await;

        source.close().await;
        destination.close().await;

        Ok(report)
    }

    async fn run_phases<D: Database>(
        &mut self,
        source: &D,
        destination: &D,
        start_time: Instant,
    ) -> MigrationReport {
        self.enter(Phase::SchemaPhase);
        let schema = self.apply_schema(destination).await;

        self.enter(Phase::ExportPhase);
        let (row_sets, exports) = self.export_tables(source).await;

        self.enter(Phase::LoadPhase);
        let loads = self.load_tables(destination, &row_sets, &exports).await;

        self.enter(Phase::VerifyPhase);
        let verifications = self.verify_tables(destination, &row_sets).await;

        self.enter(Phase::Done);

        let elapsed = start_time.elapsed();
        info!(
            "Migration finished, total time took: {}s",
            elapsed.as_secs_f32()
        );

        MigrationReport {
            phase: self.phase,
            schema,
            exports,
            loads,
            verifications,
            elapsed,
        }
    }

    fn enter(&mut self, phase: Phase) {
        debug!("Phase {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    async fn apply_schema<D: Database>(&self, destination: &D) -> Vec<SchemaOutcome> {
        let migrations_dir = &self.config.settings().migrations_dir;

        let units = load_migration_units(migrations_dir)
            .with_context(|| {
                format!(
                    "Cannot load migration scripts from {}",
                    migrations_dir.display()
                )
            })
            .unwrap_or_else(|err| {
                print_error_chain(&err);
                Vec::new()
            });

        info!("Applying {} migration scripts", units.len());
        let mut outcomes = SchemaApplier::new(destination).apply(&units).await;

        let patches = self.config.plan().column_patches();
        info!("Reconciling {} columns", patches.len());
        outcomes.extend(ColumnReconciler::new(destination).reconcile(patches).await);

        outcomes
    }

    async fn export_tables<D: Database>(&self, source: &D) -> (Vec<RowSet>, Vec<ExportOutcome>) {
        let exporter = TableExporter::new(source);
        let tables = self.config.plan().tables();

        info!(
            "Tables to migrate: {}",
            tables
                .iter()
                .map(|table| table.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut row_sets = Vec::with_capacity(tables.len());
        let mut exports = Vec::with_capacity(tables.len());

        for table in tables {
            let (row_set, status) = exporter.export(&table.name).await;
            row_sets.push(row_set);
            exports.push(ExportOutcome {
                table: table.name.clone(),
                status,
            });
        }

        (row_sets, exports)
    }

    async fn load_tables<D: Database>(
        &self,
        destination: &D,
        row_sets: &[RowSet],
        exports: &[ExportOutcome],
    ) -> Vec<LoadOutcome> {
        let plan = self.config.plan();
        let loader = BatchLoader::new(destination, self.config.settings().batch_size);

        // Tables whose rows did not make it; their dependents are not attempted.
        let mut blocked: HashSet<&str> = HashSet::new();
        let mut outcomes = Vec::with_capacity(row_sets.len());

        for ((table, row_set), export) in plan.tables().iter().zip(row_sets).zip(exports) {
            let name = table.name.as_str();

            if let Some(dependency) = table
                .depends_on
                .iter()
                .find(|dependency| blocked.contains(dependency.as_str()))
            {
                warn!(
                    "Skipping table {}, dependency {} was not loaded",
                    name, dependency
                );
                blocked.insert(name);
                outcomes.push(LoadOutcome::skipped(
                    name,
                    format!("dependency {} not loaded", dependency),
                ));
                continue;
            }

            let outcome = match &export.status {
                ExportStatus::Missing => LoadOutcome::skipped(name, "missing on source"),
                ExportStatus::Failed(message) => {
                    LoadOutcome::failed(name, 0, format!("export failed: {}", message))
                }
                ExportStatus::Exported(_) => {
                    info!("Migrating table: {}", name);
                    let start_time = Instant::now();

                    let prepared =
                        RowTransformer::new(plan.transform_rule(name)).transform(row_set);

                    match loader.load(name, &prepared).await {
                        Ok(totals) => {
                            info!(
                                "Table {} migrated, rows: {}, inserted: {}, took: {}s",
                                name,
                                totals.attempted,
                                totals.inserted,
                                start_time.elapsed().as_secs_f32()
                            );
                            if totals.attempted > 0 {
                                sync_sequences(destination, name).await;
                            }
                            LoadOutcome {
                                table: name.to_string(),
                                attempted: totals.attempted,
                                inserted: totals.inserted,
                                batches: totals.batches,
                                status: LoadStatus::Loaded,
                            }
                        }
                        Err(err) => {
                            let err = err.context(format!("Error while migrating table: {}", name));
                            print_error_chain(&err);
                            LoadOutcome::failed(name, prepared.len(), format!("{:#}", err))
                        }
                    }
                }
            };

            if outcome.is_failed() {
                blocked.insert(name);
            }
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn verify_tables<D: Database>(
        &self,
        destination: &D,
        row_sets: &[RowSet],
    ) -> Vec<VerificationResult> {
        let verifier = Verifier::new(destination);
        let mut results = Vec::new();

        for row_set in row_sets.iter().filter(|row_set| !row_set.is_empty()) {
            results.push(verifier.verify(row_set.table(), row_set.len()).await);
        }

        results
    }
}

/// Explicit ids were inserted, so the destination sequences have to catch
/// up before the site inserts new rows. A failure here does not fail the table.
async fn sync_sequences<D: Database>(destination: &D, table: &str) {
    match destination.sync_sequences(table).await {
        Ok(0) => {}
        Ok(count) => debug!("Advanced {} sequences of table {}", count, table),
        Err(err) => warn!("Cannot advance sequences of table {}: {}", table, err),
    }
}
