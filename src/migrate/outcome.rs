use std::fmt;
use std::time::Duration;

use prettytable::{format, row, Table};

use crate::extract::exporter::ExportStatus;
use crate::migrate::migrator::Phase;
use crate::schema::applier::{SchemaOutcome, SchemaStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    Loaded,
    Failed(String),
    /// Not attempted, with the reason.
    Skipped(String),
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LoadStatus::Loaded => write!(f, "loaded"),
            LoadStatus::Failed(message) => write!(f, "failed: {}", message),
            LoadStatus::Skipped(reason) => write!(f, "skipped: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    pub table: String,
    pub attempted: usize,
    pub inserted: u64,
    pub batches: usize,
    pub status: LoadStatus,
}

impl LoadOutcome {
    pub fn skipped(table: &str, reason: impl Into<String>) -> Self {
        LoadOutcome {
            table: table.to_string(),
            attempted: 0,
            inserted: 0,
            batches: 0,
            status: LoadStatus::Skipped(reason.into()),
        }
    }

    pub fn failed(table: &str, attempted: usize, message: impl Into<String>) -> Self {
        LoadOutcome {
            table: table.to_string(),
            attempted,
            inserted: 0,
            batches: 0,
            status: LoadStatus::Failed(message.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, LoadStatus::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerifyStatus {
    Ok,
    Short,
    Error(String),
}

impl fmt::Display for VerifyStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VerifyStatus::Ok => write!(f, "ok"),
            VerifyStatus::Short => write!(f, "short"),
            VerifyStatus::Error(message) => write!(f, "error: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerificationResult {
    pub table: String,
    pub source_count: usize,
    pub destination_count: Option<i64>,
    pub status: VerifyStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutcome {
    pub table: String,
    pub status: ExportStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub schema_applied: usize,
    pub schema_already_applied: usize,
    pub schema_failed: usize,
    pub loaded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub verified_ok: usize,
    pub verified_short: usize,
    pub verified_error: usize,
}

#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub phase: Phase,
    pub schema: Vec<SchemaOutcome>,
    pub exports: Vec<ExportOutcome>,
    pub loads: Vec<LoadOutcome>,
    pub verifications: Vec<VerificationResult>,
    pub elapsed: Duration,
}

impl MigrationReport {
    pub fn load(&self, table: &str) -> Option<&LoadOutcome> {
        self.loads.iter().find(|outcome| outcome.table == table)
    }

    pub fn verification(&self, table: &str) -> Option<&VerificationResult> {
        self.verifications
            .iter()
            .find(|result| result.table == table)
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();

        for outcome in &self.schema {
            match outcome.status {
                SchemaStatus::Applied => summary.schema_applied += 1,
                SchemaStatus::AlreadyApplied => summary.schema_already_applied += 1,
                SchemaStatus::Failed(_) => summary.schema_failed += 1,
            }
        }

        for outcome in &self.loads {
            match outcome.status {
                LoadStatus::Loaded => summary.loaded += 1,
                LoadStatus::Failed(_) => summary.failed += 1,
                LoadStatus::Skipped(_) => summary.skipped += 1,
            }
        }

        for result in &self.verifications {
            match result.status {
                VerifyStatus::Ok => summary.verified_ok += 1,
                VerifyStatus::Short => summary.verified_short += 1,
                VerifyStatus::Error(_) => summary.verified_error += 1,
            }
        }

        summary
    }

    pub fn render_table(&self) -> Table {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

        table.add_row(row![bFg => "Table", "Source Rows", "Load", "Inserted", "Batches", "Destination Rows", "Verify"]);

        for export in &self.exports {
            let Some(load) = self.load(&export.table) else {
                continue;
            };

            let source_rows = match &export.status {
                ExportStatus::Exported(rows) => rows.to_string(),
                ExportStatus::Missing => "missing".to_owned(),
                ExportStatus::Failed(_) => "error".to_owned(),
            };

            let verification = self.verification(&load.table);
            let destination_rows = verification
                .and_then(|result| result.destination_count)
                .map(|count| count.to_string());
            let verify = verification.map(|result| result.status.to_string());

            table.add_row(row![
                bFg => load.table,
                source_rows,
                load.status,
                load.inserted,
                load.batches,
                destination_rows.unwrap_or_else(|| "-".to_owned()),
                verify.unwrap_or_else(|| "-".to_owned())
            ]);
        }

        table
    }

    pub fn print_summary(&self) {
        self.render_table().printstd();

        let summary = self.summary();
        println!(
            "Schema applied: {}, already applied: {}, failed: {}",
            summary.schema_applied, summary.schema_already_applied, summary.schema_failed
        );
        println!(
            "Tables loaded: {}, failed: {}, skipped: {}",
            summary.loaded, summary.failed, summary.skipped
        );
        println!(
            "Verification ok: {}, short: {}, error: {}",
            summary.verified_ok, summary.verified_short, summary.verified_error
        );
        println!(
            "Finished in {:.2}s ({})",
            self.elapsed.as_secs_f32(),
            self.phase
        );
    }
}
