use std::fmt;

use tokio::time::Instant;

use crate::common::database::Database;
use crate::common::row_set::RowSet;

#[derive(Debug, Clone, PartialEq)]
pub enum ExportStatus {
    Exported(usize),
    /// The table does not exist on the source.
    Missing,
    Failed(String),
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExportStatus::Exported(rows) => write!(f, "exported {} rows", rows),
            ExportStatus::Missing => write!(f, "missing on source"),
            ExportStatus::Failed(message) => write!(f, "failed: {}", message),
        }
    }
}

pub struct TableExporter<'a, D: Database> {
    source: &'a D,
}

impl<'a, D: Database> TableExporter<'a, D> {
    pub fn new(source: &'a D) -> Self {
        TableExporter { source }
    }

    /// Full scan of `table`. Never fails: a missing table or a read error
    /// yields an empty row set and the matching status.
    pub async fn export(&self, table: &str) -> (RowSet, ExportStatus) {
        let start_time = Instant::now();

        match self.source.select_all(table).await {
            Ok(rows) => {
                let count = rows.len();
                debug!(
                    "Exported {} rows from {}, took: {}s",
                    count,
                    table,
                    start_time.elapsed().as_secs_f32()
                );
                (RowSet::new(table, rows), ExportStatus::Exported(count))
            }
            Err(err) if err.is_undefined_table() => {
                warn!("Table {} not found on source, skipping", table);
                (RowSet::empty(table), ExportStatus::Missing)
            }
            Err(err) => {
                error!("Failed to export table {}: {}", table, err);
                (RowSet::empty(table), ExportStatus::Failed(err.to_string()))
            }
        }
    }
}
