use anyhow::{Context, Result};
use tokio::time::Instant;

use crate::common::database::Database;
use crate::extract::transform::PreparedRows;

/// Totals for one table load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadTotals {
    pub attempted: usize,
    pub inserted: u64,
    pub batches: usize,
}

pub struct BatchLoader<'a, D: Database> {
    destination: &'a D,
    batch_size: usize,
}

impl<'a, D: Database> BatchLoader<'a, D> {
    pub fn new(destination: &'a D, batch_size: usize) -> Self {
        BatchLoader {
            destination,
            batch_size: batch_size.max(1),
        }
    }

    /// Inserts `prepared` in consecutive batches. The first failing batch
    /// fails the whole table; batches already sent stay committed.
    pub async fn load(&self, table: &str, prepared: &PreparedRows) -> Result<LoadTotals> {
        let mut totals = LoadTotals {
            attempted: prepared.len(),
            ..LoadTotals::default()
        };

        if prepared.is_empty() {
            debug!("No rows to insert into {}", table);
            return Ok(totals);
        }

        for (index, batch) in prepared.rows.chunks(self.batch_size).enumerate() {
            let start_time = Instant::now();

            let inserted = self
                .destination
                .insert_batch(table, &prepared.columns, batch)
                .await
                .with_context(|| {
                    format!(
                        "Failed to insert batch {} ({} rows) into {}",
                        index + 1,
                        batch.len(),
                        table
                    )
                })?;

            totals.batches += 1;
            totals.inserted += inserted;

            debug!(
                "Executed batch {} with {} rows into {}, inserted: {}, took: {}s",
                index + 1,
                batch.len(),
                table,
                inserted,
                start_time.elapsed().as_secs_f32()
            );
        }

        Ok(totals)
    }
}
