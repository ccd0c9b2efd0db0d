use crate::common::database::Database;
use crate::migrate::outcome::{VerificationResult, VerifyStatus};

pub struct Verifier<'a, D: Database> {
    destination: &'a D,
}

impl<'a, D: Database> Verifier<'a, D> {
    pub fn new(destination: &'a D) -> Self {
        Verifier { destination }
    }

    /// `ok` when the destination holds at least as many rows as were exported;
    /// pre-existing and conflict-skipped rows count towards it.
    pub async fn verify(&self, table: &str, source_count: usize) -> VerificationResult {
        let (destination_count, status) = match self.destination.count_rows(table).await {
            Ok(count) if count >= source_count as i64 => (Some(count), VerifyStatus::Ok),
            Ok(count) => {
                warn!(
                    "Table {} is short: source {} rows, destination {} rows",
                    table, source_count, count
                );
                (Some(count), VerifyStatus::Short)
            }
            Err(err) => {
                error!("Cannot count rows of {}: {}", table, err);
                (None, VerifyStatus::Error(err.to_string()))
            }
        };

        VerificationResult {
            table: table.to_string(),
            source_count,
            destination_count,
            status,
        }
    }
}
