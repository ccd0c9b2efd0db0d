use crate::common::database::Database;
use crate::insert::query::build_add_column_query;
use crate::plan::ColumnPatch;
use crate::schema::applier::{SchemaOutcome, SchemaStatus};

pub struct ColumnReconciler<'a, D: Database> {
    destination: &'a D,
}

impl<'a, D: Database> ColumnReconciler<'a, D> {
    pub fn new(destination: &'a D) -> Self {
        ColumnReconciler { destination }
    }

    pub async fn reconcile(&self, patches: &[ColumnPatch]) -> Vec<SchemaOutcome> {
        let mut outcomes = Vec::with_capacity(patches.len());

        for patch in patches {
            let name = format!("{}.{}", patch.table, patch.column);
            let query = build_add_column_query(patch);

            let status = match self.destination.execute_script(&query).await {
                Ok(()) => {
                    debug!("Column {} ensured", name);
                    SchemaStatus::Applied
                }
                Err(err) if err.is_already_exists() => SchemaStatus::AlreadyApplied,
                Err(err) => {
                    warn!("Cannot add column {}: {}", name, err);
                    SchemaStatus::Failed(err.to_string())
                }
            };

            outcomes.push(SchemaOutcome { name, status });
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::database::DbError;
    use crate::testing::FakeDatabase;

    fn patch(table: &str, column: &str) -> ColumnPatch {
        ColumnPatch {
            table: table.to_string(),
            column: column.to_string(),
            definition: "BOOLEAN NOT NULL DEFAULT FALSE".to_string(),
        }
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let destination = FakeDatabase::new();
        destination.seed("forum_posts", Vec::new());
        let patches = vec![patch("forum_posts", "is_edited")];
        let reconciler = ColumnReconciler::new(&destination);

        let first = reconciler.reconcile(&patches).await;
        let second = reconciler.reconcile(&patches).await;

        assert_eq!(first[0].status, SchemaStatus::Applied);
        assert_eq!(second[0].status, SchemaStatus::Applied);
        assert_eq!(destination.columns("forum_posts"), vec!["is_edited".to_string()]);
    }

    #[tokio::test]
    async fn failures_are_reported_and_later_patches_run() {
        let destination = FakeDatabase::new();
        destination.seed("users", Vec::new());
        destination.fail_script(
            "ALTER TABLE \"chat_messages\"",
            DbError::other("relation \"chat_messages\" does not exist"),
        );
        let patches = vec![patch("chat_messages", "deleted"), patch("users", "banned")];

        let outcomes = ColumnReconciler::new(&destination).reconcile(&patches).await;

        assert_eq!(outcomes[0].name, "chat_messages.deleted");
        assert!(matches!(outcomes[0].status, SchemaStatus::Failed(_)));
        assert_eq!(outcomes[1].status, SchemaStatus::Applied);
    }
}
