use std::fmt;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{ConnectOptions, Executor};

use crate::common::database::{Database, DbError, DbResult, Row};
use crate::common::helpers::{quote_ident, redact_url};
use crate::config::DatabaseConfig;
use crate::insert::query::{
    build_count_query, build_insert_statement, build_select_all_query, build_set_sequence_query,
    rows_to_json_array, SERIAL_COLUMNS_QUERY,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Source,
    Destination,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Endpoint::Source => write!(f, "source"),
            Endpoint::Destination => write!(f, "destination"),
        }
    }
}

/// Opens a database handle for one endpoint of the migration.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    type Connection: Database;

    async fn connect(&self, endpoint: Endpoint, config: &DatabaseConfig)
        -> Result<Self::Connection>;
}

pub struct PostgresConnection {
    pub pool: PgPool,
}

impl PostgresConnection {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let mut options = config
            .url
            .parse::<PgConnectOptions>()
            .context("Invalid PostgreSQL connection string")?;
        options.disable_statement_logging();

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect_with(options)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to PostgreSQL server {}",
                    redact_url(&config.url)
                )
            })?;

        Ok(PostgresConnection { pool })
    }
}

#[async_trait]
impl Database for PostgresConnection {
    async fn execute_script(&self, sql: &str) -> DbResult<()> {
        // Without bind arguments the simple query protocol is used, which
        // accepts several statements in one script.
        self.pool.execute(sql).await?;
        Ok(())
    }

    async fn select_all(&self, table: &str) -> DbResult<Vec<Row>> {
        let query = build_select_all_query(table);

        sqlx::query_scalar::<_, Value>(&query)
            .fetch(&self.pool)
            .map_err(DbError::from)
            .and_then(|value| async move {
                match value {
                    Value::Object(row) => Ok(row),
                    other => Err(DbError::other(format!(
                        "Expected a JSON object per row, got {}",
                        other
                    ))),
                }
            })
            .try_collect()
            .await
    }

    async fn insert_batch(&self, table: &str, columns: &[String], rows: &[Row]) -> DbResult<u64> {
        let statement = build_insert_statement(table, columns);
        let payload = rows_to_json_array(rows);

        let result = sqlx::query(&statement)
            .bind(payload)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn count_rows(&self, table: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(&build_count_query(table))
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn sync_sequences(&self, table: &str) -> DbResult<usize> {
        let owned: Vec<(String, String)> = sqlx::query_as(SERIAL_COLUMNS_QUERY)
            .bind(quote_ident(table))
            .fetch_all(&self.pool)
            .await?;

        for (column, sequence) in &owned {
            sqlx::query(&build_set_sequence_query(table, column))
                .bind(sequence)
                .execute(&self.pool)
                .await?;
        }

        Ok(owned.len())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

pub struct PostgresConnectionFactory;

#[async_trait]
impl ConnectionFactory for PostgresConnectionFactory {
    type Connection = PostgresConnection;

    async fn connect(
        &self,
        endpoint: Endpoint,
        config: &DatabaseConfig,
    ) -> Result<PostgresConnection> {
        debug!("Connecting to {} {}", endpoint, redact_url(&config.url));

        PostgresConnection::new(config)
            .await
            .with_context(|| format!("Cannot open {} database", endpoint))
    }
}
