// SPDX-License-Identifier: Apache-2.0

//! PostgreSQL Driver
//!
//! Implements the DataEngine trait for PostgreSQL using a SQLx pool.
//!
//! ## Transaction Handling
//!
//! `begin()` checks a dedicated connection out of the pool and opens a
//! transaction on it. The connection stays with the returned handle until
//! `commit()` or `rollback()`. A handle dropped mid-flight (cancelled task,
//! client timeout) rolls back and returns the connection to the pool.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::Transaction;
use tablegate_core::{Record, SqlStatement};
use tracing::{debug, info};

use super::postgres_utils::{bind_param, row_to_record};
use crate::config::PoolConfig;
use crate::engine::error::{DbFailure, DbResult};
use crate::engine::traits::{DataEngine, TransactionHandle, TransactionOptions};

/// PostgreSQL driver implementation
pub struct PostgresDriver {
    pool: PgPool,
}

impl PostgresDriver {
    pub async fn connect(database_url: &str, pool: &PoolConfig) -> DbResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(pool.max_connections)
            .min_connections(pool.min_connections)
            .acquire_timeout(Duration::from_secs(pool.acquire_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| match DbFailure::from(e) {
                failure if failure.sqlstate.as_deref() == Some("28P01") => {
                    DbFailure::connection(format!("authentication failed: {}", failure.message))
                }
                failure => DbFailure::connection(failure.message),
            })?;

        info!(
            max_connections = pool.options().get_max_connections(),
            "PostgreSQL pool ready"
        );
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn prepare(statement: &SqlStatement) -> sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments> {
        statement
            .values
            .iter()
            .fold(sqlx::query(&statement.text), bind_param)
    }
}

#[async_trait]
impl DataEngine for PostgresDriver {
    fn driver_id(&self) -> &'static str {
        "postgres"
    }

    async fn fetch_all(&self, statement: &SqlStatement) -> DbResult<Vec<Record>> {
        let start = Instant::now();
        let rows: Vec<PgRow> = Self::prepare(statement).fetch_all(&self.pool).await?;
        debug!(
            rows = rows.len(),
            params = statement.values.len(),
            elapsed_ms = start.elapsed().as_micros() as f64 / 1000.0,
            "fetch_all"
        );
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn execute(&self, statement: &SqlStatement) -> DbResult<u64> {
        let result = Self::prepare(statement).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn begin(&self, options: &TransactionOptions) -> DbResult<Box<dyn TransactionHandle>> {
        let mut tx = self.pool.begin().await?;

        if let Some(timeout) = options.statement_timeout {
            sqlx::query("SELECT set_config('statement_timeout', $1, true)")
                .bind(timeout.as_millis().to_string())
                .execute(&mut *tx)
                .await?;
        }

        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn health_check(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Transaction bound to one pooled connection
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl TransactionHandle for PostgresTransaction {
    async fn fetch_all(&mut self, statement: &SqlStatement) -> DbResult<Vec<Record>> {
        let rows: Vec<PgRow> = PostgresDriver::prepare(statement)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn execute(&mut self, statement: &SqlStatement) -> DbResult<u64> {
        let result = PostgresDriver::prepare(statement)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DbResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
