// SPDX-License-Identifier: Apache-2.0

//! DataEngine trait definition
//!
//! The seam between the admin layer and the database. The PostgreSQL driver
//! implements it over a `sqlx` pool; tests implement it in memory.

use std::time::Duration;

use async_trait::async_trait;
use tablegate_core::{Record, SqlStatement};

use crate::engine::error::DbResult;

/// Per-transaction settings
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionOptions {
    /// Server-side statement timeout, applied with transaction-local scope.
    pub statement_timeout: Option<Duration>,
}

/// Core trait every driver implements
#[async_trait]
pub trait DataEngine: Send + Sync {
    /// Unique identifier for this driver (e.g. "postgres")
    fn driver_id(&self) -> &'static str;

    /// Runs a row-returning statement on a pooled connection.
    async fn fetch_all(&self, statement: &SqlStatement) -> DbResult<Vec<Record>>;

    /// Runs a statement on a pooled connection and returns the affected row count.
    async fn execute(&self, statement: &SqlStatement) -> DbResult<u64>;

    /// Checks out a dedicated connection and opens a transaction on it.
    ///
    /// The connection belongs to the returned handle until `commit` or
    /// `rollback`; dropping the handle rolls back and releases it.
    async fn begin(&self, options: &TransactionOptions) -> DbResult<Box<dyn TransactionHandle>>;

    /// Round trip proving the database accepts work.
    async fn health_check(&self) -> DbResult<()>;

    /// Closes pooled connections.
    async fn close(&self) {}
}

/// An open transaction bound to one connection
#[async_trait]
pub trait TransactionHandle: Send {
    async fn fetch_all(&mut self, statement: &SqlStatement) -> DbResult<Vec<Record>>;

    async fn execute(&mut self, statement: &SqlStatement) -> DbResult<u64>;

    async fn commit(self: Box<Self>) -> DbResult<()>;

    async fn rollback(self: Box<Self>) -> DbResult<()>;
}
