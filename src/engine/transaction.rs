// SPDX-License-Identifier: Apache-2.0

//! Transaction manager
//!
//! One logical operation (a single write or a whole batch) runs on one
//! pooled connection inside one transaction:
//!
//! ```text
//! begin() -> statements -> finish(Ok) -> COMMIT   -> connection released
//!                       -> finish(Err) -> ROLLBACK -> connection released
//! ```
//!
//! Work is bounded twice: a transaction-local `statement_timeout` on the
//! server, and a client-side deadline around the whole unit. Driver failures
//! are translated to [`AdminError`] here, once.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tablegate_core::{AdminError, AdminResult, Record, SqlStatement};
use tracing::{debug, warn};

use crate::config::TransactionConfig;
use crate::engine::traits::{DataEngine, TransactionHandle, TransactionOptions};

/// Kinds of batch with their own size ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Insert,
    Update,
    Delete,
}

impl BatchKind {
    fn label(&self) -> &'static str {
        match self {
            BatchKind::Insert => "batch_insert",
            BatchKind::Update => "batch_update",
            BatchKind::Delete => "batch_delete",
        }
    }
}

pub struct TransactionManager {
    engine: Arc<dyn DataEngine>,
    config: TransactionConfig,
}

impl TransactionManager {
    pub fn new(engine: Arc<dyn DataEngine>, config: TransactionConfig) -> Self {
        Self { engine, config }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.statement_timeout_ms)
    }

    /// Rejects oversized batches before a connection is checked out.
    pub fn check_batch_size(&self, kind: BatchKind, len: usize) -> AdminResult<()> {
        let max = match kind {
            BatchKind::Insert => self.config.max_batch_insert,
            BatchKind::Update => self.config.max_batch_update,
            BatchKind::Delete => self.config.max_batch_delete,
        };
        if len == 0 {
            return Err(AdminError::validation(format!(
                "{} requires at least one entry",
                kind.label()
            )));
        }
        if len > max {
            return Err(AdminError::validation(format!(
                "{} accepts at most {} entries, got {}",
                kind.label(),
                max,
                len
            )));
        }
        Ok(())
    }

    pub async fn begin(&self) -> AdminResult<ManagedTransaction> {
        let timeout_ms = self.config.statement_timeout_ms;
        let options = TransactionOptions {
            statement_timeout: Some(self.timeout()).filter(|t| !t.is_zero()),
        };
        let handle = self
            .engine
            .begin(&options)
            .await
            .map_err(|e| e.into_admin(timeout_ms))?;
        debug!(timeout_ms, "transaction started");
        Ok(ManagedTransaction {
            handle: Some(handle),
            timeout_ms,
        })
    }

    /// Runs `work` under the client-side deadline.
    pub async fn bounded<T, F>(&self, work: F) -> AdminResult<T>
    where
        F: Future<Output = AdminResult<T>>,
    {
        let timeout = self.timeout();
        if timeout.is_zero() {
            return work.await;
        }
        match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(AdminError::TransactionTimeout {
                timeout_ms: self.config.statement_timeout_ms,
            }),
        }
    }
}

/// An open transaction owned by one logical operation
///
/// Dropping it without [`finish`](Self::finish) rolls back.
pub struct ManagedTransaction {
    handle: Option<Box<dyn TransactionHandle>>,
    timeout_ms: u64,
}

impl ManagedTransaction {
    fn handle(&mut self) -> AdminResult<&mut Box<dyn TransactionHandle>> {
        self.handle
            .as_mut()
            .ok_or_else(|| AdminError::internal("transaction already finished"))
    }

    pub async fn fetch_all(&mut self, statement: &SqlStatement) -> AdminResult<Vec<Record>> {
        let timeout_ms = self.timeout_ms;
        self.handle()?
            .fetch_all(statement)
            .await
            .map_err(|e| e.into_admin(timeout_ms))
    }

    pub async fn execute(&mut self, statement: &SqlStatement) -> AdminResult<u64> {
        let timeout_ms = self.timeout_ms;
        self.handle()?
            .execute(statement)
            .await
            .map_err(|e| e.into_admin(timeout_ms))
    }

    /// Commits on `Ok`, rolls back on `Err`, and releases the connection
    /// either way. A failed commit is reported in place of the result.
    pub async fn finish<T>(mut self, result: AdminResult<T>) -> AdminResult<T> {
        let Some(handle) = self.handle.take() else {
            return Err(AdminError::internal("transaction already finished"));
        };
        match result {
            Ok(value) => {
                handle
                    .commit()
                    .await
                    .map_err(|e| e.into_admin(self.timeout_ms))?;
                debug!("transaction committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = handle.rollback().await {
                    warn!(error = %rollback_err, "rollback failed; connection discarded");
                } else {
                    debug!(code = %err.code(), "transaction rolled back");
                }
                Err(err)
            }
        }
    }
}
