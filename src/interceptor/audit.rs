// SPDX-License-Identifier: Apache-2.0

//! Audit Logger
//!
//! Callers enqueue [`AuditRecord`]s on a bounded channel and return at once.
//! A background task inserts them into the audit table. A full queue drops
//! the record; a failed insert is logged. Neither reaches the caller.
//!
//! The audit table itself is never audited.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tablegate_core::whitelist::AUDIT_COLUMNS;
use tablegate_core::{AdminResult, Record, SqlStatement, TableCategory, TablePolicy, Whitelist};
use tablegate_query::{
    quote_ident, ColumnTypes, OnConflict, Params, QueryBuilder, QueryLimits, SelectQuery, WhereClause,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::types::{AuditFilters, AuditRecord, AuditSummary};
use crate::config::AuditConfig;
use crate::engine::{DataEngine, SchemaInspector};
use crate::metrics;

pub struct AuditLogger {
    sender: Mutex<Option<mpsc::Sender<AuditRecord>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    registry: Arc<Whitelist>,
    table: String,
    engine: Arc<dyn DataEngine>,
    inspector: Arc<SchemaInspector>,
    limits: QueryLimits,
}

impl AuditLogger {
    /// Starts the writer task. Must be called inside a tokio runtime.
    pub fn start(
        engine: Arc<dyn DataEngine>,
        inspector: Arc<SchemaInspector>,
        whitelist: &Whitelist,
        config: &AuditConfig,
        limits: QueryLimits,
    ) -> AdminResult<Self> {
        let registry = Arc::new(audit_registry(whitelist, &config.table)?);

        let (sender, worker) = if config.enabled {
            let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
            let writer = AuditWriter {
                engine: engine.clone(),
                inspector: inspector.clone(),
                registry: registry.clone(),
                table: config.table.clone(),
                column_types: None,
            };
            let handle = tokio::spawn(writer.run(rx));
            info!(table = %config.table, capacity = config.queue_capacity, "audit logger started");
            (Some(tx), Some(handle))
        } else {
            info!("audit logging disabled");
            (None, None)
        };

        Ok(Self {
            sender: Mutex::new(sender),
            worker: Mutex::new(worker),
            registry,
            table: config.table.clone(),
            engine,
            inspector,
            limits,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn is_audit_table(&self, table: &str) -> bool {
        table == self.table
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Enqueues a record without waiting.
    pub fn log(&self, record: AuditRecord) {
        if record.table.as_deref().is_some_and(|t| self.is_audit_table(t)) {
            return;
        }
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return;
        };
        match sender.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                metrics::record_audit_dropped();
                warn!(operation = %record.operation, "audit queue full; record dropped");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("audit writer stopped; record discarded");
            }
        }
    }

    /// Closes the queue and waits for queued records to be written.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());
        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            if let Err(e) = handle.await {
                warn!(error = %e, "audit writer ended abnormally");
            }
        }
    }

    async fn column_types(&self) -> ColumnTypes {
        match self.inspector.describe_table(&self.table).await {
            Ok(schema) => schema.column_types(),
            Err(e) => {
                warn!(error = %e, "audit table metadata unavailable");
                ColumnTypes::new()
            }
        }
    }

    fn builder<'a>(&'a self, types: &'a ColumnTypes) -> QueryBuilder<'a> {
        QueryBuilder::new(&self.registry)
            .with_limits(self.limits)
            .with_column_types(types)
    }

    /// Newest entries first.
    pub async fn query(&self, filters: &AuditFilters) -> AdminResult<(u64, Vec<Record>)> {
        let types = self.column_types().await;
        let mut query = SelectQuery::table(self.table.clone())
            .with_filter(filters.to_where())
            .with_order(Value::String("timestamp DESC".into()));
        query.limit = filters.limit;
        query.offset = filters.offset;

        let builder = self.builder(&types);
        let select = builder.select(&query)?;
        let count = builder.count(&query)?;

        let total = self
            .engine
            .fetch_all(&count)
            .await?
            .first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let records = self.engine.fetch_all(&select).await?;
        Ok((total, records))
    }

    pub async fn summary(&self, filters: &AuditFilters) -> AdminResult<AuditSummary> {
        let types = self.column_types().await;
        let policy = self.registry.validate_table(&self.table)?;
        let clause = WhereClause::parse(policy, Some(&filters.to_where()))?;
        let table = quote_ident(&self.table);

        let compile = |select: &str, tail: &str| {
            let mut params = Params::new();
            let mut sql = format!("{} FROM {}", select, table);
            if let Some(where_sql) = clause.compile(&mut params, Some(&types)) {
                sql.push_str(" WHERE ");
                sql.push_str(&where_sql);
            }
            sql.push_str(tail);
            SqlStatement::new(sql, params.into_values())
        };

        let totals = compile(
            "SELECT COUNT(*) AS \"total\", \
             COUNT(*) FILTER (WHERE \"success\") AS \"successful\", \
             COUNT(*) FILTER (WHERE NOT \"success\") AS \"failed\", \
             AVG(\"execution_time_ms\")::float8 AS \"avg_ms\"",
            "",
        );
        let by_operation = compile(
            "SELECT \"operation\" AS \"key\", COUNT(*) AS \"count\"",
            " GROUP BY \"operation\"",
        );
        let by_table = compile(
            "SELECT \"table_name\" AS \"key\", COUNT(*) AS \"count\"",
            " GROUP BY \"table_name\"",
        );

        let mut summary = AuditSummary::default();
        if let Some(row) = self.engine.fetch_all(&totals).await?.first() {
            summary.total = row.get("total").and_then(Value::as_u64).unwrap_or(0);
            summary.successful = row.get("successful").and_then(Value::as_u64).unwrap_or(0);
            summary.failed = row.get("failed").and_then(Value::as_u64).unwrap_or(0);
            summary.avg_execution_time_ms = row.get("avg_ms").and_then(Value::as_f64);
        }
        summary.by_operation = grouped(self.engine.fetch_all(&by_operation).await?);
        summary.by_table = grouped(self.engine.fetch_all(&by_table).await?);
        Ok(summary)
    }
}

fn grouped(rows: Vec<Record>) -> std::collections::BTreeMap<String, u64> {
    rows.into_iter()
        .filter_map(|row| {
            let key = row.get("key").and_then(Value::as_str)?.to_string();
            let count = row.get("count").and_then(Value::as_u64)?;
            Some((key, count))
        })
        .collect()
}

/// Registry holding only the audit table, as listed in `whitelist` or with
/// the default audit columns.
fn audit_registry(whitelist: &Whitelist, table: &str) -> AdminResult<Whitelist> {
    let policy = whitelist.get(table).cloned().unwrap_or_else(|| {
        TablePolicy::new(table, &AUDIT_COLUMNS).with_category(TableCategory::AdminOnly)
    });
    let mut registry = Whitelist::new();
    registry.insert(policy)?;
    Ok(registry)
}

struct AuditWriter {
    engine: Arc<dyn DataEngine>,
    inspector: Arc<SchemaInspector>,
    registry: Arc<Whitelist>,
    table: String,
    column_types: Option<ColumnTypes>,
}

impl AuditWriter {
    async fn run(mut self, mut rx: mpsc::Receiver<AuditRecord>) {
        while let Some(record) = rx.recv().await {
            self.write(&record).await;
        }
        debug!("audit writer drained");
    }

    async fn write(&mut self, record: &AuditRecord) {
        if self.column_types.is_none() {
            match self.inspector.describe_table(&self.table).await {
                Ok(schema) => self.column_types = Some(schema.column_types()),
                Err(e) => warn!(error = %e, "audit table metadata unavailable; writing untyped"),
            }
        }

        let Some(policy) = self.registry.get(&self.table) else {
            return;
        };
        let row = record.to_row(policy);

        let mut builder = QueryBuilder::new(&self.registry);
        if let Some(types) = &self.column_types {
            builder = builder.with_column_types(types);
        }
        let outcome = match builder.insert(&self.table, &row, OnConflict::Error) {
            Ok(statement) => self.engine.execute(&statement).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(_) => metrics::record_audit_written(),
            Err(e) => {
                metrics::record_audit_failed();
                warn!(operation = %record.operation, error = %e, "failed to write audit record");
            }
        }
    }
}
