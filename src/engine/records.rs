// SPDX-License-Identifier: Apache-2.0

//! Record reads and writes
//!
//! Every call compiles its statements twice: once without type hints, before
//! any SQL runs, so whitelist and WHERE errors surface first; then against
//! the live column types for execution. Writes run inside one managed
//! transaction per call, batches included.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tablegate_core::{AdminError, AdminResult, Record, SqlStatement, TablePolicy, Whitelist};
use tablegate_query::{ColumnTypes, OnConflict, QueryBuilder, QueryLimits, SelectQuery};
use tracing::debug;

use crate::engine::schema::TableSchema;
use crate::engine::traits::DataEngine;
use crate::engine::transaction::{BatchKind, ManagedTransaction, TransactionManager};
use crate::engine::validator::{DataValidator, WriteMode};

#[derive(Debug, Clone, Serialize)]
pub struct QueryPage {
    pub total: u64,
    pub count: usize,
    pub records: Vec<Record>,
    #[serde(skip)]
    pub statement: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InsertOutcome {
    pub record: Record,
    #[serde(skip)]
    pub statement: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    pub updated: u64,
    pub records: Vec<Record>,
    #[serde(skip)]
    pub statement: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteKind {
    Soft,
    Hard,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub deleted: u64,
    #[serde(rename = "type")]
    pub kind: DeleteKind,
    pub records: Vec<Record>,
    #[serde(skip)]
    pub statement: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchInsertOutcome {
    pub inserted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<Record>>,
    #[serde(skip)]
    pub statement: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchUpdateEntry {
    #[serde(rename = "where")]
    pub filter: Value,
    pub data: Record,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchDeleteEntry {
    #[serde(rename = "where")]
    pub filter: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchEntryResult {
    pub index: usize,
    pub affected: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub affected: u64,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<DeleteKind>,
    pub results: Vec<BatchEntryResult>,
    #[serde(skip)]
    pub statement: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportOutcome {
    pub processed: usize,
    pub written: usize,
    pub skipped: usize,
}

pub struct RecordStore {
    whitelist: Arc<Whitelist>,
    limits: QueryLimits,
    engine: Arc<dyn DataEngine>,
    transactions: Arc<TransactionManager>,
    validator: Arc<DataValidator>,
}

impl RecordStore {
    pub fn new(
        whitelist: Arc<Whitelist>,
        limits: QueryLimits,
        engine: Arc<dyn DataEngine>,
        transactions: Arc<TransactionManager>,
        validator: Arc<DataValidator>,
    ) -> Self {
        Self {
            whitelist,
            limits,
            engine,
            transactions,
            validator,
        }
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    fn builder<'a>(&'a self, types: Option<&'a ColumnTypes>) -> QueryBuilder<'a> {
        let builder = QueryBuilder::new(&self.whitelist).with_limits(self.limits);
        match types {
            Some(types) => builder.with_column_types(types),
            None => builder,
        }
    }

    fn policy(&self, table: &str) -> AdminResult<&TablePolicy> {
        self.whitelist.validate_table(table)
    }

    /// Checks `build` against the whitelist, then loads the live schema.
    async fn prepare<F>(&self, table: &str, build: F) -> AdminResult<(Arc<TableSchema>, ColumnTypes)>
    where
        F: Fn(&QueryBuilder<'_>) -> AdminResult<SqlStatement>,
    {
        build(&self.builder(None))?;
        let schema = self.validator.schema(table).await?;
        let types = schema.column_types();
        Ok((schema, types))
    }

    pub async fn query(&self, query: &SelectQuery) -> AdminResult<QueryPage> {
        self.builder(None).select(query)?;
        self.builder(None).count(query)?;
        let schema = self.validator.schema(&query.table).await?;
        let types = schema.column_types();
        let builder = self.builder(Some(&types));
        let select = builder.select(query)?;
        let count = builder.count(query)?;

        self.transactions
            .bounded(async {
                let totals = self.engine.fetch_all(&count).await?;
                let records = self.engine.fetch_all(&select).await?;
                let total = totals
                    .first()
                    .and_then(|row| row.get("count"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                Ok(QueryPage {
                    total,
                    count: records.len(),
                    records,
                    statement: select.text.clone(),
                })
            })
            .await
    }

    /// One page of rows without a total, for exports and incremental dumps.
    pub async fn page(&self, query: &SelectQuery) -> AdminResult<Vec<Record>> {
        self.builder(None).select(query)?;
        let schema = self.validator.schema(&query.table).await?;
        let types = schema.column_types();
        let select = self.builder(Some(&types)).select(query)?;
        self.transactions
            .bounded(async { Ok(self.engine.fetch_all(&select).await?) })
            .await
    }

    pub async fn schema(&self, table: &str) -> AdminResult<Arc<TableSchema>> {
        self.validator.schema(table).await
    }

    pub fn max_page_size(&self) -> u64 {
        self.limits.max_limit
    }

    pub async fn insert(&self, table: &str, data: &Record) -> AdminResult<InsertOutcome> {
        let (schema, types) = self
            .prepare(table, |b| b.insert(table, data, OnConflict::Error))
            .await?;
        let statement = self.builder(Some(&types)).insert(table, data, OnConflict::Error)?;

        let mut tx = self.transactions.begin().await?;
        let result = self
            .transactions
            .bounded(async {
                self.validator
                    .validate(&mut tx, &schema, data, WriteMode::Insert)
                    .await?;
                first_row(tx.fetch_all(&statement).await?)
            })
            .await;
        let record = tx.finish(result).await?;
        debug!(table, "record inserted");

        Ok(InsertOutcome {
            record,
            statement: statement.text,
        })
    }

    pub async fn update(&self, table: &str, data: &Record, filter: &Value) -> AdminResult<UpdateOutcome> {
        let (schema, types) = self
            .prepare(table, |b| b.update(table, data, Some(filter)))
            .await?;
        let statement = self.builder(Some(&types)).update(table, data, Some(filter))?;
        let current_id = current_id(self.policy(table)?, filter);

        let mut tx = self.transactions.begin().await?;
        let result = self
            .transactions
            .bounded(async {
                self.validator
                    .validate(&mut tx, &schema, data, WriteMode::Update { current_id })
                    .await?;
                tx.fetch_all(&statement).await
            })
            .await;
        let records = tx.finish(result).await?;

        Ok(UpdateOutcome {
            updated: records.len() as u64,
            records,
            statement: statement.text,
        })
    }

    /// `hard: None` soft-deletes where the table supports it.
    pub async fn delete(&self, table: &str, filter: &Value, hard: Option<bool>) -> AdminResult<DeleteOutcome> {
        let kind = self.delete_kind(table, hard)?;
        let build = |b: &QueryBuilder<'_>| match kind {
            DeleteKind::Soft => b.soft_delete(table, Some(filter)),
            DeleteKind::Hard => b.delete(table, Some(filter)),
        };
        let (_, types) = self.prepare(table, build).await?;
        let statement = build(&self.builder(Some(&types)))?;

        let mut tx = self.transactions.begin().await?;
        let result = self.transactions.bounded(tx.fetch_all(&statement)).await;
        let records = tx.finish(result).await?;

        Ok(DeleteOutcome {
            deleted: records.len() as u64,
            kind,
            records,
            statement: statement.text,
        })
    }

    fn delete_kind(&self, table: &str, hard: Option<bool>) -> AdminResult<DeleteKind> {
        let policy = self.policy(table)?;
        Ok(match hard {
            Some(true) => DeleteKind::Hard,
            Some(false) => DeleteKind::Soft,
            None if policy.soft_delete => DeleteKind::Soft,
            None => DeleteKind::Hard,
        })
    }

    pub async fn batch_insert(
        &self,
        table: &str,
        rows: &[Record],
        return_records: bool,
    ) -> AdminResult<BatchInsertOutcome> {
        self.transactions.check_batch_size(BatchKind::Insert, rows.len())?;
        for (index, row) in rows.iter().enumerate() {
            self.builder(None)
                .insert(table, row, OnConflict::Error)
                .map_err(|e| e.at_batch_index(index))?;
        }
        let schema = self.validator.schema(table).await?;
        let types = schema.column_types();
        let builder = self.builder(Some(&types));

        let mut tx = self.transactions.begin().await?;
        let result = self
            .transactions
            .bounded(async {
                let mut inserted = Vec::with_capacity(rows.len());
                let mut first_statement = String::new();
                for (index, row) in rows.iter().enumerate() {
                    let step = async {
                        let statement = builder.insert(table, row, OnConflict::Error)?;
                        self.validator
                            .validate(&mut tx, &schema, row, WriteMode::Insert)
                            .await?;
                        let record = first_row(tx.fetch_all(&statement).await?)?;
                        Ok::<_, AdminError>((statement.text, record))
                    };
                    let (text, record) = step.await.map_err(|e| e.at_batch_index(index))?;
                    if index == 0 {
                        first_statement = text;
                    }
                    inserted.push(record);
                }
                Ok((first_statement, inserted))
            })
            .await;
        let (statement, inserted) = tx.finish(result).await?;
        debug!(table, rows = inserted.len(), "batch inserted");

        Ok(BatchInsertOutcome {
            inserted: inserted.len(),
            records: return_records.then_some(inserted),
            statement,
        })
    }

    pub async fn batch_update(&self, table: &str, entries: &[BatchUpdateEntry]) -> AdminResult<BatchOutcome> {
        self.transactions.check_batch_size(BatchKind::Update, entries.len())?;
        for (index, entry) in entries.iter().enumerate() {
            self.builder(None)
                .update(table, &entry.data, Some(&entry.filter))
                .map_err(|e| e.at_batch_index(index))?;
        }
        let policy = self.policy(table)?;
        let schema = self.validator.schema(table).await?;
        let types = schema.column_types();
        let builder = self.builder(Some(&types));

        let mut tx = self.transactions.begin().await?;
        let result = self
            .transactions
            .bounded(async {
                let mut results = Vec::with_capacity(entries.len());
                let mut first_statement = String::new();
                for (index, entry) in entries.iter().enumerate() {
                    let step = async {
                        let statement = builder.update(table, &entry.data, Some(&entry.filter))?;
                        let current_id = current_id(policy, &entry.filter);
                        self.validator
                            .validate(&mut tx, &schema, &entry.data, WriteMode::Update { current_id })
                            .await?;
                        let affected = tx.fetch_all(&statement).await?.len() as u64;
                        Ok::<_, AdminError>((statement.text, affected))
                    };
                    let (text, affected) = step.await.map_err(|e| e.at_batch_index(index))?;
                    if index == 0 {
                        first_statement = text;
                    }
                    results.push(BatchEntryResult { index, affected });
                }
                Ok((first_statement, results))
            })
            .await;
        let (statement, results) = tx.finish(result).await?;

        Ok(BatchOutcome {
            affected: results.iter().map(|r| r.affected).sum(),
            kind: None,
            results,
            statement,
        })
    }

    pub async fn batch_delete(
        &self,
        table: &str,
        entries: &[BatchDeleteEntry],
        hard: Option<bool>,
    ) -> AdminResult<BatchOutcome> {
        self.transactions.check_batch_size(BatchKind::Delete, entries.len())?;
        let kind = self.delete_kind(table, hard)?;
        let build = |b: &QueryBuilder<'_>, filter: &Value| match kind {
            DeleteKind::Soft => b.soft_delete(table, Some(filter)),
            DeleteKind::Hard => b.delete(table, Some(filter)),
        };
        let mut statements = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            build(&self.builder(None), &entry.filter).map_err(|e| e.at_batch_index(index))?;
        }
        let schema = self.validator.schema(table).await?;
        let types = schema.column_types();
        for entry in entries {
            statements.push(build(&self.builder(Some(&types)), &entry.filter)?);
        }

        let mut tx = self.transactions.begin().await?;
        let result = self
            .transactions
            .bounded(async {
                let mut results = Vec::with_capacity(statements.len());
                for (index, statement) in statements.iter().enumerate() {
                    let affected = tx
                        .fetch_all(statement)
                        .await
                        .map_err(|e| e.at_batch_index(index))?
                        .len() as u64;
                    results.push(BatchEntryResult { index, affected });
                }
                Ok(results)
            })
            .await;
        let results = tx.finish(result).await?;

        Ok(BatchOutcome {
            affected: results.iter().map(|r| r.affected).sum(),
            kind: Some(kind),
            results,
            statement: statements
                .first()
                .map(|s| s.text.clone())
                .unwrap_or_default(),
        })
    }

    /// Writes imported rows in one transaction.
    pub async fn import(&self, table: &str, rows: &[Record], on_conflict: OnConflict) -> AdminResult<ImportOutcome> {
        self.transactions.check_batch_size(BatchKind::Insert, rows.len())?;
        self.replay(&[(table.to_string(), rows.to_vec())], on_conflict).await
    }

    /// Writes rows for several tables in one transaction, in the given order.
    pub async fn replay(
        &self,
        tables: &[(String, Vec<Record>)],
        on_conflict: OnConflict,
    ) -> AdminResult<ImportOutcome> {
        for (table, rows) in tables {
            for (index, row) in rows.iter().enumerate() {
                self.builder(None)
                    .insert(table, row, on_conflict)
                    .map_err(|e| e.at_batch_index(index))?;
            }
        }

        let mut schemas = Vec::with_capacity(tables.len());
        for (table, _) in tables {
            schemas.push(self.validator.schema(table).await?);
        }

        let mut tx = self.transactions.begin().await?;
        let result = self
            .transactions
            .bounded(async {
                let mut outcome = ImportOutcome::default();
                for ((table, rows), schema) in tables.iter().zip(&schemas) {
                    let counts = self
                        .import_into(&mut tx, table, schema, rows, on_conflict)
                        .await?;
                    outcome.processed += counts.processed;
                    outcome.written += counts.written;
                    outcome.skipped += counts.skipped;
                }
                Ok(outcome)
            })
            .await;
        tx.finish(result).await
    }

    async fn import_into(
        &self,
        tx: &mut ManagedTransaction,
        table: &str,
        schema: &TableSchema,
        rows: &[Record],
        on_conflict: OnConflict,
    ) -> AdminResult<ImportOutcome> {
        let types = schema.column_types();
        let builder = self.builder(Some(&types));
        let mode = match on_conflict {
            OnConflict::Error => WriteMode::Insert,
            OnConflict::DoNothing | OnConflict::Upsert => WriteMode::Upsert,
        };

        let mut outcome = ImportOutcome::default();
        for (index, row) in rows.iter().enumerate() {
            let step = async {
                let statement = builder.insert(table, row, on_conflict)?;
                self.validator.validate(tx, schema, row, mode).await?;
                Ok::<_, AdminError>(tx.fetch_all(&statement).await?.len())
            };
            let written = step.await.map_err(|e| e.at_batch_index(index))?;
            outcome.processed += 1;
            if written > 0 {
                outcome.written += 1;
            } else {
                outcome.skipped += 1;
            }
        }
        Ok(outcome)
    }
}

fn first_row(rows: Vec<Record>) -> AdminResult<Record> {
    rows.into_iter()
        .next()
        .ok_or_else(|| AdminError::internal("write returned no row"))
}

/// Primary-key value of a filter that pins a single row.
fn current_id<'a>(policy: &TablePolicy, filter: &'a Value) -> Option<&'a Value> {
    filter
        .get(&policy.primary_key)
        .filter(|v| v.is_string() || v.is_number())
}
