// SPDX-License-Identifier: Apache-2.0

//! Tablegate - whitelisted, audited PostgreSQL administration as tool calls
//! Core library

pub mod backup;
pub mod commands;
pub mod config;
pub mod engine;
pub mod export;
pub mod interceptor;
pub mod metrics;
pub mod observability;
pub mod tools;

use std::sync::Arc;

use tablegate_core::{AdminResult, Whitelist};
use tracing::info;

use backup::{BackupManager, ProcessRunner, TokioProcessRunner};
use config::AdminConfig;
use engine::drivers::PostgresDriver;
use engine::{
    DataEngine, DataValidator, PgConnectionParams, RecordStore, SchemaCache, SchemaInspector,
    TransactionManager,
};
use export::ExportPipeline;
use interceptor::AuditLogger;

pub use commands::{dispatch, CallContext, ToolResponse};

/// Everything a tool call needs, shared across concurrent calls.
pub struct AppState {
    pub config: AdminConfig,
    pub whitelist: Arc<Whitelist>,
    pub engine: Arc<dyn DataEngine>,
    pub inspector: Arc<SchemaInspector>,
    /// TTL-bounded cache behind the introspection tools.
    pub introspection: SchemaCache,
    pub validator: Arc<DataValidator>,
    pub transactions: Arc<TransactionManager>,
    pub store: Arc<RecordStore>,
    pub audit: Arc<AuditLogger>,
    pub backups: BackupManager,
}

impl AppState {
    /// Connects to the configured database and starts the audit writer.
    pub async fn new(config: AdminConfig) -> AdminResult<Self> {
        let whitelist = config.load_whitelist()?;
        let driver = PostgresDriver::connect(config.database_url.expose(), &config.pool).await?;
        info!(tables = whitelist.tables().count(), "connected to PostgreSQL");
        Self::with_engine(config, whitelist, Arc::new(driver), Arc::new(TokioProcessRunner))
    }

    /// Wires the layers over an existing engine and process runner.
    pub fn with_engine(
        config: AdminConfig,
        whitelist: Whitelist,
        engine: Arc<dyn DataEngine>,
        runner: Arc<dyn ProcessRunner>,
    ) -> AdminResult<Self> {
        let connection = PgConnectionParams::parse(config.database_url.expose())?;
        let whitelist = Arc::new(whitelist);
        let limits = config.query_limits();

        let inspector = Arc::new(SchemaInspector::new(engine.clone()));
        let introspection = SchemaCache::with_ttl(config.schema_cache_ttl());
        let validator = Arc::new(DataValidator::new(inspector.clone()));
        let transactions = Arc::new(TransactionManager::new(
            engine.clone(),
            config.transaction.clone(),
        ));
        let store = Arc::new(RecordStore::new(
            whitelist.clone(),
            limits,
            engine.clone(),
            transactions.clone(),
            validator.clone(),
        ));
        let exports = Arc::new(ExportPipeline::new(
            store.clone(),
            config.backup.export_batch_size,
        ));
        let audit = Arc::new(AuditLogger::start(
            engine.clone(),
            inspector.clone(),
            &whitelist,
            &config.audit,
            limits,
        )?);
        let backups = BackupManager::new(
            config.backup.clone(),
            whitelist.clone(),
            engine.clone(),
            inspector.clone(),
            store.clone(),
            exports,
            validator.clone(),
            runner,
            connection,
        );

        Ok(Self {
            config,
            whitelist,
            engine,
            inspector,
            introspection,
            validator,
            transactions,
            store,
            audit,
            backups,
        })
    }

    /// Flushes queued audit records and closes the pool.
    pub async fn shutdown(&self) {
        self.audit.shutdown().await;
        self.engine.close().await;
        info!("shutdown complete");
    }
}
