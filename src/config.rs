// SPDX-License-Identifier: Apache-2.0

//! Service configuration
//!
//! Resolution order: built-in defaults, then the JSON file named by
//! `TABLEGATE_CONFIG`, then `DATABASE_URL`, `TABLEGATE_BACKUP_DIR` and
//! `TABLEGATE_LOG` from the environment (a `.env` file is honoured).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tablegate_core::{AdminError, AdminResult, Whitelist};
use tablegate_query::QueryLimits;
use tracing::{debug, info};

use crate::observability::Sensitive;

pub const CONFIG_ENV: &str = "TABLEGATE_CONFIG";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const BACKUP_DIR_ENV: &str = "TABLEGATE_BACKUP_DIR";
pub const LOG_ENV: &str = "TABLEGATE_LOG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminConfig {
    #[serde(default)]
    pub database_url: Sensitive<String>,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub transaction: TransactionConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default = "default_schema_cache_ttl")]
    pub schema_cache_ttl_secs: u64,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub whitelist_file: Option<PathBuf>,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub log_filter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionConfig {
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_ms: u64,
    #[serde(default = "default_max_batch_insert")]
    pub max_batch_insert: usize,
    #[serde(default = "default_max_batch_update")]
    pub max_batch_update: usize,
    #[serde(default = "default_max_batch_delete")]
    pub max_batch_delete: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u64,
    #[serde(default = "default_max_limit")]
    pub max_limit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_audit_table")]
    pub table: String,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfig {
    #[serde(default = "default_backup_dir")]
    pub directory: PathBuf,
    #[serde(default = "default_pg_dump")]
    pub pg_dump_path: String,
    #[serde(default = "default_psql")]
    pub psql_path: String,
    #[serde(default = "default_export_batch")]
    pub export_batch_size: usize,
}

fn default_true() -> bool {
    true
}

fn default_schema_cache_ttl() -> u64 {
    300
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_statement_timeout() -> u64 {
    30_000
}

fn default_max_batch_insert() -> usize {
    1000
}

fn default_max_batch_update() -> usize {
    100
}

fn default_max_batch_delete() -> usize {
    100
}

fn default_limit() -> u64 {
    tablegate_query::builder::DEFAULT_LIMIT
}

fn default_max_limit() -> u64 {
    tablegate_query::builder::MAX_LIMIT
}

fn default_audit_table() -> String {
    "audit_logs".to_string()
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_pg_dump() -> String {
    "pg_dump".to_string()
}

fn default_psql() -> String {
    "psql".to_string()
}

fn default_export_batch() -> usize {
    500
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: 0,
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            statement_timeout_ms: default_statement_timeout(),
            max_batch_insert: default_max_batch_insert(),
            max_batch_update: default_max_batch_update(),
            max_batch_delete: default_max_batch_delete(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            table: default_audit_table(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            directory: default_backup_dir(),
            pg_dump_path: default_pg_dump(),
            psql_path: default_psql(),
            export_batch_size: default_export_batch(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            database_url: Sensitive::default(),
            pool: PoolConfig::default(),
            transaction: TransactionConfig::default(),
            query: QueryConfig::default(),
            schema_cache_ttl_secs: default_schema_cache_ttl(),
            audit: AuditConfig::default(),
            backup: BackupConfig::default(),
            whitelist_file: None,
            log_dir: None,
            log_filter: None,
        }
    }
}

impl AdminConfig {
    /// Loads `.env`, the optional config file, and environment overrides.
    pub fn load() -> AdminResult<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => {
                debug!("No {} set, using default configuration", CONFIG_ENV);
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> AdminResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AdminError::validation(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config: AdminConfig = serde_json::from_str(&content).map_err(|e| {
            AdminError::validation(format!("Failed to parse config {}: {}", path.display(), e))
        })?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Environment values win over file values.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(DATABASE_URL_ENV).filter(|v| !v.is_empty()) {
            self.database_url = Sensitive::new(url);
        }
        if let Some(dir) = lookup(BACKUP_DIR_ENV).filter(|v| !v.is_empty()) {
            self.backup.directory = PathBuf::from(dir);
        }
        if let Some(filter) = lookup(LOG_ENV).filter(|v| !v.is_empty()) {
            self.log_filter = Some(filter);
        }
    }

    pub fn validate(&self) -> AdminResult<()> {
        if self.query.default_limit == 0 || self.query.default_limit > self.query.max_limit {
            return Err(AdminError::validation(
                "query.defaultLimit must be between 1 and query.maxLimit",
            ));
        }
        if self.audit.queue_capacity == 0 {
            return Err(AdminError::validation("audit.queueCapacity must be positive"));
        }
        if self.backup.export_batch_size == 0 {
            return Err(AdminError::validation("backup.exportBatchSize must be positive"));
        }
        if self.pool.max_connections == 0 {
            return Err(AdminError::validation("pool.maxConnections must be positive"));
        }
        Ok(())
    }

    pub fn load_whitelist(&self) -> AdminResult<Whitelist> {
        match &self.whitelist_file {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    AdminError::validation(format!(
                        "Failed to read whitelist {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                let whitelist = Whitelist::from_json(&content)?;
                info!(tables = whitelist.tables().count(), "Loaded whitelist from {:?}", path);
                Ok(whitelist)
            }
            None => Ok(Whitelist::builtin()),
        }
    }

    pub fn query_limits(&self) -> QueryLimits {
        QueryLimits {
            default_limit: self.query.default_limit,
            max_limit: self.query.max_limit,
        }
    }

    pub fn schema_cache_ttl(&self) -> Option<Duration> {
        (self.schema_cache_ttl_secs > 0).then(|| Duration::from_secs(self.schema_cache_ttl_secs))
    }
}
