// SPDX-License-Identifier: Apache-2.0

//! Backup and restore orchestration
//!
//! Full and table backups are `pg_dump` plain-SQL dumps; incremental backups
//! are JSON documents of changed rows. Every backup gets a sidecar manifest
//! carrying its SHA-256 checksum, which restore and validation recompute.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_compression::tokio::bufread::GzipDecoder;
use async_compression::tokio::write::GzipEncoder;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tablegate_core::{
    validate_table_access, AdminError, AdminResult, Operation, Record, Whitelist,
};
use tablegate_query::{quote_ident, SelectQuery};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::manifest::{
    backup_file_name, backup_kind_file_name, file_name, manifest_path, read_manifest,
    resolve_backup_path, sha256_file_hex, write_manifest, MANIFEST_SUFFIX,
};
use super::process::{ProcessRunner, ProcessSpec};
use super::types::*;
use crate::config::BackupConfig;
use crate::engine::records::{ImportOutcome, RecordStore};
use crate::engine::{DataEngine, DataValidator, PgConnectionParams, SchemaInspector};
use crate::export::{parse_csv_rows, parse_json_rows, ExportFormat, ExportPipeline, ExportSummary};

pub struct BackupManager {
    config: BackupConfig,
    whitelist: Arc<Whitelist>,
    engine: Arc<dyn DataEngine>,
    inspector: Arc<SchemaInspector>,
    store: Arc<RecordStore>,
    exports: Arc<ExportPipeline>,
    validator: Arc<DataValidator>,
    runner: Arc<dyn ProcessRunner>,
    connection: PgConnectionParams,
}

impl BackupManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: BackupConfig,
        whitelist: Arc<Whitelist>,
        engine: Arc<dyn DataEngine>,
        inspector: Arc<SchemaInspector>,
        store: Arc<RecordStore>,
        exports: Arc<ExportPipeline>,
        validator: Arc<DataValidator>,
        runner: Arc<dyn ProcessRunner>,
        connection: PgConnectionParams,
    ) -> Self {
        Self {
            config,
            whitelist,
            engine,
            inspector,
            store,
            exports,
            validator,
            runner,
            connection,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    async fn ensure_directory(&self) -> AdminResult<()> {
        tokio::fs::create_dir_all(&self.config.directory)
            .await
            .map_err(|e| AdminError::backup_failed(format!("cannot create backup directory: {}", e)))
    }

    /// Whitelisted tables a full backup may read, in whitelist order.
    fn dumpable_tables(&self) -> Vec<String> {
        self.whitelist
            .tables()
            .filter(|p| validate_table_access(&self.whitelist, &p.name, Operation::BackupFull).is_ok())
            .map(|p| p.name.clone())
            .collect()
    }

    async fn count_rows(&self, table: &str) -> AdminResult<u64> {
        let mut query = SelectQuery::table(table).paged(1, 0);
        query.include_deleted = true;
        Ok(self.store.query(&query).await?.total)
    }

    fn dump_spec(&self, tables: &[String], data_only: bool, schema_only: bool) -> ProcessSpec {
        let mut args = self.connection.cli_args();
        args.extend(
            ["--format=plain", "--no-owner", "--no-privileges", "--encoding=UTF8"].map(String::from),
        );
        if data_only {
            args.push("--data-only".into());
        }
        if schema_only {
            args.push("--schema-only".into());
        }
        for table in tables {
            args.push(format!("--table={}", quote_ident(table)));
        }
        ProcessSpec::new(self.config.pg_dump_path.clone())
            .args(args)
            .envs(self.connection.env())
    }

    /// Streams `pg_dump` into `path`, gzipping on the way when asked.
    async fn dump_to(&self, spec: &ProcessSpec, path: &Path, compress: bool) -> AdminResult<()> {
        let file = tokio::fs::File::create(path)
            .await
            .map_err(|e| AdminError::backup_failed(format!("cannot create backup file: {}", e)))?;

        let result = if compress {
            let mut encoder = GzipEncoder::new(file);
            let output = self.runner.run_to_writer(spec, &mut encoder).await;
            finish_writer(&mut encoder, output).await
        } else {
            let mut file = file;
            let output = self.runner.run_to_writer(spec, &mut file).await;
            finish_writer(&mut file, output).await
        };

        let failure = match result {
            Ok(output) if output.success() => None,
            Ok(output) => Some(format!(
                "{} exited with status {:?}: {}",
                spec.program,
                output.status,
                output.last_error_line()
            )),
            Err(e) => Some(format!("{} failed: {}", spec.program, e)),
        };
        if let Some(message) = failure {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(error = %e, "failed to remove partial backup file");
            }
            return Err(AdminError::backup_failed(message));
        }
        Ok(())
    }

    async fn seal(&self, path: &Path, mut manifest: BackupManifest) -> AdminResult<BackupManifest> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| AdminError::backup_failed(format!("cannot stat backup file: {}", e)))?
            .len();
        manifest.size = size;
        manifest.checksum = sha256_file_hex(path)
            .await
            .map_err(|e| AdminError::backup_failed(format!("cannot checksum backup file: {}", e)))?;
        write_manifest(path, &manifest).await?;
        info!(
            file = %manifest.file,
            kind = manifest.kind.prefix(),
            tables = manifest.tables.len(),
            records = manifest.record_count,
            size,
            "backup written"
        );
        Ok(manifest)
    }

    fn new_manifest(&self, kind: BackupKind, file: &str, tables: Vec<String>, at: DateTime<Utc>) -> BackupManifest {
        BackupManifest {
            backup_id: Uuid::new_v4().to_string(),
            kind,
            timestamp: at,
            file: file.to_string(),
            tables,
            record_count: 0,
            size: 0,
            compressed: false,
            checksum: String::new(),
            dependencies: Vec::new(),
            data_only: false,
            schema_only: false,
            since: None,
            skipped: Vec::new(),
            description: None,
        }
    }

    #[instrument(skip(self, options))]
    pub async fn backup_full(&self, options: &FullBackupOptions) -> AdminResult<BackupManifest> {
        let present = self.inspector.list_tables().await?;
        let tables: Vec<String> = self
            .dumpable_tables()
            .into_iter()
            .filter(|t| present.contains(t))
            .collect();
        if tables.is_empty() {
            return Err(AdminError::validation("no whitelisted tables exist to back up"));
        }

        let mut record_count = 0;
        for table in &tables {
            record_count += self.count_rows(table).await?;
        }

        self.ensure_directory().await?;
        let at = Utc::now();
        let name = backup_kind_file_name(BackupKind::Full, None, "sql", options.compress, at);
        let path = resolve_backup_path(&self.config.directory, &name)?;

        let spec = self.dump_spec(&tables, !options.include_schema, false);
        self.dump_to(&spec, &path, options.compress).await?;

        let mut manifest = self.new_manifest(BackupKind::Full, &name, tables, at);
        manifest.record_count = record_count;
        manifest.compressed = options.compress;
        manifest.data_only = !options.include_schema;
        manifest.description = options.description.clone();
        self.seal(&path, manifest).await
    }

    #[instrument(skip(self, options), fields(table = %options.table))]
    pub async fn backup_table(&self, options: &TableBackupOptions) -> AdminResult<BackupManifest> {
        if options.data_only && options.schema_only {
            return Err(AdminError::validation(
                "dataOnly and schemaOnly cannot both be set",
            ));
        }
        validate_table_access(&self.whitelist, &options.table, Operation::BackupTable)?;

        let record_count = if options.schema_only {
            0
        } else {
            self.count_rows(&options.table).await?
        };

        self.ensure_directory().await?;
        let at = Utc::now();
        let name = backup_kind_file_name(
            BackupKind::Table,
            Some(&options.table),
            "sql",
            options.compress,
            at,
        );
        let path = resolve_backup_path(&self.config.directory, &name)?;

        let tables = vec![options.table.clone()];
        let spec = self.dump_spec(&tables, options.data_only, options.schema_only);
        self.dump_to(&spec, &path, options.compress).await?;

        let mut manifest = self.new_manifest(BackupKind::Table, &name, tables, at);
        manifest.record_count = record_count;
        manifest.compressed = options.compress;
        manifest.data_only = options.data_only;
        manifest.schema_only = options.schema_only;
        self.seal(&path, manifest).await
    }

    /// Rows changed since `since` in every requested table, keyed by table.
    ///
    /// Tables without `updated_at` or `created_at` cannot be filtered by
    /// time; they are skipped and listed in the manifest.
    #[instrument(skip(self, options))]
    pub async fn backup_incremental(
        &self,
        options: &IncrementalBackupOptions,
    ) -> AdminResult<BackupManifest> {
        let base = self
            .newest(BackupKind::Full)
            .await?
            .ok_or_else(|| {
                AdminError::validation("incremental backup requires an existing full backup")
            })?;
        let since = options.since.unwrap_or(base.timestamp);

        let requested = match &options.tables {
            Some(tables) => {
                for table in tables {
                    validate_table_access(&self.whitelist, table, Operation::BackupIncremental)?;
                }
                tables.clone()
            }
            None => {
                let present = self.inspector.list_tables().await?;
                self.dumpable_tables()
                    .into_iter()
                    .filter(|t| present.contains(t))
                    .collect()
            }
        };

        let mut document = Map::new();
        let mut tables = Vec::new();
        let mut skipped = Vec::new();
        let mut record_count = 0u64;
        for table in requested {
            let policy = self.whitelist.validate_table(&table)?;
            let Some(column) = policy.change_tracking_column() else {
                warn!(table = %table, "no updated_at/created_at column; skipped from incremental backup");
                skipped.push(table);
                continue;
            };
            let mut query = SelectQuery::table(table.clone())
                .with_filter(json!({ column: { "$gte": since.to_rfc3339() } }));
            query.include_deleted = true;
            let rows = self.exports.collect(&query).await?;
            record_count += rows.len() as u64;
            document.insert(table.clone(), Value::Array(rows.into_iter().map(Value::Object).collect()));
            tables.push(table);
        }

        let bytes = serde_json::to_vec(&Value::Object(document))
            .map_err(|e| AdminError::internal(format!("cannot encode incremental backup: {}", e)))?;

        self.ensure_directory().await?;
        let at = Utc::now();
        let name = backup_kind_file_name(BackupKind::Incremental, None, "json", options.compress, at);
        let path = resolve_backup_path(&self.config.directory, &name)?;
        write_bytes(&path, &bytes, options.compress).await?;

        let mut manifest = self.new_manifest(BackupKind::Incremental, &name, tables, at);
        manifest.record_count = record_count;
        manifest.compressed = options.compress;
        manifest.data_only = true;
        manifest.dependencies = vec![base.file];
        manifest.since = Some(since);
        manifest.skipped = skipped;
        self.seal(&path, manifest).await
    }

    #[instrument(skip(self, options), fields(table = %options.table))]
    pub async fn export(&self, options: &ExportOptions, format: ExportFormat) -> AdminResult<ExportSummary> {
        let mut query = SelectQuery::table(options.table.clone());
        query.filter = options.filter.clone();
        query.columns = options.columns.clone();
        query.include_deleted = options.include_deleted;

        self.ensure_directory().await?;
        let name = backup_file_name(
            "export",
            Some(&options.table),
            format.extension(),
            false,
            Utc::now(),
        );
        let path = resolve_backup_path(&self.config.directory, &name)?;
        self.exports.export_to_file(&query, format, &path).await
    }

    #[instrument(skip(self, options), fields(table = %options.table))]
    pub async fn import(&self, options: &ImportOptions, format: ExportFormat) -> AdminResult<ImportOutcome> {
        let rows = match format {
            ExportFormat::Json => match &options.data {
                Value::String(text) => {
                    let parsed: Value = serde_json::from_str(text)
                        .map_err(|e| AdminError::validation(format!("import data is not valid JSON: {}", e)))?;
                    parse_json_rows(&parsed)?
                }
                other => parse_json_rows(other)?,
            },
            ExportFormat::Csv => {
                let text = options
                    .data
                    .as_str()
                    .ok_or_else(|| AdminError::validation("CSV import data must be a string"))?;
                let schema = self.store.schema(&options.table).await?;
                parse_csv_rows(text, &schema)?
            }
        };
        if rows.is_empty() {
            return Err(AdminError::validation("import data contains no rows"));
        }
        self.store
            .import(&options.table, &rows, options.mode.on_conflict())
            .await
    }

    /// Checks a backup file against its manifest and its dependencies.
    async fn verify(&self, backup_file: &str) -> AdminResult<(PathBuf, BackupManifest, String)> {
        let path = resolve_backup_path(&self.config.directory, backup_file)?;
        let manifest = read_manifest(&path).await?;
        let integrity = |message: String| AdminError::backup_integrity(message, Some(backup_file.to_string()));

        if manifest.file != backup_file {
            return Err(integrity("manifest describes a different file".into()));
        }
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|_| integrity("backup file is missing".into()))?;
        if metadata.len() != manifest.size {
            return Err(integrity(format!(
                "size mismatch: manifest records {} bytes, file has {}",
                manifest.size,
                metadata.len()
            )));
        }
        let checksum = sha256_file_hex(&path)
            .await
            .map_err(|e| integrity(format!("cannot read backup file: {}", e)))?;
        if checksum != manifest.checksum {
            return Err(integrity("checksum mismatch".into()));
        }

        if manifest.kind == BackupKind::Incremental && manifest.dependencies.is_empty() {
            return Err(integrity("incremental backup records no base backup".into()));
        }
        for dependency in &manifest.dependencies {
            let dep_path = resolve_backup_path(&self.config.directory, dependency)
                .map_err(|_| integrity(format!("invalid base backup reference '{}'", dependency)))?;
            if tokio::fs::metadata(&dep_path).await.is_err() {
                return Err(integrity(format!("base backup '{}' is missing", dependency)));
            }
        }
        Ok((path, manifest, checksum))
    }

    #[instrument(skip(self))]
    pub async fn validate_backup(&self, backup_file: &str) -> AdminResult<BackupValidation> {
        let (_, manifest, checksum) = self.verify(backup_file).await?;
        Ok(BackupValidation {
            backup_file: backup_file.to_string(),
            valid: true,
            checksum,
            size: manifest.size,
            kind: manifest.kind,
            dependencies: manifest.dependencies,
        })
    }

    #[instrument(skip(self, options), fields(file = %options.backup_file))]
    pub async fn restore_full(&self, options: &RestoreOptions) -> AdminResult<RestoreSummary> {
        self.restore(options, None).await
    }

    #[instrument(skip(self, options), fields(file = %options.backup_file))]
    pub async fn restore_table(&self, options: &RestoreOptions) -> AdminResult<RestoreSummary> {
        let table = options
            .table
            .as_deref()
            .ok_or_else(|| AdminError::validation("restore_table requires 'table'"))?;
        self.restore(options, Some(table)).await
    }

    async fn restore(&self, options: &RestoreOptions, only: Option<&str>) -> AdminResult<RestoreSummary> {
        let (path, manifest, _) = self.verify(&options.backup_file).await?;

        let tables: Vec<String> = match only {
            Some(table) => {
                if !manifest.tables.iter().any(|t| t == table) {
                    return Err(AdminError::validation(format!(
                        "backup '{}' does not contain table '{}'",
                        manifest.file, table
                    )));
                }
                if manifest.kind == BackupKind::Full {
                    return Err(AdminError::validation(
                        "a full backup can only be restored with restore_full",
                    ));
                }
                vec![table.to_string()]
            }
            None => manifest.tables.clone(),
        };
        let operation = if only.is_some() {
            Operation::RestoreTable
        } else {
            Operation::RestoreFull
        };
        for table in &tables {
            validate_table_access(&self.whitelist, table, operation)?;
        }

        self.engine.health_check().await?;

        let result = if manifest.kind == BackupKind::Incremental {
            self.replay_incremental(&path, &manifest, &tables, options).await
        } else {
            self.run_restore(&path, &manifest, &tables, options).await
        };
        self.validator.invalidate_all();

        let (dropped_existing, rows) = result?;
        info!(file = %manifest.file, tables = tables.len(), "restore complete");
        Ok(RestoreSummary {
            backup_file: manifest.file.clone(),
            kind: manifest.kind,
            tables,
            dropped_existing,
            rows,
        })
    }

    async fn run_restore(
        &self,
        path: &Path,
        manifest: &BackupManifest,
        tables: &[String],
        options: &RestoreOptions,
    ) -> AdminResult<(bool, Option<ImportOutcome>)> {
        let dropped = options.drops_first() && !manifest.schema_only;
        if dropped && options.continues_on_error() {
            return Err(AdminError::validation(
                "dropExisting cannot be combined with skipErrors or onConflict 'skip'",
            ));
        }
        let prologue = if dropped {
            clear_statement(manifest, tables)
        } else {
            String::new()
        };

        let mut args = self.connection.cli_args();
        args.extend(["--quiet", "--no-psqlrc"].map(String::from));
        if !options.continues_on_error() {
            args.extend(["-v", "ON_ERROR_STOP=1", "--single-transaction"].map(String::from));
        }
        let spec = ProcessSpec::new(self.config.psql_path.clone())
            .args(args)
            .envs(self.connection.env());

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| AdminError::backup_failed(format!("cannot open backup file: {}", e)))?;
        // The clearing statement shares psql's single transaction with the load.
        let prologue = std::io::Cursor::new(prologue.into_bytes());
        let fed = if manifest.compressed {
            let mut source = prologue.chain(GzipDecoder::new(BufReader::new(file)));
            self.runner.run_from_reader(&spec, &mut source).await
        } else {
            let mut source = prologue.chain(file);
            self.runner.run_from_reader(&spec, &mut source).await
        };
        let output =
            fed.map_err(|e| AdminError::backup_failed(format!("{} failed: {}", spec.program, e)))?;

        if !output.success() {
            return Err(AdminError::backup_failed(format!(
                "{} exited with status {:?}: {}",
                spec.program,
                output.status,
                output.last_error_line()
            )));
        }
        if !output.stderr.trim().is_empty() {
            warn!(file = %manifest.file, stderr = %output.last_error_line(), "restore reported errors");
        }
        Ok((dropped, None))
    }

    async fn replay_incremental(
        &self,
        path: &Path,
        manifest: &BackupManifest,
        tables: &[String],
        options: &RestoreOptions,
    ) -> AdminResult<(bool, Option<ImportOutcome>)> {
        let bytes = read_bytes(path, manifest.compressed).await?;
        let mut document: Map<String, Value> = serde_json::from_slice(&bytes).map_err(|e| {
            AdminError::backup_integrity(
                format!("incremental backup is not a JSON object: {}", e),
                Some(manifest.file.clone()),
            )
        })?;

        let mut batches: Vec<(String, Vec<Record>)> = Vec::with_capacity(tables.len());
        for table in tables {
            let rows = match document.remove(table) {
                Some(value) => parse_json_rows(&value)?,
                None => Vec::new(),
            };
            batches.push((table.clone(), rows));
        }
        if batches.iter().all(|(_, rows)| rows.is_empty()) {
            return Ok((false, Some(ImportOutcome::default())));
        }

        let outcome = self
            .store
            .replay(&batches, options.on_conflict.on_conflict())
            .await?;
        Ok((false, Some(outcome)))
    }

    async fn manifests(&self) -> AdminResult<Vec<BackupManifest>> {
        let mut entries = match tokio::fs::read_dir(&self.config.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(AdminError::backup_failed(format!(
                    "cannot read backup directory: {}",
                    e
                )))
            }
        };

        let mut manifests = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AdminError::backup_failed(format!("cannot read backup directory: {}", e)))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(backup) = name.strip_suffix(MANIFEST_SUFFIX) else {
                continue;
            };
            match read_manifest(&self.config.directory.join(backup)).await {
                Ok(manifest) => manifests.push(manifest),
                Err(e) => warn!(manifest = %name, error = %e, "skipping unreadable manifest"),
            }
        }
        manifests.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(manifests)
    }

    async fn newest(&self, kind: BackupKind) -> AdminResult<Option<BackupManifest>> {
        Ok(self.manifests().await?.into_iter().find(|m| m.kind == kind))
    }

    /// Newest first.
    pub async fn list_backups(&self, kind: Option<BackupKind>) -> AdminResult<Vec<BackupListing>> {
        let mut listings = Vec::new();
        for manifest in self.manifests().await? {
            if kind.is_some_and(|k| k != manifest.kind) {
                continue;
            }
            let file_present = tokio::fs::metadata(self.config.directory.join(&manifest.file))
                .await
                .is_ok();
            listings.push(BackupListing {
                manifest,
                file_present,
            });
        }
        Ok(listings)
    }

    #[instrument(skip(self))]
    pub async fn delete_backup(&self, backup_file: &str) -> AdminResult<DeletedBackup> {
        let path = resolve_backup_path(&self.config.directory, backup_file)?;

        let dependents: Vec<String> = self
            .manifests()
            .await?
            .into_iter()
            .filter(|m| m.dependencies.iter().any(|d| d == backup_file))
            .map(|m| m.file)
            .collect();
        if !dependents.is_empty() {
            return Err(AdminError::validation(format!(
                "backup '{}' is the base of {}",
                backup_file,
                dependents.join(", ")
            )));
        }

        let removed_file = remove_if_present(&path).await?;
        let removed_manifest = remove_if_present(&manifest_path(&path)).await?;
        if !removed_file && !removed_manifest {
            return Err(AdminError::not_found(format!("backup '{}' not found", backup_file)));
        }
        info!(file = %backup_file, "backup deleted");
        Ok(DeletedBackup {
            backup_file: file_name(&path).unwrap_or_else(|| backup_file.to_string()),
            deleted: true,
        })
    }
}

/// One `DROP`/`TRUNCATE` naming every restored table, so dependencies among
/// them need no `CASCADE` and outside dependents make PostgreSQL refuse.
fn clear_statement(manifest: &BackupManifest, tables: &[String]) -> String {
    let targets = tables.iter().map(|t| quote_ident(t)).collect::<Vec<_>>().join(", ");
    if manifest.carries_schema() {
        format!("DROP TABLE IF EXISTS {};\n", targets)
    } else {
        format!("TRUNCATE TABLE {};\n", targets)
    }
}

/// Flushes (and for gzip, finalises) the writer after the child exits.
async fn finish_writer<W, T>(writer: &mut W, output: std::io::Result<T>) -> std::io::Result<T>
where
    W: AsyncWrite + Unpin,
{
    let output = output?;
    writer.shutdown().await?;
    Ok(output)
}

async fn write_bytes(path: &Path, bytes: &[u8], compress: bool) -> AdminResult<()> {
    let failed = |e: std::io::Error| AdminError::backup_failed(format!("cannot write backup file: {}", e));
    let file = tokio::fs::File::create(path).await.map_err(failed)?;
    if compress {
        let mut encoder = GzipEncoder::new(file);
        encoder.write_all(bytes).await.map_err(failed)?;
        encoder.shutdown().await.map_err(failed)?;
    } else {
        let mut file = file;
        file.write_all(bytes).await.map_err(failed)?;
        file.shutdown().await.map_err(failed)?;
    }
    Ok(())
}

async fn read_bytes(path: &Path, compressed: bool) -> AdminResult<Vec<u8>> {
    let failed = |e: std::io::Error| AdminError::backup_failed(format!("cannot read backup file: {}", e));
    let file = tokio::fs::File::open(path).await.map_err(failed)?;
    let mut reader: Box<dyn AsyncRead + Unpin + Send> = if compressed {
        Box::new(GzipDecoder::new(BufReader::new(file)))
    } else {
        Box::new(file)
    };
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).await.map_err(failed)?;
    Ok(bytes)
}

async fn remove_if_present(path: &Path) -> AdminResult<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(AdminError::backup_failed(format!("cannot delete {}: {}", path.display(), e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn compressed_bytes_read_back_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("incremental_x.json.gz");
        write_bytes(&path, br#"{"books":[]}"#, true).await.unwrap();

        let raw = tokio::fs::read(&path).await.unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);
        assert_eq!(read_bytes(&path, true).await.unwrap(), br#"{"books":[]}"#);
    }

    #[tokio::test]
    async fn removing_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!remove_if_present(&dir.path().join("nope")).await.unwrap());
    }
}
