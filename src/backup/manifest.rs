// SPDX-License-Identifier: Apache-2.0

//! Backup file naming, path confinement, checksums and manifest I/O

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tablegate_core::{AdminError, AdminResult};
use tokio::io::AsyncReadExt;

use super::types::{BackupKind, BackupManifest};

pub const MANIFEST_SUFFIX: &str = ".manifest.json";

/// `<kind>[_<table>]_<UTC timestamp>.<ext>[.gz]`
pub fn backup_file_name(
    kind: &str,
    table: Option<&str>,
    extension: &str,
    compressed: bool,
    at: DateTime<Utc>,
) -> String {
    let mut name = kind.to_string();
    if let Some(table) = table {
        name.push('_');
        name.push_str(table);
    }
    name.push('_');
    name.push_str(&at.format("%Y%m%dT%H%M%S%3fZ").to_string());
    name.push('.');
    name.push_str(extension);
    if compressed {
        name.push_str(".gz");
    }
    name
}

pub fn backup_kind_file_name(
    kind: BackupKind,
    table: Option<&str>,
    extension: &str,
    compressed: bool,
    at: DateTime<Utc>,
) -> String {
    backup_file_name(kind.prefix(), table, extension, compressed, at)
}

pub fn manifest_path(backup: &Path) -> PathBuf {
    let mut name = backup.as_os_str().to_os_string();
    name.push(MANIFEST_SUFFIX);
    PathBuf::from(name)
}

/// Joins a bare file name onto the backup directory. Anything that could
/// leave the directory is rejected.
pub fn resolve_backup_path(dir: &Path, name: &str) -> AdminResult<PathBuf> {
    let mut components = Path::new(name).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single || name.contains('\\') {
        return Err(AdminError::validation(format!(
            "backup file '{}' must be a plain file name inside the backup directory",
            name
        )));
    }

    if name.ends_with(MANIFEST_SUFFIX) {
        return Err(AdminError::validation(format!(
            "'{}' is a manifest; name the backup file it describes",
            name
        )));
    }

    let candidate = dir.join(name);
    if let (Ok(base), Ok(canonical)) = (std::fs::canonicalize(dir), std::fs::canonicalize(&candidate)) {
        if !canonical.starts_with(&base) {
            return Err(AdminError::validation("backup path escapes backup directory"));
        }
    }
    Ok(candidate)
}

pub async fn sha256_file_hex(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub async fn write_manifest(backup: &Path, manifest: &BackupManifest) -> AdminResult<()> {
    let bytes = serde_json::to_vec_pretty(manifest)
        .map_err(|e| AdminError::internal(format!("cannot encode manifest: {}", e)))?;
    tokio::fs::write(manifest_path(backup), bytes)
        .await
        .map_err(|e| AdminError::backup_failed(format!("cannot write manifest: {}", e)))
}

pub async fn read_manifest(backup: &Path) -> AdminResult<BackupManifest> {
    let path = manifest_path(backup);
    let bytes = tokio::fs::read(&path).await.map_err(|_| {
        AdminError::backup_integrity("backup manifest is missing", file_name(backup))
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        AdminError::backup_integrity(format!("backup manifest is unreadable: {}", e), file_name(backup))
    })
}

pub fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}
