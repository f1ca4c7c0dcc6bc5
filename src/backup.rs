//! Backup manager.
//!
//! Snapshots every configured markdown source plus a database dump into
//! `backups/<timestamp>/` with a checksum manifest. A backup is valid
//! only while its manifest checksums match recomputation; an invalid
//! backup blocks anything that depends on it. `restore` is
//! operator-invoked and not part of the automated migration path.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, SqlitePool};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::MigrateError;
use crate::models::Domain;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MARKDOWN_DIR: &str = "markdown_files";
pub const DUMP_FILE: &str = "database_dump";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub created_at: DateTime<Utc>,
    pub files: Vec<ManifestEntry>,
    pub dump: ManifestEntry,
}

#[derive(Debug, Clone)]
pub struct Backup {
    pub dir: PathBuf,
    pub manifest: Manifest,
}

/// Snapshot all configured markdown sources and dump the database.
pub async fn create_backup(config: &Config, pool: &SqlitePool) -> Result<Backup, MigrateError> {
    let label = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let dir = config.backup.dir.join(&label);
    let markdown_dir = dir.join(MARKDOWN_DIR);
    fs::create_dir_all(&markdown_dir).map_err(|e| MigrateError::io(&markdown_dir, e))?;

    let mut files = Vec::new();
    for domain in Domain::ALL {
        let Some(source) = config.sources.path_for(domain) else {
            continue;
        };
        if !source.exists() {
            warn!(domain = %domain, path = %source.display(), "source file missing; not in backup");
            continue;
        }
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("{}.md", domain));
        let dest = markdown_dir.join(&name);
        fs::copy(source, &dest).map_err(|e| MigrateError::io(&dest, e))?;
        files.push(manifest_entry(&dest, &name)?);
    }

    let dump_path = dir.join(DUMP_FILE);
    dump_database(pool, &dump_path).await?;
    let dump = manifest_entry(&dump_path, DUMP_FILE)?;

    let manifest = Manifest {
        created_at: Utc::now(),
        files,
        dump,
    };
    let manifest_path = dir.join(MANIFEST_FILE);
    let json = serde_json::to_string_pretty(&manifest)
        .map_err(|e| MigrateError::Backup(format!("could not serialize manifest: {}", e)))?;
    fs::write(&manifest_path, json).map_err(|e| MigrateError::io(&manifest_path, e))?;

    info!(dir = %dir.display(), files = manifest.files.len(), "backup created");
    Ok(Backup { dir, manifest })
}

/// Recompute every checksum and confirm the dump is a readable database.
pub async fn verify(backup_dir: &Path) -> Result<bool, MigrateError> {
    let manifest = load_manifest(backup_dir)?;

    for entry in &manifest.files {
        let path = backup_dir.join(MARKDOWN_DIR).join(&entry.name);
        if !checksum_matches(&path, entry)? {
            warn!(path = %path.display(), "backup file checksum mismatch");
            return Ok(false);
        }
    }

    let dump_path = backup_dir.join(DUMP_FILE);
    if !checksum_matches(&dump_path, &manifest.dump)? {
        warn!(path = %dump_path.display(), "database dump checksum mismatch");
        return Ok(false);
    }

    if !dump_readable(&dump_path).await {
        warn!(path = %dump_path.display(), "database dump is not readable");
        return Ok(false);
    }

    Ok(true)
}

/// Reverse a backup: copy markdown files back over the configured
/// sources and swap the database dump in. The caller must not hold an
/// open pool on the target database.
pub async fn restore(config: &Config, backup_dir: &Path) -> Result<(), MigrateError> {
    if !verify(backup_dir).await? {
        return Err(MigrateError::Backup(format!(
            "backup {} failed verification; refusing to restore",
            backup_dir.display()
        )));
    }

    let manifest = load_manifest(backup_dir)?;
    for entry in &manifest.files {
        let from = backup_dir.join(MARKDOWN_DIR).join(&entry.name);
        let target = Domain::ALL
            .iter()
            .filter_map(|d| config.sources.path_for(*d))
            .find(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy() == entry.name.as_str())
                    .unwrap_or(false)
            });
        match target {
            Some(dest) => {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(|e| MigrateError::io(parent, e))?;
                }
                fs::copy(&from, dest).map_err(|e| MigrateError::io(dest, e))?;
            }
            None => warn!(file = %entry.name, "no configured source matches backup file"),
        }
    }

    let dump_path = backup_dir.join(DUMP_FILE);
    let db_path = &config.db.path;
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| MigrateError::io(parent, e))?;
        }
    }
    fs::copy(&dump_path, db_path).map_err(|e| MigrateError::io(db_path, e))?;
    // Stale WAL sidecars would shadow the restored file.
    for suffix in ["-wal", "-shm"] {
        let sidecar = PathBuf::from(format!("{}{}", db_path.display(), suffix));
        if sidecar.exists() {
            fs::remove_file(&sidecar).map_err(|e| MigrateError::io(&sidecar, e))?;
        }
    }

    info!(dir = %backup_dir.display(), "backup restored");
    Ok(())
}

async fn dump_database(pool: &SqlitePool, dump_path: &Path) -> Result<(), MigrateError> {
    // VACUUM INTO produces a consistent single-file snapshot even in WAL
    // mode. The path is quoted inline; single quotes are escaped.
    let escaped = dump_path.display().to_string().replace('\'', "''");
    sqlx::query(&format!("VACUUM INTO '{}'", escaped))
        .execute(pool)
        .await
        .map_err(|e| MigrateError::Backup(format!("database dump failed: {}", e)))?;
    Ok(())
}

async fn dump_readable(dump_path: &Path) -> bool {
    let options = match SqliteConnectOptions::from_str(&format!("sqlite:{}", dump_path.display())) {
        Ok(options) => options.read_only(true),
        Err(_) => return false,
    };
    let Ok(mut conn) = options.connect().await else {
        return false;
    };
    let result: Result<i64, _> = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master")
        .fetch_one(&mut conn)
        .await;
    result.is_ok()
}

fn load_manifest(backup_dir: &Path) -> Result<Manifest, MigrateError> {
    let path = backup_dir.join(MANIFEST_FILE);
    let content = fs::read_to_string(&path).map_err(|e| MigrateError::io(&path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| MigrateError::Backup(format!("manifest {} is corrupt: {}", path.display(), e)))
}

fn manifest_entry(path: &Path, name: &str) -> Result<ManifestEntry, MigrateError> {
    let metadata = fs::metadata(path).map_err(|e| MigrateError::io(path, e))?;
    Ok(ManifestEntry {
        name: name.to_string(),
        size: metadata.len(),
        sha256: sha256_file(path)?,
    })
}

fn checksum_matches(path: &Path, entry: &ManifestEntry) -> Result<bool, MigrateError> {
    if !path.exists() {
        return Ok(false);
    }
    Ok(sha256_file(path)? == entry.sha256)
}

fn sha256_file(path: &Path) -> Result<String, MigrateError> {
    let bytes = fs::read(path).map_err(|e| MigrateError::io(path, e))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}
