//! Append-only rollback journal.
//!
//! One JSON file per committed run at
//! `logs/migrations/<timestamp>_<domain>_<userId>.json`, holding the
//! exact primary keys that run inserted plus a SHA-256 checksum of the
//! payload. The journal is the sole source of truth for undo: rollback
//! deletes precisely the recorded keys and never re-derives "what this
//! run inserted" from the data. A missing or checksum-mismatched entry
//! makes rollback refuse instead of guessing.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::MigrateError;
use crate::models::{Domain, MigrationRun, RecordId};
use crate::store::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub run_id: String,
    pub domain: Domain,
    pub user_id: String,
    pub record_ids: Vec<RecordId>,
    pub timestamp: DateTime<Utc>,
    pub checksum: String,
}

impl JournalEntry {
    /// Checksum over the canonical payload (everything but the checksum
    /// field itself).
    fn compute_checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.run_id.as_bytes());
        hasher.update(self.domain.as_str().as_bytes());
        hasher.update(self.user_id.as_bytes());
        hasher.update(self.timestamp.to_rfc3339().as_bytes());
        for record_id in &self.record_ids {
            hasher.update(record_id.table.as_bytes());
            hasher.update(record_id.id.to_le_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn verify(&self) -> bool {
        self.checksum == self.compute_checksum()
    }
}

pub struct Journal {
    dir: PathBuf,
}

impl Journal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist the journal entry for a run about to commit.
    ///
    /// The write is verified (read back, parsed, checksum compared)
    /// before returning; the caller must not commit its transaction if
    /// this fails. The journal file store cannot share the database
    /// transaction, so write-and-verify is the durability gate.
    pub fn record(&self, run: &MigrationRun, ids: &[RecordId]) -> Result<JournalEntry, MigrateError> {
        fs::create_dir_all(&self.dir).map_err(|e| MigrateError::io(&self.dir, e))?;

        let timestamp = Utc::now();
        let mut entry = JournalEntry {
            run_id: run.run_id.clone(),
            domain: run.domain,
            user_id: run.user_id.clone(),
            record_ids: ids.to_vec(),
            timestamp,
            checksum: String::new(),
        };
        entry.checksum = entry.compute_checksum();

        let path = self.entry_path(&timestamp, run.domain, &run.user_id);
        let json = serde_json::to_string_pretty(&entry).map_err(|e| {
            MigrateError::RollbackIntegrity(format!("could not serialize journal entry: {}", e))
        })?;
        fs::write(&path, &json).map_err(|e| MigrateError::io(&path, e))?;

        // Read back and verify before the transaction is allowed to commit.
        let written = Self::load(&path)?;
        if written.run_id != entry.run_id || !written.verify() {
            return Err(MigrateError::RollbackIntegrity(format!(
                "journal entry verification failed after write: {}",
                path.display()
            )));
        }

        debug!(run_id = %entry.run_id, path = %path.display(), "journal entry recorded");
        Ok(entry)
    }

    /// All entries for one user, newest first.
    pub fn entries(&self, user_id: &str) -> Result<Vec<JournalEntry>, MigrateError> {
        let mut entries = Vec::new();
        for path in self.entry_files()? {
            match Self::load(&path) {
                Ok(entry) if entry.user_id == user_id => entries.push(entry),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), "skipping unreadable journal entry: {}", e),
            }
        }
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    /// Find an entry by run id.
    pub fn find(&self, run_id: &str) -> Result<Option<(PathBuf, JournalEntry)>, MigrateError> {
        for path in self.entry_files()? {
            let entry = Self::load(&path)?;
            if entry.run_id == run_id {
                return Ok(Some((path, entry)));
            }
        }
        Ok(None)
    }

    /// Most recent entry for a user, optionally narrowed to one domain.
    pub fn latest(
        &self,
        user_id: &str,
        domain: Option<Domain>,
    ) -> Result<Option<(PathBuf, JournalEntry)>, MigrateError> {
        let mut best: Option<(PathBuf, JournalEntry)> = None;
        for path in self.entry_files()? {
            let entry = Self::load(&path)?;
            if entry.user_id != user_id {
                continue;
            }
            if let Some(wanted) = domain {
                if entry.domain != wanted {
                    continue;
                }
            }
            let newer = match &best {
                Some((_, current)) => entry.timestamp > current.timestamp,
                None => true,
            };
            if newer {
                best = Some((path, entry));
            }
        }
        Ok(best)
    }

    /// Resolve a rollback target to its journal entry.
    pub fn locate(
        &self,
        target: &RollbackTarget,
        user_id: &str,
    ) -> Result<Option<(PathBuf, JournalEntry)>, MigrateError> {
        match target {
            RollbackTarget::Run(run_id) => self.find(run_id),
            RollbackTarget::Domain(domain) => self.latest(user_id, Some(*domain)),
            RollbackTarget::Latest => self.latest(user_id, None),
        }
    }

    /// Remove the entry for a run. Called after a completed rollback, or
    /// to clean up when a commit failed after the entry was written.
    pub fn remove(&self, run_id: &str) -> Result<(), MigrateError> {
        if let Some((path, _)) = self.find(run_id)? {
            fs::remove_file(&path).map_err(|e| MigrateError::io(&path, e))?;
        }
        Ok(())
    }

    fn entry_path(&self, timestamp: &DateTime<Utc>, domain: Domain, user_id: &str) -> PathBuf {
        let safe_user: String = user_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.dir.join(format!(
            "{}_{}_{}.json",
            timestamp.format("%Y%m%d_%H%M%S%3f"),
            domain,
            safe_user
        ))
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>, MigrateError> {
        let mut files = Vec::new();
        let dir = match fs::read_dir(&self.dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(MigrateError::io(&self.dir, e)),
        };
        for entry in dir {
            let entry = entry.map_err(|e| MigrateError::io(&self.dir, e))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn load(path: &Path) -> Result<JournalEntry, MigrateError> {
        let content = fs::read_to_string(path).map_err(|e| MigrateError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            MigrateError::RollbackIntegrity(format!(
                "journal entry {} is corrupt: {}",
                path.display(),
                e
            ))
        })
    }
}

/// Which run to undo.
#[derive(Debug, Clone)]
pub enum RollbackTarget {
    /// A specific run by id.
    Run(String),
    /// The most recent committed run for this user in one domain.
    Domain(Domain),
    /// The most recent committed run for this user in any domain.
    Latest,
}

#[derive(Debug, Clone)]
pub struct RollbackReport {
    pub run_id: String,
    pub domain: Domain,
    pub recorded: usize,
    pub deleted: u64,
    pub dry_run: bool,
}

/// Undo one committed run using its journal entry.
///
/// Deletes exactly the recorded primary keys in their own transaction,
/// marks the run reverted, and removes the journal entry. Refuses with
/// `RollbackIntegrityError` when the entry is missing or fails its
/// checksum.
pub async fn rollback(
    store: &dyn Store,
    journal: &Journal,
    target: &RollbackTarget,
    user_id: &str,
    dry_run: bool,
) -> Result<RollbackReport, MigrateError> {
    let Some((path, entry)) = journal.locate(target, user_id)? else {
        return Err(MigrateError::RollbackIntegrity(format!(
            "no journal entry found for {:?} (user '{}')",
            target, user_id
        )));
    };

    if entry.user_id != user_id {
        return Err(MigrateError::RollbackIntegrity(format!(
            "journal entry {} belongs to user '{}', not '{}'",
            entry.run_id, entry.user_id, user_id
        )));
    }

    if !entry.verify() {
        return Err(MigrateError::RollbackIntegrity(format!(
            "checksum mismatch in journal entry {}; refusing to roll back",
            path.display()
        )));
    }

    if dry_run {
        info!(
            run_id = %entry.run_id,
            records = entry.record_ids.len(),
            "rollback dry-run; no rows deleted"
        );
        return Ok(RollbackReport {
            run_id: entry.run_id,
            domain: entry.domain,
            recorded: entry.record_ids.len(),
            deleted: 0,
            dry_run: true,
        });
    }

    let deleted = store.delete(&entry.record_ids).await?;
    if deleted != entry.record_ids.len() as u64 {
        warn!(
            run_id = %entry.run_id,
            recorded = entry.record_ids.len(),
            deleted,
            "rollback deleted fewer rows than recorded"
        );
    }

    store.mark_run_reverted(&entry.run_id).await?;
    journal.remove(&entry.run_id)?;

    info!(run_id = %entry.run_id, deleted, "rollback complete");
    Ok(RollbackReport {
        run_id: entry.run_id,
        domain: entry.domain,
        recorded: entry.record_ids.len(),
        deleted,
        dry_run: false,
    })
}
