//! Advisory migration locks.
//!
//! One lock file per `(user_id, domain)` pair under the configured lock
//! directory. Acquisition uses `create_new` so only one process can own
//! a key at a time; contenders retry on a short interval until the
//! configured timeout and then fail with a lock error. Dropping the
//! guard removes the file.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::MigrateError;
use crate::models::Domain;

const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// RAII guard over one `(user_id, domain)` lock file.
pub struct MigrationLock {
    path: PathBuf,
    key: String,
}

impl MigrationLock {
    /// Acquire the lock for `(user_id, domain)`, retrying until
    /// `timeout_secs` elapses.
    pub async fn acquire(
        dir: &Path,
        user_id: &str,
        domain: Domain,
        timeout_secs: u64,
    ) -> Result<Self, MigrateError> {
        fs::create_dir_all(dir).map_err(|e| MigrateError::io(dir, e))?;

        let key = format!("{}_{}", sanitize(user_id), domain);
        let path = dir.join(format!("{}.lock", key));
        let deadline = Instant::now() + Duration::from_secs(timeout_secs);

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let body = format!("pid={}\nacquired_at={}\n", std::process::id(), Utc::now().to_rfc3339());
                    file.write_all(body.as_bytes())
                        .map_err(|e| MigrateError::io(&path, e))?;
                    debug!(key = %key, "lock acquired");
                    return Ok(Self { path, key });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(MigrateError::LockTimeout { key, timeout_secs });
                    }
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
                Err(e) => return Err(MigrateError::io(&path, e)),
            }
        }
    }
}

impl Drop for MigrationLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(key = %self.key, error = %e, "could not remove lock file");
        } else {
            debug!(key = %self.key, "lock released");
        }
    }
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let lock = MigrationLock::acquire(dir.path(), "demo", Domain::Health, 1)
            .await
            .unwrap();
        assert!(dir.path().join("demo_health.lock").exists());
        drop(lock);
        assert!(!dir.path().join("demo_health.lock").exists());
    }

    #[tokio::test]
    async fn contended_key_times_out() {
        let dir = TempDir::new().unwrap();
        let _held = MigrationLock::acquire(dir.path(), "demo", Domain::Meal, 1)
            .await
            .unwrap();
        let err = MigrationLock::acquire(dir.path(), "demo", Domain::Meal, 0)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, MigrateError::LockTimeout { .. }));
        assert_eq!(err.exit_code(), 5);
    }

    #[tokio::test]
    async fn different_domains_do_not_contend() {
        let dir = TempDir::new().unwrap();
        let _health = MigrationLock::acquire(dir.path(), "demo", Domain::Health, 1)
            .await
            .unwrap();
        let _meal = MigrationLock::acquire(dir.path(), "demo", Domain::Meal, 1)
            .await
            .unwrap();
    }
}
