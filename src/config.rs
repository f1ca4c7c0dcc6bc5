use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::Domain;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub sources: SourcesConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub lock: LockConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// One markdown source file per domain. Domains without a configured
/// source are skipped by `--all` and rejected when selected explicitly.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    pub health: Option<PathBuf>,
    pub workouts: Option<PathBuf>,
    pub meals: Option<PathBuf>,
    pub coaching: Option<PathBuf>,
    /// Strict table parsing: abort a whole file on the first malformed
    /// row instead of skipping it.
    #[serde(default)]
    pub strict: bool,
}

impl SourcesConfig {
    pub fn path_for(&self, domain: Domain) -> Option<&Path> {
        match domain {
            Domain::Health => self.health.as_deref(),
            Domain::Workout => self.workouts.as_deref(),
            Domain::Meal => self.meals.as_deref(),
            Domain::Coaching => self.coaching.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackupConfig {
    #[serde(default = "default_backup_dir")]
    pub dir: PathBuf,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: default_backup_dir(),
        }
    }
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogsConfig {
    #[serde(default = "default_logs_dir")]
    pub dir: PathBuf,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            dir: default_logs_dir(),
        }
    }
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LockConfig {
    #[serde(default = "default_lock_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_lock_timeout")]
    pub timeout_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            dir: default_lock_dir(),
            timeout_secs: default_lock_timeout(),
        }
    }
}

fn default_lock_dir() -> PathBuf {
    PathBuf::from(".locks")
}

fn default_lock_timeout() -> u64 {
    10
}

impl Config {
    /// The journal directory: rollback entries live under
    /// `logs/migrations/`.
    pub fn journal_dir(&self) -> PathBuf {
        self.logs.dir.join("migrations")
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.db.path.as_os_str().is_empty() {
        anyhow::bail!("db.path must not be empty");
    }

    if config.lock.timeout_secs == 0 {
        anyhow::bail!("lock.timeout_secs must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let config: Config = toml::from_str(
            r#"
            [db]
            path = "data/site.sqlite"

            [sources]
            health = "data/health.md"
            "#,
        )
        .unwrap();

        assert_eq!(config.backup.dir, PathBuf::from("backups"));
        assert_eq!(config.logs.dir, PathBuf::from("logs"));
        assert_eq!(config.lock.timeout_secs, 10);
        assert!(!config.sources.strict);
        assert!(config.sources.path_for(Domain::Health).is_some());
        assert!(config.sources.path_for(Domain::Meal).is_none());
    }

    #[test]
    fn test_journal_dir_under_logs() {
        let config: Config = toml::from_str(
            r#"
            [db]
            path = "x.sqlite"

            [sources]

            [logs]
            dir = "/tmp/mylogs"
            "#,
        )
        .unwrap();
        assert_eq!(config.journal_dir(), PathBuf::from("/tmp/mylogs/migrations"));
    }
}
