//! Error taxonomy.
//!
//! Two layers: [`RowError`] is data-level (one bad row or field, never
//! fatal, reported and counted), while [`MigrateError`] is run-level
//! (the process stops and exits nonzero). Store internals surface as
//! [`StoreError`] and are wrapped into the run-level database variant.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal, run-level failures. Each maps to a stable process exit code.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("database error: {0}")]
    Database(#[from] StoreError),

    #[error("backup error: {0}")]
    Backup(String),

    #[error("rollback integrity error: {0}")]
    RollbackIntegrity(String),

    #[error("could not acquire migration lock '{key}' within {timeout_secs}s")]
    LockTimeout { key: String, timeout_secs: u64 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MigrateError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        MigrateError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            MigrateError::Database(_) => 2,
            MigrateError::Backup(_) => 3,
            MigrateError::RollbackIntegrity(_) => 4,
            MigrateError::LockTimeout { .. } => 5,
            MigrateError::Config(_) | MigrateError::Io { .. } => 1,
        }
    }
}

/// Failures inside a persistence implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sql(#[from] sqlx::Error),

    #[error("transaction error: {0}")]
    Transaction(String),
}

/// What made a row bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowErrorKind {
    Parse,
    Validation,
}

/// One bad row or field in a source file. Collected and reported; never
/// aborts the run on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    pub file: String,
    pub line: usize,
    pub field: Option<String>,
    pub kind: RowErrorKind,
    pub message: String,
}

impl RowError {
    pub fn parse(file: &str, line: usize, message: impl Into<String>) -> Self {
        Self {
            file: file.to_string(),
            line,
            field: None,
            kind: RowErrorKind::Parse,
            message: message.into(),
        }
    }

    pub fn validation(
        file: &str,
        line: usize,
        field: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            file: file.to_string(),
            line,
            field: Some(field.to_string()),
            kind: RowErrorKind::Validation,
            message: message.into(),
        }
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            RowErrorKind::Parse => "parse",
            RowErrorKind::Validation => "validation",
        };
        match &self.field {
            Some(field) => write!(
                f,
                "{}:{} [{}] {}: {}",
                self.file, self.line, kind, field, self.message
            ),
            None => write!(f, "{}:{} [{}] {}", self.file, self.line, kind, self.message),
        }
    }
}
