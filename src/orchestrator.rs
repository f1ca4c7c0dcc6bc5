//! Multi-domain orchestration.
//!
//! Resolves which domains to run, takes every advisory lock up front,
//! backs up before the first write when asked to, then runs the domain
//! migrators sequentially in a fixed order. Locks are held until every
//! run has finished.

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::backup::{create_backup, verify};
use crate::config::Config;
use crate::error::MigrateError;
use crate::journal::Journal;
use crate::lock::MigrationLock;
use crate::migrator::{run_migration, MigrationOptions};
use crate::models::{Domain, MigrationRun};
use crate::store::Store;

/// Per-domain results of one invocation.
///
/// A fatal failure in one domain stops the sequence, but the runs that
/// committed before it are kept so the operator still sees their counts.
pub struct MigrationOutcome {
    pub runs: Vec<MigrationRun>,
    pub failure: Option<MigrateError>,
}

/// Run migrations for the selected domains, in [`Domain::ALL`] order.
///
/// Every selected domain must have a configured source path; that is
/// checked before any lock is taken so a half-configured invocation
/// fails before it touches anything. `Err` is returned only for
/// pre-flight failures (config, locks, backup); once migrations start,
/// per-domain outcomes are reported through [`MigrationOutcome`].
pub async fn migrate(
    config: &Config,
    store: &dyn Store,
    pool: &SqlitePool,
    journal: &Journal,
    domains: &[Domain],
    user_id: &str,
    options: MigrationOptions,
    with_backup: bool,
) -> Result<MigrationOutcome, MigrateError> {
    if domains.is_empty() {
        return Err(MigrateError::Config(
            "no domain selected; pass --all or one of --health/--workouts/--meals/--coaching"
                .to_string(),
        ));
    }

    let mut ordered: Vec<Domain> = Domain::ALL
        .into_iter()
        .filter(|d| domains.contains(d))
        .collect();
    ordered.dedup();

    for domain in &ordered {
        let Some(source) = config.sources.path_for(*domain) else {
            return Err(MigrateError::Config(format!(
                "no source file configured for domain '{}'",
                domain
            )));
        };
        if !source.exists() {
            return Err(MigrateError::Config(format!(
                "source file for '{}' does not exist: {}",
                domain,
                source.display()
            )));
        }
    }

    let mut locks = Vec::with_capacity(ordered.len());
    for domain in &ordered {
        locks.push(
            MigrationLock::acquire(
                &config.lock.dir,
                user_id,
                *domain,
                config.lock.timeout_secs,
            )
            .await?,
        );
    }

    if with_backup && !options.dry_run {
        let backup = create_backup(config, pool).await?;
        if !verify(&backup.dir).await? {
            return Err(MigrateError::Backup(format!(
                "backup {} failed verification; refusing to migrate",
                backup.dir.display()
            )));
        }
        info!(dir = %backup.dir.display(), "backup verified");
    }

    let mut outcome = MigrationOutcome {
        runs: Vec::with_capacity(ordered.len()),
        failure: None,
    };
    for domain in ordered {
        let source = config
            .sources
            .path_for(domain)
            .ok_or_else(|| MigrateError::Config(format!("no source for '{}'", domain)))?;
        match run_migration(store, journal, domain, source, user_id, options).await {
            Ok(run) => outcome.runs.push(run),
            Err(e) => {
                warn!(domain = %domain, "migration failed; earlier committed domains are kept");
                outcome.failure = Some(e);
                break;
            }
        }
    }

    drop(locks);
    Ok(outcome)
}
