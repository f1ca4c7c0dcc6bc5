//! # health-migrate CLI (`hmig`)
//!
//! Migrates markdown-tracked health data into the website's SQLite
//! database. Domains are selected with flags; everything else (source
//! paths, database location, backup and log directories) comes from the
//! TOML config file.
//!
//! ## Usage
//!
//! ```bash
//! hmig --config ./config/migrate.toml --user-id daniel <flags>
//! ```
//!
//! | Invocation | Effect |
//! |-----------|--------|
//! | `hmig --all` | Migrate every domain with a configured source |
//! | `hmig --health --dry-run` | Validate health metrics, write nothing |
//! | `hmig --meals --backup` | Back up sources + database, then migrate meals |
//! | `hmig --workouts --skip-duplicates false` | Re-migrate, replacing existing sessions |
//! | `hmig --rollback` | Undo the most recent migration run |
//! | `hmig --rollback --rollback-type meal` | Undo the most recent meal run |
//! | `hmig --rollback --run-id <uuid>` | Undo one specific run |
//! | `hmig --list-migrations` | Show run history |
//! | `hmig --export health` | Print committed rows as markdown |
//! | `hmig --restore backups/20241114_083000` | Restore a verified backup |
//!
//! Exit codes: `0` success (including validation failures, which are
//! reported per row), `1` config or I/O, `2` database, `3` backup,
//! `4` rollback integrity, `5` lock timeout.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use health_migrate::config::{load_config, Config};
use health_migrate::error::{MigrateError, StoreError};
use health_migrate::journal::{rollback, Journal, RollbackTarget};
use health_migrate::lock::MigrationLock;
use health_migrate::migrator::MigrationOptions;
use health_migrate::models::Domain;
use health_migrate::parser::ParseMode;
use health_migrate::store::Store;
use health_migrate::store_sqlite::SqliteStore;
use health_migrate::{backup, db, export, logging, orchestrator, report, schema};

/// Migrate markdown health-tracking data into the website database.
#[derive(Parser)]
#[command(
    name = "hmig",
    about = "Migrate markdown health-tracking data into the website's SQLite database",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, default_value = "./config/migrate.toml")]
    config: PathBuf,

    /// Migrate every domain with a configured source.
    #[arg(long)]
    all: bool,

    /// Migrate health metrics.
    #[arg(long)]
    health: bool,

    /// Migrate workout logs.
    #[arg(long)]
    workouts: bool,

    /// Migrate meal logs.
    #[arg(long)]
    meals: bool,

    /// Migrate coaching notes.
    #[arg(long)]
    coaching: bool,

    /// User the migrated rows belong to.
    #[arg(long)]
    user_id: Option<String>,

    /// Parse and validate only; write nothing.
    #[arg(long)]
    dry_run: bool,

    /// Back up the markdown sources and the database before migrating.
    #[arg(long)]
    backup: bool,

    /// Skip rows whose natural key already exists. Pass `false` to
    /// replace existing rows instead.
    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    skip_duplicates: bool,

    /// Debug output on stderr and full per-row error listings.
    #[arg(long, short)]
    verbose: bool,

    /// Undo a committed migration run using its journal entry.
    #[arg(long)]
    rollback: bool,

    /// With --rollback: undo the most recent run of this domain.
    #[arg(long, value_enum)]
    rollback_type: Option<Domain>,

    /// With --rollback: undo this specific run.
    #[arg(long)]
    run_id: Option<String>,

    /// Show migration run history for the user.
    #[arg(long)]
    list_migrations: bool,

    /// Print committed rows of one domain as markdown.
    #[arg(long, value_enum)]
    export: Option<Domain>,

    /// Restore a backup directory (database and markdown sources).
    #[arg(long)]
    restore: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => {}
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<(), MigrateError> {
    let config =
        load_config(&cli.config).map_err(|e| MigrateError::Config(format!("{:#}", e)))?;
    logging::init(&config.logs.dir, cli.verbose)?;

    // Restore runs before any pool is opened on the target database.
    if let Some(backup_dir) = &cli.restore {
        backup::restore(&config, backup_dir).await?;
        println!("Restored backup {}", backup_dir.display());
        return Ok(());
    }

    let pool = db::connect(&config.db.path)
        .await
        .map_err(|e| MigrateError::Database(StoreError::Transaction(format!("{:#}", e))))?;
    schema::init_schema(&pool)
        .await
        .map_err(|e| MigrateError::Database(StoreError::Transaction(format!("{:#}", e))))?;
    let store = SqliteStore::new(pool.clone());
    let journal = Journal::new(config.journal_dir());

    if cli.list_migrations {
        let user_id = require_user(&cli)?;
        let runs = store.list_runs(user_id).await?;
        report::print_run_list(&runs);
        return Ok(());
    }

    if let Some(domain) = cli.export {
        let user_id = require_user(&cli)?;
        let markdown = export::export_markdown(&store, domain, user_id).await?;
        print!("{}", markdown);
        return Ok(());
    }

    if cli.rollback {
        let user_id = require_user(&cli)?;
        let target = match (&cli.run_id, cli.rollback_type) {
            (Some(run_id), _) => RollbackTarget::Run(run_id.clone()),
            (None, Some(domain)) => RollbackTarget::Domain(domain),
            (None, None) => RollbackTarget::Latest,
        };
        // Resolve the target once, take the (user, domain) lock for that
        // entry, then roll back that exact run. A migration committing
        // in between cannot shift which run gets undone.
        let Some((_, entry)) = journal.locate(&target, user_id)? else {
            return Err(MigrateError::RollbackIntegrity(format!(
                "no journal entry found for {:?} (user '{}')",
                target, user_id
            )));
        };
        let _lock = MigrationLock::acquire(
            &config.lock.dir,
            user_id,
            entry.domain,
            config.lock.timeout_secs,
        )
        .await?;
        let pinned = RollbackTarget::Run(entry.run_id);
        let result = rollback(&store, &journal, &pinned, user_id, cli.dry_run).await?;
        report::print_rollback(&result);
        return Ok(());
    }

    let user_id = require_user(&cli)?;
    let domains = selected_domains(&cli, &config)?;
    let options = MigrationOptions {
        dry_run: cli.dry_run,
        skip_duplicates: cli.skip_duplicates,
        mode: if config.sources.strict {
            ParseMode::Strict
        } else {
            ParseMode::Lenient
        },
    };

    let outcome = orchestrator::migrate(
        &config,
        &store,
        &pool,
        &journal,
        &domains,
        user_id,
        options,
        cli.backup,
    )
    .await?;

    // Committed domains are reported even when a later one failed.
    for run in &outcome.runs {
        report::print_run(run, cli.verbose);
    }
    if let Some(err) = outcome.failure {
        return Err(err);
    }
    Ok(())
}

fn require_user(cli: &Cli) -> Result<&str, MigrateError> {
    cli.user_id
        .as_deref()
        .ok_or_else(|| MigrateError::Config("--user-id is required".to_string()))
}

/// Resolve domain flags. `--all` selects every domain with a configured
/// source; explicit flags select exactly what they name.
fn selected_domains(cli: &Cli, config: &Config) -> Result<Vec<Domain>, MigrateError> {
    if cli.all {
        let domains: Vec<Domain> = Domain::ALL
            .into_iter()
            .filter(|d| config.sources.path_for(*d).is_some())
            .collect();
        if domains.is_empty() {
            return Err(MigrateError::Config(
                "--all selected but no sources are configured".to_string(),
            ));
        }
        return Ok(domains);
    }

    let mut domains = Vec::new();
    if cli.health {
        domains.push(Domain::Health);
    }
    if cli.workouts {
        domains.push(Domain::Workout);
    }
    if cli.meals {
        domains.push(Domain::Meal);
    }
    if cli.coaching {
        domains.push(Domain::Coaching);
    }
    if domains.is_empty() {
        return Err(MigrateError::Config(
            "no domain selected; pass --all or one of --health/--workouts/--meals/--coaching"
                .to_string(),
        ));
    }
    Ok(domains)
}
