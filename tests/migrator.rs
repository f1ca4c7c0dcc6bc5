//! Pipeline tests against the in-memory store: atomicity, idempotence,
//! dry runs, duplicate handling, and journal-driven rollback.

use health_migrate::error::MigrateError;
use health_migrate::journal::{rollback, Journal, RollbackTarget};
use health_migrate::migrator::{run_migration_text, MigrationOptions};
use health_migrate::models::{Domain, RunState, ValidatedRecord};
use health_migrate::store::Store;
use health_migrate::store_memory::MemoryStore;
use tempfile::TempDir;

const HEALTH_MD: &str = "\
# Health Tracking

| Date | Weight (lbs) | Body Fat % | Notes |
|------|--------------|------------|-------|
| 2024-11-14 | 175.5 | 18.2 | morning |
| 2024-11-15 | 176 | - | - |
";

const HEALTH_MD_MIXED: &str = "\
| Date | Weight (lbs) | Body Fat % | Notes |
|------|--------------|------------|-------|
| 2024-11-14 | 175.5 | 18.2 | - |
| 13/45/2024 | 176 | - | bad date |
| 2024-11-16 | abc | - | bad weight |
| 2024-11-17 | 177 | 18.0 | - |
| 2024-11-18 | 178 | - | - |
";

const WORKOUT_MD: &str = "\
| Date | Phase | Workout | Exercise | Sets x Reps | Notes |
|------|-------|---------|----------|-------------|-------|
| 2024-11-14 | Phase 1 | Upper A | Bench Press | 3x10 | - |
| 2024-11-14 | Phase 1 | Upper A | Barbell Row | 3x8 | - |
| 2024-11-15 | Phase 1 | Lower A | Squat | 5x5 | - |
";

fn journal_in(tmp: &TempDir) -> Journal {
    Journal::new(tmp.path().join("migrations"))
}

async fn migrate(
    store: &MemoryStore,
    journal: &Journal,
    domain: Domain,
    text: &str,
    options: MigrationOptions,
) -> Result<health_migrate::models::MigrationRun, MigrateError> {
    run_migration_text(store, journal, domain, text, "source.md", "daniel", options).await
}

#[tokio::test]
async fn committed_run_inserts_all_valid_rows() {
    let tmp = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let journal = journal_in(&tmp);

    let run = migrate(
        &store,
        &journal,
        Domain::Health,
        HEALTH_MD,
        MigrationOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(run.state, RunState::Committed);
    assert_eq!(run.counts.parsed, 2);
    assert_eq!(run.counts.valid, 2);
    assert_eq!(run.counts.invalid, 0);
    assert_eq!(run.counts.inserted, 2);
    assert_eq!(run.counts.skipped_duplicate, 0);
    assert_eq!(store.row_count(), 2);

    let entries = journal.entries("daniel").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].record_ids.len(), 2);
}

#[tokio::test]
async fn rerun_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let journal = journal_in(&tmp);

    migrate(
        &store,
        &journal,
        Domain::Health,
        HEALTH_MD,
        MigrationOptions::default(),
    )
    .await
    .unwrap();
    let second = migrate(
        &store,
        &journal,
        Domain::Health,
        HEALTH_MD,
        MigrationOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(second.counts.inserted, 0);
    assert_eq!(second.counts.skipped_duplicate, 2);
    assert_eq!(store.row_count(), 2);
}

#[tokio::test]
async fn invalid_rows_do_not_block_valid_ones() {
    let tmp = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let journal = journal_in(&tmp);

    let run = migrate(
        &store,
        &journal,
        Domain::Health,
        HEALTH_MD_MIXED,
        MigrationOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(run.counts.parsed, 5);
    assert_eq!(run.counts.valid, 3);
    assert_eq!(run.counts.invalid, 2);
    assert_eq!(run.counts.inserted, 3);
    assert_eq!(run.counts.parsed, run.counts.valid + run.counts.invalid);
    assert_eq!(store.row_count(), 3);
    assert_eq!(run.errors.len(), 2);
}

#[tokio::test]
async fn failed_staging_persists_nothing() {
    let tmp = TempDir::new().unwrap();
    let store = MemoryStore::failing_after(2);
    let journal = journal_in(&tmp);

    let err = migrate(
        &store,
        &journal,
        Domain::Health,
        HEALTH_MD_MIXED,
        MigrationOptions::default(),
    )
    .await
    .err()
    .unwrap();

    assert!(matches!(err, MigrateError::Database(_)));
    assert_eq!(err.exit_code(), 2);
    assert_eq!(store.row_count(), 0);
    assert!(journal.entries("daniel").unwrap().is_empty());
}

#[tokio::test]
async fn dry_run_writes_nothing_but_predicts_counts() {
    let tmp = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let journal = journal_in(&tmp);

    let options = MigrationOptions {
        dry_run: true,
        ..MigrationOptions::default()
    };
    let run = migrate(&store, &journal, Domain::Health, HEALTH_MD, options)
        .await
        .unwrap();

    assert_eq!(run.state, RunState::Reported);
    assert_eq!(run.counts.inserted, 2);
    assert_eq!(store.row_count(), 0);
    assert!(journal.entries("daniel").unwrap().is_empty());

    // A real run afterward inserts exactly what the dry run predicted.
    let real = migrate(
        &store,
        &journal,
        Domain::Health,
        HEALTH_MD,
        MigrationOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(real.counts.inserted, run.counts.inserted);
}

#[tokio::test]
async fn rollback_deletes_exactly_the_journaled_rows() {
    let tmp = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let journal = journal_in(&tmp);

    migrate(
        &store,
        &journal,
        Domain::Health,
        HEALTH_MD,
        MigrationOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(store.row_count(), 2);

    let report = rollback(&store, &journal, &RollbackTarget::Latest, "daniel", false)
        .await
        .unwrap();

    assert_eq!(report.recorded, 2);
    assert_eq!(report.deleted, 2);
    assert_eq!(store.row_count(), 0);
    assert!(journal.entries("daniel").unwrap().is_empty());

    let runs = store.list_runs("daniel").await.unwrap();
    assert_eq!(runs[0].state, RunState::Reverted);
}

#[tokio::test]
async fn rollback_refuses_without_journal_entry() {
    let tmp = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let journal = journal_in(&tmp);

    let err = rollback(&store, &journal, &RollbackTarget::Latest, "daniel", false)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, MigrateError::RollbackIntegrity(_)));
    assert_eq!(err.exit_code(), 4);
}

#[tokio::test]
async fn rollback_refuses_tampered_journal_entry() {
    let tmp = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let journal = journal_in(&tmp);

    let run = migrate(
        &store,
        &journal,
        Domain::Health,
        HEALTH_MD,
        MigrationOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(store.row_count(), 2);

    // Edit the recorded ids without recomputing the checksum.
    let (path, mut entry) = journal.find(&run.run_id).unwrap().unwrap();
    entry
        .record_ids
        .push(health_migrate::models::RecordId::new("health_metrics", 99));
    std::fs::write(&path, serde_json::to_string_pretty(&entry).unwrap()).unwrap();

    let err = rollback(&store, &journal, &RollbackTarget::Latest, "daniel", false)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, MigrateError::RollbackIntegrity(_)));
    assert_eq!(err.exit_code(), 4);
    // Nothing was deleted and the entry is still on disk.
    assert_eq!(store.row_count(), 2);
    assert!(journal.find(&run.run_id).unwrap().is_some());
}

#[tokio::test]
async fn rollback_by_run_id_ignores_newer_runs() {
    let tmp = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let journal = journal_in(&tmp);

    let health = migrate(
        &store,
        &journal,
        Domain::Health,
        HEALTH_MD,
        MigrationOptions::default(),
    )
    .await
    .unwrap();
    // A workout run commits after the health run was picked as target.
    migrate(
        &store,
        &journal,
        Domain::Workout,
        WORKOUT_MD,
        MigrationOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(store.row_count(), 7);

    let target = RollbackTarget::Run(health.run_id.clone());
    let report = rollback(&store, &journal, &target, "daniel", false)
        .await
        .unwrap();

    assert_eq!(report.run_id, health.run_id);
    assert_eq!(report.domain, Domain::Health);
    assert_eq!(report.deleted, 2);
    // The newer workout rows and their journal entry survive.
    assert_eq!(store.row_count(), 5);
    assert_eq!(journal.entries("daniel").unwrap().len(), 1);
}

#[tokio::test]
async fn workout_rows_are_grouped_into_sessions() {
    let tmp = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let journal = journal_in(&tmp);

    let run = migrate(
        &store,
        &journal,
        Domain::Workout,
        WORKOUT_MD,
        MigrationOptions::default(),
    )
    .await
    .unwrap();

    // 3 exercise rows in 2 sessions: 2 session rows + 3 exercise rows.
    assert_eq!(run.counts.inserted, 3);
    assert_eq!(store.row_count(), 5);

    let rows = store.export_rows(Domain::Workout, "daniel").await.unwrap();
    assert_eq!(rows.len(), 3);
}

#[tokio::test]
async fn overwrite_replaces_existing_rows() {
    let tmp = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let journal = journal_in(&tmp);

    migrate(
        &store,
        &journal,
        Domain::Health,
        "| Date | Weight (lbs) | Body Fat % | Notes |\n|---|---|---|---|\n| 2024-11-14 | 175.5 | - | - |\n",
        MigrationOptions::default(),
    )
    .await
    .unwrap();

    let options = MigrationOptions {
        skip_duplicates: false,
        ..MigrationOptions::default()
    };
    let run = migrate(
        &store,
        &journal,
        Domain::Health,
        "| Date | Weight (lbs) | Body Fat % | Notes |\n|---|---|---|---|\n| 2024-11-14 | 180 | - | - |\n",
        options,
    )
    .await
    .unwrap();

    assert_eq!(run.counts.inserted, 1);
    assert_eq!(run.counts.skipped_duplicate, 0);
    assert_eq!(store.row_count(), 1);

    let rows = store.export_rows(Domain::Health, "daniel").await.unwrap();
    let ValidatedRecord::Health(row) = &rows[0] else {
        panic!("expected health row");
    };
    assert_eq!(row.weight_lbs, Some(180.0));
}

#[tokio::test]
async fn duplicate_rows_within_one_file_are_skipped() {
    let tmp = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let journal = journal_in(&tmp);

    let text = "\
| Date | Weight (lbs) | Body Fat % | Notes |
|---|---|---|---|
| 2024-11-14 | 175.5 | - | - |
| 2024-11-14 | 176.0 | - | repeated date |
";
    let run = migrate(
        &store,
        &journal,
        Domain::Health,
        text,
        MigrationOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(run.counts.inserted, 1);
    assert_eq!(run.counts.skipped_duplicate, 1);
    assert_eq!(store.row_count(), 1);
}
