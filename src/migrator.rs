//! Domain migrators: the parse → validate → stage → journal → commit
//! pipeline.
//!
//! One run covers one `(domain, user)` pair. The pipeline never writes
//! before everything has been staged inside a single transaction and the
//! rollback journal entry has been written and verified; any failure
//! after staging aborts the transaction, so a run persists either all of
//! its rows or none of them. Invalid rows never block valid ones.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::MigrateError;
use crate::journal::Journal;
use crate::models::{
    Domain, ExerciseEntry, MigrationRun, RunState, StageRecord, StagedWrite, ValidatedRecord,
    WorkoutSession,
};
use crate::parser::{parse_sections, parse_table, ParseMode, TableSchema};
use crate::store::Store;
use crate::validate::validate_rows;

/// Per-run behavior switches, resolved from config and CLI flags.
#[derive(Debug, Clone, Copy)]
pub struct MigrationOptions {
    pub dry_run: bool,
    /// When false, an existing row with the same natural key is replaced
    /// instead of skipped.
    pub skip_duplicates: bool,
    pub mode: ParseMode,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            skip_duplicates: true,
            mode: ParseMode::Lenient,
        }
    }
}

/// Expected pipe-table header for a domain. Coaching is section-based
/// and has no table schema.
pub fn table_schema(domain: Domain) -> Option<TableSchema> {
    match domain {
        Domain::Health => Some(TableSchema::new(&[
            "Date",
            "Weight (lbs)",
            "Body Fat %",
            "Notes",
        ])),
        Domain::Workout => Some(TableSchema::new(&[
            "Date",
            "Phase",
            "Workout",
            "Exercise",
            "Sets x Reps",
            "Notes",
        ])),
        Domain::Meal => Some(TableSchema::new(&[
            "Date",
            "Meal",
            "Food/Drink",
            "Calories (est.)",
            "Notes",
        ])),
        Domain::Coaching => None,
    }
}

/// Migrate one domain from its markdown source file.
pub async fn run_migration(
    store: &dyn Store,
    journal: &Journal,
    domain: Domain,
    source: &Path,
    user_id: &str,
    options: MigrationOptions,
) -> Result<MigrationRun, MigrateError> {
    let text = fs::read_to_string(source).map_err(|e| MigrateError::io(source, e))?;
    let file = source.display().to_string();
    run_migration_text(store, journal, domain, &text, &file, user_id, options).await
}

/// Migrate one domain from already-loaded source text. Split out so
/// tests can drive the pipeline without touching the filesystem.
pub async fn run_migration_text(
    store: &dyn Store,
    journal: &Journal,
    domain: Domain,
    text: &str,
    file: &str,
    user_id: &str,
    options: MigrationOptions,
) -> Result<MigrationRun, MigrateError> {
    let mut run = MigrationRun::new(domain, user_id, options.dry_run);
    info!(run_id = %run.run_id, domain = %domain, user = user_id, dry_run = options.dry_run, "migration started");

    run.state = RunState::Parsing;
    let (records, parse_errors) = match table_schema(domain) {
        Some(schema) => parse_table(text, &schema, options.mode, file),
        None => parse_sections(text, options.mode, file),
    };
    let parse_error_rows = parse_errors.len() as u64;
    run.errors.extend(parse_errors);

    run.state = RunState::Validating;
    let (valid, row_errors, invalid_rows) = validate_rows(domain, &records, user_id);
    run.errors.extend(row_errors);

    run.counts.parsed = records.len() as u64 + parse_error_rows;
    run.counts.valid = valid.len() as u64;
    run.counts.invalid = invalid_rows + parse_error_rows;

    let stage_records = group_for_staging(domain, valid);

    // Dedup against both the database and earlier rows of this run.
    let mut seen: HashSet<_> = HashSet::new();
    let mut writes = Vec::new();
    for record in stage_records {
        let key = record.natural_key();
        let units = record.row_units();
        if !seen.insert(key.clone()) {
            debug!(key = %key, "duplicate within source file; skipped");
            run.counts.skipped_duplicate += units;
            continue;
        }
        if store.exists(&key).await? {
            if options.skip_duplicates {
                debug!(key = %key, "already migrated; skipped");
                run.counts.skipped_duplicate += units;
                continue;
            }
            writes.push(StagedWrite {
                record,
                overwrite: true,
            });
            run.counts.inserted += units;
        } else {
            writes.push(StagedWrite {
                record,
                overwrite: false,
            });
            run.counts.inserted += units;
        }
    }

    if options.dry_run {
        run.finish(RunState::Reported);
        info!(
            run_id = %run.run_id,
            would_insert = run.counts.inserted,
            skipped = run.counts.skipped_duplicate,
            invalid = run.counts.invalid,
            "dry run; nothing written"
        );
        return Ok(run);
    }

    run.state = RunState::Staging;
    let staged = store.stage(&writes).await?;
    let ids = staged.record_ids().to_vec();

    // The journal entry must be durable before the transaction commits;
    // a run without a verified entry could never be rolled back.
    run.state = RunState::Committing;
    if !ids.is_empty() {
        if let Err(e) = journal.record(&run, &ids) {
            warn!(run_id = %run.run_id, "journal write failed; aborting staged transaction");
            staged.abort().await?;
            run.finish(RunState::RolledBack);
            return Err(e);
        }
    }

    run.finish(RunState::Committed);
    if let Err(e) = staged.commit(&run).await {
        journal.remove(&run.run_id)?;
        run.finish(RunState::RolledBack);
        return Err(MigrateError::Database(e));
    }

    info!(
        run_id = %run.run_id,
        inserted = run.counts.inserted,
        skipped = run.counts.skipped_duplicate,
        invalid = run.counts.invalid,
        "migration committed"
    );
    Ok(run)
}

/// Group per-exercise workout rows into parent sessions keyed by
/// `(date, workout)`, preserving first-seen order. Other domains pass
/// through one-to-one.
fn group_for_staging(domain: Domain, records: Vec<ValidatedRecord>) -> Vec<StageRecord> {
    if domain != Domain::Workout {
        return records
            .into_iter()
            .map(|record| match record {
                ValidatedRecord::Health(r) => StageRecord::Health(r),
                ValidatedRecord::Meal(r) => StageRecord::Meal(r),
                ValidatedRecord::Coaching(r) => StageRecord::Coaching(r),
                ValidatedRecord::Workout(r) => StageRecord::WorkoutSession(WorkoutSession {
                    user_id: r.user_id.clone(),
                    date: r.date,
                    phase: r.phase.clone(),
                    workout: r.workout.clone(),
                    exercises: vec![ExerciseEntry {
                        exercise: r.exercise,
                        volume: r.volume,
                        notes: r.notes,
                    }],
                }),
            })
            .collect();
    }

    let mut sessions: Vec<WorkoutSession> = Vec::new();
    for record in records {
        let ValidatedRecord::Workout(row) = record else {
            continue;
        };
        let existing = sessions
            .iter_mut()
            .find(|s| s.date == row.date && s.workout == row.workout);
        let entry = ExerciseEntry {
            exercise: row.exercise,
            volume: row.volume,
            notes: row.notes,
        };
        match existing {
            Some(session) => session.exercises.push(entry),
            None => sessions.push(WorkoutSession {
                user_id: row.user_id,
                date: row.date,
                phase: row.phase,
                workout: row.workout,
                exercises: vec![entry],
            }),
        }
    }
    sessions.into_iter().map(StageRecord::WorkoutSession).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExerciseVolume;
    use chrono::NaiveDate;

    fn workout_row(date: &str, workout: &str, exercise: &str) -> ValidatedRecord {
        ValidatedRecord::Workout(crate::models::WorkoutRow {
            user_id: "daniel".into(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            phase: Some("Phase 1".into()),
            workout: workout.into(),
            exercise: exercise.into(),
            volume: ExerciseVolume::Sets { sets: 3, reps: 10 },
            notes: None,
        })
    }

    #[test]
    fn test_workout_rows_group_into_sessions() {
        let rows = vec![
            workout_row("2024-11-14", "Upper A", "Bench Press"),
            workout_row("2024-11-14", "Upper A", "Row"),
            workout_row("2024-11-15", "Lower A", "Squat"),
        ];
        let staged = group_for_staging(Domain::Workout, rows);
        assert_eq!(staged.len(), 2);
        let StageRecord::WorkoutSession(first) = &staged[0] else {
            panic!("expected session");
        };
        assert_eq!(first.workout, "Upper A");
        assert_eq!(first.exercises.len(), 2);
        assert_eq!(staged[0].row_units(), 2);
        assert_eq!(staged[1].row_units(), 1);
    }

    #[test]
    fn test_non_workout_records_pass_through() {
        let rows = vec![ValidatedRecord::Health(crate::models::HealthRow {
            user_id: "daniel".into(),
            date: NaiveDate::parse_from_str("2024-11-14", "%Y-%m-%d").unwrap(),
            weight_lbs: Some(175.5),
            body_fat_pct: None,
            notes: None,
        })];
        let staged = group_for_staging(Domain::Health, rows);
        assert_eq!(staged.len(), 1);
        assert!(matches!(staged[0], StageRecord::Health(_)));
    }

    #[test]
    fn test_schemas_cover_table_domains() {
        assert!(table_schema(Domain::Health).is_some());
        assert!(table_schema(Domain::Workout).is_some());
        assert!(table_schema(Domain::Meal).is_some());
        assert!(table_schema(Domain::Coaching).is_none());
    }
}
