//! SQLite implementation of the persistence port.
//!
//! Staged inserts run inside one sqlx transaction held open by
//! [`SqliteStagedRun`]; the finalized run summary is written through the
//! same transaction so rows and their run record land atomically.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::error::StoreError;
use crate::models::{
    CoachingRow, Domain, ExerciseVolume, HealthRow, MealRow, MigrationRun, NaturalKey, RecordId,
    RunCounts, RunState, RunSummary, StageRecord, StagedWrite, ValidatedRecord, WorkoutRow,
};
use crate::store::{StagedRun, Store};

const TABLES: [&str; 5] = [
    "health_metrics",
    "workout_sessions",
    "workout_exercises",
    "meals",
    "coaching_notes",
];

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn exists(&self, key: &NaturalKey) -> Result<bool, StoreError> {
        let count: i64 = match key {
            NaturalKey::Health { user_id, date } => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM health_metrics WHERE user_id = ? AND date = ?",
                )
                .bind(user_id)
                .bind(date.to_string())
                .fetch_one(&self.pool)
                .await?
            }
            NaturalKey::Workout {
                user_id,
                date,
                workout,
            } => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM workout_sessions \
                     WHERE user_id = ? AND date = ? AND workout = ?",
                )
                .bind(user_id)
                .bind(date.to_string())
                .bind(workout)
                .fetch_one(&self.pool)
                .await?
            }
            NaturalKey::Meal {
                user_id,
                date,
                meal,
                food,
            } => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM meals \
                     WHERE user_id = ? AND date = ? AND meal = ? AND food = ?",
                )
                .bind(user_id)
                .bind(date.to_string())
                .bind(meal)
                .bind(food)
                .fetch_one(&self.pool)
                .await?
            }
            NaturalKey::Coaching {
                user_id,
                date,
                title,
            } => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM coaching_notes \
                     WHERE user_id = ? AND date = ? AND title = ?",
                )
                .bind(user_id)
                .bind(date.to_string())
                .bind(title)
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(count > 0)
    }

    async fn stage(&self, writes: &[StagedWrite]) -> Result<Box<dyn StagedRun>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::new();

        for write in writes {
            if write.overwrite {
                delete_by_key(&mut tx, &write.record.natural_key()).await?;
            }
            insert_record(&mut tx, &write.record, &mut ids).await?;
        }

        Ok(Box::new(SqliteStagedRun { tx, ids }))
    }

    async fn delete(&self, ids: &[RecordId]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0u64;

        // Children before parents: exercises reference sessions.
        let ordered = ids
            .iter()
            .filter(|id| id.table == "workout_exercises")
            .chain(ids.iter().filter(|id| id.table != "workout_exercises"));

        for record_id in ordered {
            if !TABLES.contains(&record_id.table.as_str()) {
                return Err(StoreError::Transaction(format!(
                    "refusing to delete from unknown table '{}'",
                    record_id.table
                )));
            }
            let sql = format!("DELETE FROM {} WHERE id = ?", record_id.table);
            let result = sqlx::query(&sql)
                .bind(record_id.id)
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(deleted)
    }

    async fn list_runs(&self, user_id: &str) -> Result<Vec<RunSummary>, StoreError> {
        let rows = sqlx::query(
            "SELECT run_id, domain, user_id, state, parsed, valid, invalid, inserted, \
             skipped_duplicate, started_at, finished_at \
             FROM migration_runs WHERE user_id = ? ORDER BY started_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            summaries.push(run_summary_from_row(&row)?);
        }
        Ok(summaries)
    }

    async fn mark_run_reverted(&self, run_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE migration_runs SET state = ? WHERE run_id = ?")
            .bind(RunState::Reverted.as_str())
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn export_rows(
        &self,
        domain: Domain,
        user_id: &str,
    ) -> Result<Vec<ValidatedRecord>, StoreError> {
        match domain {
            Domain::Health => {
                let rows = sqlx::query(
                    "SELECT date, weight_lbs, body_fat_pct, notes \
                     FROM health_metrics WHERE user_id = ? ORDER BY date, id",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
                rows.iter()
                    .map(|row| {
                        Ok(ValidatedRecord::Health(HealthRow {
                            user_id: user_id.to_string(),
                            date: date_column(row)?,
                            weight_lbs: row.get("weight_lbs"),
                            body_fat_pct: row.get("body_fat_pct"),
                            notes: row.get("notes"),
                        }))
                    })
                    .collect()
            }
            Domain::Workout => {
                let rows = sqlx::query(
                    "SELECT s.date AS date, s.phase AS phase, s.workout AS workout, \
                     e.exercise AS exercise, e.sets AS sets, e.reps AS reps, \
                     e.duration_minutes AS duration_minutes, e.notes AS notes \
                     FROM workout_sessions s \
                     JOIN workout_exercises e ON e.session_id = s.id \
                     WHERE s.user_id = ? ORDER BY s.date, s.id, e.id",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
                rows.iter()
                    .map(|row| {
                        Ok(ValidatedRecord::Workout(WorkoutRow {
                            user_id: user_id.to_string(),
                            date: date_column(row)?,
                            phase: row.get("phase"),
                            workout: row.get("workout"),
                            exercise: row.get("exercise"),
                            volume: volume_from_columns(
                                row.get("sets"),
                                row.get("reps"),
                                row.get("duration_minutes"),
                            )?,
                            notes: row.get("notes"),
                        }))
                    })
                    .collect()
            }
            Domain::Meal => {
                let rows = sqlx::query(
                    "SELECT date, meal, food, calories, notes \
                     FROM meals WHERE user_id = ? ORDER BY date, id",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
                rows.iter()
                    .map(|row| {
                        let calories: Option<i64> = row.get("calories");
                        Ok(ValidatedRecord::Meal(MealRow {
                            user_id: user_id.to_string(),
                            date: date_column(row)?,
                            meal: row.get("meal"),
                            food: row.get("food"),
                            calories: calories.map(|c| c as u32),
                            notes: row.get("notes"),
                        }))
                    })
                    .collect()
            }
            Domain::Coaching => {
                let rows = sqlx::query(
                    "SELECT date, title, trainer, subject, orders, body \
                     FROM coaching_notes WHERE user_id = ? ORDER BY date, id",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
                rows.iter()
                    .map(|row| {
                        Ok(ValidatedRecord::Coaching(CoachingRow {
                            user_id: user_id.to_string(),
                            date: date_column(row)?,
                            title: row.get("title"),
                            trainer: row.get("trainer"),
                            subject: row.get("subject"),
                            orders: row.get("orders"),
                            body: row.get("body"),
                        }))
                    })
                    .collect()
            }
        }
    }
}

struct SqliteStagedRun {
    tx: Transaction<'static, Sqlite>,
    ids: Vec<RecordId>,
}

#[async_trait]
impl StagedRun for SqliteStagedRun {
    fn record_ids(&self) -> &[RecordId] {
        &self.ids
    }

    async fn commit(mut self: Box<Self>, run: &MigrationRun) -> Result<(), StoreError> {
        insert_run(&mut self.tx, run).await?;
        self.tx.commit().await?;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

async fn insert_record(
    tx: &mut Transaction<'static, Sqlite>,
    record: &StageRecord,
    ids: &mut Vec<RecordId>,
) -> Result<(), StoreError> {
    match record {
        StageRecord::Health(r) => {
            let result = sqlx::query(
                "INSERT INTO health_metrics (user_id, date, weight_lbs, body_fat_pct, notes) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&r.user_id)
            .bind(r.date.to_string())
            .bind(r.weight_lbs)
            .bind(r.body_fat_pct)
            .bind(&r.notes)
            .execute(&mut **tx)
            .await?;
            ids.push(RecordId::new("health_metrics", result.last_insert_rowid()));
        }
        StageRecord::WorkoutSession(session) => {
            let result = sqlx::query(
                "INSERT INTO workout_sessions (user_id, date, phase, workout) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&session.user_id)
            .bind(session.date.to_string())
            .bind(&session.phase)
            .bind(&session.workout)
            .execute(&mut **tx)
            .await?;
            let session_id = result.last_insert_rowid();
            ids.push(RecordId::new("workout_sessions", session_id));

            for entry in &session.exercises {
                let (sets, reps, duration) = volume_columns(&entry.volume);
                let result = sqlx::query(
                    "INSERT INTO workout_exercises \
                     (session_id, exercise, sets, reps, duration_minutes, notes) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(session_id)
                .bind(&entry.exercise)
                .bind(sets)
                .bind(reps)
                .bind(duration)
                .bind(&entry.notes)
                .execute(&mut **tx)
                .await?;
                ids.push(RecordId::new(
                    "workout_exercises",
                    result.last_insert_rowid(),
                ));
            }
        }
        StageRecord::Meal(r) => {
            let result = sqlx::query(
                "INSERT INTO meals (user_id, date, meal, food, calories, notes) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&r.user_id)
            .bind(r.date.to_string())
            .bind(&r.meal)
            .bind(&r.food)
            .bind(r.calories.map(|c| c as i64))
            .bind(&r.notes)
            .execute(&mut **tx)
            .await?;
            ids.push(RecordId::new("meals", result.last_insert_rowid()));
        }
        StageRecord::Coaching(r) => {
            let result = sqlx::query(
                "INSERT INTO coaching_notes (user_id, date, title, trainer, subject, orders, body) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&r.user_id)
            .bind(r.date.to_string())
            .bind(&r.title)
            .bind(&r.trainer)
            .bind(&r.subject)
            .bind(&r.orders)
            .bind(&r.body)
            .execute(&mut **tx)
            .await?;
            ids.push(RecordId::new("coaching_notes", result.last_insert_rowid()));
        }
    }
    Ok(())
}

async fn delete_by_key(
    tx: &mut Transaction<'static, Sqlite>,
    key: &NaturalKey,
) -> Result<(), StoreError> {
    match key {
        NaturalKey::Health { user_id, date } => {
            sqlx::query("DELETE FROM health_metrics WHERE user_id = ? AND date = ?")
                .bind(user_id)
                .bind(date.to_string())
                .execute(&mut **tx)
                .await?;
        }
        NaturalKey::Workout {
            user_id,
            date,
            workout,
        } => {
            sqlx::query(
                "DELETE FROM workout_exercises WHERE session_id IN \
                 (SELECT id FROM workout_sessions WHERE user_id = ? AND date = ? AND workout = ?)",
            )
            .bind(user_id)
            .bind(date.to_string())
            .bind(workout)
            .execute(&mut **tx)
            .await?;
            sqlx::query(
                "DELETE FROM workout_sessions WHERE user_id = ? AND date = ? AND workout = ?",
            )
            .bind(user_id)
            .bind(date.to_string())
            .bind(workout)
            .execute(&mut **tx)
            .await?;
        }
        NaturalKey::Meal {
            user_id,
            date,
            meal,
            food,
        } => {
            sqlx::query(
                "DELETE FROM meals WHERE user_id = ? AND date = ? AND meal = ? AND food = ?",
            )
            .bind(user_id)
            .bind(date.to_string())
            .bind(meal)
            .bind(food)
            .execute(&mut **tx)
            .await?;
        }
        NaturalKey::Coaching {
            user_id,
            date,
            title,
        } => {
            sqlx::query("DELETE FROM coaching_notes WHERE user_id = ? AND date = ? AND title = ?")
                .bind(user_id)
                .bind(date.to_string())
                .bind(title)
                .execute(&mut **tx)
                .await?;
        }
    }
    Ok(())
}

async fn insert_run(
    tx: &mut Transaction<'static, Sqlite>,
    run: &MigrationRun,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO migration_runs \
         (run_id, domain, user_id, state, parsed, valid, invalid, inserted, skipped_duplicate, \
          started_at, finished_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&run.run_id)
    .bind(run.domain.as_str())
    .bind(&run.user_id)
    .bind(run.state.as_str())
    .bind(run.counts.parsed as i64)
    .bind(run.counts.valid as i64)
    .bind(run.counts.invalid as i64)
    .bind(run.counts.inserted as i64)
    .bind(run.counts.skipped_duplicate as i64)
    .bind(run.started_at.to_rfc3339())
    .bind(run.finished_at.map(|t| t.to_rfc3339()))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn volume_columns(volume: &ExerciseVolume) -> (Option<i64>, Option<i64>, Option<i64>) {
    match volume {
        ExerciseVolume::Sets { sets, reps } => (Some(*sets as i64), Some(*reps as i64), None),
        ExerciseVolume::Duration { minutes } => (None, None, Some(*minutes as i64)),
    }
}

fn volume_from_columns(
    sets: Option<i64>,
    reps: Option<i64>,
    duration: Option<i64>,
) -> Result<ExerciseVolume, StoreError> {
    match (sets, reps, duration) {
        (Some(sets), Some(reps), _) => Ok(ExerciseVolume::Sets {
            sets: sets as u32,
            reps: reps as u32,
        }),
        (_, _, Some(minutes)) => Ok(ExerciseVolume::Duration {
            minutes: minutes as u32,
        }),
        _ => Err(StoreError::Transaction(
            "exercise row has neither sets/reps nor duration".to_string(),
        )),
    }
}

fn date_column(row: &SqliteRow) -> Result<NaiveDate, StoreError> {
    let raw: String = row.get("date");
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|e| StoreError::Transaction(format!("stored date '{}' is invalid: {}", raw, e)))
}

fn run_summary_from_row(row: &SqliteRow) -> Result<RunSummary, StoreError> {
    let domain_raw: String = row.get("domain");
    let state_raw: String = row.get("state");
    let domain = Domain::parse(&domain_raw).ok_or_else(|| {
        StoreError::Transaction(format!("stored domain '{}' is invalid", domain_raw))
    })?;
    let state = RunState::parse(&state_raw).ok_or_else(|| {
        StoreError::Transaction(format!("stored run state '{}' is invalid", state_raw))
    })?;
    let parsed: i64 = row.get("parsed");
    let valid: i64 = row.get("valid");
    let invalid: i64 = row.get("invalid");
    let inserted: i64 = row.get("inserted");
    let skipped: i64 = row.get("skipped_duplicate");
    Ok(RunSummary {
        run_id: row.get("run_id"),
        domain,
        user_id: row.get("user_id"),
        state,
        counts: RunCounts {
            parsed: parsed as u64,
            valid: valid as u64,
            invalid: invalid as u64,
            inserted: inserted as u64,
            skipped_duplicate: skipped as u64,
        },
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
    })
}
