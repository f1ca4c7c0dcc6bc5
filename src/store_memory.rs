//! In-memory [`Store`] implementation for tests.
//!
//! Vectors behind `std::sync::Mutex`; staged writes are buffered and
//! applied on commit so aborting leaves nothing behind. A `fail_after`
//! fail-point forces a transaction error mid-staging, which the
//! atomicity tests use to prove that a failed run persists zero rows.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::StoreError;
use crate::models::{
    CoachingRow, Domain, ExerciseEntry, HealthRow, MealRow, MigrationRun, NaturalKey, RecordId,
    RunState, RunSummary, StageRecord, StagedWrite, ValidatedRecord, WorkoutRow,
};
use crate::store::{StagedRun, Store};

#[derive(Debug, Clone)]
struct SessionRow {
    user_id: String,
    date: NaiveDate,
    phase: Option<String>,
    workout: String,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    health: Vec<(i64, HealthRow)>,
    sessions: Vec<(i64, SessionRow)>,
    exercises: Vec<(i64, i64, ExerciseEntry)>,
    meals: Vec<(i64, MealRow)>,
    coaching: Vec<(i64, CoachingRow)>,
    runs: Vec<MigrationRun>,
}

impl Inner {
    fn alloc(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn has_key(&self, key: &NaturalKey) -> bool {
        match key {
            NaturalKey::Health { user_id, date } => self
                .health
                .iter()
                .any(|(_, r)| &r.user_id == user_id && &r.date == date),
            NaturalKey::Workout {
                user_id,
                date,
                workout,
            } => self.sessions.iter().any(|(_, s)| {
                &s.user_id == user_id && &s.date == date && &s.workout == workout
            }),
            NaturalKey::Meal {
                user_id,
                date,
                meal,
                food,
            } => self.meals.iter().any(|(_, r)| {
                &r.user_id == user_id && &r.date == date && &r.meal == meal && &r.food == food
            }),
            NaturalKey::Coaching {
                user_id,
                date,
                title,
            } => self.coaching.iter().any(|(_, r)| {
                &r.user_id == user_id && &r.date == date && &r.title == title
            }),
        }
    }

    fn delete_key(&mut self, key: &NaturalKey) {
        match key {
            NaturalKey::Health { user_id, date } => self
                .health
                .retain(|(_, r)| !(&r.user_id == user_id && &r.date == date)),
            NaturalKey::Workout {
                user_id,
                date,
                workout,
            } => {
                let session_ids: Vec<i64> = self
                    .sessions
                    .iter()
                    .filter(|(_, s)| {
                        &s.user_id == user_id && &s.date == date && &s.workout == workout
                    })
                    .map(|(id, _)| *id)
                    .collect();
                self.exercises
                    .retain(|(_, session_id, _)| !session_ids.contains(session_id));
                self.sessions.retain(|(id, _)| !session_ids.contains(id));
            }
            NaturalKey::Meal {
                user_id,
                date,
                meal,
                food,
            } => self.meals.retain(|(_, r)| {
                !(&r.user_id == user_id && &r.date == date && &r.meal == meal && &r.food == food)
            }),
            NaturalKey::Coaching {
                user_id,
                date,
                title,
            } => self.coaching.retain(|(_, r)| {
                !(&r.user_id == user_id && &r.date == date && &r.title == title)
            }),
        }
    }
}

/// In-memory persistence port for unit and property tests.
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    fail_after: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            fail_after: None,
        }
    }

    /// Force `stage` to fail after `n` records have been staged.
    pub fn failing_after(n: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            fail_after: Some(n),
        }
    }

    /// Total committed data rows across all domain tables.
    pub fn row_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.health.len() + inner.sessions.len() + inner.exercises.len() + inner.meals.len()
            + inner.coaching.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn exists(&self, key: &NaturalKey) -> Result<bool, StoreError> {
        Ok(self.inner.lock().unwrap().has_key(key))
    }

    async fn stage(&self, writes: &[StagedWrite]) -> Result<Box<dyn StagedRun>, StoreError> {
        let mut staged = Vec::new();
        let mut ids = Vec::new();
        {
            let mut inner = self.inner.lock().unwrap();
            for (index, write) in writes.iter().enumerate() {
                if let Some(limit) = self.fail_after {
                    if index >= limit {
                        return Err(StoreError::Transaction(format!(
                            "forced failure after {} staged records",
                            limit
                        )));
                    }
                }
                let mut record_ids = Vec::new();
                match &write.record {
                    StageRecord::WorkoutSession(session) => {
                        let session_id = inner.alloc();
                        record_ids.push(RecordId::new("workout_sessions", session_id));
                        for _ in &session.exercises {
                            record_ids.push(RecordId::new("workout_exercises", inner.alloc()));
                        }
                    }
                    StageRecord::Health(_) => {
                        record_ids.push(RecordId::new("health_metrics", inner.alloc()));
                    }
                    StageRecord::Meal(_) => {
                        record_ids.push(RecordId::new("meals", inner.alloc()));
                    }
                    StageRecord::Coaching(_) => {
                        record_ids.push(RecordId::new("coaching_notes", inner.alloc()));
                    }
                }
                ids.extend(record_ids.iter().cloned());
                staged.push((write.clone(), record_ids));
            }
        }

        Ok(Box::new(MemoryStagedRun {
            inner: Arc::clone(&self.inner),
            staged,
            ids,
        }))
    }

    async fn delete(&self, ids: &[RecordId]) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut deleted = 0u64;
        for record_id in ids {
            let before = match record_id.table.as_str() {
                "health_metrics" => {
                    let n = inner.health.len();
                    inner.health.retain(|(id, _)| *id != record_id.id);
                    n - inner.health.len()
                }
                "workout_sessions" => {
                    let n = inner.sessions.len();
                    inner.sessions.retain(|(id, _)| *id != record_id.id);
                    n - inner.sessions.len()
                }
                "workout_exercises" => {
                    let n = inner.exercises.len();
                    inner.exercises.retain(|(id, _, _)| *id != record_id.id);
                    n - inner.exercises.len()
                }
                "meals" => {
                    let n = inner.meals.len();
                    inner.meals.retain(|(id, _)| *id != record_id.id);
                    n - inner.meals.len()
                }
                "coaching_notes" => {
                    let n = inner.coaching.len();
                    inner.coaching.retain(|(id, _)| *id != record_id.id);
                    n - inner.coaching.len()
                }
                other => {
                    return Err(StoreError::Transaction(format!(
                        "refusing to delete from unknown table '{}'",
                        other
                    )))
                }
            };
            deleted += before as u64;
        }
        Ok(deleted)
    }

    async fn list_runs(&self, user_id: &str) -> Result<Vec<RunSummary>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut summaries: Vec<RunSummary> = inner
            .runs
            .iter()
            .filter(|run| run.user_id == user_id)
            .map(|run| RunSummary {
                run_id: run.run_id.clone(),
                domain: run.domain,
                user_id: run.user_id.clone(),
                state: run.state,
                counts: run.counts,
                started_at: run.started_at.to_rfc3339(),
                finished_at: run.finished_at.map(|t| t.to_rfc3339()),
            })
            .collect();
        summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(summaries)
    }

    async fn mark_run_reverted(&self, run_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(run) = inner.runs.iter_mut().find(|run| run.run_id == run_id) {
            run.state = RunState::Reverted;
        }
        Ok(())
    }

    async fn export_rows(
        &self,
        domain: Domain,
        user_id: &str,
    ) -> Result<Vec<ValidatedRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<ValidatedRecord> = match domain {
            Domain::Health => inner
                .health
                .iter()
                .filter(|(_, r)| r.user_id == user_id)
                .map(|(_, r)| ValidatedRecord::Health(r.clone()))
                .collect(),
            Domain::Workout => {
                let mut out = Vec::new();
                let mut sessions: Vec<&(i64, SessionRow)> = inner
                    .sessions
                    .iter()
                    .filter(|(_, s)| s.user_id == user_id)
                    .collect();
                sessions.sort_by(|a, b| (a.1.date, a.0).cmp(&(b.1.date, b.0)));
                for (session_id, session) in sessions {
                    for (_, sid, entry) in inner.exercises.iter() {
                        if sid == session_id {
                            out.push(ValidatedRecord::Workout(WorkoutRow {
                                user_id: session.user_id.clone(),
                                date: session.date,
                                phase: session.phase.clone(),
                                workout: session.workout.clone(),
                                exercise: entry.exercise.clone(),
                                volume: entry.volume,
                                notes: entry.notes.clone(),
                            }));
                        }
                    }
                }
                return Ok(out);
            }
            Domain::Meal => inner
                .meals
                .iter()
                .filter(|(_, r)| r.user_id == user_id)
                .map(|(_, r)| ValidatedRecord::Meal(r.clone()))
                .collect(),
            Domain::Coaching => inner
                .coaching
                .iter()
                .filter(|(_, r)| r.user_id == user_id)
                .map(|(_, r)| ValidatedRecord::Coaching(r.clone()))
                .collect(),
        };
        rows.sort_by_key(|r| r.date());
        Ok(rows)
    }
}

struct MemoryStagedRun {
    inner: Arc<Mutex<Inner>>,
    staged: Vec<(StagedWrite, Vec<RecordId>)>,
    ids: Vec<RecordId>,
}

#[async_trait]
impl StagedRun for MemoryStagedRun {
    fn record_ids(&self) -> &[RecordId] {
        &self.ids
    }

    async fn commit(self: Box<Self>, run: &MigrationRun) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        for (write, record_ids) in &self.staged {
            if write.overwrite {
                inner.delete_key(&write.record.natural_key());
            }
            match &write.record {
                StageRecord::Health(r) => {
                    inner.health.push((record_ids[0].id, r.clone()));
                }
                StageRecord::WorkoutSession(session) => {
                    let session_id = record_ids[0].id;
                    inner.sessions.push((
                        session_id,
                        SessionRow {
                            user_id: session.user_id.clone(),
                            date: session.date,
                            phase: session.phase.clone(),
                            workout: session.workout.clone(),
                        },
                    ));
                    for (entry, record_id) in session.exercises.iter().zip(&record_ids[1..]) {
                        inner.exercises.push((record_id.id, session_id, entry.clone()));
                    }
                }
                StageRecord::Meal(r) => {
                    inner.meals.push((record_ids[0].id, r.clone()));
                }
                StageRecord::Coaching(r) => {
                    inner.coaching.push((record_ids[0].id, r.clone()));
                }
            }
        }
        inner.runs.push(run.clone());
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<(), StoreError> {
        // Nothing was applied; dropping the buffer is the rollback.
        Ok(())
    }
}
