//! Core data types that flow through the migration pipeline.
//!
//! Raw markdown rows ([`SourceRecord`]) are produced by the parser and
//! consumed by the validators, which emit typed, range-checked
//! [`ValidatedRecord`]s. Only validated records cross into persistence
//! logic; raw string maps never do.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::RowError;

/// The four migratable data domains.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Health,
    Workout,
    Meal,
    Coaching,
}

impl Domain {
    pub const ALL: [Domain; 4] = [
        Domain::Health,
        Domain::Workout,
        Domain::Meal,
        Domain::Coaching,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Health => "health",
            Domain::Workout => "workout",
            Domain::Meal => "meal",
            Domain::Coaching => "coaching",
        }
    }

    pub fn parse(s: &str) -> Option<Domain> {
        match s {
            "health" => Some(Domain::Health),
            "workout" => Some(Domain::Workout),
            "meal" => Some(Domain::Meal),
            "coaching" => Some(Domain::Coaching),
            _ => None,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw row as extracted from a markdown source, before validation.
///
/// Field order follows the source column order. Discarded once the
/// validators have produced a [`ValidatedRecord`] or a set of
/// [`RowError`]s for it.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub file: String,
    /// 1-based line number of the row (or section header) in the source.
    pub line: usize,
    pub fields: Vec<(String, String)>,
}

impl SourceRecord {
    pub fn new(file: &str, line: usize) -> Self {
        Self {
            file: file.to_string(),
            line,
            fields: Vec::new(),
        }
    }

    pub fn push(&mut self, column: &str, value: &str) {
        self.fields.push((column.to_string(), value.to_string()));
    }

    /// Case-insensitive column lookup.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value.as_str())
    }
}

/// Exercise volume notation, normalized from free text like `"3x10"`,
/// `"3 sets of 10 reps"`, or `"30 minutes"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseVolume {
    Sets { sets: u32, reps: u32 },
    Duration { minutes: u32 },
}

impl fmt::Display for ExerciseVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExerciseVolume::Sets { sets, reps } => write!(f, "{}x{}", sets, reps),
            ExerciseVolume::Duration { minutes } => write!(f, "{} minutes", minutes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRow {
    pub user_id: String,
    pub date: NaiveDate,
    pub weight_lbs: Option<f64>,
    pub body_fat_pct: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutRow {
    pub user_id: String,
    pub date: NaiveDate,
    pub phase: Option<String>,
    pub workout: String,
    pub exercise: String,
    pub volume: ExerciseVolume,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealRow {
    pub user_id: String,
    pub date: NaiveDate,
    pub meal: String,
    pub food: String,
    pub calories: Option<u32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachingRow {
    pub user_id: String,
    pub date: NaiveDate,
    pub title: String,
    pub trainer: Option<String>,
    pub subject: Option<String>,
    pub orders: Option<String>,
    pub body: String,
}

/// A typed record produced by the validators. One variant per domain;
/// workout rows are still per-exercise here and are grouped into
/// sessions by the migrator before staging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "lowercase")]
pub enum ValidatedRecord {
    Health(HealthRow),
    Workout(WorkoutRow),
    Meal(MealRow),
    Coaching(CoachingRow),
}

impl ValidatedRecord {
    pub fn domain(&self) -> Domain {
        match self {
            ValidatedRecord::Health(_) => Domain::Health,
            ValidatedRecord::Workout(_) => Domain::Workout,
            ValidatedRecord::Meal(_) => Domain::Meal,
            ValidatedRecord::Coaching(_) => Domain::Coaching,
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            ValidatedRecord::Health(r) => r.date,
            ValidatedRecord::Workout(r) => r.date,
            ValidatedRecord::Meal(r) => r.date,
            ValidatedRecord::Coaching(r) => r.date,
        }
    }

    /// The natural key that identifies this record for deduplication.
    pub fn natural_key(&self) -> NaturalKey {
        match self {
            ValidatedRecord::Health(r) => NaturalKey::Health {
                user_id: r.user_id.clone(),
                date: r.date,
            },
            ValidatedRecord::Workout(r) => NaturalKey::Workout {
                user_id: r.user_id.clone(),
                date: r.date,
                workout: r.workout.clone(),
            },
            ValidatedRecord::Meal(r) => NaturalKey::Meal {
                user_id: r.user_id.clone(),
                date: r.date,
                meal: r.meal.clone(),
                food: r.food.clone(),
            },
            ValidatedRecord::Coaching(r) => NaturalKey::Coaching {
                user_id: r.user_id.clone(),
                date: r.date,
                title: r.title.clone(),
            },
        }
    }
}

/// A workout session: the persistence-level grouping of exercise rows
/// that share `(user_id, date, workout)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSession {
    pub user_id: String,
    pub date: NaiveDate,
    pub phase: Option<String>,
    pub workout: String,
    pub exercises: Vec<ExerciseEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseEntry {
    pub exercise: String,
    pub volume: ExerciseVolume,
    pub notes: Option<String>,
}

/// What actually gets handed to the persistence port for insertion.
/// Identical to [`ValidatedRecord`] except that workout rows have been
/// grouped into parent sessions with child exercises.
#[derive(Debug, Clone, PartialEq)]
pub enum StageRecord {
    Health(HealthRow),
    WorkoutSession(WorkoutSession),
    Meal(MealRow),
    Coaching(CoachingRow),
}

impl StageRecord {
    pub fn natural_key(&self) -> NaturalKey {
        match self {
            StageRecord::Health(r) => NaturalKey::Health {
                user_id: r.user_id.clone(),
                date: r.date,
            },
            StageRecord::WorkoutSession(s) => NaturalKey::Workout {
                user_id: s.user_id.clone(),
                date: s.date,
                workout: s.workout.clone(),
            },
            StageRecord::Meal(r) => NaturalKey::Meal {
                user_id: r.user_id.clone(),
                date: r.date,
                meal: r.meal.clone(),
                food: r.food.clone(),
            },
            StageRecord::Coaching(r) => NaturalKey::Coaching {
                user_id: r.user_id.clone(),
                date: r.date,
                title: r.title.clone(),
            },
        }
    }

    /// Number of source rows this stage record accounts for. Sessions
    /// count one per exercise so run counts stay in row units.
    pub fn row_units(&self) -> u64 {
        match self {
            StageRecord::WorkoutSession(s) => s.exercises.len() as u64,
            _ => 1,
        }
    }
}

/// A staged write: the record plus whether an existing row with the
/// same natural key should be replaced (only when duplicate skipping
/// has been disabled).
#[derive(Debug, Clone)]
pub struct StagedWrite {
    pub record: StageRecord,
    pub overwrite: bool,
}

/// Dedup key per domain. Health is keyed by date alone; the other
/// domains carry a discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NaturalKey {
    Health {
        user_id: String,
        date: NaiveDate,
    },
    Workout {
        user_id: String,
        date: NaiveDate,
        workout: String,
    },
    Meal {
        user_id: String,
        date: NaiveDate,
        meal: String,
        food: String,
    },
    Coaching {
        user_id: String,
        date: NaiveDate,
        title: String,
    },
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NaturalKey::Health { user_id, date } => write!(f, "health/{}/{}", user_id, date),
            NaturalKey::Workout {
                user_id,
                date,
                workout,
            } => write!(f, "workout/{}/{}/{}", user_id, date, workout),
            NaturalKey::Meal {
                user_id,
                date,
                meal,
                food,
            } => write!(f, "meal/{}/{}/{}/{}", user_id, date, meal, food),
            NaturalKey::Coaching {
                user_id,
                date,
                title,
            } => write!(f, "coaching/{}/{}/{}", user_id, date, title),
        }
    }
}

/// Primary key of one inserted row: table name plus rowid. Workout runs
/// span two tables, so the table is part of the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordId {
    pub table: String,
    pub id: i64,
}

impl RecordId {
    pub fn new(table: &str, id: i64) -> Self {
        Self {
            table: table.to_string(),
            id,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.id)
    }
}

/// Lifecycle state of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Parsing,
    Validating,
    /// Terminal state of a dry run.
    Reported,
    Staging,
    Committing,
    Committed,
    /// Terminal: commit failed, zero rows persisted.
    RolledBack,
    /// Terminal: a committed run was later undone via the journal.
    Reverted,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Parsing => "parsing",
            RunState::Validating => "validating",
            RunState::Reported => "reported",
            RunState::Staging => "staging",
            RunState::Committing => "committing",
            RunState::Committed => "committed",
            RunState::RolledBack => "rolled_back",
            RunState::Reverted => "reverted",
        }
    }

    pub fn parse(s: &str) -> Option<RunState> {
        match s {
            "pending" => Some(RunState::Pending),
            "parsing" => Some(RunState::Parsing),
            "validating" => Some(RunState::Validating),
            "reported" => Some(RunState::Reported),
            "staging" => Some(RunState::Staging),
            "committing" => Some(RunState::Committing),
            "committed" => Some(RunState::Committed),
            "rolled_back" => Some(RunState::RolledBack),
            "reverted" => Some(RunState::Reverted),
            _ => None,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result counts for one run. Invariants: `parsed = valid + invalid`
/// and `valid = inserted + skipped_duplicate`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub parsed: u64,
    pub valid: u64,
    pub invalid: u64,
    pub inserted: u64,
    pub skipped_duplicate: u64,
}

/// One invocation of a domain migrator. Append-only once finalized;
/// the only later mutation is the committed → reverted transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRun {
    pub run_id: String,
    pub domain: Domain,
    pub user_id: String,
    pub dry_run: bool,
    pub state: RunState,
    pub counts: RunCounts,
    pub errors: Vec<RowError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl MigrationRun {
    pub fn new(domain: Domain, user_id: &str, dry_run: bool) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            domain,
            user_id: user_id.to_string(),
            dry_run,
            state: RunState::Pending,
            counts: RunCounts::default(),
            errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn finish(&mut self, state: RunState) {
        self.state = state;
        self.finished_at = Some(Utc::now());
    }
}

/// Stored summary of a past run, for `--list-migrations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub domain: Domain,
    pub user_id: String,
    pub state: RunState,
    pub counts: RunCounts,
    pub started_at: String,
    pub finished_at: Option<String>,
}
