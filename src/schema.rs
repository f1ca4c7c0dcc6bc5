//! Database schema for the migrated domains.
//!
//! Every domain table carries a UNIQUE index on its natural key so the
//! store can never hold two rows the dedup logic would consider the same
//! record. Creation is idempotent.

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS health_metrics (
            id INTEGER PRIMARY KEY,
            user_id TEXT NOT NULL,
            date TEXT NOT NULL,
            weight_lbs REAL,
            body_fat_pct REAL,
            notes TEXT,
            UNIQUE(user_id, date)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workout_sessions (
            id INTEGER PRIMARY KEY,
            user_id TEXT NOT NULL,
            date TEXT NOT NULL,
            phase TEXT,
            workout TEXT NOT NULL,
            UNIQUE(user_id, date, workout)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workout_exercises (
            id INTEGER PRIMARY KEY,
            session_id INTEGER NOT NULL,
            exercise TEXT NOT NULL,
            sets INTEGER,
            reps INTEGER,
            duration_minutes INTEGER,
            notes TEXT,
            FOREIGN KEY (session_id) REFERENCES workout_sessions(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meals (
            id INTEGER PRIMARY KEY,
            user_id TEXT NOT NULL,
            date TEXT NOT NULL,
            meal TEXT NOT NULL,
            food TEXT NOT NULL,
            calories INTEGER,
            notes TEXT,
            UNIQUE(user_id, date, meal, food)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS coaching_notes (
            id INTEGER PRIMARY KEY,
            user_id TEXT NOT NULL,
            date TEXT NOT NULL,
            title TEXT NOT NULL,
            trainer TEXT,
            subject TEXT,
            orders TEXT,
            body TEXT NOT NULL,
            UNIQUE(user_id, date, title)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS migration_runs (
            run_id TEXT PRIMARY KEY,
            domain TEXT NOT NULL,
            user_id TEXT NOT NULL,
            state TEXT NOT NULL,
            parsed INTEGER NOT NULL,
            valid INTEGER NOT NULL,
            invalid INTEGER NOT NULL,
            inserted INTEGER NOT NULL,
            skipped_duplicate INTEGER NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_health_user_date ON health_metrics(user_id, date)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sessions_user_date ON workout_sessions(user_id, date)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_exercises_session ON workout_exercises(session_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_meals_user_date ON meals(user_id, date)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_runs_user_started ON migration_runs(user_id, started_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
