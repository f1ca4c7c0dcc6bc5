//! Field and row validators.
//!
//! One pure function per field. Each returns the typed value or an error
//! message; canonical null markers ("None", "N/A", empty) map to `None`
//! for optional numeric fields rather than erroring. Row validators
//! compose the field validators into a [`ValidatedRecord`] or a list of
//! per-field errors tagged with the row's line number; a bad row never
//! aborts a run.

use chrono::NaiveDate;

use crate::error::RowError;
use crate::models::{
    CoachingRow, Domain, ExerciseVolume, HealthRow, MealRow, SourceRecord, ValidatedRecord,
    WorkoutRow,
};

pub const WEIGHT_RANGE: (f64, f64) = (50.0, 1000.0);
pub const BODY_FAT_RANGE: (f64, f64) = (0.0, 100.0);
pub const CALORIES_MAX: u32 = 10_000;

/// Canonical "no value" markers that map to null rather than an error.
pub fn is_null_marker(raw: &str) -> bool {
    let s = raw.trim();
    s.is_empty() || s == "-" || s.eq_ignore_ascii_case("none") || s.eq_ignore_ascii_case("n/a")
}

/// Strict `YYYY-MM-DD`. Anything else is an error.
pub fn validate_date(raw: &str) -> Result<NaiveDate, String> {
    let s = raw.trim();
    if s.len() != 10 {
        return Err(format!("date must be YYYY-MM-DD, got '{}'", raw.trim()));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("date must be YYYY-MM-DD, got '{}'", s))
}

fn validate_range(
    raw: &str,
    label: &str,
    min: f64,
    max: f64,
) -> Result<Option<f64>, String> {
    if is_null_marker(raw) {
        return Ok(None);
    }
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("{} must be numeric, got '{}'", label, raw.trim()))?;
    if !(min..=max).contains(&value) {
        return Err(format!(
            "{} must be between {} and {}, got {}",
            label, min, max, value
        ));
    }
    Ok(Some(value))
}

pub fn validate_weight(raw: &str) -> Result<Option<f64>, String> {
    validate_range(raw, "weight", WEIGHT_RANGE.0, WEIGHT_RANGE.1)
}

pub fn validate_body_fat(raw: &str) -> Result<Option<f64>, String> {
    let cleaned = raw.trim().trim_end_matches('%');
    validate_range(cleaned, "body fat", BODY_FAT_RANGE.0, BODY_FAT_RANGE.1)
}

/// Estimated calories; a leading `~` and digit-group commas are
/// tolerated (`~1,200`).
pub fn validate_calories(raw: &str) -> Result<Option<u32>, String> {
    if is_null_marker(raw) {
        return Ok(None);
    }
    let cleaned: String = raw
        .trim()
        .trim_start_matches('~')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    let value: u32 = cleaned
        .trim()
        .parse()
        .map_err(|_| format!("calories must be a whole number, got '{}'", raw.trim()))?;
    if value > CALORIES_MAX {
        return Err(format!(
            "calories must be at most {}, got {}",
            CALORIES_MAX, value
        ));
    }
    Ok(Some(value))
}

/// Normalize sets/reps notation.
///
/// Accepted shapes: `3x10`, `3 sets of 10 reps`,
/// `3 sets: 15,12,10 reps` (reps averaged), `30 minutes` (mapped to a
/// duration). Anything else is an error.
pub fn parse_sets_reps(raw: &str) -> Result<ExerciseVolume, String> {
    let s = raw.trim().to_lowercase();
    if s.is_empty() {
        return Err("sets/reps must not be empty".to_string());
    }

    // "30 minutes" / "30 min"
    for suffix in ["minutes", "minute", "mins", "min"] {
        if let Some(prefix) = s.strip_suffix(suffix) {
            let minutes: u32 = prefix
                .trim()
                .parse()
                .map_err(|_| format!("unrecognized duration: '{}'", raw.trim()))?;
            return Ok(ExerciseVolume::Duration { minutes });
        }
    }

    // "3x10"
    if let Some((sets, reps)) = s.split_once('x') {
        if let (Ok(sets), Ok(reps)) = (sets.trim().parse(), reps.trim().parse()) {
            return Ok(ExerciseVolume::Sets { sets, reps });
        }
    }

    // "3 sets of 10 reps" / "3 sets: 15,12,10 reps"
    if let Some((sets_part, rest)) = s.split_once("sets") {
        let sets: u32 = sets_part
            .trim()
            .parse()
            .map_err(|_| format!("unrecognized sets/reps notation: '{}'", raw.trim()))?;
        let rest = rest.trim_start();

        if let Some(reps_part) = rest.strip_prefix("of ") {
            let reps: u32 = reps_part
                .trim_end_matches("reps")
                .trim()
                .parse()
                .map_err(|_| format!("unrecognized sets/reps notation: '{}'", raw.trim()))?;
            return Ok(ExerciseVolume::Sets { sets, reps });
        }

        if let Some(list_part) = rest.strip_prefix(':') {
            let list = list_part.trim_end_matches("reps").trim();
            let mut total = 0u32;
            let mut count = 0u32;
            for piece in list.split(',') {
                let reps: u32 = piece
                    .trim()
                    .parse()
                    .map_err(|_| format!("unrecognized rep list: '{}'", raw.trim()))?;
                total = total
                    .checked_add(reps)
                    .ok_or_else(|| format!("unrecognized rep list: '{}'", raw.trim()))?;
                count += 1;
            }
            if count == 0 {
                return Err(format!("unrecognized rep list: '{}'", raw.trim()));
            }
            let reps = ((total as f64) / (count as f64)).round() as u32;
            return Ok(ExerciseVolume::Sets { sets, reps });
        }
    }

    Err(format!("unrecognized sets/reps notation: '{}'", raw.trim()))
}

fn optional_text(raw: Option<&str>) -> Option<String> {
    match raw {
        Some(s) if !is_null_marker(s) => Some(s.trim().to_string()),
        _ => None,
    }
}

fn required_text(
    rec: &SourceRecord,
    column: &str,
    errors: &mut Vec<RowError>,
) -> Option<String> {
    match rec.get(column) {
        Some(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(_) => {
            errors.push(RowError::validation(
                &rec.file,
                rec.line,
                column,
                "must not be empty",
            ));
            None
        }
        None => {
            errors.push(RowError::validation(
                &rec.file,
                rec.line,
                column,
                "missing column",
            ));
            None
        }
    }
}

fn field_date(rec: &SourceRecord, column: &str, errors: &mut Vec<RowError>) -> Option<NaiveDate> {
    match rec.get(column) {
        Some(raw) => match validate_date(raw) {
            Ok(date) => Some(date),
            Err(msg) => {
                errors.push(RowError::validation(&rec.file, rec.line, column, msg));
                None
            }
        },
        None => {
            errors.push(RowError::validation(
                &rec.file,
                rec.line,
                column,
                "missing column",
            ));
            None
        }
    }
}

pub fn validate_health_row(rec: &SourceRecord, user_id: &str) -> Result<ValidatedRecord, Vec<RowError>> {
    let mut errors = Vec::new();

    let date = field_date(rec, "Date", &mut errors);

    let weight = match validate_weight(rec.get("Weight (lbs)").unwrap_or_default()) {
        Ok(v) => v,
        Err(msg) => {
            errors.push(RowError::validation(&rec.file, rec.line, "Weight (lbs)", msg));
            None
        }
    };

    let body_fat = match validate_body_fat(rec.get("Body Fat %").unwrap_or_default()) {
        Ok(v) => v,
        Err(msg) => {
            errors.push(RowError::validation(&rec.file, rec.line, "Body Fat %", msg));
            None
        }
    };

    let notes = optional_text(rec.get("Notes"));

    match date {
        Some(date) if errors.is_empty() => Ok(ValidatedRecord::Health(HealthRow {
            user_id: user_id.to_string(),
            date,
            weight_lbs: weight,
            body_fat_pct: body_fat,
            notes,
        })),
        _ => Err(errors),
    }
}

pub fn validate_workout_row(rec: &SourceRecord, user_id: &str) -> Result<ValidatedRecord, Vec<RowError>> {
    let mut errors = Vec::new();

    let date = field_date(rec, "Date", &mut errors);
    let phase = optional_text(rec.get("Phase"));
    let workout = required_text(rec, "Workout", &mut errors);
    let exercise = required_text(rec, "Exercise", &mut errors);

    let volume = match parse_sets_reps(rec.get("Sets x Reps").unwrap_or_default()) {
        Ok(v) => Some(v),
        Err(msg) => {
            errors.push(RowError::validation(&rec.file, rec.line, "Sets x Reps", msg));
            None
        }
    };

    let notes = optional_text(rec.get("Notes"));

    match (date, workout, exercise, volume) {
        (Some(date), Some(workout), Some(exercise), Some(volume)) if errors.is_empty() => {
            Ok(ValidatedRecord::Workout(WorkoutRow {
                user_id: user_id.to_string(),
                date,
                phase,
                workout,
                exercise,
                volume,
                notes,
            }))
        }
        _ => Err(errors),
    }
}

pub fn validate_meal_row(rec: &SourceRecord, user_id: &str) -> Result<ValidatedRecord, Vec<RowError>> {
    let mut errors = Vec::new();

    let date = field_date(rec, "Date", &mut errors);
    let meal = required_text(rec, "Meal", &mut errors);
    let food = required_text(rec, "Food/Drink", &mut errors);

    let calories = match validate_calories(rec.get("Calories (est.)").unwrap_or_default()) {
        Ok(v) => v,
        Err(msg) => {
            errors.push(RowError::validation(
                &rec.file,
                rec.line,
                "Calories (est.)",
                msg,
            ));
            None
        }
    };

    let notes = optional_text(rec.get("Notes"));

    match (date, meal, food) {
        (Some(date), Some(meal), Some(food)) if errors.is_empty() => {
            Ok(ValidatedRecord::Meal(MealRow {
                user_id: user_id.to_string(),
                date,
                meal,
                food,
                calories,
                notes,
            }))
        }
        _ => Err(errors),
    }
}

pub fn validate_coaching_row(rec: &SourceRecord, user_id: &str) -> Result<ValidatedRecord, Vec<RowError>> {
    let mut errors = Vec::new();

    let date = field_date(rec, "date", &mut errors);
    let title = required_text(rec, "title", &mut errors);
    let trainer = optional_text(rec.get("trainer"));
    let subject = optional_text(rec.get("subject"));
    let orders = optional_text(rec.get("orders"));
    let body = rec.get("body").unwrap_or_default().trim().to_string();

    match (date, title) {
        (Some(date), Some(title)) if errors.is_empty() => {
            Ok(ValidatedRecord::Coaching(CoachingRow {
                user_id: user_id.to_string(),
                date,
                title,
                trainer,
                subject,
                orders,
                body,
            }))
        }
        _ => Err(errors),
    }
}

/// Validate all rows for a domain, partitioning into typed records and
/// per-field errors. Returns `(valid, errors, invalid_row_count)`;
/// a row with several bad fields contributes several errors but counts
/// as one invalid row.
pub fn validate_rows(
    domain: Domain,
    records: &[SourceRecord],
    user_id: &str,
) -> (Vec<ValidatedRecord>, Vec<RowError>, u64) {
    let mut valid = Vec::new();
    let mut errors = Vec::new();
    let mut invalid_rows = 0u64;

    for rec in records {
        let result = match domain {
            Domain::Health => validate_health_row(rec, user_id),
            Domain::Workout => validate_workout_row(rec, user_id),
            Domain::Meal => validate_meal_row(rec, user_id),
            Domain::Coaching => validate_coaching_row(rec, user_id),
        };
        match result {
            Ok(record) => valid.push(record),
            Err(row_errors) => {
                invalid_rows += 1;
                errors.extend(row_errors);
            }
        }
    }

    (valid, errors, invalid_rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_strict() {
        assert!(validate_date("2024-11-14").is_ok());
        assert!(validate_date(" 2024-11-14 ").is_ok());
        assert!(validate_date("13/45/2024").is_err());
        assert!(validate_date("2024-13-01").is_err());
        assert!(validate_date("2024-1-1").is_err());
        assert!(validate_date("").is_err());
    }

    #[test]
    fn test_weight_range_and_nulls() {
        assert_eq!(validate_weight("175.5").unwrap(), Some(175.5));
        assert_eq!(validate_weight("None").unwrap(), None);
        assert_eq!(validate_weight("n/a").unwrap(), None);
        assert_eq!(validate_weight("").unwrap(), None);
        assert!(validate_weight("abc").is_err());
        assert!(validate_weight("49.9").is_err());
        assert!(validate_weight("1000.5").is_err());
    }

    #[test]
    fn test_body_fat() {
        assert_eq!(validate_body_fat("22.3").unwrap(), Some(22.3));
        assert_eq!(validate_body_fat("22.3%").unwrap(), Some(22.3));
        assert!(validate_body_fat("101").is_err());
        assert!(validate_body_fat("-1").is_err());
    }

    #[test]
    fn test_calories() {
        assert_eq!(validate_calories("650").unwrap(), Some(650));
        assert_eq!(validate_calories("~650").unwrap(), Some(650));
        assert_eq!(validate_calories("~1,200").unwrap(), Some(1200));
        assert_eq!(validate_calories("N/A").unwrap(), None);
        assert!(validate_calories("10001").is_err());
        assert!(validate_calories("lots").is_err());
    }

    #[test]
    fn test_sets_reps_notations() {
        assert_eq!(
            parse_sets_reps("3x10").unwrap(),
            ExerciseVolume::Sets { sets: 3, reps: 10 }
        );
        assert_eq!(
            parse_sets_reps("3 sets of 10 reps").unwrap(),
            ExerciseVolume::Sets { sets: 3, reps: 10 }
        );
        // 15,12,10 averages to 12.33 -> 12
        assert_eq!(
            parse_sets_reps("3 sets: 15,12,10 reps").unwrap(),
            ExerciseVolume::Sets { sets: 3, reps: 12 }
        );
        assert_eq!(
            parse_sets_reps("30 minutes").unwrap(),
            ExerciseVolume::Duration { minutes: 30 }
        );
        assert!(parse_sets_reps("a few").is_err());
        assert!(parse_sets_reps("").is_err());
        // A rep list whose running total would overflow is rejected.
        assert!(parse_sets_reps("1 sets: 4294967295,4294967295 reps").is_err());
    }

    fn health_record(date: &str, weight: &str, fat: &str) -> SourceRecord {
        let mut rec = SourceRecord::new("health.md", 5);
        rec.push("Date", date);
        rec.push("Weight (lbs)", weight);
        rec.push("Body Fat %", fat);
        rec.push("Notes", "");
        rec
    }

    #[test]
    fn test_health_row_valid() {
        let rec = health_record("2024-11-14", "175.5", "22.3");
        let validated = validate_health_row(&rec, "daniel").unwrap();
        match validated {
            ValidatedRecord::Health(row) => {
                assert_eq!(row.user_id, "daniel");
                assert_eq!(row.weight_lbs, Some(175.5));
                assert_eq!(row.body_fat_pct, Some(22.3));
                assert!(row.notes.is_none());
            }
            other => panic!("expected health row, got {:?}", other),
        }
    }

    #[test]
    fn test_health_row_collects_all_field_errors() {
        let rec = health_record("13/45/2024", "abc", "150");
        let errors = validate_health_row(&rec, "daniel").unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.line == 5));
        assert!(errors.iter().any(|e| e.field.as_deref() == Some("Date")));
        assert!(errors
            .iter()
            .any(|e| e.field.as_deref() == Some("Weight (lbs)")
                && e.message.contains("numeric")));
    }

    #[test]
    fn test_validate_rows_partitions() {
        let rows = vec![
            health_record("2024-11-14", "175.5", "22.3"),
            health_record("2024-11-15", "abc", "21.0"),
        ];
        let (valid, errors, invalid) = validate_rows(Domain::Health, &rows, "daniel");
        assert_eq!(valid.len(), 1);
        assert_eq!(invalid, 1);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("numeric"));
    }

    #[test]
    fn test_workout_row() {
        let mut rec = SourceRecord::new("workouts.md", 9);
        rec.push("Date", "2024-11-14");
        rec.push("Phase", "Hypertrophy");
        rec.push("Workout", "Push A");
        rec.push("Exercise", "Bench Press");
        rec.push("Sets x Reps", "3x10");
        rec.push("Notes", "paused reps");
        let validated = validate_workout_row(&rec, "daniel").unwrap();
        match validated {
            ValidatedRecord::Workout(row) => {
                assert_eq!(row.workout, "Push A");
                assert_eq!(row.volume, ExerciseVolume::Sets { sets: 3, reps: 10 });
                assert_eq!(row.notes.as_deref(), Some("paused reps"));
            }
            other => panic!("expected workout row, got {:?}", other),
        }
    }

    #[test]
    fn test_meal_row_tilde_calories() {
        let mut rec = SourceRecord::new("meals.md", 4);
        rec.push("Date", "2024-11-14");
        rec.push("Meal", "Lunch");
        rec.push("Food/Drink", "Chicken bowl");
        rec.push("Calories (est.)", "~750");
        rec.push("Notes", "");
        let validated = validate_meal_row(&rec, "daniel").unwrap();
        match validated {
            ValidatedRecord::Meal(row) => assert_eq!(row.calories, Some(750)),
            other => panic!("expected meal row, got {:?}", other),
        }
    }

    #[test]
    fn test_coaching_row() {
        let mut rec = SourceRecord::new("coaching.md", 3);
        rec.push("date", "2024-11-14");
        rec.push("title", "Form check");
        rec.push("trainer", "Sam");
        rec.push("body", "Keep the bar over midfoot.");
        let validated = validate_coaching_row(&rec, "daniel").unwrap();
        match validated {
            ValidatedRecord::Coaching(row) => {
                assert_eq!(row.title, "Form check");
                assert_eq!(row.trainer.as_deref(), Some("Sam"));
                assert!(row.subject.is_none());
            }
            other => panic!("expected coaching row, got {:?}", other),
        }
    }
}
