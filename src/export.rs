//! Markdown export: rebuild source-format markdown from committed rows.
//!
//! The inverse of the parser, used to spot-check a migration by diffing
//! regenerated markdown against the original source. Output follows the
//! same table and section layouts the parsers accept, so an exported
//! file re-migrates to identical rows.

use tracing::debug;

use crate::error::MigrateError;
use crate::models::{Domain, ValidatedRecord};
use crate::store::Store;

/// Render all committed rows of one domain for one user as markdown.
pub async fn export_markdown(
    store: &dyn Store,
    domain: Domain,
    user_id: &str,
) -> Result<String, MigrateError> {
    let rows = store.export_rows(domain, user_id).await?;
    debug!(domain = %domain, rows = rows.len(), "exporting rows");
    Ok(match domain {
        Domain::Health => render_health(&rows),
        Domain::Workout => render_workout(&rows),
        Domain::Meal => render_meal(&rows),
        Domain::Coaching => render_coaching(&rows),
    })
}

fn render_health(rows: &[ValidatedRecord]) -> String {
    let mut out = String::from("# Health Tracking\n\n");
    out.push_str("| Date | Weight (lbs) | Body Fat % | Notes |\n");
    out.push_str("|------|--------------|------------|-------|\n");
    for row in rows {
        let ValidatedRecord::Health(r) = row else {
            continue;
        };
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            r.date,
            opt_float(r.weight_lbs),
            opt_float(r.body_fat_pct),
            opt_text(r.notes.as_deref()),
        ));
    }
    out
}

fn render_workout(rows: &[ValidatedRecord]) -> String {
    let mut out = String::from("# Workout Log\n\n");
    out.push_str("| Date | Phase | Workout | Exercise | Sets x Reps | Notes |\n");
    out.push_str("|------|-------|---------|----------|-------------|-------|\n");
    for row in rows {
        let ValidatedRecord::Workout(r) = row else {
            continue;
        };
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            r.date,
            opt_text(r.phase.as_deref()),
            r.workout,
            r.exercise,
            r.volume,
            opt_text(r.notes.as_deref()),
        ));
    }
    out
}

fn render_meal(rows: &[ValidatedRecord]) -> String {
    let mut out = String::from("# Meal Log\n\n");
    out.push_str("| Date | Meal | Food/Drink | Calories (est.) | Notes |\n");
    out.push_str("|------|------|------------|-----------------|-------|\n");
    for row in rows {
        let ValidatedRecord::Meal(r) = row else {
            continue;
        };
        let calories = r
            .calories
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            r.date,
            r.meal,
            r.food,
            calories,
            opt_text(r.notes.as_deref()),
        ));
    }
    out
}

fn render_coaching(rows: &[ValidatedRecord]) -> String {
    let mut out = String::from("# Coaching Notes\n");
    for row in rows {
        let ValidatedRecord::Coaching(r) = row else {
            continue;
        };
        out.push_str(&format!("\n## {}: {}\n\n", r.date, r.title));
        if let Some(trainer) = &r.trainer {
            out.push_str(&format!("**Trainer:** {}\n", trainer));
        }
        if let Some(subject) = &r.subject {
            out.push_str(&format!("**Subject:** {}\n", subject));
        }
        if let Some(orders) = &r.orders {
            out.push_str(&format!("**Orders:** {}\n", orders));
        }
        if !r.body.is_empty() {
            out.push('\n');
            out.push_str(&r.body);
            out.push('\n');
        }
    }
    out
}

fn opt_text(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

fn opt_float(value: Option<f64>) -> String {
    match value {
        Some(v) => {
            if v.fract() == 0.0 {
                format!("{:.0}", v)
            } else {
                format!("{}", v)
            }
        }
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CoachingRow, ExerciseVolume, HealthRow, WorkoutRow};
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_health_table_round_trips_through_parser() {
        let rows = vec![ValidatedRecord::Health(HealthRow {
            user_id: "daniel".into(),
            date: date("2024-11-14"),
            weight_lbs: Some(175.5),
            body_fat_pct: None,
            notes: Some("morning".into()),
        })];
        let markdown = render_health(&rows);

        let schema = crate::migrator::table_schema(Domain::Health).unwrap();
        let (records, errors) = crate::parser::parse_table(
            &markdown,
            &schema,
            crate::parser::ParseMode::Strict,
            "export.md",
        );
        assert!(errors.is_empty());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("Weight (lbs)"), Some("175.5"));
        assert_eq!(records[0].get("Body Fat %"), Some("-"));
    }

    #[test]
    fn test_workout_volume_renders_both_notations() {
        let mut row = WorkoutRow {
            user_id: "daniel".into(),
            date: date("2024-11-14"),
            phase: None,
            workout: "Upper A".into(),
            exercise: "Bench Press".into(),
            volume: ExerciseVolume::Sets { sets: 3, reps: 10 },
            notes: None,
        };
        let sets = render_workout(&[ValidatedRecord::Workout(row.clone())]);
        assert!(sets.contains("| 3x10 |"));

        row.volume = ExerciseVolume::Duration { minutes: 30 };
        let duration = render_workout(&[ValidatedRecord::Workout(row)]);
        assert!(duration.contains("| 30 minutes |"));
    }

    #[test]
    fn test_coaching_sections_round_trip_through_parser() {
        let rows = vec![ValidatedRecord::Coaching(CoachingRow {
            user_id: "daniel".into(),
            date: date("2024-11-14"),
            title: "Deload week".into(),
            trainer: Some("Alex".into()),
            subject: None,
            orders: Some("Cut volume in half".into()),
            body: "Felt beat up, pulling intensity back.".into(),
        })];
        let markdown = render_coaching(&rows);

        let (records, errors) = crate::parser::parse_sections(
            &markdown,
            crate::parser::ParseMode::Strict,
            "export.md",
        );
        assert!(errors.is_empty());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("title"), Some("Deload week"));
        assert_eq!(records[0].get("trainer"), Some("Alex"));
        assert_eq!(
            records[0].get("body"),
            Some("Felt beat up, pulling intensity back.")
        );
    }
}
