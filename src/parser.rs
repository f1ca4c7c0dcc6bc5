//! Markdown parsers: pipe tables and dated sections.
//!
//! Pure text-in, records-out transformation with no I/O. Both parsers
//! produce [`SourceRecord`]s in file order with accurate 1-based line
//! numbers, plus a list of per-row parse errors. In lenient mode a
//! malformed row is skipped and reported; in strict mode the first
//! malformed row aborts the whole file (no records are returned).

use crate::error::RowError;
use crate::models::SourceRecord;

/// How to react to a malformed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Lenient,
    Strict,
}

/// Expected header of a pipe table, in column order.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub columns: Vec<String>,
}

impl TableSchema {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Parse a markdown pipe table against an expected schema.
///
/// Header and separator rows are recognized and skipped; lines without a
/// pipe are treated as surrounding prose and ignored. A data row whose
/// cell count does not match the header is a parse error for that row
/// only (lenient) or aborts the file (strict).
pub fn parse_table(
    text: &str,
    schema: &TableSchema,
    mode: ParseMode,
    file: &str,
) -> (Vec<SourceRecord>, Vec<RowError>) {
    let mut records = Vec::new();
    let mut errors = Vec::new();
    let mut header_seen = false;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if !line.contains('|') {
            continue;
        }

        let cells = split_row(line);
        if cells.is_empty() {
            continue;
        }

        if is_separator(&cells) {
            continue;
        }

        if is_header(&cells, schema) {
            header_seen = true;
            continue;
        }

        if !header_seen {
            let err = RowError::parse(
                file,
                line_no,
                format!(
                    "table row before header; expected columns: {}",
                    schema.columns.join(" | ")
                ),
            );
            if mode == ParseMode::Strict {
                return (Vec::new(), vec![err]);
            }
            errors.push(err);
            continue;
        }

        if cells.len() != schema.columns.len() {
            let err = RowError::parse(
                file,
                line_no,
                format!(
                    "expected {} cells, found {}",
                    schema.columns.len(),
                    cells.len()
                ),
            );
            if mode == ParseMode::Strict {
                return (Vec::new(), vec![err]);
            }
            errors.push(err);
            continue;
        }

        let mut record = SourceRecord::new(file, line_no);
        for (column, cell) in schema.columns.iter().zip(cells.iter()) {
            record.push(column, cell);
        }
        records.push(record);
    }

    (records, errors)
}

/// Parse prose-style sources made of `## YYYY-MM-DD: Title` sections.
///
/// Each section yields one record with `date`, `title`, any labeled
/// sub-fields (`**Trainer:** ...`), and the remaining free text as
/// `body`. A `##` header that does not carry a `date: title` shape is a
/// parse error for that section.
pub fn parse_sections(text: &str, mode: ParseMode, file: &str) -> (Vec<SourceRecord>, Vec<RowError>) {
    let mut records = Vec::new();
    let mut errors = Vec::new();

    let mut current: Option<SectionBuilder> = None;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim_end();

        if let Some(rest) = line.strip_prefix("## ") {
            if let Some(section) = current.take() {
                records.push(section.into_record(file));
            }
            match rest.split_once(':') {
                Some((date, title)) if !title.trim().is_empty() => {
                    current = Some(SectionBuilder::new(
                        line_no,
                        date.trim().to_string(),
                        title.trim().to_string(),
                    ));
                }
                _ => {
                    let err = RowError::parse(
                        file,
                        line_no,
                        format!("section header is not 'YYYY-MM-DD: Title': '{}'", rest),
                    );
                    if mode == ParseMode::Strict {
                        return (Vec::new(), vec![err]);
                    }
                    errors.push(err);
                }
            }
            continue;
        }

        let Some(section) = current.as_mut() else {
            continue;
        };

        // Labeled sub-field: **Trainer:** John
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("**") {
            if let Some((label, value)) = rest.split_once(":**") {
                section
                    .fields
                    .push((label.trim().to_lowercase(), value.trim().to_string()));
                continue;
            }
        }

        section.body_lines.push(line.to_string());
    }

    if let Some(section) = current.take() {
        records.push(section.into_record(file));
    }

    (records, errors)
}

struct SectionBuilder {
    line: usize,
    date: String,
    title: String,
    fields: Vec<(String, String)>,
    body_lines: Vec<String>,
}

impl SectionBuilder {
    fn new(line: usize, date: String, title: String) -> Self {
        Self {
            line,
            date,
            title,
            fields: Vec::new(),
            body_lines: Vec::new(),
        }
    }

    fn into_record(self, file: &str) -> SourceRecord {
        let mut record = SourceRecord::new(file, self.line);
        record.push("date", &self.date);
        record.push("title", &self.title);
        for (label, value) in &self.fields {
            record.push(label, value);
        }
        let body = self.body_lines.join("\n");
        record.push("body", body.trim());
        record
    }
}

fn split_row(line: &str) -> Vec<String> {
    let inner = line.trim().trim_start_matches('|').trim_end_matches('|');
    inner.split('|').map(|cell| cell.trim().to_string()).collect()
}

fn is_separator(cells: &[String]) -> bool {
    cells
        .iter()
        .all(|cell| !cell.is_empty() && cell.chars().all(|c| c == '-' || c == ':'))
}

fn is_header(cells: &[String], schema: &TableSchema) -> bool {
    cells.len() == schema.columns.len()
        && cells
            .iter()
            .zip(schema.columns.iter())
            .all(|(cell, column)| cell.eq_ignore_ascii_case(column))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health_schema() -> TableSchema {
        TableSchema::new(&["Date", "Weight (lbs)", "Body Fat %", "Notes"])
    }

    const HEALTH_TABLE: &str = "\
# Health Log

| Date | Weight (lbs) | Body Fat % | Notes |
|------|--------------|------------|-------|
| 2024-11-14 | 175.5 | 22.3 | morning |
| 2024-11-15 | 174.8 | 22.1 | |
";

    #[test]
    fn test_table_basic() {
        let (records, errors) =
            parse_table(HEALTH_TABLE, &health_schema(), ParseMode::Lenient, "health.md");
        assert!(errors.is_empty());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("Date"), Some("2024-11-14"));
        assert_eq!(records[0].get("Weight (lbs)"), Some("175.5"));
        assert_eq!(records[0].line, 5);
        assert_eq!(records[1].get("Notes"), Some(""));
    }

    #[test]
    fn test_table_cell_count_mismatch_lenient() {
        let text = "\
| Date | Weight (lbs) | Body Fat % | Notes |
|---|---|---|---|
| 2024-11-14 | 175.5 | 22.3 | ok |
| 2024-11-15 | 174.8 |
| 2024-11-16 | 174.0 | 21.9 | ok |
";
        let (records, errors) =
            parse_table(text, &health_schema(), ParseMode::Lenient, "health.md");
        assert_eq!(records.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 4);
        assert!(errors[0].message.contains("expected 4 cells"));
    }

    #[test]
    fn test_table_cell_count_mismatch_strict_aborts_file() {
        let text = "\
| Date | Weight (lbs) | Body Fat % | Notes |
|---|---|---|---|
| 2024-11-14 | 175.5 | 22.3 | ok |
| 2024-11-15 | 174.8 |
| 2024-11-16 | 174.0 | 21.9 | ok |
";
        let (records, errors) = parse_table(text, &health_schema(), ParseMode::Strict, "health.md");
        assert!(records.is_empty());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 4);
    }

    #[test]
    fn test_table_prose_ignored() {
        let text = "\
Some introduction text.

| Date | Weight (lbs) | Body Fat % | Notes |
|---|---|---|---|
| 2024-11-14 | 175.5 | 22.3 | |

Closing remarks, no pipes here.
";
        let (records, errors) =
            parse_table(text, &health_schema(), ParseMode::Lenient, "health.md");
        assert!(errors.is_empty());
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_table_row_before_header_is_error() {
        let text = "| 2024-11-14 | 175.5 | 22.3 | |\n";
        let (records, errors) =
            parse_table(text, &health_schema(), ParseMode::Lenient, "health.md");
        assert!(records.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("before header"));
    }

    #[test]
    fn test_table_deterministic_order() {
        let (r1, _) = parse_table(HEALTH_TABLE, &health_schema(), ParseMode::Lenient, "h.md");
        let (r2, _) = parse_table(HEALTH_TABLE, &health_schema(), ParseMode::Lenient, "h.md");
        assert_eq!(r1.len(), r2.len());
        for (a, b) in r1.iter().zip(r2.iter()) {
            assert_eq!(a.fields, b.fields);
            assert_eq!(a.line, b.line);
        }
    }

    const COACHING_TEXT: &str = "\
# Coaching Notes

## 2024-11-14: Form check
**Trainer:** Sam
**Subject:** Squat depth

Keep the bar over midfoot.
Brace before the descent.

## 2024-11-21: Programming review
**Trainer:** Sam
**Orders:** Add a third pull day

Short session, mostly discussion.
";

    #[test]
    fn test_sections_basic() {
        let (records, errors) = parse_sections(COACHING_TEXT, ParseMode::Lenient, "coaching.md");
        assert!(errors.is_empty());
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.line, 3);
        assert_eq!(first.get("date"), Some("2024-11-14"));
        assert_eq!(first.get("title"), Some("Form check"));
        assert_eq!(first.get("trainer"), Some("Sam"));
        assert_eq!(first.get("subject"), Some("Squat depth"));
        assert!(first.get("body").unwrap().contains("midfoot"));
        assert!(first.get("body").unwrap().contains("Brace"));

        let second = &records[1];
        assert_eq!(second.get("orders"), Some("Add a third pull day"));
        assert_eq!(second.get("subject"), None);
    }

    #[test]
    fn test_sections_malformed_header_lenient() {
        let text = "\
## just a heading without a date
body text

## 2024-11-14: Real one
content
";
        let (records, errors) = parse_sections(text, ParseMode::Lenient, "coaching.md");
        assert_eq!(records.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 1);
        assert_eq!(records[0].get("title"), Some("Real one"));
    }

    #[test]
    fn test_sections_malformed_header_strict() {
        let text = "## nope\n\n## 2024-11-14: Real one\n";
        let (records, errors) = parse_sections(text, ParseMode::Strict, "coaching.md");
        assert!(records.is_empty());
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_sections_body_trimmed() {
        let text = "## 2024-11-14: T\n\n\nline one\n\n";
        let (records, _) = parse_sections(text, ParseMode::Lenient, "c.md");
        assert_eq!(records[0].get("body"), Some("line one"));
    }
}
