//! Human-facing run output printed to stdout.
//!
//! Structured tracing goes to the log file; this module is the terse
//! operator summary: one counts line per run, row errors beneath it,
//! and fixed-width tables for run history.

use crate::journal::RollbackReport;
use crate::models::{MigrationRun, RunSummary};

pub fn print_run(run: &MigrationRun, verbose: bool) {
    let label = if run.dry_run { " (dry run)" } else { "" };
    println!(
        "{}{}: parsed {} | valid {} | invalid {} | inserted {} | skipped {}",
        run.domain,
        label,
        run.counts.parsed,
        run.counts.valid,
        run.counts.invalid,
        run.counts.inserted,
        run.counts.skipped_duplicate
    );

    if run.errors.is_empty() {
        return;
    }
    if verbose {
        for error in &run.errors {
            println!("  {}", error);
        }
    } else {
        let shown = run.errors.len().min(5);
        for error in &run.errors[..shown] {
            println!("  {}", error);
        }
        if run.errors.len() > shown {
            println!(
                "  ... and {} more (run with --verbose to see all)",
                run.errors.len() - shown
            );
        }
    }
}

pub fn print_run_list(summaries: &[RunSummary]) {
    if summaries.is_empty() {
        println!("No migration runs recorded.");
        return;
    }
    println!(
        "{:<36}  {:<8}  {:<11}  {:>8}  {:>7}  {}",
        "RUN ID", "DOMAIN", "STATE", "INSERTED", "SKIPPED", "STARTED"
    );
    for s in summaries {
        println!(
            "{:<36}  {:<8}  {:<11}  {:>8}  {:>7}  {}",
            s.run_id,
            s.domain.as_str(),
            s.state.as_str(),
            s.counts.inserted,
            s.counts.skipped_duplicate,
            s.started_at
        );
    }
}

pub fn print_rollback(report: &RollbackReport) {
    if report.dry_run {
        println!(
            "Would roll back run {} ({}): {} recorded rows",
            report.run_id, report.domain, report.recorded
        );
    } else {
        println!(
            "Rolled back run {} ({}): deleted {} of {} recorded rows",
            report.run_id, report.domain, report.deleted, report.recorded
        );
    }
}
