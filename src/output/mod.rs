//! Console reports
//!
//! This module renders:
//! - The summary of a finished run
//! - The contents of the load status table (`--status`)
//! - The task plan of a dry run

use crate::orchestrator::{ExtractionTask, RunSummary, TaskStatus};
use crate::storage::{LoadStatus, LoadStatusRecord};
use chrono::SecondsFormat;
use std::collections::BTreeMap;

/// Formats a run summary as plain text
pub fn format_run_summary(summary: &RunSummary) -> String {
    let mut out = String::new();

    out.push_str("=== Run Summary ===\n\n");
    out.push_str(&format!(
        "Started:  {}\n",
        summary.started_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    out.push_str(&format!(
        "Finished: {}\n",
        summary.finished_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    out.push_str(&format!("Duration: {:.1}s\n", summary.duration.as_secs_f64()));
    if summary.interrupted {
        out.push_str("Status:   interrupted\n");
    }
    out.push('\n');

    for source in &summary.sources {
        out.push_str(&format!("{}:\n", source.data_source));
        if let Some(error) = &source.error {
            out.push_str(&format!("  ERROR: {}\n\n", error));
            continue;
        }
        out.push_str(&format!(
            "  {} completed, {} failed, {} skipped, {} rows ({:.1}s)\n",
            source.totals.completed,
            source.totals.failed,
            source.totals.skipped,
            source.totals.total_rows,
            source.duration.as_secs_f64()
        ));
        if source.totals.invalid_records > 0 {
            out.push_str(&format!(
                "  {} records dropped by validation\n",
                source.totals.invalid_records
            ));
        }
        for outcome in source
            .outcomes
            .iter()
            .filter(|o| o.status == TaskStatus::Failed)
        {
            out.push_str(&format!(
                "  - {}: {}\n",
                outcome.key,
                outcome.error.as_deref().unwrap_or("unknown error")
            ));
        }
        out.push('\n');
    }

    out.push_str(&format!(
        "Total: {} completed, {} failed, {} skipped, {} rows\n",
        summary.total_completed(),
        summary.total_failed(),
        summary.total_skipped(),
        summary.total_rows()
    ));

    out
}

/// Prints a run summary to stdout
pub fn print_run_summary(summary: &RunSummary) {
    print!("{}", format_run_summary(summary));
}

/// Formats load status rows grouped by data source
pub fn format_load_statuses(records: &[LoadStatusRecord]) -> String {
    if records.is_empty() {
        return "No load status recorded\n".to_string();
    }

    let mut counts: BTreeMap<&str, [usize; 4]> = BTreeMap::new();
    for record in records {
        let slot = match record.status {
            LoadStatus::Pending => 0,
            LoadStatus::InProgress => 1,
            LoadStatus::Completed => 2,
            LoadStatus::Failed => 3,
        };
        counts.entry(record.key.data_source.as_str()).or_default()[slot] += 1;
    }

    let mut out = String::from("=== Load Status ===\n\n");
    for (source, [pending, in_progress, completed, failed]) in &counts {
        out.push_str(&format!(
            "{}: {} completed, {} failed, {} in progress, {} pending\n",
            source, completed, failed, in_progress, pending
        ));
    }
    out.push('\n');

    for record in records {
        out.push_str(&format!(
            "{:<12} {} rows={} updated={}",
            record.status.to_string(),
            record.key,
            record.rows_processed,
            record
                .last_updated
                .to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        if let Some(error) = &record.error_message {
            out.push_str(&format!(" error={}", error));
        }
        out.push('\n');
    }

    out
}

/// Prints load status rows to stdout
pub fn print_load_statuses(records: &[LoadStatusRecord]) {
    print!("{}", format_load_statuses(records));
}

/// Prints the tasks a run would attempt
pub fn print_plan(tasks: &[ExtractionTask]) {
    println!("=== Dry Run ===\n");
    for task in tasks {
        println!("  - {}", task);
    }
    println!("\n✓ Would run {} tasks", tasks.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{SourceSummary, TaskOutcome};
    use crate::storage::TaskKey;
    use chrono::Utc;
    use std::time::Duration;

    #[test]
    fn test_run_summary_lists_failures() {
        let mut source = SourceSummary::new("clubelo");
        source.record(TaskOutcome::failed(
            TaskKey::new("clubelo", "ratings", "ENG", "2223"),
            "HTTP 500".to_string(),
            Duration::from_secs(1),
        ));
        let mut broken = SourceSummary::new("espn");
        broken.error = Some("no adapter registered".to_string());

        let summary = RunSummary::new(Utc::now(), Duration::from_secs(2), vec![source, broken], false);
        let text = format_run_summary(&summary);

        assert!(text.contains("clubelo/ratings [ENG 2223]: HTTP 500"));
        assert!(text.contains("ERROR: no adapter registered"));
        assert!(text.contains("Total: 0 completed, 1 failed, 0 skipped, 0 rows"));
    }

    #[test]
    fn test_interrupted_run_reports_dropped_records() {
        let mut source = SourceSummary::new("clubelo");
        source.record(TaskOutcome {
            key: TaskKey::new("clubelo", "ratings", "ENG", "2223"),
            status: TaskStatus::Completed,
            rows: 18,
            invalid_records: 2,
            error: None,
            elapsed: Duration::from_millis(500),
        });

        let summary = RunSummary::new(Utc::now(), Duration::from_secs(1), vec![source], true);
        let text = format_run_summary(&summary);

        assert!(text.starts_with("=== Run Summary ===\n\nStarted:  "));
        assert!(text.contains("Status:   interrupted\n"));
        assert!(text.contains("  1 completed, 0 failed, 0 skipped, 18 rows"));
        assert!(text.contains("  2 records dropped by validation\n"));
        assert!(text.ends_with("Total: 1 completed, 0 failed, 0 skipped, 18 rows\n"));
    }

    #[test]
    fn test_load_status_counts() {
        let now = Utc::now();
        let record = |league: &str, status: LoadStatus| LoadStatusRecord {
            key: TaskKey::new("clubelo", "ratings", league, "2223"),
            status,
            rows_processed: 3,
            error_message: None,
            started_at: Some(now),
            completed_at: None,
            last_updated: now,
        };
        let text = format_load_statuses(&[
            record("ENG", LoadStatus::Completed),
            record("ESP", LoadStatus::Completed),
            record("GER", LoadStatus::Failed),
        ]);

        assert!(text.contains("clubelo: 2 completed, 1 failed, 0 in progress, 0 pending"));
        assert!(text.contains("clubelo/ratings [GER 2223] rows=3"));
    }

    #[test]
    fn test_empty_status_table() {
        assert_eq!(format_load_statuses(&[]), "No load status recorded\n");
    }
}
