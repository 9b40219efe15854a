use crate::orchestrator::task::{TaskOutcome, TaskStatus};
use chrono::{DateTime, Utc};
use std::ops::AddAssign;
use std::time::Duration;

/// Aggregate task counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_rows: u64,
    pub invalid_records: usize,
}

impl Totals {
    pub fn record(&mut self, outcome: &TaskOutcome) {
        match outcome.status {
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Skipped => self.skipped += 1,
        }
        self.total_rows += outcome.rows;
        self.invalid_records += outcome.invalid_records;
    }

    pub fn tasks(&self) -> usize {
        self.completed + self.failed + self.skipped
    }
}

impl AddAssign for Totals {
    fn add_assign(&mut self, other: Self) {
        self.completed += other.completed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.total_rows += other.total_rows;
        self.invalid_records += other.invalid_records;
    }
}

/// Results for one data source
#[derive(Debug, Clone)]
pub struct SourceSummary {
    pub data_source: String,
    pub totals: Totals,
    /// Set when the source could not run at all
    pub error: Option<String>,
    pub outcomes: Vec<TaskOutcome>,
    pub duration: Duration,
}

impl SourceSummary {
    pub fn new(data_source: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            totals: Totals::default(),
            error: None,
            outcomes: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn record(&mut self, outcome: TaskOutcome) {
        self.totals.record(&outcome);
        self.outcomes.push(outcome);
    }
}

/// Outcome of a whole run; derived, never persisted
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
    pub sources: Vec<SourceSummary>,
    pub totals: Totals,
    /// The run was stopped before every task was attempted
    pub interrupted: bool,
}

impl RunSummary {
    pub fn new(
        started_at: DateTime<Utc>,
        duration: Duration,
        sources: Vec<SourceSummary>,
        interrupted: bool,
    ) -> Self {
        let mut totals = Totals::default();
        for source in &sources {
            totals += source.totals;
        }
        Self {
            started_at,
            finished_at: Utc::now(),
            duration,
            sources,
            totals,
            interrupted,
        }
    }

    pub fn total_completed(&self) -> usize {
        self.totals.completed
    }

    pub fn total_failed(&self) -> usize {
        self.totals.failed
    }

    pub fn total_skipped(&self) -> usize {
        self.totals.skipped
    }

    pub fn total_rows(&self) -> u64 {
        self.totals.total_rows
    }

    pub fn source(&self, name: &str) -> Option<&SourceSummary> {
        self.sources.iter().find(|s| s.data_source == name)
    }

    /// Sources that could not run
    pub fn source_errors(&self) -> impl Iterator<Item = (&str, &str)> {
        self.sources
            .iter()
            .filter_map(|s| s.error.as_deref().map(|e| (s.data_source.as_str(), e)))
    }

    pub fn has_failures(&self) -> bool {
        self.totals.failed > 0 || self.source_errors().next().is_some()
    }

    /// Process exit code for the run
    pub fn exit_code(&self) -> u8 {
        u8::from(self.has_failures())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TaskKey;

    fn outcome(status: TaskStatus, rows: u64) -> TaskOutcome {
        TaskOutcome {
            key: TaskKey::new("s", "t", "l", "2223"),
            status,
            rows,
            invalid_records: 0,
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn test_totals_across_sources() {
        let mut a = SourceSummary::new("a");
        a.record(outcome(TaskStatus::Completed, 10));
        a.record(outcome(TaskStatus::Skipped, 0));
        let mut b = SourceSummary::new("b");
        b.record(outcome(TaskStatus::Completed, 5));

        let summary = RunSummary::new(Utc::now(), Duration::from_secs(1), vec![a, b], false);

        assert_eq!(summary.total_completed(), 2);
        assert_eq!(summary.total_skipped(), 1);
        assert_eq!(summary.total_rows(), 15);
        assert_eq!(summary.totals.tasks(), 3);
        assert!(!summary.has_failures());
        assert_eq!(summary.exit_code(), 0);
    }

    #[test]
    fn test_failures_set_exit_code() {
        let mut a = SourceSummary::new("a");
        a.record(outcome(TaskStatus::Failed, 0));
        let summary = RunSummary::new(Utc::now(), Duration::ZERO, vec![a], false);
        assert_eq!(summary.exit_code(), 1);

        let mut b = SourceSummary::new("b");
        b.error = Some("adapter could not be built".to_string());
        let summary = RunSummary::new(Utc::now(), Duration::ZERO, vec![b], false);
        assert!(summary.has_failures());
        assert_eq!(summary.source_errors().count(), 1);
    }
}
