//! Run orchestration
//!
//! The orchestrator expands a [`RunRequest`] into (source, table, league,
//! season) tasks and drives each one through the load status state machine:
//! skip check, `in_progress`, extraction, validation, upsert, then
//! `completed` or `failed`. A failing task never stops the run, and a source
//! whose adapter cannot be built is reported without affecting the others.
//!
//! Cancelling the token from [`Orchestrator::stop_handle`] ends the run
//! after the task currently in flight. A task waiting out retry backoff at
//! that moment stops early and is recorded as failed; a later run with
//! `skip_completed` resumes where it stopped.

mod summary;
mod task;

pub use summary::{RunSummary, SourceSummary, Totals};
pub use task::{enumerate_tasks, ExtractionTask, LeagueSelection, TaskOutcome, TaskStatus};

use crate::adapter::{AdapterError, AdapterRegistry, ExtractRequest, SourceAdapter, SourceContext};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::fetch::FetchController;
use crate::record::validate_batch;
use crate::season::is_period_complete;
use crate::storage::{LoadStatusStore, RecordWriter, TaskKey};
use crate::{error_chain, HarvestError, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// What to extract in one run
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Sources to run; all enabled sources by priority when `None`
    pub data_sources: Option<Vec<String>>,
    /// Leagues to run; all enabled leagues when `None`
    pub leagues: Option<Vec<String>>,
    /// Seasons in any recognised notation; must not be empty
    pub seasons: Vec<String>,
    /// Skip tasks already marked completed
    pub skip_completed: bool,
}

impl RunRequest {
    pub fn new<S: Into<String>>(seasons: impl IntoIterator<Item = S>) -> Self {
        Self {
            data_sources: None,
            leagues: None,
            seasons: seasons.into_iter().map(Into::into).collect(),
            skip_completed: true,
        }
    }
}

/// Drives extraction runs across data sources
pub struct Orchestrator {
    config: Arc<Config>,
    registry: AdapterRegistry,
    status: Arc<dyn LoadStatusStore>,
    writer: Arc<dyn RecordWriter>,
    cache: Arc<CacheStore>,
    stop: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        registry: AdapterRegistry,
        status: Arc<dyn LoadStatusStore>,
        writer: Arc<dyn RecordWriter>,
        cache: Arc<CacheStore>,
    ) -> Self {
        Self {
            config,
            registry,
            status,
            writer,
            cache,
            stop: CancellationToken::new(),
        }
    }

    /// Uses an externally owned stop token
    ///
    /// A cancelled token stays cancelled, so resuming in the same process
    /// needs a fresh one.
    pub fn with_stop_token(mut self, stop: CancellationToken) -> Self {
        self.stop = stop;
        self
    }

    /// Token that, once cancelled, stops the run before its next task
    pub fn stop_handle(&self) -> CancellationToken {
        self.stop.clone()
    }

    fn stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Lists the tasks a run would attempt, without extracting anything
    pub fn plan(&self, request: &RunRequest) -> Result<Vec<ExtractionTask>> {
        let selection = self.select_leagues(request)?;
        let mut tasks = Vec::new();

        for name in self.select_sources(request) {
            match self.build_adapter(&name) {
                Ok(adapter) => {
                    tasks.extend(enumerate_tasks(&name, &adapter.list_tables(), &selection))
                }
                Err(e) => tracing::warn!("[{}] Source unavailable: {}", name, error_chain(&e)),
            }
        }

        Ok(tasks)
    }

    /// Runs every selected task and summarises the outcome
    ///
    /// Only an invalid request is an error; task and source failures are
    /// recorded in the status table and the returned summary.
    pub async fn run(&self, request: &RunRequest) -> Result<RunSummary> {
        let selection = self.select_leagues(request)?;
        let sources = self.select_sources(request);

        let started_at = Utc::now();
        let start = Instant::now();
        let mut summaries = Vec::with_capacity(sources.len());
        let mut interrupted = false;

        tracing::info!(
            "Starting run: {} sources, {} leagues, seasons {}",
            sources.len(),
            selection.len(),
            request.seasons.join(", ")
        );

        for name in &sources {
            if self.stop_requested() {
                interrupted = true;
                break;
            }

            let source_start = Instant::now();
            let mut summary = SourceSummary::new(name.clone());

            match self.build_adapter(name) {
                Ok(adapter) => {
                    let tasks = enumerate_tasks(name, &adapter.list_tables(), &selection);
                    tracing::info!("[{}] {} tasks", name, tasks.len());

                    for task in &tasks {
                        if self.stop_requested() {
                            interrupted = true;
                            break;
                        }
                        let season_end = selection
                            .iter()
                            .find(|l| l.league == task.league)
                            .and_then(|l| l.season_end);
                        let outcome = self
                            .run_task(adapter.as_ref(), task, season_end, request.skip_completed)
                            .await;
                        summary.record(outcome);
                    }
                }
                Err(e) => {
                    let message = error_chain(&e);
                    tracing::error!("[{}] Source unavailable: {}", name, message);
                    summary.error = Some(message);
                }
            }

            summary.duration = source_start.elapsed();
            tracing::info!(
                "[{}] {} completed, {} failed, {} skipped, {} rows in {:.1}s",
                name,
                summary.totals.completed,
                summary.totals.failed,
                summary.totals.skipped,
                summary.totals.total_rows,
                summary.duration.as_secs_f64()
            );
            summaries.push(summary);

            if interrupted {
                break;
            }
        }

        if interrupted {
            tracing::warn!("Run stopped before all tasks were attempted");
        }

        let summary = RunSummary::new(started_at, start.elapsed(), summaries, interrupted);
        tracing::info!(
            "Run finished: {} completed, {} failed, {} skipped, {} rows in {:.1}s",
            summary.total_completed(),
            summary.total_failed(),
            summary.total_skipped(),
            summary.total_rows(),
            summary.duration.as_secs_f64()
        );
        Ok(summary)
    }

    fn select_sources(&self, request: &RunRequest) -> Vec<String> {
        if let Some(names) = &request.data_sources {
            return names.clone();
        }

        let mut names: Vec<String> = self
            .config
            .enabled_sources()
            .into_iter()
            .map(|s| s.name.clone())
            .collect();

        // Adapters registered in code rather than declared in the config file
        for name in self.registry.names() {
            if self.config.source(name).is_none() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    fn select_leagues(&self, request: &RunRequest) -> Result<Vec<LeagueSelection>> {
        if request.seasons.is_empty() {
            return Err(HarvestError::InvalidRequest(
                "at least one season is required".to_string(),
            ));
        }

        let leagues = request
            .leagues
            .clone()
            .unwrap_or_else(|| self.config.enabled_leagues());
        if leagues.is_empty() {
            return Err(HarvestError::InvalidRequest("no leagues selected".to_string()));
        }

        let mut selection = Vec::with_capacity(leagues.len());
        for league in leagues {
            let config = self.config.league(&league);
            let code = config.map(|c| c.season_code).unwrap_or_default();

            let mut seasons: Vec<String> = Vec::with_capacity(request.seasons.len());
            for season in &request.seasons {
                let season = code.parse(season)?;
                if !seasons.contains(&season) {
                    seasons.push(season);
                }
            }

            selection.push(LeagueSelection {
                league,
                seasons,
                season_end: config.and_then(|c| c.season_end),
            });
        }

        Ok(selection)
    }

    fn build_adapter(&self, name: &str) -> Result<Arc<dyn SourceAdapter>> {
        if !self.registry.contains(name) {
            return Err(HarvestError::UnknownSource(name.to_string()));
        }

        let fetcher = FetchController::from_config(name, &self.config, self.cache.clone())?
            .with_cancellation(self.stop.clone());
        let ctx = SourceContext {
            name,
            config: &self.config,
            fetcher: Arc::new(fetcher),
        };
        Ok(self.registry.build(&ctx)?)
    }

    async fn run_task(
        &self,
        adapter: &dyn SourceAdapter,
        task: &ExtractionTask,
        season_end: Option<u32>,
        skip_completed: bool,
    ) -> TaskOutcome {
        let key = task.key();
        let start = Instant::now();

        match self.status.should_skip(&key, !skip_completed) {
            Ok(true) => {
                tracing::info!("Skipping {}: already completed", key);
                return TaskOutcome::skipped(key);
            }
            Ok(false) => {}
            Err(e) => return self.fail(key, &e.into(), start),
        }

        if let Err(e) = self.status.mark_in_progress(&key) {
            return self.fail(key, &e.into(), start);
        }

        let (rows, invalid_records) = match self.extract_and_load(adapter, task, season_end).await {
            Ok(counts) => counts,
            Err(e) => return self.fail(key, &e, start),
        };

        if let Err(e) = self.status.mark_completed(&key, rows) {
            return self.fail(key, &e.into(), start);
        }

        let elapsed = start.elapsed();
        tracing::info!(
            "Completed {}: {} rows in {:.1}s",
            key,
            rows,
            elapsed.as_secs_f64()
        );

        TaskOutcome {
            key,
            status: TaskStatus::Completed,
            rows,
            invalid_records,
            error: None,
            elapsed,
        }
    }

    /// Returns the number of rows written and of records dropped by validation
    async fn extract_and_load(
        &self,
        adapter: &dyn SourceAdapter,
        task: &ExtractionTask,
        season_end: Option<u32>,
    ) -> Result<(u64, usize)> {
        let force_refresh = match is_period_complete(&task.season, season_end, Utc::now()) {
            Ok(complete) => !complete,
            Err(e) => {
                tracing::warn!("Cannot tell whether {} has ended ({}), refetching", task.season, e);
                true
            }
        };

        let request = ExtractRequest {
            league: task.league.clone(),
            season: task.season.clone(),
            force_refresh,
        };

        let records = match adapter.extract(&task.table, &request).await {
            Ok(records) => records,
            Err(AdapterError::NoData(reason)) => {
                tracing::info!("No data for {}: {}", task, reason);
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let batch = validate_batch(records, &task.table.required_fields);
        if let Some(first) = batch.invalid.first() {
            tracing::warn!(
                "{}: dropped {} invalid records ({})",
                task,
                batch.invalid.len(),
                first
            );
        }

        if batch.valid.is_empty() {
            return Ok((0, batch.invalid.len()));
        }

        let affected = self.writer.write(
            &task.table.table_name,
            &batch.valid,
            &task.table.conflict_columns,
        )?;
        tracing::debug!("{}: {} rows affected", task, affected);

        Ok((batch.valid.len() as u64, batch.invalid.len()))
    }

    fn fail(&self, key: TaskKey, error: &HarvestError, start: Instant) -> TaskOutcome {
        let message = error_chain(error);
        tracing::error!("Failed {}: {}", key, message);

        if let Err(e) = self.status.mark_failed(&key, &message) {
            tracing::error!("Could not record failure of {}: {}", key, e);
        }

        TaskOutcome::failed(key, message, start.elapsed())
    }
}
