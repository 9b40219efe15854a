//! Integration tests for the extraction pipeline
//!
//! These tests use wiremock to stand in for a remote statistics API and run
//! the orchestrator end to end against an in-memory database.

use stat_harvest::cache::CacheStore;
use stat_harvest::config::{parse_config, Config};
use stat_harvest::storage::{
    Database, LoadStatus, LoadStatusStore, SqliteStatusStore, StorageError, TaskKey, UpsertWriter,
};
use stat_harvest::{AdapterRegistry, Orchestrator, RunRequest};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const TARGET_SCHEMA: &str = "
CREATE TABLE ratings (
    team TEXT NOT NULL,
    league TEXT NOT NULL,
    season TEXT NOT NULL,
    elo REAL,
    PRIMARY KEY (team, league, season)
);
";

/// Creates a configuration pointing the `clubelo` source at the mock server
fn create_test_config(base_url: &str, cache: &str) -> Config {
    parse_config(&format!(
        r#"
[database]
path = ":memory:"

[cache]
{cache}

[retry]
max-attempts = 3
initial-delay = 0.01
max-delay = 0.05

[rate-limit]
requests-per-minute = 1000
delay-between-requests = 0.0

[egress]
timeout = 5.0

[[league]]
name = "ENG"

[[league]]
name = "ESP"

[[source]]
name = "clubelo"

[[source.table]]
name = "ratings"
url = "{base_url}/ratings/{{league}}/{{season}}"
conflict-columns = ["team", "league", "season"]
required-fields = ["team", "league", "season"]
add-context-columns = true
"#
    ))
    .expect("Failed to parse test config")
}

struct Pipeline {
    orchestrator: Orchestrator,
    db: Database,
    status: Arc<SqliteStatusStore>,
}

fn create_pipeline(config: Config, db: Database) -> Pipeline {
    let status = Arc::new(SqliteStatusStore::new(db.clone()));
    let registry = AdapterRegistry::from_config(&config);
    let cache = Arc::new(CacheStore::from_config(&config.cache));
    let writer = Arc::new(UpsertWriter::new(db.clone(), config.database.batch_size));
    let orchestrator = Orchestrator::new(Arc::new(config), registry, status.clone(), writer, cache);
    Pipeline {
        orchestrator,
        db,
        status,
    }
}

fn create_database() -> Database {
    let db = Database::open_in_memory().expect("Failed to open database");
    db.execute_script(TARGET_SCHEMA)
        .expect("Failed to create target table");
    db
}

fn ratings_body() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!([
        {"team": "Arsenal", "elo": 1950.5},
        {"team": "Spurs", "elo": 1800.0}
    ]))
}

fn request(leagues: &[&str], seasons: &[&str]) -> RunRequest {
    let mut request = RunRequest::new(seasons.iter().copied());
    request.leagues = Some(leagues.iter().map(|l| l.to_string()).collect());
    request
}

fn count_rows(db: &Database) -> i64 {
    db.with_connection(|conn| {
        conn.query_row("SELECT COUNT(*) FROM ratings", [], |row| row.get(0))
            .map_err(StorageError::from)
    })
    .expect("Failed to count rows")
}

async fn requests_to(server: &MockServer, url_path: &str) -> usize {
    server
        .received_requests()
        .await
        .expect("Request recording disabled")
        .iter()
        .filter(|r| r.url.path() == url_path)
        .count()
}

fn status_of(pipeline: &Pipeline, league: &str, season: &str) -> stat_harvest::storage::LoadStatusRecord {
    pipeline
        .status
        .get_status(&TaskKey::new("clubelo", "ratings", league, season))
        .expect("Failed to read status")
        .expect("Task has no status")
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let mock_server = MockServer::start().await;

    // Two server errors, then a good response
    Mock::given(method("GET"))
        .and(path("/ratings/ENG/2223"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ratings/ENG/2223"))
        .respond_with(ratings_body())
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), "");
    let pipeline = create_pipeline(config, create_database());

    let summary = pipeline
        .orchestrator
        .run(&request(&["ENG"], &["2223"]))
        .await
        .expect("Run failed");

    assert_eq!(requests_to(&mock_server, "/ratings/ENG/2223").await, 3);
    assert_eq!(summary.total_completed(), 1);
    assert_eq!(summary.total_rows(), 2);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(count_rows(&pipeline.db), 2);

    let record = status_of(&pipeline, "ENG", "2223");
    assert_eq!(record.status, LoadStatus::Completed);
    assert_eq!(record.rows_processed, 2);
    assert!(record.completed_at.is_some());
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_task() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ratings/ENG/2223"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), "");
    let pipeline = create_pipeline(config, create_database());

    let summary = pipeline
        .orchestrator
        .run(&request(&["ENG"], &["2223"]))
        .await
        .expect("Run failed");

    assert_eq!(requests_to(&mock_server, "/ratings/ENG/2223").await, 3);
    assert_eq!(summary.total_failed(), 1);
    assert_eq!(summary.exit_code(), 1);

    let record = status_of(&pipeline, "ENG", "2223");
    assert_eq!(record.status, LoadStatus::Failed);
    assert_eq!(record.rows_processed, 0);
    let message = record.error_message.expect("Missing error message");
    assert!(message.contains("Giving up after 3 attempts"), "{}", message);
    assert!(message.contains("503"), "{}", message);
}

#[tokio::test]
async fn test_missing_data_completes_with_zero_rows() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ratings/ENG/2223"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), "");
    let pipeline = create_pipeline(config, create_database());

    let summary = pipeline
        .orchestrator
        .run(&request(&["ENG"], &["2223"]))
        .await
        .expect("Run failed");

    // 404 is permanent, so no retries
    assert_eq!(requests_to(&mock_server, "/ratings/ENG/2223").await, 1);
    assert_eq!(summary.total_completed(), 1);
    assert_eq!(summary.total_rows(), 0);

    let record = status_of(&pipeline, "ENG", "2223");
    assert_eq!(record.status, LoadStatus::Completed);
    assert_eq!(record.rows_processed, 0);
}

#[tokio::test]
async fn test_permanent_error_does_not_stop_other_tasks() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ratings/ENG/2223"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ratings/ESP/2223"))
        .respond_with(ratings_body())
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), "");
    let pipeline = create_pipeline(config, create_database());

    let summary = pipeline
        .orchestrator
        .run(&request(&["ENG", "ESP"], &["2223"]))
        .await
        .expect("Run failed");

    assert_eq!(requests_to(&mock_server, "/ratings/ENG/2223").await, 1);
    assert_eq!(summary.total_failed(), 1);
    assert_eq!(summary.total_completed(), 1);
    assert_eq!(summary.exit_code(), 1);
    assert_eq!(status_of(&pipeline, "ENG", "2223").status, LoadStatus::Failed);
    assert_eq!(status_of(&pipeline, "ESP", "2223").status, LoadStatus::Completed);
}

#[tokio::test]
async fn test_finished_seasons_are_served_from_cache() {
    let mock_server = MockServer::start().await;
    let cache_dir = tempfile::tempdir().expect("Failed to create temp dir");

    Mock::given(method("GET"))
        .respond_with(ratings_body())
        .mount(&mock_server)
        .await;

    let cache = format!("directory = \"{}\"", cache_dir.path().display());

    for _ in 0..2 {
        // A fresh pipeline each time, sharing only the on-disk cache
        let config = create_test_config(&mock_server.uri(), &cache);
        let pipeline = create_pipeline(config, create_database());
        let summary = pipeline
            .orchestrator
            .run(&request(&["ENG"], &["2223", "4849"]))
            .await
            .expect("Run failed");
        assert_eq!(summary.total_completed(), 2);
        assert_eq!(count_rows(&pipeline.db), 4);
    }

    // Finished season fetched once; the running season is always refetched
    assert_eq!(requests_to(&mock_server, "/ratings/ENG/2223").await, 1);
    assert_eq!(requests_to(&mock_server, "/ratings/ENG/4849").await, 2);
}

/// Responds with `response` and requests a stop, simulating an interrupt
struct StopAfterResponse {
    stop: CancellationToken,
    response: ResponseTemplate,
}

impl Respond for StopAfterResponse {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.stop.cancel();
        self.response.clone()
    }
}

#[tokio::test]
async fn test_interrupted_run_resumes_where_it_stopped() {
    let mock_server = MockServer::start().await;
    let stop = CancellationToken::new();

    Mock::given(method("GET"))
        .and(path("/ratings/ENG/2122"))
        .respond_with(StopAfterResponse {
            stop: stop.clone(),
            response: ratings_body(),
        })
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ratings_body())
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), "");
    let mut pipeline = create_pipeline(config, create_database());
    pipeline.orchestrator = pipeline.orchestrator.with_stop_token(stop);

    let run = request(&["ENG", "ESP"], &["2122", "2223"]);

    let first = pipeline.orchestrator.run(&run).await.expect("Run failed");
    assert!(first.interrupted);
    assert_eq!(first.total_completed(), 1);

    pipeline.orchestrator = pipeline.orchestrator.with_stop_token(CancellationToken::new());
    let second = pipeline.orchestrator.run(&run).await.expect("Run failed");
    assert!(!second.interrupted);
    assert_eq!(second.total_skipped(), 1);
    assert_eq!(second.total_completed(), 3);

    // Every task fetched exactly once across both runs
    for url_path in [
        "/ratings/ENG/2122",
        "/ratings/ENG/2223",
        "/ratings/ESP/2122",
        "/ratings/ESP/2223",
    ] {
        assert_eq!(requests_to(&mock_server, url_path).await, 1, "{}", url_path);
    }

    assert_eq!(count_rows(&pipeline.db), 8);
    let statuses = pipeline
        .status
        .list_statuses(Some("clubelo"), Some("ratings"))
        .expect("Failed to list statuses");
    assert_eq!(statuses.len(), 4);
    assert!(statuses.iter().all(|r| r.status == LoadStatus::Completed));
}

#[tokio::test]
async fn test_stop_request_cuts_retry_backoff_short() {
    let mock_server = MockServer::start().await;
    let stop = CancellationToken::new();

    Mock::given(method("GET"))
        .and(path("/ratings/ENG/2223"))
        .respond_with(StopAfterResponse {
            stop: stop.clone(),
            response: ResponseTemplate::new(503),
        })
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&mock_server.uri(), "");
    config.retry.initial_delay = 2.0;
    config.retry.max_delay = 10.0;
    let mut pipeline = create_pipeline(config, create_database());
    pipeline.orchestrator = pipeline.orchestrator.with_stop_token(stop);

    let start = Instant::now();
    let summary = pipeline
        .orchestrator
        .run(&request(&["ENG", "ESP"], &["2223"]))
        .await
        .expect("Run failed");

    // No 2s + 4s backoff and no further attempts once the stop arrives
    assert!(start.elapsed() < Duration::from_secs(2), "{:?}", start.elapsed());
    assert_eq!(requests_to(&mock_server, "/ratings/ENG/2223").await, 1);
    assert_eq!(requests_to(&mock_server, "/ratings/ESP/2223").await, 0);
    assert!(summary.interrupted);
    assert_eq!(summary.total_failed(), 1);

    let record = status_of(&pipeline, "ENG", "2223");
    assert_eq!(record.status, LoadStatus::Failed);
    let message = record.error_message.expect("Missing error message");
    assert!(message.contains("Cancelled after 1 attempts"), "{}", message);
}
