use mockito::{Matcher, Server, ServerGuard};
use queueview::api;
use queueview::error::AppError;
use queueview::estimation::{EstimatorConfig, WaitTimeEstimator};
use queueview::poller::{CycleOutcome, Poller};
use queueview::state::AppState;
use queueview::store::DocumentStore;
use queueview::store::couchdb::CouchDbStore;
use serde_json::{Value, json};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

const ALL_DOCS_PATH: &str = "/terminal_images/_all_docs";
const WINDOW: Duration = Duration::from_secs(60 * 60);

fn minutes_ago(minutes: i64) -> String {
    (OffsetDateTime::now_utc() - time::Duration::minutes(minutes))
        .format(&Rfc3339)
        .expect("format timestamp")
}

fn all_docs_body(docs: Vec<Value>) -> String {
    let rows: Vec<Value> = docs
        .into_iter()
        .map(|doc| {
            let id = doc["_id"].clone();
            json!({"id": id, "key": id, "value": {"rev": "1-a"}, "doc": doc})
        })
        .collect();
    json!({"total_rows": rows.len(), "offset": 0, "rows": rows}).to_string()
}

fn five_documents() -> String {
    all_docs_body(vec![
        json!({"_id": "a1", "terminal_id": "A", "head_count": 4,
               "timestamp": minutes_ago(20), "processing_time_ms": 15000}),
        json!({"_id": "a2", "terminal_id": "A", "pic_id": "p-7", "num_ppl": 6,
               "timestamp_received": minutes_ago(5), "timestamp_processed": minutes_ago(4)}),
        json!({"_id": "b1", "terminal_id": "B", "head_count": 2, "timestamp": minutes_ago(10)}),
        json!({"_id": "b2", "terminal_id": "B", "head_count": 9, "timestamp": minutes_ago(180)}),
        json!({"_id": "b3", "terminal_id": "B", "timestamp": minutes_ago(1)}),
    ])
}

fn poller_for(server: &ServerGuard, state: &Arc<RwLock<AppState>>) -> Result<Poller, AppError> {
    let store = CouchDbStore::new(
        format!("{}{ALL_DOCS_PATH}", server.url()),
        Some("admin".to_string()),
        Some("admin".to_string()),
        Duration::from_secs(2),
    )?;
    let store: Arc<dyn DocumentStore> = Arc::new(store);
    let estimator = WaitTimeEstimator::new(EstimatorConfig {
        wait_multiplier: 2.5,
        processing_time_scaling_factor: 5.0,
        label_offset: UtcOffset::UTC,
    });
    Ok(Poller::new(
        store,
        estimator,
        Arc::clone(state),
        Duration::from_millis(1_000),
        WINDOW,
    ))
}

#[tokio::test]
async fn poll_cycle_publishes_windowed_series_per_location() -> Result<(), Box<dyn std::error::Error>>
{
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", ALL_DOCS_PATH)
        .match_query(Matcher::UrlEncoded(
            "include_docs".to_string(),
            "true".to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(five_documents())
        .create_async()
        .await;

    let state = Arc::new(RwLock::new(AppState::new()));
    let poller = poller_for(&server, &state)?;

    let outcome = poller.poll_once().await?;

    mock.assert_async().await;
    assert_eq!(
        outcome,
        CycleOutcome::Published {
            locations: 2,
            points: 3
        }
    );

    let snapshot = state.read().map_err(|_| AppError::StateLock)?.snapshot();
    assert!(!snapshot.loading);
    assert_eq!(snapshot.error, None);

    let a = snapshot.series.get("A").expect("location A");
    let a_minutes: Vec<f64> = a.points.iter().map(|p| p.estimated_minutes).collect();
    // 4 * 15000 * 5 / 60000 and 6 * 2.5, in store order
    assert_eq!(a_minutes, vec![5.0, 15.0]);

    let b = snapshot.series.get("B").expect("location B");
    assert_eq!(b.points.len(), 1);
    assert_eq!(b.points[0].estimated_minutes, 5.0);
    Ok(())
}

#[tokio::test]
async fn failed_cycle_keeps_series_until_next_success() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new_async().await;
    let healthy = server
        .mock("GET", ALL_DOCS_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(five_documents())
        .create_async()
        .await;

    let state = Arc::new(RwLock::new(AppState::new()));
    let poller = poller_for(&server, &state)?;
    poller.poll_once().await?;
    let published = state.read().map_err(|_| AppError::StateLock)?.snapshot();
    healthy.remove_async().await;

    let failing = server
        .mock("GET", ALL_DOCS_PATH)
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body(r#"{"error":"internal_server_error"}"#)
        .create_async()
        .await;

    let outcome = poller.poll_once().await?;
    assert_eq!(outcome, CycleOutcome::Failed);

    let degraded = state.read().map_err(|_| AppError::StateLock)?.snapshot();
    assert!(Arc::ptr_eq(&published.series, &degraded.series));
    assert!(
        degraded
            .error
            .as_deref()
            .is_some_and(|message| message.contains("500"))
    );
    assert_eq!(degraded.updated_at, published.updated_at);
    failing.remove_async().await;

    let _recovered = server
        .mock("GET", ALL_DOCS_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(all_docs_body(vec![json!({
            "_id": "c1", "terminal_id": "C", "head_count": 1, "timestamp": minutes_ago(2)
        })]))
        .create_async()
        .await;

    poller.poll_once().await?;

    let recovered = state.read().map_err(|_| AppError::StateLock)?.snapshot();
    assert_eq!(recovered.error, None);
    assert_eq!(recovered.series.keys().collect::<Vec<_>>(), vec!["C"]);
    assert_eq!(recovered.cycle, 2);
    Ok(())
}

#[tokio::test]
async fn api_serves_published_series() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", ALL_DOCS_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(five_documents())
        .create_async()
        .await;

    let state = Arc::new(RwLock::new(AppState::new()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = api::router(Arc::clone(&state));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let client = reqwest::Client::new();
    let loading = client
        .get(format!("http://{addr}/api/series"))
        .send()
        .await?;
    assert_eq!(loading.status().as_u16(), 503);
    let body: Value = loading.json().await?;
    assert_eq!(body["error_code"], "NO_DATA");

    poller_for(&server, &state)?.poll_once().await?;

    let series: Value = client
        .get(format!("http://{addr}/api/series"))
        .send()
        .await?
        .json()
        .await?;
    let locations = series["locations"].as_array().expect("locations array");
    assert_eq!(locations.len(), 2);
    assert_eq!(locations[0]["location_id"], "A");
    assert_eq!(locations[0]["current_wait_minutes"], 15.0);
    assert_eq!(locations[0]["points"][0]["basis"], "service_time");

    let missing = client
        .get(format!("http://{addr}/api/locations/Z"))
        .send()
        .await?;
    assert_eq!(missing.status().as_u16(), 404);

    let health: Value = client
        .get(format!("http://{addr}/api/health"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(health["status"], "ok");
    Ok(())
}
