//! HTTP-level tests for the provider gateway.
//!
//! A small axum server stands in for the authoring API. It keeps just
//! enough state (versions, last-modified stamps, recorded requests) to
//! drive a full sync pass through the real reqwest client and SQLite store.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use intent_sync::config::{Config, ProviderConfig};
use intent_sync::corpus_fs::FsCorpusSource;
use intent_sync::entities::BuiltinEntityRegistry;
use intent_sync::gateway::LuisGateway;
use intent_sync::labels::BracketLabelExtractor;
use intent_sync::fingerprint::needs_sync;
use intent_sync::models::{AppInfo, ModelPayload, SyncFingerprint, TrainingState};
use intent_sync::payload::{PayloadBuilder, PayloadTags};
use intent_sync::progress::NoProgress;
use intent_sync::store::SqliteFingerprintStore;
use intent_sync::sync::{
    options_from_config, SyncComponents, SyncEngine, SyncFailure, SyncOutcome, SyncTarget,
};
use intent_sync::traits::{FingerprintStore, RemoteGateway};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const KEY: &str = "secret-key";

// ─── Mock Provider ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    query: Option<String>,
    body: String,
}

#[derive(Default)]
struct MockState {
    versions: Vec<(String, Option<String>)>,
    requests: Vec<Recorded>,
    /// Number of upcoming requests answered with 503.
    unavailable: u32,
    /// Number of upcoming requests answered with 429.
    rate_limited: u32,
    /// Import stores the version, then answers 503.
    commit_then_unavailable: bool,
    /// Imported versions carry no `lastModifiedDateTime`.
    untimed_imports: bool,
    fail_submodel: bool,
    stamp: u32,
}

type Shared = Arc<Mutex<MockState>>;

fn error_body(message: &str) -> String {
    json!({"error": {"code": "BadArgument", "message": message}}).to_string()
}

fn respond(
    state: &mut MockState,
    method: &Method,
    path: &str,
    headers: &HeaderMap,
    body: &str,
) -> (StatusCode, String) {
    if state.unavailable > 0 {
        state.unavailable -= 1;
        return (StatusCode::SERVICE_UNAVAILABLE, String::new());
    }
    if state.rate_limited > 0 {
        state.rate_limited -= 1;
        return (StatusCode::TOO_MANY_REQUESTS, error_body("Rate limit exceeded"));
    }
    let key = headers
        .get("Ocp-Apim-Subscription-Key")
        .and_then(|v| v.to_str().ok());
    if key != Some(KEY) {
        return (
            StatusCode::UNAUTHORIZED,
            error_body("Access denied due to invalid subscription key."),
        );
    }

    let segments: Vec<&str> = path
        .trim_start_matches("/authoring/")
        .trim_end_matches('/')
        .split('/')
        .collect();

    match (method.as_str(), segments.as_slice()) {
        ("GET", ["apps", _, "versions"]) => {
            let list: Vec<Value> = state
                .versions
                .iter()
                .map(|(version, modified)| match modified {
                    Some(m) => json!({"version": version, "lastModifiedDateTime": m}),
                    None => json!({"version": version}),
                })
                .collect();
            (StatusCode::OK, Value::Array(list).to_string())
        }
        ("DELETE", ["apps", _, "versions", version]) => {
            state.versions.retain(|(v, _)| v != version);
            (StatusCode::OK, json!({"code": "Success"}).to_string())
        }
        ("GET", ["apps", app]) => (
            StatusCode::OK,
            json!({"id": app, "name": "Demo Bot", "culture": "en-us"}).to_string(),
        ),
        ("POST", ["apps", _, "versions", "import"]) => {
            let payload: ModelPayload = match serde_json::from_str(body) {
                Ok(p) => p,
                Err(e) => return (StatusCode::BAD_REQUEST, error_body(&e.to_string())),
            };
            if payload.utterances.iter().any(|u| u.text.contains("BAD")) {
                return (StatusCode::BAD_REQUEST, error_body("Bad utterance"));
            }
            if state.versions.iter().any(|(v, _)| *v == payload.version_id) {
                return (
                    StatusCode::BAD_REQUEST,
                    error_body("A version with the same ID already exists"),
                );
            }
            state.stamp += 1;
            let stamp = format!("2026-03-01T10:00:{:02}Z", state.stamp);
            let stamp = (!state.untimed_imports).then_some(stamp);
            state.versions.push((payload.version_id.clone(), stamp));
            if state.commit_then_unavailable {
                return (StatusCode::SERVICE_UNAVAILABLE, String::new());
            }
            (StatusCode::CREATED, json!(payload.version_id).to_string())
        }
        ("POST", ["apps", _, "versions", _, "train"]) => (
            StatusCode::ACCEPTED,
            json!({"statusId": 9, "status": "Queued"}).to_string(),
        ),
        ("GET", ["apps", _, "versions", _, "train"]) => {
            let second = if state.fail_submodel {
                json!({"modelId": "m2", "details": {"statusId": 1, "status": "Fail", "failureReason": "FewLabels"}})
            } else {
                json!({"modelId": "m2", "details": {"statusId": 2, "status": "UpToDate"}})
            };
            let first = json!({"modelId": "m1", "details": {"statusId": 0, "status": "Success"}});
            (StatusCode::OK, json!([first, second]).to_string())
        }
        ("POST", ["apps", _, "publish"]) => (
            StatusCode::CREATED,
            json!({"endpointUrl": "https://example.invalid"}).to_string(),
        ),
        _ => (StatusCode::NOT_FOUND, error_body("Resource not found")),
    }
}

async fn handle(
    State(state): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = String::from_utf8_lossy(&body).to_string();
    let (status, text) = {
        let mut state = state.lock().unwrap();
        state.requests.push(Recorded {
            method: method.clone(),
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            body: body.clone(),
        });
        respond(&mut state, &method, uri.path(), &headers, &body)
    };
    (status, text).into_response()
}

async fn start_mock(state: Shared) -> String {
    let app = Router::new().fallback(handle).with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn provider_config(endpoint: &str, max_retries: u32) -> ProviderConfig {
    ProviderConfig {
        endpoint: endpoint.to_string(),
        api_path: "authoring".to_string(),
        app_id: "app-1".to_string(),
        version_id: "0.1".to_string(),
        schema_version: "7.0.0".to_string(),
        key_env: "UNUSED_TEST_KEY".to_string(),
        timeout_secs: 5,
        max_retries,
    }
}

async fn gateway_with(state: Shared, max_retries: u32) -> LuisGateway {
    let endpoint = start_mock(state).await;
    LuisGateway::with_key(&provider_config(&endpoint, max_retries), KEY)
        .unwrap()
        .with_retry_base(Duration::from_millis(1))
}

fn requests(state: &Shared) -> Vec<Recorded> {
    state.lock().unwrap().requests.clone()
}

// ─── Wire Mapping ───────────────────────────────────────────────────

#[tokio::test]
async fn test_missing_timestamp_always_needs_sync() {
    let state: Shared = Arc::default();
    state.lock().unwrap().versions = vec![
        ("0.1".to_string(), Some("2026-01-01T00:00:00Z".to_string())),
        ("0.2".to_string(), None),
    ];
    let gateway = gateway_with(state.clone(), 0).await;

    let versions = gateway.list_versions("app-1").await.unwrap();

    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].version_id, "0.1");
    assert_eq!(
        versions[0].last_modified.as_deref(),
        Some("2026-01-01T00:00:00Z")
    );
    assert_eq!(versions[1].last_modified, None);

    // Even a fingerprint recorded with an empty timestamp cannot match.
    let stored = SyncFingerprint {
        content_hash: "h".to_string(),
        remote_timestamp: String::new(),
    };
    assert!(needs_sync(Some(&stored), "h", Some(&versions[1])));
    let reqs = requests(&state);
    let req = &reqs[0];
    assert_eq!(req.method, Method::GET);
    assert_eq!(req.path, "/authoring/apps/app-1/versions");
}

#[tokio::test]
async fn test_app_info_defaults_missing_description() {
    let gateway = gateway_with(Arc::default(), 0).await;

    let app = gateway.get_app_info("app-1").await.unwrap();

    assert_eq!(app.name, "Demo Bot");
    assert_eq!(app.culture, "en-us");
    assert_eq!(app.description, "");
}

#[tokio::test]
async fn test_training_status_mapping() {
    let state: Shared = Arc::default();
    state.lock().unwrap().fail_submodel = true;
    let gateway = gateway_with(state, 0).await;

    let started = gateway.start_training("app-1", "0.1").await.unwrap();
    let statuses = gateway.poll_training("app-1", "0.1").await.unwrap();

    assert_eq!(started, TrainingState::Queued);
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].state, TrainingState::Success);
    assert_eq!(statuses[1].model_id, "m2");
    assert_eq!(statuses[1].state, TrainingState::Fail);
    assert_eq!(statuses[1].failure_reason.as_deref(), Some("FewLabels"));
}

#[tokio::test]
async fn test_publish_sends_slot_in_body() {
    let state: Shared = Arc::default();
    let gateway = gateway_with(state.clone(), 0).await;

    gateway.publish("app-1", "0.1", true).await.unwrap();

    let reqs = requests(&state);
    let req = &reqs[0];
    assert_eq!(req.path, "/authoring/apps/app-1/publish");
    let body: Value = serde_json::from_str(&req.body).unwrap();
    assert_eq!(body, json!({"versionId": "0.1", "isStaging": true}));
}

// ─── Errors and Retries ─────────────────────────────────────────────

#[tokio::test]
async fn test_client_error_surfaces_message_without_retry() {
    let state: Shared = Arc::default();
    let endpoint = start_mock(state.clone()).await;
    let gateway = LuisGateway::with_key(&provider_config(&endpoint, 3), "wrong-key")
        .unwrap()
        .with_retry_base(Duration::from_millis(1));

    let err = gateway.list_versions("app-1").await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "List versions failed: Access denied due to invalid subscription key."
    );
    assert_eq!(requests(&state).len(), 1);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let state: Shared = Arc::default();
    state.lock().unwrap().unavailable = 2;
    let gateway = gateway_with(state.clone(), 2).await;

    let versions = gateway.list_versions("app-1").await.unwrap();

    assert!(versions.is_empty());
    assert_eq!(requests(&state).len(), 3);
}

#[tokio::test]
async fn test_retries_exhausted_reports_status() {
    let state: Shared = Arc::default();
    state.lock().unwrap().unavailable = 10;
    let gateway = gateway_with(state.clone(), 1).await;

    let err = gateway.get_app_info("app-1").await.unwrap_err();

    assert_eq!(err.to_string(), "Get app failed with HTTP 503");
    assert_eq!(requests(&state).len(), 2);
}

fn minimal_payload() -> ModelPayload {
    let app = AppInfo {
        name: "Demo Bot".to_string(),
        description: String::new(),
        culture: "en-us".to_string(),
    };
    let tags = PayloadTags {
        schema_version: "7.0.0".to_string(),
        version_id: "0.1".to_string(),
    };
    let extractor = BracketLabelExtractor::new();
    let registry = BuiltinEntityRegistry::new();
    PayloadBuilder::new(&extractor, &registry)
        .build(&[], &app, &tags)
        .unwrap()
}

fn import_requests(state: &Shared) -> usize {
    requests(state)
        .iter()
        .filter(|r| r.path.ends_with("/versions/import"))
        .count()
}

#[tokio::test]
async fn test_import_is_not_resent_after_server_error() {
    let state: Shared = Arc::default();
    state.lock().unwrap().commit_then_unavailable = true;
    let gateway = gateway_with(state.clone(), 3).await;

    let err = gateway
        .import_version("app-1", "0.1", &minimal_payload())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Import failed with HTTP 503");
    assert_eq!(import_requests(&state), 1);
    assert_eq!(state.lock().unwrap().versions.len(), 1);
}

#[tokio::test]
async fn test_import_retries_rate_limit() {
    let state: Shared = Arc::default();
    state.lock().unwrap().rate_limited = 1;
    let gateway = gateway_with(state.clone(), 2).await;

    gateway
        .import_version("app-1", "0.1", &minimal_payload())
        .await
        .unwrap();

    assert_eq!(import_requests(&state), 2);
}

#[tokio::test]
async fn test_publish_is_not_resent_after_server_error() {
    let state: Shared = Arc::default();
    state.lock().unwrap().unavailable = 1;
    let gateway = gateway_with(state.clone(), 3).await;

    let err = gateway.publish("app-1", "0.1", true).await.unwrap_err();

    assert_eq!(err.to_string(), "Publish failed with HTTP 503");
    assert_eq!(requests(&state).len(), 1);
}

// ─── End to End ─────────────────────────────────────────────────────

fn write_corpus(root: &std::path::Path, extra_utterance: Option<&str>) {
    let mut utterances = vec!["hello", "hi, I am [Bob](name)"];
    if let Some(u) = extra_utterance {
        utterances.push(u);
    }
    let intent = json!({
        "name": "greet",
        "utterances": utterances,
        "entities": [{"name": "name", "type": "person"}],
    });
    std::fs::write(root.join("greet.json"), intent.to_string()).unwrap();
}

fn test_config(tmp: &TempDir, endpoint: &str) -> Config {
    let corpus = tmp.path().join("corpus");
    std::fs::create_dir_all(&corpus).unwrap();
    let content = format!(
        r#"
[db]
path = "{}"

[corpus]
root = "{}"

[provider]
endpoint = "{}"
api_path = "authoring"
app_id = "app-1"
version_id = "0.1"
max_retries = 0

[training]
poll_interval_ms = 5
max_polls = 20
"#,
        tmp.path().join("data/isync.sqlite").display(),
        corpus.display(),
        endpoint
    );
    toml::from_str(&content).unwrap()
}

fn engine_for(config: &Config, store: Arc<SqliteFingerprintStore>) -> SyncEngine {
    let gateway = LuisGateway::with_key(&config.provider, KEY).unwrap();
    let target = SyncTarget {
        app_id: config.provider.app_id.clone(),
        version_id: config.provider.version_id.clone(),
        schema_version: config.provider.schema_version.clone(),
    };
    let components = SyncComponents {
        corpus: Arc::new(FsCorpusSource::new(config.corpus.clone())),
        store,
        extractor: Arc::new(BracketLabelExtractor::new()),
        registry: Arc::new(BuiltinEntityRegistry::with_overrides(&config.entities)),
        gateway: Arc::new(gateway),
        progress: Arc::new(NoProgress),
    };
    SyncEngine::new(target, options_from_config(config, false, false), components)
}

#[tokio::test]
async fn test_full_sync_over_http_then_idempotent() {
    let state: Shared = Arc::default();
    let endpoint = start_mock(state.clone()).await;
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, &endpoint);
    write_corpus(&config.corpus.root, None);
    let store = Arc::new(SqliteFingerprintStore::connect(&config).await.unwrap());
    let engine = engine_for(&config, store.clone());
    let cancel = CancellationToken::new();

    let report = engine.run(&cancel).await.unwrap();

    let fingerprint = match report.outcome {
        SyncOutcome::Synced { fingerprint } => fingerprint,
        other => panic!("expected Synced, got {:?}", other),
    };
    assert_eq!(fingerprint.remote_timestamp, "2026-03-01T10:00:01Z");
    assert_eq!(
        store.get(&engine.fingerprint_key()).await.unwrap(),
        Some(fingerprint)
    );

    let reqs = requests(&state);
    let import = reqs
        .iter()
        .find(|r| r.path.ends_with("/versions/import"))
        .unwrap();
    assert_eq!(import.query.as_deref(), Some("versionId=0.1"));
    let payload: Value = serde_json::from_str(&import.body).unwrap();
    assert_eq!(payload["name"], "Demo Bot");
    assert_eq!(payload["versionId"], "0.1");
    assert_eq!(payload["prebuiltEntities"][0]["name"], "personName");
    assert_eq!(payload["utterances"][1]["entities"][0]["startPos"], 9);
    assert_eq!(payload["utterances"][1]["entities"][0]["endPos"], 12);

    // Second pass only lists versions.
    let before = requests(&state).len();
    let report = engine.run(&cancel).await.unwrap();
    assert!(matches!(report.outcome, SyncOutcome::UpToDate));
    let after = requests(&state);
    assert_eq!(after.len(), before + 1);
    assert_eq!(after[before].method, Method::GET);
}

#[tokio::test]
async fn test_untimed_remote_version_is_not_recorded() {
    let state: Shared = Arc::default();
    state.lock().unwrap().untimed_imports = true;
    let endpoint = start_mock(state.clone()).await;
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, &endpoint);
    write_corpus(&config.corpus.root, None);
    let store = Arc::new(SqliteFingerprintStore::connect(&config).await.unwrap());
    let engine = engine_for(&config, store.clone());

    let report = engine.run(&CancellationToken::new()).await.unwrap();

    assert!(matches!(
        report.outcome,
        SyncOutcome::Failed(SyncFailure::Record(_))
    ));
    assert_eq!(store.get(&engine.fingerprint_key()).await.unwrap(), None);
    let check = engine.check().await.unwrap();
    assert!(check.needs_sync);
}

#[tokio::test]
async fn test_rejected_import_leaves_fingerprint_untouched() {
    let state: Shared = Arc::default();
    let endpoint = start_mock(state.clone()).await;
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, &endpoint);
    write_corpus(&config.corpus.root, Some("this one is BAD"));
    let store = Arc::new(SqliteFingerprintStore::connect(&config).await.unwrap());
    let engine = engine_for(&config, store.clone());

    let report = engine.run(&CancellationToken::new()).await.unwrap();

    match &report.outcome {
        SyncOutcome::Failed(failure) => {
            assert!(failure.to_string().contains("Bad utterance"), "got: {}", failure)
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(store.get(&engine.fingerprint_key()).await.unwrap(), None);
    assert!(!requests(&state).iter().any(|r| r.path.ends_with("/train")));
}
