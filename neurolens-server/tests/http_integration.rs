//! HTTP integration tests for the Neurolens REST API
//!
//! Routes are driven end to end through Axum `oneshot` against in-memory storage, with
//! a stub embedder standing in for the real backend so semantic drift is deterministic.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use neurolens_core::repository::InMemorySubjectRepository;
use neurolens_core::{Capabilities, CapabilityError, EmbeddingBackend, NeurolensConfig};
use neurolens_server::http::build_router;
use neurolens_server::router::AppState;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// Points "garden" transcripts one way and everything else the other.
struct TopicEmbedder;

#[async_trait]
impl EmbeddingBackend for TopicEmbedder {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, CapabilityError> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(if text.contains("garden") {
            vec![1.0, 0.0]
        } else {
            vec![0.0, 1.0]
        }))
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn name(&self) -> &str {
        "topic-stub"
    }
}

fn make_state() -> Arc<AppState> {
    let capabilities = Capabilities {
        embedder: Some(Arc::new(TopicEmbedder)),
        ..Capabilities::default()
    };
    Arc::new(AppState::new(
        NeurolensConfig::default(),
        capabilities,
        Arc::new(InMemorySubjectRepository::new()),
    ))
}

async fn send(state: &Arc<AppState>, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&b).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = build_router(state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn observe(state: &Arc<AppState>, subject: &str, text: &str, end: f64, date: &str) -> Value {
    let payload = json!({
        "segments": [{"start": 0.0, "end": end, "text": text}],
        "date": date,
    });
    let (status, body) = send(
        state,
        "POST",
        &format!("/subjects/{subject}/observations"),
        Some(payload),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "observe failed: {body}");
    body
}

// ===========================================================================
// TEST 1: GET /version: returns version and protocol
// ===========================================================================
#[tokio::test]
async fn test_version_endpoint() {
    let (status, body) = send(&make_state(), "GET", "/version", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["version"].is_string());
    assert_eq!(body["protocol"], "neurolens/1");
}

// ===========================================================================
// TEST 2: GET /health: storage backend and capability flags
// ===========================================================================
#[tokio::test]
async fn test_health_endpoint() {
    let (status, body) = send(&make_state(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"]["backend"], "memory");
    assert_eq!(body["capabilities"]["embedder"], true);
    assert_eq!(body["capabilities"]["parser"], false);
    assert!(body["socket"].is_string());
}

// ===========================================================================
// TEST 3: POST /analyze: lenient segment times, parser reported degraded
// ===========================================================================
#[tokio::test]
async fn test_analyze_endpoint() {
    let payload = json!({
        "segments": [
            {"start": "0.0", "end": "3.0", "text": "I walked to the garden."},
            {"start": 4.0, "end": 6.0, "text": "um it was nice"}
        ]
    });
    let (status, body) = send(&make_state(), "POST", "/analyze", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transcript"]["duration_sec"], 6.0);
    assert_eq!(body["features"]["pauses"], 1.0);
    assert!(body["features"]["filler_word_rate"].as_f64().unwrap() > 0.0);
    assert_eq!(body["degraded"], json!(["parser"]));
}

// ===========================================================================
// TEST 4: observations → drift report, including semantic drift
// ===========================================================================
#[tokio::test]
async fn test_observe_and_drift_roundtrip() {
    let state = make_state();

    let first = observe(&state, "S1", "the garden was lovely today", 2.5, "2024-06-01").await;
    assert_eq!(first["baseline_created"], true);
    assert_eq!(first["extraction"]["features"]["semantic_similarity_drift"], 0.0);

    let second = observe(&state, "S1", "the kitchen was warm", 4.0, "2024-06-08").await;
    assert_eq!(second["baseline_created"], false);
    assert_eq!(second["extraction"]["features"]["semantic_similarity_drift"], 1.0);

    let (status, drift) = send(&state, "GET", "/subjects/S1/drift", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(drift["baseline_date"], "2024-06-01");
    assert_eq!(drift["latest_date"], "2024-06-08");

    let speed = drift["changes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["field"] == "speech_speed")
        .unwrap();
    assert_eq!(speed["baseline"], 2.0);
    assert_eq!(speed["latest"], 1.0);
    assert_eq!(speed["percent_change"], -50.0);
    assert!(drift["report"]
        .as_str()
        .unwrap()
        .contains("speech_speed: 1.000 (change -50.0%)"));
}

// ===========================================================================
// TEST 5: drift for an unknown subject is a 404
// ===========================================================================
#[tokio::test]
async fn test_drift_unknown_subject_404() {
    let (status, body) = send(&make_state(), "GET", "/subjects/ghost/drift", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
    assert!(body["error"].as_str().unwrap().contains("ghost"));
}

// ===========================================================================
// TEST 6: history limit and trend series
// ===========================================================================
#[tokio::test]
async fn test_history_and_trend() {
    let state = make_state();
    for (day, text) in [("01", "a"), ("02", "a b"), ("03", "a b c")] {
        observe(&state, "S2", text, 1.0, &format!("2024-07-{day}")).await;
    }

    let (status, history) = send(&state, "GET", "/subjects/S2/history?limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["count"], 2);
    assert_eq!(history["records"][0]["date"], "2024-07-02");
    assert_eq!(history["records"][1]["date"], "2024-07-03");

    let (status, trend) = send(&state, "GET", "/subjects/S2/trend/speech_speed", None).await;
    assert_eq!(status, StatusCode::OK);
    let values: Vec<f64> = trend["points"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["value"].as_f64().unwrap())
        .collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0]);

    let (status, _) = send(&state, "GET", "/subjects/S2/trend/not_a_field", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ===========================================================================
// TEST 7: seeded confidence interval is reproducible over HTTP
// ===========================================================================
#[tokio::test]
async fn test_confidence_interval_seeded() {
    let state = make_state();
    for (day, text) in [("01", "a"), ("02", "a b"), ("03", "a b c"), ("04", "a b c d")] {
        observe(&state, "S3", text, 1.0, &format!("2024-08-{day}")).await;
    }

    let uri = "/subjects/S3/confidence/speech_speed?iterations=400&alpha=0.1&seed=7";
    let (status, a) = send(&state, "GET", uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, b) = send(&state, "GET", uri, None).await;
    assert_eq!(a, b);

    let lower = a["lower"].as_f64().unwrap();
    let upper = a["upper"].as_f64().unwrap();
    assert!(lower >= 1.0 && upper <= 4.0 && lower <= upper);
    assert_eq!(a["mean"], 2.5);
    assert_eq!(a["samples"], 4);

    let (status, _) = send(
        &state,
        "GET",
        "/subjects/S3/confidence/speech_speed?alpha=1.5",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ===========================================================================
// TEST 8: DELETE baseline: next observation becomes the new baseline
// ===========================================================================
#[tokio::test]
async fn test_reset_baseline() {
    let state = make_state();
    observe(&state, "S4", "one two three four", 2.0, "2024-09-01").await;

    let (status, body) = send(&state, "DELETE", "/subjects/S4/baseline", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], true);

    let (status, _) = send(&state, "GET", "/subjects/S4/drift", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let next = observe(&state, "S4", "one two", 2.0, "2024-09-02").await;
    assert_eq!(next["baseline_created"], true);

    let (_, drift) = send(&state, "GET", "/subjects/S4/drift", None).await;
    assert_eq!(drift["baseline_date"], "2024-09-02");
}

// ===========================================================================
// TEST 9: an empty transcript is a valid observation
// ===========================================================================
#[tokio::test]
async fn test_observe_empty_transcript() {
    let state = make_state();
    let (status, body) = send(
        &state,
        "POST",
        "/subjects/S5/observations",
        Some(json!({"segments": [], "date": "2024-01-01"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["baseline_created"], true);
    assert_eq!(body["extraction"]["transcript"]["duration_sec"], 0.0);
    assert_eq!(body["extraction"]["features"]["speech_speed"], 0.0);

    let (status, drift) = send(&state, "GET", "/subjects/S5/drift", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(drift["baseline_date"], "2024-01-01");
}

// ===========================================================================
// TEST 10: bootstrap iterations above the configured ceiling are a 400
// ===========================================================================
#[tokio::test]
async fn test_confidence_interval_iteration_ceiling() {
    let state = make_state();
    observe(&state, "S6", "one two three", 1.0, "2024-01-01").await;

    for iterations in ["1000000000", "18446744073709551615"] {
        let uri = format!("/subjects/S6/confidence/speech_speed?iterations={iterations}&seed=1");
        let (status, body) = send(&state, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert!(body["error"].as_str().unwrap().contains("exceeds"));
    }
}

// ===========================================================================
// TEST 11: GET /subjects lists every tracked subject
// ===========================================================================
#[tokio::test]
async fn test_list_subjects() {
    let state = make_state();
    let (status, body) = send(&state, "GET", "/subjects", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);

    observe(&state, "zeta", "hello there", 1.0, "2024-01-01").await;
    observe(&state, "alpha", "hello there", 1.0, "2024-01-01").await;

    let (status, body) = send(&state, "GET", "/subjects", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subjects"], json!(["alpha", "zeta"]));
}
