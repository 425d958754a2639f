// REST router exercised in-process through tower's `oneshot`.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use quality_scoring::api::auth::ADMIN_TOKEN_ENV;
use quality_scoring::api::rest::router;
use quality_scoring::app_state::AppState;
use quality_scoring::{
    JsonFileWeightSource, QualityMetricsTracker, RuntimeConfig, ScoringEngine,
    WeightConfigurationSource, WeightStore,
};
use serde_json::{json, Value};
use tower::ServiceExt;

const TOKEN: &str = "test-admin-token";

fn state_with_weights(path: &std::path::Path) -> Arc<AppState> {
    std::env::set_var(ADMIN_TOKEN_ENV, TOKEN);
    let config = RuntimeConfig::default();
    let source: Arc<dyn WeightConfigurationSource> = Arc::new(JsonFileWeightSource::new(path));
    let weights = Arc::new(WeightStore::from_source(source.as_ref()));
    let engine = Arc::new(ScoringEngine::new(&config, weights));
    let tracker = Arc::new(QualityMetricsTracker::from_config(&config));
    Arc::new(AppState::new(config, source, engine, tracker))
}

fn authed(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {TOKEN}"));
    match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weights.json");
    std::fs::write(&path, r#"{ "technical": 0.5, "volume": 0.5 }"#).unwrap();
    let app = router(state_with_weights(&path));

    let resp = app
        .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["weights_version"], 1);
}

#[tokio::test]
async fn evaluate_requires_token() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(state_with_weights(&dir.path().join("missing.json")));

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/evaluate")
                .header("content-type", "application/json")
                .header("authorization", "Bearer wrong")
                .body(Body::from(r#"{"symbol":"BTCUSDT"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn evaluate_returns_full_result_and_tracks_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weights.json");
    std::fs::write(&path, "{}").unwrap();
    let state = state_with_weights(&path);
    let app = router(state.clone());

    let body = json!({
        "symbol": "btcusdt",
        "scores": { "technical": 80, "volume": 75, "orderflow": 82,
                    "orderbook": 78, "price_structure": 76, "sentiment": 70 }
    });
    let resp = app
        .clone()
        .oneshot(authed("POST", "/api/v1/evaluate", Some(body)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let result = json_body(resp).await;
    assert_eq!(result["symbol"], "BTCUSDT");
    assert_eq!(result["decision"], "BUY");
    assert_eq!(result["adjustment"]["type"], "amplified");
    assert_eq!(result["risk"]["side"], "long");
    assert!(result["adjusted_score"].as_f64().unwrap() > result["base_score"].as_f64().unwrap());
    assert_eq!(state.tracker.len(), 1);

    // Outcome for that evaluation, then a duplicate.
    let outcome = json!({ "evaluation_id": result["id"], "realized_pnl_pct": 1.2 });
    let resp = app
        .clone()
        .oneshot(authed("POST", "/api/v1/quality/outcome", Some(outcome.clone())))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = app
        .clone()
        .oneshot(authed("POST", "/api/v1/quality/outcome", Some(outcome)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = app
        .oneshot(authed("GET", "/api/v1/quality/stats?symbol=btcusdt", None))
        .await
        .unwrap();
    let stats = json_body(resp).await;
    assert_eq!(stats["count"], 1);
    assert_eq!(stats["amplification_rate"], 1.0);
    assert_eq!(stats["outcomes"]["amplified"]["count"], 1);
}

#[tokio::test]
async fn unknown_dimension_in_scores_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(state_with_weights(&dir.path().join("missing.json")));

    let body = json!({ "symbol": "BTCUSDT", "scores": { "funding": 60 } });
    let resp = app
        .oneshot(authed("POST", "/api/v1/evaluate", Some(body)))
        .await
        .unwrap();
    assert!(resp.status().is_client_error());
}

#[tokio::test]
async fn reload_rejects_bad_file_and_keeps_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weights.json");
    std::fs::write(&path, r#"{ "technical": 1.0 }"#).unwrap();
    let state = state_with_weights(&path);
    let app = router(state.clone());

    std::fs::write(&path, "{ broken").unwrap();
    let resp = app
        .clone()
        .oneshot(authed("POST", "/api/v1/weights/reload", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(state.weights.version(), 1);

    std::fs::write(&path, r#"{ "technical": 1.0, "sentiment": 1.0 }"#).unwrap();
    let resp = app
        .clone()
        .oneshot(authed("POST", "/api/v1/weights/reload", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["changed"], true);
    assert_eq!(body["version"], 2);

    let resp = app
        .oneshot(authed("GET", "/api/v1/weights", None))
        .await
        .unwrap();
    let weights = json_body(resp).await;
    assert_eq!(weights["version"], 2);
    assert_eq!(weights["weights"]["sentiment"], 0.5);
}

#[tokio::test]
async fn filter_effectiveness_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(state_with_weights(&dir.path().join("missing.json")));

    let body = json!({ "symbol": "SOLUSDT", "scores": { "technical": 100, "volume": 60 } });
    app.clone()
        .oneshot(authed("POST", "/api/v1/evaluate", Some(body)))
        .await
        .unwrap();

    let resp = app
        .oneshot(authed("GET", "/api/v1/quality/filters", None))
        .await
        .unwrap();
    let fe = json_body(resp).await;
    assert_eq!(fe["total"], 1);
    assert_eq!(fe["filtered"], 1);
    assert_eq!(fe["reasons"]["insufficient_data"], 1);
}

#[tokio::test]
async fn config_endpoint_serves_the_loaded_config() {
    std::env::set_var(ADMIN_TOKEN_ENV, TOKEN);
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("runtime_config.json");
    let original = r#"{ "risk": { "buy_threshold": 65.0 } }"#;
    std::fs::write(&config_path, original).unwrap();

    let config = RuntimeConfig::load(&config_path).unwrap();
    let source: Arc<dyn WeightConfigurationSource> =
        Arc::new(JsonFileWeightSource::new(dir.path().join("missing.json")));
    let weights = Arc::new(WeightStore::from_source(source.as_ref()));
    let engine = Arc::new(ScoringEngine::new(&config, weights));
    let tracker = Arc::new(QualityMetricsTracker::from_config(&config));
    let app = router(Arc::new(AppState::new(config, source, engine, tracker)));

    let resp = app
        .oneshot(authed("GET", "/api/v1/config", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["risk"]["buy_threshold"], 65.0);

    // Serving the config never writes it back.
    assert_eq!(std::fs::read_to_string(&config_path).unwrap(), original);
}
