use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use sentinel_config::{AlertRule, ComparisonOp, ConfigLoader, EngineConfig, HealthCheckEndpoint};
use sentinel_core::ManualClock;
use sentinel_engine::Engine;
use sentinel_health::HttpProbe;
use sentinel_server::{create_router, AppState};
use sentinel_types::{Labels, Severity};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn create_test_engine(config: EngineConfig) -> Arc<Engine> {
    let engine = Engine::new(
        config,
        vec![],
        Arc::new(HttpProbe::new()),
        Arc::new(ManualClock::default()),
    )
    .unwrap();
    Arc::new(engine)
}

fn app(engine: &Arc<Engine>) -> Router {
    create_router(AppState::new(engine.clone()))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let engine = create_test_engine(EngineConfig::default());

    let (status, json) = send(app(&engine), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["engine"], "sentinel");
    assert_eq!(json["running"], false);
}

#[tokio::test]
async fn test_record_and_query_metric() {
    let engine = create_test_engine(EngineConfig::default());

    let (status, json) = send(
        app(&engine),
        post_json(
            "/api/v1/metrics",
            json!({"name": "cpu", "value": 42.5, "labels": {"host": "server1"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["value"], 42.5);

    engine
        .record_metric("cpu", 10.0, Labels::from([("host".to_string(), "server2".to_string())]))
        .await
        .unwrap();

    let (status, json) = send(app(&engine), get("/api/v1/metrics/cpu?host=server1")).await;
    assert_eq!(status, StatusCode::OK);
    let points = json["points"].as_array().unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0]["labels"]["host"], "server1");

    let (_, json) = send(app(&engine), get("/api/v1/metrics/cpu")).await;
    assert_eq!(json["points"].as_array().unwrap().len(), 2);

    let (_, json) = send(app(&engine), get("/api/v1/metrics")).await;
    assert_eq!(json["metrics"], json!(["cpu"]));
}

#[tokio::test]
async fn test_invalid_metric_is_bad_request() {
    let engine = create_test_engine(EngineConfig::default());

    let (status, json) = send(
        app(&engine),
        post_json("/api/v1/metrics", json!({"name": "  ", "value": 1.0})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("Invalid metric"));
}

#[tokio::test]
async fn test_bad_time_range_is_bad_request() {
    let engine = create_test_engine(EngineConfig::default());

    let (status, _) = send(app(&engine), get("/api/v1/metrics/cpu?start=yesterday")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        app(&engine),
        get("/api/v1/metrics/cpu?start=2024-01-02T00:00:00Z&end=2024-01-01T00:00:00Z"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_alerts_and_report() {
    let config = EngineConfig {
        rules: vec![AlertRule::new("cpu_high", "cpu", ComparisonOp::GreaterThan, 90.0)
            .with_severity(Severity::Critical)
            .with_sustained_secs(0)],
        ..EngineConfig::default()
    };
    let engine = create_test_engine(config);
    engine.record_metric("cpu", 95.0, Labels::new()).await.unwrap();
    engine.evaluate_now().await;

    let (status, json) = send(app(&engine), get("/api/v1/alerts")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["alerts"][0]["rule_id"], "cpu_high");
    assert_eq!(json["alerts"][0]["status"], "active");

    let (status, json) = send(app(&engine), get("/api/v1/reports/daily")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["period"], "daily");
    assert_eq!(json["alerts"]["total_alerts"], 1);
    assert_eq!(json["alerts"]["critical_alerts"], 1);

    let (status, _) = send(app(&engine), get("/api/v1/reports/yearly")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, json) = send(app(&engine), get("/api/v1/dashboard")).await;
    assert_eq!(json["active_alerts"], 1);
    assert_eq!(json["alerts_by_severity"]["critical"], 1);

    let (_, json) = send(app(&engine), get("/api/v1/alerts/history?limit=5")).await;
    assert!(json["alerts"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_silence_lifecycle() {
    let engine = create_test_engine(EngineConfig::default());

    let (status, json) = send(
        app(&engine),
        post_json(
            "/api/v1/silences",
            json!({"pattern": "maintenance", "duration_secs": 3600, "reason": "planned"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = json["id"].as_str().unwrap().to_string();

    let (_, json) = send(app(&engine), get("/api/v1/silences")).await;
    assert_eq!(json["silences"].as_array().unwrap().len(), 1);

    let delete = Request::builder()
        .uri(format!("/api/v1/silences/{}", id))
        .method("DELETE")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app(&engine), delete).await;
    assert_eq!(status, StatusCode::OK);

    let delete_again = Request::builder()
        .uri(format!("/api/v1/silences/{}", id))
        .method("DELETE")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app(&engine), delete_again).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        app(&engine),
        post_json("/api/v1/silences", json!({"pattern": "x", "duration_secs": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_checks_and_telemetry() {
    let config = EngineConfig {
        endpoints: vec![HealthCheckEndpoint::new("API Health", "http://127.0.0.1:9/health")],
        ..EngineConfig::default()
    };
    let engine = create_test_engine(config);

    let (status, json) = send(app(&engine), get("/api/v1/health-checks")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["endpoints"][0]["endpoint"], "API Health");
    assert_eq!(json["endpoints"][0]["healthy"], Value::Null);

    let response = app(&engine).oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("sentinel_series 0"));
}

#[tokio::test]
async fn test_router_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sentinel.toml");
    std::fs::write(
        &path,
        r#"
[engine]
name = "edge"

[[rules]]
id = "disk_full"
metric = "disk_usage"
operator = ">="
threshold = 95.0
"#,
    )
    .unwrap();

    let config = ConfigLoader::new(&path).load().unwrap();
    let engine = create_test_engine(config);

    let (_, json) = send(app(&engine), get("/health")).await;
    assert_eq!(json["engine"], "edge");
}
