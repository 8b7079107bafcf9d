//! Integration tests for the broker API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use broker_lib::{
    health::{components, HealthRegistry},
    persistence::{read_allocation_log, JsonlAllocationLog, NullSink},
    Allocator, CostOptimizer, DryRunProvisioner, RateTable, RetryPolicy, WorkloadPolicyTable,
};
use hybrid_broker::api::{self, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::ALLOCATOR).await;
    health_registry.register(components::ALLOCATION_LOG).await;

    let allocator = Arc::new(Allocator::new(
        Arc::new(RateTable::standard()),
        Arc::new(WorkloadPolicyTable::standard()),
        Arc::new(NullSink),
    ));
    let state = Arc::new(AppState::new(
        allocator,
        CostOptimizer::new(1500.0),
        Arc::new(DryRunProvisioner),
        RetryPolicy::default(),
        health_registry,
    ));
    let router = api::create_router(state.clone());

    (router, state)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, value)
}

fn post_allocation(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/allocations")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn training_request(budget: f64) -> Value {
    json!({
        "workload_type": "ai_training",
        "gpu_memory_gb": 24,
        "vcpu_count": 8,
        "ram_gb": 32,
        "storage_gb": 500,
        "duration_hours": 48.0,
        "budget_usd": budget
    })
}

#[tokio::test]
async fn test_allocate_returns_created() {
    let (app, state) = setup_test_app().await;

    let (status, body) = send(app, post_allocation(training_request(100.0))).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["allocation"]["provider"], "vastai_reserved");
    assert_eq!(body["allocation"]["cost_per_hour"], 0.36);
    assert_eq!(body["allocation"]["specs"]["gpu"], "RTX 5090");
    assert_eq!(body["persisted"], true);
    assert!(body.get("instance_handle").is_none());
    assert_eq!(state.allocator.len(), 1);
}

#[tokio::test]
async fn test_allocate_appends_to_allocation_log() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join("allocations.log");

    let allocator = Arc::new(Allocator::new(
        Arc::new(RateTable::standard()),
        Arc::new(WorkloadPolicyTable::standard()),
        Arc::new(JsonlAllocationLog::new(&path)),
    ));
    let state = Arc::new(AppState::new(
        allocator,
        CostOptimizer::new(1500.0),
        Arc::new(DryRunProvisioner),
        RetryPolicy::default(),
        HealthRegistry::new(),
    ));

    let (status, body) = send(
        api::create_router(state),
        post_allocation(training_request(20.0)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["persisted"], true);

    let records = read_allocation_log(&path).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].allocation.instance_id, body["allocation"]["instance_id"]);
}

#[tokio::test]
async fn test_allocate_with_provisioning_returns_handle() {
    let (app, _state) = setup_test_app().await;

    let mut request = training_request(100.0);
    request["provision"] = json!(true);
    let (status, body) = send(app, post_allocation(request)).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["instance_handle"]["dry_run"], true);
    assert_eq!(
        body["instance_handle"]["instance_id"],
        body["allocation"]["instance_id"]
    );
}

#[tokio::test]
async fn test_budget_exceeded_is_unprocessable() {
    let (app, state) = setup_test_app().await;

    let (status, body) = send(app, post_allocation(training_request(5.0))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "budget_exceeded");
    assert!(body["error"].as_str().unwrap().contains("$5.76"));
    assert!(state.allocator.is_empty());
}

#[tokio::test]
async fn test_unknown_workload_is_not_found() {
    let (app, _state) = setup_test_app().await;

    let mut request = training_request(100.0);
    request["workload_type"] = json!("development");
    let (status, body) = send(app, post_allocation(request)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "unknown_workload");
}

#[tokio::test]
async fn test_malformed_body_is_invalid_request() {
    let (app, _state) = setup_test_app().await;

    let mut request = training_request(100.0);
    request["workload_type"] = json!("quantum");
    let (status, body) = send(app, post_allocation(request)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "invalid_request");
}

#[tokio::test]
async fn test_list_and_get_allocations() {
    let (app, _state) = setup_test_app().await;

    let (_, created) = send(app.clone(), post_allocation(training_request(100.0))).await;
    let instance_id = created["allocation"]["instance_id"].as_str().unwrap().to_string();

    let (status, list) = send(app.clone(), get("/api/v1/allocations")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 1);
    assert_eq!(list["allocations"][0]["instance_id"], instance_id.as_str());

    let (status, one) = send(app.clone(), get(&format!("/api/v1/allocations/{}", instance_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(one["workload_type"], "ai_training");

    let (status, missing) = send(app, get("/api/v1/allocations/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(missing["code"], "not_found");
}

#[tokio::test]
async fn test_optimize_reports_monthly_cost() {
    let (app, _state) = setup_test_app().await;

    send(app.clone(), post_allocation(training_request(100.0))).await;
    let (status, report) = send(app, get("/api/v1/optimize")).await;

    assert_eq!(status, StatusCode::OK);
    // 0.36 * 720
    let total = report["total_monthly_cost"].as_f64().unwrap();
    assert!((total - 259.2).abs() < 1e-9);
    assert_eq!(report["budget_limit"], 1500.0);
    assert_eq!(report["recommendations"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_rates_lists_tables() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = send(app, get("/api/v1/rates")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rates"].as_array().unwrap().len(), 9);
    assert_eq!(body["policies"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = send(app, get("/healthz")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["components"][components::ALLOCATOR].is_object());
}

#[tokio::test]
async fn test_healthz_degraded_after_log_failure_is_still_ok() {
    let (app, state) = setup_test_app().await;
    state.health_registry.record_persistence(false).await;

    let (status, body) = send(app, get("/healthz")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_unavailable_when_unhealthy() {
    let (app, state) = setup_test_app().await;
    state
        .health_registry
        .set_unhealthy(components::ALLOCATOR, "policy table invalid")
        .await;

    let (status, _) = send(app, get("/healthz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_readyz_follows_initialization() {
    let (app, state) = setup_test_app().await;

    let (status, body) = send(app.clone(), get("/readyz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);

    state.health_registry.set_ready(true).await;
    let (status, body) = send(app, get("/readyz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
}

#[tokio::test]
async fn test_metrics_exposes_broker_series() {
    let (app, _state) = setup_test_app().await;
    send(app.clone(), post_allocation(training_request(100.0))).await;

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("broker_allocations_total"));
    assert!(text.contains("broker_allocation_latency_seconds"));
}
