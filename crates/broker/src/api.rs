//! HTTP API for allocation, optimization, health checks and Prometheus metrics

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use broker_lib::{
    health::{components, ComponentStatus, HealthRegistry},
    observability::BrokerMetrics,
    policy::PolicyEntry,
    provision_with_retry,
    rates::RateEntry,
    Allocator, BrokerError, CostOptimizer, InstanceHandle, OptimizationReport, ProvisionRequest,
    ProvisioningService, ResourceAllocation, ResourceRequest, RetryPolicy,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub allocator: Arc<Allocator>,
    pub optimizer: CostOptimizer,
    pub provisioner: Arc<dyn ProvisioningService>,
    pub retry_policy: RetryPolicy,
    pub health_registry: HealthRegistry,
    pub metrics: BrokerMetrics,
}

impl AppState {
    pub fn new(
        allocator: Arc<Allocator>,
        optimizer: CostOptimizer,
        provisioner: Arc<dyn ProvisioningService>,
        retry_policy: RetryPolicy,
        health_registry: HealthRegistry,
    ) -> Self {
        Self {
            allocator,
            optimizer,
            provisioner,
            retry_policy,
            health_registry,
            metrics: BrokerMetrics::new(),
        }
    }
}

/// Body of `POST /api/v1/allocations`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocateRequest {
    #[serde(flatten)]
    pub request: ResourceRequest,
    /// Also create the instance through the provisioning service
    #[serde(default)]
    pub provision: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocateResponse {
    pub allocation: ResourceAllocation,
    pub persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_handle: Option<InstanceHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationList {
    pub allocations: Vec<ResourceAllocation>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatesResponse {
    pub rates: Vec<RateEntry>,
    pub policies: Vec<PolicyEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Error returned by API handlers
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.into(),
                code: code.to_string(),
            },
        }
    }
}

impl From<BrokerError> for ApiError {
    fn from(e: BrokerError) -> Self {
        let status = match &e {
            BrokerError::UnknownWorkload(_) => StatusCode::NOT_FOUND,
            BrokerError::BudgetExceeded { .. } | BrokerError::InvalidRequest(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            BrokerError::RateNotFound { .. }
            | BrokerError::DuplicateInstanceId(_)
            | BrokerError::PolicyValidation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if e.is_internal() {
            error!(code = e.code(), error = %e, "Internal allocation failure");
        }
        Self::new(status, e.code(), e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_request",
            rejection.body_text(),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

async fn create_allocation(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AllocateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AllocateResponse>), ApiError> {
    let Json(body) = payload?;

    // The allocation log append is blocking file I/O
    let allocator = state.allocator.clone();
    let request = body.request.clone();
    let outcome = tokio::task::spawn_blocking(move || allocator.allocate(&request))
        .await
        .map_err(|e| {
            error!(error = %e, "Allocation task failed");
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "Allocation task failed",
            )
        })??;
    state
        .health_registry
        .record_persistence(outcome.persisted)
        .await;

    let mut response = AllocateResponse {
        allocation: outcome.allocation,
        persisted: outcome.persisted,
        instance_handle: None,
        provisioning_error: None,
    };

    if body.provision {
        let request = ProvisionRequest::from_allocation(&response.allocation);
        match provision_with_retry(state.provisioner.as_ref(), &request, &state.retry_policy).await
        {
            Ok(handle) => {
                state.health_registry.set_healthy(components::PROVISIONER).await;
                response.instance_handle = Some(handle);
            }
            Err(e) => {
                state
                    .health_registry
                    .set_degraded(components::PROVISIONER, e.to_string())
                    .await;
                response.provisioning_error = Some(e.to_string());
            }
        }
    }

    Ok((StatusCode::CREATED, Json(response)))
}

async fn list_allocations(State(state): State<Arc<AppState>>) -> Json<AllocationList> {
    let allocations = state.allocator.allocations();
    Json(AllocationList {
        total: allocations.len(),
        allocations,
    })
}

async fn get_allocation(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
) -> Result<Json<ResourceAllocation>, ApiError> {
    state.allocator.get(&instance_id).map(Json).ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("No allocation with id {}", instance_id),
        )
    })
}

async fn optimize(State(state): State<Arc<AppState>>) -> Json<OptimizationReport> {
    Json(state.allocator.optimize(&state.optimizer))
}

async fn rates(State(state): State<Arc<AppState>>) -> Json<RatesResponse> {
    Json(RatesResponse {
        rates: state.allocator.rates().entries(),
        policies: state.allocator.policies().entries(),
    })
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/v1/allocations",
            get(list_allocations).post(create_allocation),
        )
        .route("/api/v1/allocations/:id", get(get_allocation))
        .route("/api/v1/optimize", get(optimize))
        .route("/api/v1/rates", get(rates))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
