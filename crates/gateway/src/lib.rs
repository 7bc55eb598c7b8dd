//! HTTP API gateway for Covenant.
//!
//! The transport collaborator: deserializes requests, hands them to the
//! governance service, and maps typed failures to HTTP statuses. The core
//! prescribes no wire format — everything here is this layer's choice.
//!
//! Endpoints:
//!
//! - `GET  /health`                           — liveness (never throttled)
//! - `GET  /v1/admission`                     — admission status
//! - `POST /v1/agreements`                    — create an agreement
//! - `GET  /v1/agreements/{id}`               — verify an agreement
//! - `POST /v1/agreements/{id}/deactivate`    — deactivate (idempotent)
//! - `POST /v1/agreements/{id}/evaluate`      — evaluate one policy
//! - `POST /v1/agreements/{id}/usage`         — record usage
//! - `POST /v1/agreements/{id}/tasks`         — full gating pipeline
//!
//! An admission middleware refuses every `/v1/agreements*` request with
//! 503 while the host is over its resource envelope; `/health` and
//! `/v1/admission` stay reachable so operators can see why.

use axum::{
    Router,
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use covenant_admission::AdmissionStatus;
use covenant_core::{AgreementId, CreateAgreement, GovernanceError};
use covenant_service::GovernanceService;

/// Shared state for all gateway routes.
pub type SharedState = Arc<GovernanceService>;

/// Build the gateway router.
pub fn build_router(state: SharedState) -> Router {
    let agreements = Router::new()
        .route("/agreements", post(create_agreement_handler))
        .route("/agreements/{id}", get(verify_agreement_handler))
        .route("/agreements/{id}/deactivate", post(deactivate_handler))
        .route("/agreements/{id}/evaluate", post(evaluate_handler))
        .route("/agreements/{id}/usage", post(record_usage_handler))
        .route("/agreements/{id}/tasks", post(submit_task_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admission_middleware,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/admission", get(admission_handler))
        .nest("/v1", agreements)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
pub async fn serve(
    state: SharedState,
    host: &str,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Covenant gateway listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

// ── Middleware ────────────────────────────────────────────────────────────

/// Reject agreement operations while the host is over its resource budget.
/// Evaluated fresh per request, since conditions can change between the last
/// sample and this request, and over-throttling beats under-throttling
/// near the limit.
async fn admission_middleware(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.admission().has_available_resources() {
        return ApiError::from(GovernanceError::ResourceUnavailable {
            reason: "host resource usage over configured thresholds".into(),
        })
        .into_response();
    }
    next.run(request).await
}

// ── Error mapping ─────────────────────────────────────────────────────────

/// Wire form of a governance failure: a stable kind plus the display text.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

struct ApiError(GovernanceError);

impl From<GovernanceError> for ApiError {
    fn from(err: GovernanceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GovernanceError::InvalidTerms(_) | GovernanceError::InvalidQuantity { .. } => {
                StatusCode::BAD_REQUEST
            }
            GovernanceError::MissingCompulsoryPolicy { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            GovernanceError::ConsensusRejected { .. }
            | GovernanceError::PolicyViolation { .. } => StatusCode::FORBIDDEN,
            GovernanceError::NotFound(_) => StatusCode::NOT_FOUND,
            GovernanceError::AgreementInvalid { .. } => StatusCode::CONFLICT,
            GovernanceError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GovernanceError::ResourceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = ErrorBody {
            error: self.0.kind().into(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    agreements: usize,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        agreements: state.store().len(),
    })
}

async fn admission_handler(State(state): State<SharedState>) -> Json<AdmissionStatus> {
    Json(state.admission_check())
}

async fn create_agreement_handler(
    State(state): State<SharedState>,
    Json(request): Json<CreateAgreement>,
) -> Result<impl IntoResponse, ApiError> {
    let agreement = state.create_agreement(request).await?;
    Ok((StatusCode::CREATED, Json(agreement)))
}

async fn verify_agreement_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.verify_agreement(&AgreementId::from_raw(id))?;
    Ok(Json(report))
}

async fn deactivate_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.deactivate_agreement(&AgreementId::from_raw(id))?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct EvaluateRequest {
    policy: String,
    #[serde(default)]
    params: serde_json::Value,
}

async fn evaluate_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<EvaluateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let verdict = state.evaluate_compliance(
        &AgreementId::from_raw(id),
        &request.policy,
        &request.params,
    )?;
    Ok(Json(verdict))
}

#[derive(Debug, Deserialize)]
struct RecordUsageRequest {
    metric: String,
    quantity: f64,
}

#[derive(Debug, Serialize)]
struct RecordUsageResponse {
    metric: String,
    total: f64,
}

async fn record_usage_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<RecordUsageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let total = state.record_usage(
        &AgreementId::from_raw(id),
        &request.metric,
        request.quantity,
    )?;
    Ok(Json(RecordUsageResponse {
        metric: request.metric,
        total,
    }))
}

#[derive(Debug, Deserialize)]
struct SubmitTaskRequest {
    operation: String,
    #[serde(default)]
    params: serde_json::Value,
}

async fn submit_task_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<SubmitTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .submit_task(&AgreementId::from_raw(id), &request.operation, &request.params)
        .await?;
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use covenant_admission::{AdmissionController, ResourceSample, Thresholds};
    use covenant_consensus::ConsensusGate;
    use covenant_core::EventBus;
    use covenant_meter::UsageMeter;
    use covenant_policy::PolicyEngine;
    use covenant_service::LoggingExecutor;
    use covenant_store::AgreementStore;

    fn test_state() -> SharedState {
        let events = Arc::new(EventBus::default());
        let store = Arc::new(AgreementStore::new());
        let policy = Arc::new(PolicyEngine::with_defaults(
            vec!["harmful".into()],
            1000.0,
        ));
        let meter = Arc::new(UsageMeter::new(store.clone()));
        Arc::new(GovernanceService::new(
            store,
            policy,
            meter,
            Arc::new(ConsensusGate::single_party()),
            Arc::new(AdmissionController::new(
                Thresholds {
                    max_cpu_percent: 85.0,
                    max_memory_mb: 1024.0,
                },
                4,
                events.clone(),
            )),
            events,
            Arc::new(LoggingExecutor),
        ))
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create_agreement(state: &SharedState) -> String {
        let app = build_router(state.clone());
        let response = app
            .oneshot(json_request(
                "POST",
                "/v1/agreements",
                serde_json::json!({
                    "consumer_id": "consumer-1",
                    "provider_id": "provider-1",
                    "terms": {"max_calls": 5},
                    "ethical_policies": ["content_safety", "fair_use"],
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_reports_agreement_count() {
        let state = test_state();
        let app = build_router(state);

        let response = app
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["agreements"], 0);
    }

    #[tokio::test]
    async fn create_and_verify_roundtrip() {
        let state = test_state();
        let id = create_agreement(&state).await;

        let app = build_router(state);
        let response = app
            .oneshot(
                HttpRequest::get(format!("/v1/agreements/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["valid"], true);
        assert_eq!(json["ethical_status"], true);
        assert_eq!(json["usage_limits"]["calls"], 5.0);
    }

    #[tokio::test]
    async fn missing_compulsory_policy_maps_to_422() {
        let state = test_state();
        let app = build_router(state);

        let response = app
            .oneshot(json_request(
                "POST",
                "/v1/agreements",
                serde_json::json!({
                    "consumer_id": "c",
                    "provider_id": "p",
                    "terms": {},
                    "ethical_policies": ["fair_use"],
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["error"], "missing_compulsory_policy");
    }

    #[tokio::test]
    async fn unknown_agreement_maps_to_404() {
        let state = test_state();
        let app = build_router(state);

        let response = app
            .oneshot(
                HttpRequest::get("/v1/agreements/no-such-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "not_found");
    }

    #[tokio::test]
    async fn quota_exhaustion_maps_to_429() {
        let state = test_state();
        let id = create_agreement(&state).await;

        let usage = serde_json::json!({"metric": "calls", "quantity": 3});
        let uri = format!("/v1/agreements/{id}/usage");

        let response = build_router(state.clone())
            .oneshot(json_request("POST", &uri, usage.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["total"], 3.0);

        let response = build_router(state)
            .oneshot(json_request("POST", &uri, usage))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_json(response).await["error"], "quota_exceeded");
    }

    #[tokio::test]
    async fn policy_violation_maps_to_403() {
        let state = test_state();
        let id = create_agreement(&state).await;

        let response = build_router(state)
            .oneshot(json_request(
                "POST",
                &format!("/v1/agreements/{id}/tasks"),
                serde_json::json!({
                    "operation": "summarize",
                    "params": {"content": "harmful plan"},
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let json = body_json(response).await;
        assert_eq!(json["error"], "policy_violation");
        assert!(json["message"].as_str().unwrap().contains("harmful"));
    }

    #[tokio::test]
    async fn evaluate_endpoint_returns_verdict_as_data() {
        let state = test_state();
        let id = create_agreement(&state).await;

        let response = build_router(state)
            .oneshot(json_request(
                "POST",
                &format!("/v1/agreements/{id}/evaluate"),
                serde_json::json!({
                    "policy": "content_safety",
                    "params": {"content": "harmful plan"},
                }),
            ))
            .await
            .unwrap();
        // Non-compliance is an answer, not an HTTP error
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["compliant"], false);
    }

    #[tokio::test]
    async fn throttled_host_returns_503_but_health_stays_up() {
        let state = test_state();
        let id = create_agreement(&state).await;

        state
            .admission()
            .record_sample(ResourceSample::new(99.0, 2048.0));

        let response = build_router(state.clone())
            .oneshot(
                HttpRequest::get(format!("/v1/agreements/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["error"], "resource_unavailable");

        let response = build_router(state.clone())
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = build_router(state)
            .oneshot(HttpRequest::get("/v1/admission").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["available"], false);
    }

    #[tokio::test]
    async fn deactivate_then_task_maps_to_409() {
        let state = test_state();
        let id = create_agreement(&state).await;

        let response = build_router(state.clone())
            .oneshot(json_request(
                "POST",
                &format!("/v1/agreements/{id}/deactivate"),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = build_router(state)
            .oneshot(json_request(
                "POST",
                &format!("/v1/agreements/{id}/tasks"),
                serde_json::json!({"operation": "op", "params": {"content": "ok"}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["error"], "agreement_invalid");
    }

    #[tokio::test]
    async fn admitted_task_returns_outcome() {
        let state = test_state();
        let id = create_agreement(&state).await;

        let response = build_router(state)
            .oneshot(json_request(
                "POST",
                &format!("/v1/agreements/{id}/tasks"),
                serde_json::json!({
                    "operation": "summarize",
                    "params": {"content": "quarterly report"},
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["operation"], "summarize");
        assert_eq!(json["calls_used"], 1.0);
    }
}
