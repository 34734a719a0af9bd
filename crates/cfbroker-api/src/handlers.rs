//! Broker protocol handlers.
//!
//! Each handler calls into the [`ServiceBroker`](crate::ServiceBroker) and
//! maps its result onto the status codes platforms expect.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use cfbroker_lifecycle::{BindingCredentials, LifecycleError};

use crate::ApiState;
use crate::broker::{BindDetails, BrokerError, ProvisionDetails, UpdateDetails};

#[derive(Serialize)]
struct ErrorBody {
    description: String,
}

#[derive(Serialize)]
struct BindingResponse {
    credentials: BindingCredentials,
}

fn empty(status: StatusCode) -> Response {
    (status, Json(json!({}))).into_response()
}

fn error_response(err: &BrokerError, missing: StatusCode) -> Response {
    let status = match err {
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        BrokerError::Lifecycle(LifecycleError::InstanceExists(_)) => StatusCode::CONFLICT,
        BrokerError::Lifecycle(LifecycleError::InstanceDoesNotExist(_)) => missing,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %err, "broker operation failed");
    }
    (
        status,
        Json(ErrorBody {
            description: err.to_string(),
        }),
    )
        .into_response()
}

// ── Catalog ────────────────────────────────────────────────────

/// GET /v2/catalog
pub async fn catalog(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.broker.services())
}

// ── Service instances ──────────────────────────────────────────

/// PUT /v2/service_instances/{instance_id}
pub async fn provision(
    State(state): State<ApiState>,
    Path(instance_id): Path<String>,
    Json(details): Json<ProvisionDetails>,
) -> Response {
    match state.broker.provision(&instance_id, &details).await {
        Ok(()) => empty(StatusCode::CREATED),
        Err(e) => error_response(&e, StatusCode::NOT_FOUND),
    }
}

/// PATCH /v2/service_instances/{instance_id}
pub async fn update(
    State(state): State<ApiState>,
    Path(instance_id): Path<String>,
    Json(details): Json<UpdateDetails>,
) -> Response {
    match state.broker.update(&instance_id, &details).await {
        Ok(()) => empty(StatusCode::OK),
        Err(e) => error_response(&e, StatusCode::NOT_FOUND),
    }
}

/// DELETE /v2/service_instances/{instance_id}
pub async fn deprovision(
    State(state): State<ApiState>,
    Path(instance_id): Path<String>,
) -> Response {
    match state.broker.deprovision(&instance_id).await {
        Ok(()) => empty(StatusCode::OK),
        Err(BrokerError::Lifecycle(LifecycleError::InstanceDoesNotExist(_))) => {
            empty(StatusCode::GONE)
        }
        Err(e) => error_response(&e, StatusCode::NOT_FOUND),
    }
}

/// GET /v2/service_instances/{instance_id}/last_operation
pub async fn last_operation(
    State(state): State<ApiState>,
    Path(instance_id): Path<String>,
) -> impl IntoResponse {
    Json(state.broker.last_operation(&instance_id))
}

// ── Bindings ───────────────────────────────────────────────────

/// PUT /v2/service_instances/{instance_id}/service_bindings/{binding_id}
pub async fn bind(
    State(state): State<ApiState>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    Json(details): Json<BindDetails>,
) -> Response {
    match state.broker.bind(&instance_id, &binding_id, &details) {
        Ok(credentials) => {
            (StatusCode::CREATED, Json(BindingResponse { credentials })).into_response()
        }
        Err(e) => error_response(&e, StatusCode::NOT_FOUND),
    }
}

/// DELETE /v2/service_instances/{instance_id}/service_bindings/{binding_id}
pub async fn unbind(
    State(state): State<ApiState>,
    Path((instance_id, binding_id)): Path<(String, String)>,
) -> Response {
    match state.broker.unbind(&instance_id, &binding_id) {
        Ok(()) => empty(StatusCode::OK),
        Err(e) => error_response(&e, StatusCode::NOT_FOUND),
    }
}
