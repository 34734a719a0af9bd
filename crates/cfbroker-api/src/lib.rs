//! cfbroker-api — broker protocol surface for cfbroker.
//!
//! [`ServiceBroker`] implements the broker operations; [`build_router`]
//! exposes them over HTTP behind basic auth.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/v2/catalog` | Service catalog |
//! | PUT | `/v2/service_instances/{instance_id}` | Provision an instance |
//! | PATCH | `/v2/service_instances/{instance_id}` | Update an instance |
//! | DELETE | `/v2/service_instances/{instance_id}` | Deprovision an instance |
//! | GET | `/v2/service_instances/{instance_id}/last_operation` | Operation status |
//! | PUT | `/v2/service_instances/{instance_id}/service_bindings/{binding_id}` | Bind |
//! | DELETE | `/v2/service_instances/{instance_id}/service_bindings/{binding_id}` | Unbind |

pub mod auth;
pub mod broker;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, put};

use cfbroker_core::config::AuthConfig;

pub use broker::{BrokerError, BrokerResult, ServiceBroker};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub broker: Arc<ServiceBroker>,
}

/// Build the broker protocol router. Every route requires `credentials`.
pub fn build_router(broker: Arc<ServiceBroker>, credentials: AuthConfig) -> Router {
    let state = ApiState { broker };

    Router::new()
        .route("/v2/catalog", get(handlers::catalog))
        .route(
            "/v2/service_instances/{instance_id}",
            put(handlers::provision)
                .patch(handlers::update)
                .delete(handlers::deprovision),
        )
        .route(
            "/v2/service_instances/{instance_id}/last_operation",
            get(handlers::last_operation),
        )
        .route(
            "/v2/service_instances/{instance_id}/service_bindings/{binding_id}",
            put(handlers::bind).delete(handlers::unbind),
        )
        .layer(middleware::from_fn_with_state(
            Arc::new(credentials),
            auth::require_basic_auth,
        ))
        .with_state(state)
}
