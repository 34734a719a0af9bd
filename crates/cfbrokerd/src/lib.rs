//! cfbrokerd — assembles the broker from its configuration.
//!
//! Wiring only. The binary in `main.rs` adds the CLI, logging, and the
//! HTTP server lifecycle.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tracing::info;

use cfbroker_api::ServiceBroker;
use cfbroker_cluster::ClusterClient;
use cfbroker_core::BrokerConfig;
use cfbroker_lifecycle::{DefaultBinder, DefaultCreator};
use cfbroker_state::LocalPersister;

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,cfbrokerd=debug,cfbroker=debug";

/// Build the broker router for a validated configuration.
pub fn build_app(config: &BrokerConfig) -> anyhow::Result<Router> {
    let client = ClusterClient::new(&config.cluster).context("failed to create cluster client")?;

    let persister = Arc::new(LocalPersister::new(&config.broker.state_path));
    info!(path = ?persister.path(), "using state file");

    let creator = Arc::new(DefaultCreator::new(Arc::new(client), persister.clone()));
    let binder = Arc::new(DefaultBinder::new(persister));
    let broker = ServiceBroker::new(config.broker.clone(), creator, binder);
    info!(
        service_id = %config.broker.service_id,
        plans = config.broker.plans.len(),
        "service broker initialized"
    );

    Ok(cfbroker_api::build_router(
        Arc::new(broker),
        config.broker.auth.clone(),
    ))
}
