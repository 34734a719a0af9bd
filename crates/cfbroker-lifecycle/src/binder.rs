//! Instance binder — hands out connection details for bound applications.
//!
//! The cluster has no per-binding users, so every binding of an instance
//! receives the same credentials and unbinding changes nothing.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use cfbroker_state::StatePersister;

use crate::error::{LifecycleError, LifecycleResult};

/// Connection details returned to a bound application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingCredentials {
    pub port: u16,
    pub ip_list: Vec<String>,
    pub password: String,
}

pub trait InstanceBinder: Send + Sync {
    fn bind(&self, id: &str, binding_id: &str) -> LifecycleResult<BindingCredentials>;

    fn unbind(&self, id: &str, binding_id: &str) -> LifecycleResult<()>;

    fn exists(&self, id: &str) -> LifecycleResult<bool>;
}

/// [`InstanceBinder`] that reads credentials from the broker state.
pub struct DefaultBinder {
    persister: Arc<dyn StatePersister>,
}

impl DefaultBinder {
    pub fn new(persister: Arc<dyn StatePersister>) -> Self {
        Self { persister }
    }
}

impl InstanceBinder for DefaultBinder {
    fn bind(&self, id: &str, binding_id: &str) -> LifecycleResult<BindingCredentials> {
        let state = self
            .persister
            .load()
            .map_err(LifecycleError::FailedToLoadState)?;
        let instance = state
            .find(id)
            .ok_or_else(|| LifecycleError::InstanceDoesNotExist(id.to_string()))?;

        debug!(instance_id = %id, %binding_id, uid = instance.credentials.uid, "binding issued");
        Ok(BindingCredentials {
            port: instance.credentials.port,
            ip_list: instance.credentials.ip_list.clone(),
            password: instance.credentials.password.clone(),
        })
    }

    fn unbind(&self, id: &str, binding_id: &str) -> LifecycleResult<()> {
        debug!(instance_id = %id, %binding_id, "binding released");
        Ok(())
    }

    fn exists(&self, id: &str) -> LifecycleResult<bool> {
        let state = self
            .persister
            .load()
            .map_err(LifecycleError::FailedToLoadState)?;
        Ok(state.contains(id))
    }
}
