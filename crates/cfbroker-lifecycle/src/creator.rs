//! Instance creator — creates, updates and destroys the cluster databases
//! backing service instances, and records them in the broker state.
//!
//! Every call on [`DefaultCreator`] runs under one async mutex, held across
//! the remote call, so a load → remote → save cycle never interleaves with
//! another one.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use cfbroker_cluster::ClusterApi;
use cfbroker_core::{BoxFuture, InstanceSettings};
use cfbroker_state::{ServiceInstance, State, StatePersister};

use crate::error::{LifecycleError, LifecycleResult};

/// Manages the databases behind service instances.
pub trait InstanceCreator: Send + Sync {
    /// Create a database for `id` and record its credentials.
    fn create<'a>(
        &'a self,
        id: &'a str,
        settings: &'a InstanceSettings,
    ) -> BoxFuture<'a, LifecycleResult<()>>;

    /// Forward a settings update to the database behind `id`.
    fn update<'a>(
        &'a self,
        id: &'a str,
        params: &'a Map<String, Value>,
    ) -> BoxFuture<'a, LifecycleResult<()>>;

    /// Delete the database behind `id` and forget the instance.
    fn destroy<'a>(&'a self, id: &'a str) -> BoxFuture<'a, LifecycleResult<()>>;

    fn exists<'a>(&'a self, id: &'a str) -> BoxFuture<'a, LifecycleResult<bool>>;
}

/// [`InstanceCreator`] backed by a cluster client and a state persister.
pub struct DefaultCreator {
    cluster: Arc<dyn ClusterApi>,
    persister: Arc<dyn StatePersister>,
    lock: Mutex<()>,
}

impl DefaultCreator {
    pub fn new(cluster: Arc<dyn ClusterApi>, persister: Arc<dyn StatePersister>) -> Self {
        Self {
            cluster,
            persister,
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> LifecycleResult<State> {
        self.persister
            .load()
            .map_err(LifecycleError::FailedToLoadState)
    }

    /// Save after the cluster has already been changed.
    fn save_after_remote_change(&self, state: &State, id: &str, action: &str) -> LifecycleResult<()> {
        self.persister.save(state).map_err(|e| {
            error!(
                instance_id = %id,
                %action,
                error = %e,
                "cluster changed but broker state was not saved; state and cluster have diverged"
            );
            LifecycleError::FailedToSaveState(e)
        })
    }

    async fn create_instance(&self, id: &str, settings: &InstanceSettings) -> LifecycleResult<()> {
        let _guard = self.lock.lock().await;

        let mut state = self.load()?;
        if state.contains(id) {
            return Err(LifecycleError::InstanceExists(id.to_string()));
        }

        let credentials = self.cluster.create_database(settings).await?;
        let uid = credentials.uid;
        state.available_instances.push(ServiceInstance {
            id: id.to_string(),
            credentials,
        });
        self.save_after_remote_change(&state, id, "create")?;

        info!(instance_id = %id, uid, name = %settings.name, "instance created");
        Ok(())
    }

    async fn update_instance(&self, id: &str, params: &Map<String, Value>) -> LifecycleResult<()> {
        let _guard = self.lock.lock().await;

        let state = self.load()?;
        let instance = state
            .find(id)
            .ok_or_else(|| LifecycleError::InstanceDoesNotExist(id.to_string()))?;

        let uid = instance.credentials.uid;
        self.cluster.update_database(uid, params).await?;

        info!(instance_id = %id, uid, fields = params.len(), "instance updated");
        Ok(())
    }

    async fn destroy_instance(&self, id: &str) -> LifecycleResult<()> {
        let _guard = self.lock.lock().await;

        let state = self.load()?;
        let (matching, remaining): (Vec<_>, Vec<_>) = state
            .available_instances
            .into_iter()
            .partition(|instance| instance.id == id);
        if matching.is_empty() {
            return Err(LifecycleError::InstanceDoesNotExist(id.to_string()));
        }

        for instance in &matching {
            debug!(instance_id = %id, uid = instance.credentials.uid, "deleting database");
            self.cluster
                .delete_database(instance.credentials.uid)
                .await?;
        }

        let state = State {
            available_instances: remaining,
        };
        self.save_after_remote_change(&state, id, "destroy")?;

        info!(instance_id = %id, databases = matching.len(), "instance destroyed");
        Ok(())
    }

    async fn instance_exists(&self, id: &str) -> LifecycleResult<bool> {
        let _guard = self.lock.lock().await;
        Ok(self.load()?.contains(id))
    }
}

impl InstanceCreator for DefaultCreator {
    fn create<'a>(
        &'a self,
        id: &'a str,
        settings: &'a InstanceSettings,
    ) -> BoxFuture<'a, LifecycleResult<()>> {
        Box::pin(self.create_instance(id, settings))
    }

    fn update<'a>(
        &'a self,
        id: &'a str,
        params: &'a Map<String, Value>,
    ) -> BoxFuture<'a, LifecycleResult<()>> {
        Box::pin(self.update_instance(id, params))
    }

    fn destroy<'a>(&'a self, id: &'a str) -> BoxFuture<'a, LifecycleResult<()>> {
        Box::pin(self.destroy_instance(id))
    }

    fn exists<'a>(&'a self, id: &'a str) -> BoxFuture<'a, LifecycleResult<bool>> {
        Box::pin(self.instance_exists(id))
    }
}
