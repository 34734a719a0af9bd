//! Persisted broker state.

use serde::{Deserialize, Deserializer, Serialize};

use cfbroker_core::{InstanceCredentials, InstanceId};

/// Every service instance the broker has provisioned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    #[serde(
        rename = "AvailableInstances",
        default,
        deserialize_with = "null_as_empty"
    )]
    pub available_instances: Vec<ServiceInstance>,
}

/// A provisioned instance and the credentials of its database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    #[serde(rename = "ID")]
    pub id: InstanceId,
    #[serde(rename = "Credentials")]
    pub credentials: InstanceCredentials,
}

impl State {
    pub fn find(&self, id: &str) -> Option<&ServiceInstance> {
        self.available_instances.iter().find(|i| i.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }
}

// Documents written by older brokers store an empty list as `null`.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ServiceInstance>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ServiceInstance>>::deserialize(deserializer)?.unwrap_or_default())
}
