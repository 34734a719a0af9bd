//! Shared types used across cfbroker crates.
//!
//! `PlanSettings` and `InstanceSettings` serialize directly into the cluster
//! REST API's database document (`/v1/bdbs`), so field names follow the
//! cluster's wire format rather than Rust naming.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Boxed future alias for the async collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Broker-assigned identifier of a service instance.
pub type InstanceId = String;

/// Shard key pattern hashing on the substring between curly braces.
pub const SHARD_KEY_TAG_REGEX: &str = r".*\{(?<tag>.*)\}.*";

/// Shard key pattern hashing on the whole key name.
pub const SHARD_KEY_WHOLE_REGEX: &str = r"(?<tag>.*)";

// ── Settings ──────────────────────────────────────────────────────

/// Data persistence mode of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persistence {
    Disabled,
    Aof,
    Snapshot,
}

impl Persistence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Persistence::Disabled => "disabled",
            Persistence::Aof => "aof",
            Persistence::Snapshot => "snapshot",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "disabled" => Some(Persistence::Disabled),
            "aof" => Some(Persistence::Aof),
            "snapshot" => Some(Persistence::Snapshot),
            _ => None,
        }
    }
}

impl fmt::Display for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot after `writes` writes within `secs` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPolicy {
    pub writes: u64,
    pub secs: u64,
}

/// A single shard key hashing rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardKeyRegex {
    pub regex: String,
}

/// The two fixed hashing rules applied to every sharded database.
pub fn default_shard_key_regexes() -> Vec<ShardKeyRegex> {
    vec![
        ShardKeyRegex {
            regex: SHARD_KEY_TAG_REGEX.to_string(),
        },
        ShardKeyRegex {
            regex: SHARD_KEY_WHOLE_REGEX.to_string(),
        },
    ]
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Database settings derived from a service plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSettings {
    /// Memory limit in bytes.
    pub memory_size: u64,
    pub replication: bool,
    pub shards_count: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub sharding: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub implicit_shard_key: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shard_key_regex: Vec<ShardKeyRegex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_persistence: Option<Persistence>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snapshot_policy: Vec<SnapshotPolicy>,
}

impl PlanSettings {
    /// Render the settings as a loose parameter map, the shape update
    /// requests are assembled in.
    pub fn to_params(&self) -> serde_json::Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

/// Everything needed to create a database on the cluster.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSettings {
    pub name: String,
    #[serde(rename = "authentication_redis_pass")]
    pub password: String,
    #[serde(flatten)]
    pub plan: PlanSettings,
}

impl fmt::Debug for InstanceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceSettings")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .field("plan", &self.plan)
            .finish()
    }
}

// ── Credentials ───────────────────────────────────────────────────

/// Cluster-assigned identity of a provisioned database.
///
/// Field names match the persisted state document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceCredentials {
    #[serde(rename = "UID")]
    pub uid: u64,
    #[serde(rename = "Port")]
    pub port: u16,
    #[serde(rename = "IPList")]
    pub ip_list: Vec<String>,
    #[serde(rename = "Password")]
    pub password: String,
}
