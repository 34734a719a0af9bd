//! Broker YAML configuration parser.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::types::{Persistence, PlanSettings, SnapshotPolicy, default_shard_key_regexes};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub cluster: ClusterConfig,
    pub broker: ServiceBrokerConfig,
}

/// Connection settings for the cluster management API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Base URL, e.g. `https://cluster.example.com:9443`.
    pub address: String,
    pub auth: AuthConfig,
    /// Skip TLS certificate verification. The management API usually runs
    /// with a self-signed certificate.
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_create_timeout_secs")]
    pub create_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceBrokerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub auth: AuthConfig,
    pub service_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Extra catalog tags, appended to the built-in ones.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    #[serde(default)]
    pub plans: Vec<ServicePlanConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicePlanConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub settings: ServiceInstanceConfig,
}

/// Per-plan database settings as written by the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstanceConfig {
    /// Memory limit in bytes.
    #[serde(default)]
    pub memory_limit: u64,
    #[serde(default)]
    pub replication: bool,
    #[serde(default = "default_shard_count")]
    pub shard_count: u32,
    pub persistence: Option<Persistence>,
    pub snapshot: Option<SnapshotPolicy>,
}

impl Default for ServiceInstanceConfig {
    fn default() -> Self {
        Self {
            memory_limit: 0,
            replication: false,
            shard_count: default_shard_count(),
            persistence: None,
            snapshot: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_create_timeout_secs() -> u64 {
    15
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_port() -> u16 {
    8080
}

fn default_shard_count() -> u32 {
    1
}

fn default_state_path() -> PathBuf {
    PathBuf::from("/var/lib/cfbroker/state.json")
}

impl BrokerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: BrokerConfig = serde_yaml::from_str(content).context("parsing config YAML")?;
        Ok(config)
    }

    /// Check the invariants the broker relies on at runtime.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cluster.address.trim().is_empty() {
            bail!("cluster.address must be set");
        }
        if self.cluster.poll_interval_ms == 0 {
            bail!("cluster.poll_interval_ms must be positive");
        }
        if self.broker.service_id.trim().is_empty() {
            bail!("broker.service_id must be set");
        }
        if self.broker.plans.is_empty() {
            bail!("broker.plans must contain at least one plan");
        }

        let mut seen = HashSet::new();
        for plan in &self.broker.plans {
            if plan.id.trim().is_empty() {
                bail!("plan {:?} has an empty id", plan.name);
            }
            if !seen.insert(plan.id.as_str()) {
                bail!("duplicate plan id {:?}", plan.id);
            }
            let settings = &plan.settings;
            if settings.memory_limit == 0 {
                bail!("plan {:?}: memory_limit must be positive", plan.id);
            }
            if settings.shard_count == 0 {
                bail!("plan {:?}: shard_count must be at least 1", plan.id);
            }
            if settings.persistence == Some(Persistence::Snapshot) && settings.snapshot.is_none() {
                bail!(
                    "plan {:?}: snapshot persistence requires a snapshot policy",
                    plan.id
                );
            }
        }
        Ok(())
    }
}

impl ClusterConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn create_timeout(&self) -> Duration {
        Duration::from_secs(self.create_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ServiceBrokerConfig {
    pub fn plan(&self, id: &str) -> Option<&ServicePlanConfig> {
        self.plans.iter().find(|p| p.id == id)
    }
}

impl ServiceInstanceConfig {
    /// Expand the operator-facing settings into the cluster's database
    /// settings, deriving the sharding and snapshot fields.
    pub fn plan_settings(&self) -> PlanSettings {
        let sharded = self.shard_count > 1;
        let snapshot_policy = match (self.persistence, self.snapshot) {
            (Some(Persistence::Snapshot), Some(policy)) => vec![policy],
            _ => Vec::new(),
        };
        PlanSettings {
            memory_size: self.memory_limit,
            replication: self.replication,
            shards_count: self.shard_count,
            sharding: sharded,
            implicit_shard_key: sharded,
            shard_key_regex: if sharded {
                default_shard_key_regexes()
            } else {
                Vec::new()
            },
            data_persistence: self.persistence,
            snapshot_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SHARD_KEY_TAG_REGEX, SHARD_KEY_WHOLE_REGEX};

    const SAMPLE: &str = r#"
cluster:
  address: https://cluster.local:9443
  auth:
    username: admin
    password: secret
broker:
  port: 9000
  auth:
    username: broker
    password: broker-secret
  service_id: redislabs-service
  name: redislabs
  description: Redis Labs Enterprise Cluster
  state_path: /tmp/cfbroker/state.json
  plans:
    - id: small
      name: small
      description: Small instance
      settings:
        memory_limit: 104857600
        replication: false
        shard_count: 1
        persistence: snapshot
        snapshot:
          writes: 10
          secs: 12
    - id: large
      name: large
      settings:
        memory_limit: 700000000
        replication: true
        shard_count: 2
"#;

    #[test]
    fn test_parse_sample() {
        let config = BrokerConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.cluster.address, "https://cluster.local:9443");
        assert!(config.cluster.accept_invalid_certs);
        assert_eq!(config.cluster.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.cluster.create_timeout(), Duration::from_secs(15));
        assert_eq!(config.broker.port, 9000);
        assert_eq!(config.broker.plans.len(), 2);
        assert_eq!(config.broker.plans[1].description, "");
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_minimal_defaults() {
        let yaml = r#"
cluster:
  address: http://localhost:8080
  auth: { username: a, password: b }
broker:
  service_id: svc
"#;
        let config = BrokerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.broker.port, 8080);
        assert_eq!(
            config.broker.state_path,
            PathBuf::from("/var/lib/cfbroker/state.json")
        );
        assert!(config.broker.plans.is_empty());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_snapshot_plan_settings() {
        let config = BrokerConfig::from_yaml(SAMPLE).unwrap();
        let settings = config.broker.plan("small").unwrap().settings.plan_settings();
        assert_eq!(settings.data_persistence, Some(Persistence::Snapshot));
        assert_eq!(
            settings.snapshot_policy,
            vec![SnapshotPolicy { writes: 10, secs: 12 }]
        );
        assert!(!settings.sharding);
        assert!(settings.shard_key_regex.is_empty());
    }

    #[test]
    fn test_sharded_plan_settings() {
        let config = BrokerConfig::from_yaml(SAMPLE).unwrap();
        let settings = config.broker.plan("large").unwrap().settings.plan_settings();
        assert!(settings.sharding);
        assert!(settings.implicit_shard_key);
        let regexes: Vec<&str> = settings
            .shard_key_regex
            .iter()
            .map(|r| r.regex.as_str())
            .collect();
        assert_eq!(regexes, [SHARD_KEY_TAG_REGEX, SHARD_KEY_WHOLE_REGEX]);
        assert!(settings.data_persistence.is_none());
    }

    #[test]
    fn test_snapshot_policy_ignored_without_snapshot_persistence() {
        let settings = ServiceInstanceConfig {
            memory_limit: 1024,
            persistence: Some(Persistence::Aof),
            snapshot: Some(SnapshotPolicy { writes: 1, secs: 1 }),
            ..ServiceInstanceConfig::default()
        }
        .plan_settings();
        assert!(settings.snapshot_policy.is_empty());
    }

    #[test]
    fn test_validate_rejects_duplicate_plans() {
        let mut config = BrokerConfig::from_yaml(SAMPLE).unwrap();
        config.broker.plans[1].id = "small".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate plan id"));
    }

    #[test]
    fn test_validate_requires_snapshot_policy() {
        let mut config = BrokerConfig::from_yaml(SAMPLE).unwrap();
        config.broker.plans[0].settings.snapshot = None;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("snapshot policy"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.yml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = BrokerConfig::from_file(&path).unwrap();
        assert_eq!(config.broker.service_id, "redislabs-service");

        let missing = BrokerConfig::from_file(&dir.path().join("nope.yml"));
        assert!(missing.is_err());
    }

    #[test]
    fn test_auth_debug_is_redacted() {
        let config = BrokerConfig::from_yaml(SAMPLE).unwrap();
        let rendered = format!("{:?}", config.cluster.auth);
        assert!(!rendered.contains("secret"));
    }
}
