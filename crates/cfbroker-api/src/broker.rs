//! Service broker facade.
//!
//! Translates broker protocol requests into lifecycle calls: checks the
//! service and plan, turns request parameters into database settings, and
//! delegates the actual work to an [`InstanceCreator`] and an
//! [`InstanceBinder`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use cfbroker_cluster::{ParamError, validate_update_params};
use cfbroker_core::config::{ServiceBrokerConfig, ServicePlanConfig};
use cfbroker_core::password::{self, DEFAULT_PASSWORD_LENGTH};
use cfbroker_core::{InstanceSettings, PasswordError};
use cfbroker_lifecycle::{
    BindingCredentials, InstanceBinder, InstanceCreator, LifecycleError,
};

/// Tag every catalog entry carries.
pub const SERVICE_TAG: &str = "redislabs";

/// Longest database name the cluster accepts.
pub const MAX_DATABASE_NAME_LEN: usize = 63;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("service {0} does not exist")]
    ServiceDoesNotExist(String),

    #[error("plan {0} does not exist")]
    PlanDoesNotExist(String),

    #[error("database name is required")]
    DatabaseNameIsRequired,

    #[error(transparent)]
    InvalidParameters(#[from] ParamError),

    #[error("failed to generate password: {0}")]
    Password(#[from] PasswordError),

    #[error("failed to encode plan settings: {0}")]
    PlanSettings(#[source] serde_json::Error),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl BrokerError {
    /// Whether the request itself was at fault.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BrokerError::ServiceDoesNotExist(_)
                | BrokerError::PlanDoesNotExist(_)
                | BrokerError::DatabaseNameIsRequired
                | BrokerError::InvalidParameters(_)
        )
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;

// ── Catalog ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Catalog {
    pub services: Vec<Service>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub description: String,
    pub bindable: bool,
    pub plan_updateable: bool,
    pub tags: Vec<String>,
    pub plans: Vec<ServicePlan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServicePlan {
    pub id: String,
    pub name: String,
    pub description: String,
}

// ── Request details ────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvisionDetails {
    pub service_id: String,
    pub plan_id: String,
    #[serde(default)]
    pub organization_guid: Option<String>,
    #[serde(default)]
    pub space_guid: Option<String>,
    #[serde(default)]
    pub parameters: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDetails {
    pub service_id: String,
    /// Present when the caller switches plans.
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub parameters: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BindDetails {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub app_guid: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastOperation {
    pub state: OperationState,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

// ── Facade ─────────────────────────────────────────────────────

pub struct ServiceBroker {
    config: ServiceBrokerConfig,
    creator: Arc<dyn InstanceCreator>,
    binder: Arc<dyn InstanceBinder>,
}

impl ServiceBroker {
    pub fn new(
        config: ServiceBrokerConfig,
        creator: Arc<dyn InstanceCreator>,
        binder: Arc<dyn InstanceBinder>,
    ) -> Self {
        Self {
            config,
            creator,
            binder,
        }
    }

    pub fn services(&self) -> Catalog {
        let mut tags = vec![SERVICE_TAG.to_string()];
        tags.extend(self.config.tags.iter().cloned());

        let plans = self
            .config
            .plans
            .iter()
            .map(|plan| ServicePlan {
                id: plan.id.clone(),
                name: plan.name.clone(),
                description: plan.description.clone(),
            })
            .collect();

        Catalog {
            services: vec![Service {
                id: self.config.service_id.clone(),
                name: self.config.name.clone(),
                description: self.config.description.clone(),
                bindable: true,
                plan_updateable: true,
                tags,
                plans,
            }],
        }
    }

    pub async fn provision(&self, id: &str, details: &ProvisionDetails) -> BrokerResult<()> {
        self.check_service(&details.service_id)?;
        let plan = self.plan(&details.plan_id)?;

        let empty = Map::new();
        let params = details.parameters.as_ref().unwrap_or(&empty);
        let name = string_param(params, "name")?.ok_or(BrokerError::DatabaseNameIsRequired)?;
        let password = match string_param(params, "password")? {
            Some(password) => password.to_string(),
            None => password::generate(DEFAULT_PASSWORD_LENGTH)?,
        };

        let settings = InstanceSettings {
            name: database_name(name, id),
            password,
            plan: plan.settings.plan_settings(),
        };
        info!(
            instance_id = %id,
            plan_id = %plan.id,
            database = %settings.name,
            "provisioning instance"
        );
        self.creator.create(id, &settings).await?;
        Ok(())
    }

    pub async fn update(&self, id: &str, details: &UpdateDetails) -> BrokerResult<()> {
        self.check_service(&details.service_id)?;

        let mut params = match &details.plan_id {
            Some(plan_id) => self
                .plan(plan_id)?
                .settings
                .plan_settings()
                .to_params()
                .map_err(BrokerError::PlanSettings)?,
            None => Map::new(),
        };
        if let Some(caller) = &details.parameters {
            params.extend(validate_update_params(caller)?);
        }

        info!(
            instance_id = %id,
            plan_id = details.plan_id.as_deref().unwrap_or(""),
            fields = params.len(),
            "updating instance"
        );
        self.creator.update(id, &params).await?;
        Ok(())
    }

    pub async fn deprovision(&self, id: &str) -> BrokerResult<()> {
        info!(instance_id = %id, "deprovisioning instance");
        self.creator.destroy(id).await?;
        Ok(())
    }

    pub fn bind(
        &self,
        id: &str,
        binding_id: &str,
        details: &BindDetails,
    ) -> BrokerResult<BindingCredentials> {
        debug!(instance_id = %id, %binding_id, app_guid = ?details.app_guid, "binding instance");
        Ok(self.binder.bind(id, binding_id)?)
    }

    pub fn unbind(&self, id: &str, binding_id: &str) -> BrokerResult<()> {
        Ok(self.binder.unbind(id, binding_id)?)
    }

    /// Every operation completes before its request returns.
    pub fn last_operation(&self, _id: &str) -> LastOperation {
        LastOperation {
            state: OperationState::Succeeded,
            description: String::new(),
        }
    }

    fn check_service(&self, service_id: &str) -> BrokerResult<()> {
        if service_id == self.config.service_id {
            Ok(())
        } else {
            Err(BrokerError::ServiceDoesNotExist(service_id.to_string()))
        }
    }

    fn plan(&self, plan_id: &str) -> BrokerResult<&ServicePlanConfig> {
        self.config
            .plan(plan_id)
            .ok_or_else(|| BrokerError::PlanDoesNotExist(plan_id.to_string()))
    }
}

/// A non-empty string parameter. Absent, `null` and `""` read as `None`.
fn string_param<'a>(params: &'a Map<String, Value>, key: &str) -> BrokerResult<Option<&'a str>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ParamError::InvalidType(key.to_string()).into()),
    }
}

/// `<name>-<id>`, cut to the longest name the cluster accepts. The limit is
/// in bytes; the cut backs off to the nearest char boundary.
fn database_name(name: &str, id: &str) -> String {
    let mut full = format!("{name}-{id}");
    if full.len() > MAX_DATABASE_NAME_LEN {
        let mut end = MAX_DATABASE_NAME_LEN;
        while !full.is_char_boundary(end) {
            end -= 1;
        }
        full.truncate(end);
    }
    full
}
