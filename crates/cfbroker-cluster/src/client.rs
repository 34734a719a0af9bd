//! Cluster management API client.
//!
//! All requests use HTTP basic auth. The HTTP client is built once per
//! [`ClusterClient`] from the cluster configuration (TLS policy, timeouts)
//! and reused for every call.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use cfbroker_core::config::ClusterConfig;
use cfbroker_core::{BoxFuture, InstanceCredentials, InstanceSettings};

use crate::error::{ClusterError, ClusterResult};
use crate::poll::{Clock, TokioClock, poll_until_active};

const DATABASES_PATH: &str = "/v1/bdbs";

/// Operations the broker performs against the cluster.
pub trait ClusterApi: Send + Sync {
    /// Create a database and wait until the cluster reports it active.
    fn create_database<'a>(
        &'a self,
        settings: &'a InstanceSettings,
    ) -> BoxFuture<'a, ClusterResult<InstanceCredentials>>;

    /// Apply a partial settings update to an existing database.
    fn update_database<'a>(
        &'a self,
        uid: u64,
        params: &'a Map<String, Value>,
    ) -> BoxFuture<'a, ClusterResult<()>>;

    fn delete_database(&self, uid: u64) -> BoxFuture<'_, ClusterResult<()>>;
}

/// Database document as reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseStatus {
    pub uid: u64,
    #[serde(default)]
    pub status: String,
    #[serde(
        default,
        rename = "authentication_redis_pass",
        alias = "authentication_admin_pass"
    )]
    pub password: String,
    #[serde(default, rename = "endpoint_ip")]
    pub ip_list: Vec<String>,
    /// `host:port` of the master endpoint.
    #[serde(default, rename = "dns_address_master")]
    pub dns_address: String,
}

impl DatabaseStatus {
    pub fn into_credentials(self) -> ClusterResult<InstanceCredentials> {
        let port = parse_port(&self.dns_address)?;
        Ok(InstanceCredentials {
            uid: self.uid,
            port,
            ip_list: self.ip_list,
            password: self.password,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    description: String,
    #[serde(default)]
    error_code: Option<String>,
}

/// Extract the port from a `host:port` address.
pub fn parse_port(address: &str) -> ClusterResult<u16> {
    let malformed = || ClusterError::MalformedAddress(address.to_string());
    let mut parts = address.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_host), Some(port), None) => port.trim().parse().map_err(|_| malformed()),
        _ => Err(malformed()),
    }
}

/// Build the error for a non-success response, preferring the cluster's
/// own description.
fn rejection(status: u16, body: &str) -> ClusterError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let description = if parsed.description.is_empty() {
        if body.trim().is_empty() {
            format!("cluster responded with status {status}")
        } else {
            body.trim().to_string()
        }
    } else {
        parsed.description
    };
    ClusterError::Rejected {
        status,
        description,
        error_code: parsed.error_code,
    }
}

/// reqwest-backed [`ClusterApi`] implementation.
pub struct ClusterClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    poll_interval: Duration,
    create_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl ClusterClient {
    pub fn new(config: &ClusterConfig) -> ClusterResult<Self> {
        if config.accept_invalid_certs {
            warn!(address = %config.address, "TLS certificate verification disabled for cluster API");
        }
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .connect_timeout(Duration::from_secs(30))
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ClusterError::Client(e.to_string()))?;

        info!(address = %config.address, "cluster client created");
        Ok(Self {
            http,
            base_url: config.address.trim_end_matches('/').to_string(),
            username: config.auth.username.clone(),
            password: config.auth.password.clone(),
            poll_interval: config.poll_interval(),
            create_timeout: config.create_timeout(),
            clock: Arc::new(TokioClock::new()),
        })
    }

    /// Replace the clock used while polling new databases.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> ClusterResult<reqwest::Response> {
        let url = self.url(path);
        debug!(%method, %url, "cluster request");

        let mut request = self
            .http
            .request(method, &url)
            .basic_auth(&self.username, Some(&self.password));
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = request.send().await.map_err(|e| ClusterError::Request {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let err = rejection(status.as_u16(), &body);
        warn!(%url, status = status.as_u16(), error = %err, "cluster rejected request");
        Err(err)
    }

    async fn decode_status(response: reqwest::Response) -> ClusterResult<DatabaseStatus> {
        response
            .json::<DatabaseStatus>()
            .await
            .map_err(|e| ClusterError::Decode(e.to_string()))
    }

    async fn fetch_status(&self, uid: u64) -> ClusterResult<DatabaseStatus> {
        let path = format!("{DATABASES_PATH}/{uid}");
        let response = self.execute(Method::GET, &path, None).await?;
        Self::decode_status(response).await
    }

    async fn create(&self, settings: &InstanceSettings) -> ClusterResult<InstanceCredentials> {
        let body = serde_json::to_vec(settings).map_err(|e| ClusterError::Encode(e.to_string()))?;
        info!(
            name = %settings.name,
            memory_size = settings.plan.memory_size,
            shards = settings.plan.shards_count,
            "requesting database creation"
        );
        let response = self.execute(Method::POST, DATABASES_PATH, Some(body)).await?;
        let created = Self::decode_status(response).await?;
        let uid = created.uid;
        info!(uid, status = %created.status, "database creation scheduled");

        let active = poll_until_active(
            created,
            || self.fetch_status(uid),
            self.clock.as_ref(),
            self.poll_interval,
            self.create_timeout,
        )
        .await?;
        let credentials = active.into_credentials()?;
        info!(uid, port = credentials.port, "database is ready");
        Ok(credentials)
    }

    async fn update(&self, uid: u64, params: &Map<String, Value>) -> ClusterResult<()> {
        let body = serde_json::to_vec(params).map_err(|e| ClusterError::Encode(e.to_string()))?;
        let path = format!("{DATABASES_PATH}/{uid}");
        let fields: Vec<&str> = params.keys().map(String::as_str).collect();
        info!(uid, ?fields, "requesting database update");
        self.execute(Method::PUT, &path, Some(body)).await?;
        Ok(())
    }

    async fn delete(&self, uid: u64) -> ClusterResult<()> {
        let path = format!("{DATABASES_PATH}/{uid}");
        info!(uid, "requesting database deletion");
        self.execute(Method::DELETE, &path, None).await?;
        Ok(())
    }
}

impl ClusterApi for ClusterClient {
    fn create_database<'a>(
        &'a self,
        settings: &'a InstanceSettings,
    ) -> BoxFuture<'a, ClusterResult<InstanceCredentials>> {
        Box::pin(self.create(settings))
    }

    fn update_database<'a>(
        &'a self,
        uid: u64,
        params: &'a Map<String, Value>,
    ) -> BoxFuture<'a, ClusterResult<()>> {
        Box::pin(self.update(uid, params))
    }

    fn delete_database(&self, uid: u64) -> BoxFuture<'_, ClusterResult<()>> {
        Box::pin(self.delete(uid))
    }
}
