//! End-to-end broker tests.
//!
//! Drives the full stack (router → broker → lifecycle → cluster client →
//! state file) against a stub cluster API served on an ephemeral port.

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::Json;
use serde_json::{Value, json};
use tower::ServiceExt;

use cfbroker_api::{ServiceBroker, build_router};
use cfbroker_cluster::ClusterClient;
use cfbroker_core::config::{
    AuthConfig, ClusterConfig, ServiceBrokerConfig, ServiceInstanceConfig, ServicePlanConfig,
};
use cfbroker_lifecycle::{DefaultBinder, DefaultCreator};
use cfbroker_state::LocalPersister;

/// `broker:secret`, base64-encoded.
const BROKER_AUTH: &str = "Basic YnJva2VyOnNlY3JldA==";

// ── Stub cluster ───────────────────────────────────────────────

#[derive(Clone, Default)]
struct Cluster {
    requests: Arc<Mutex<Vec<(String, String, Option<Value>)>>>,
}

impl Cluster {
    fn record(&self, method: &str, path: String, body: &Bytes) {
        let body = (!body.is_empty()).then(|| serde_json::from_slice(body).unwrap());
        self.requests
            .lock()
            .unwrap()
            .push((method.to_string(), path, body));
    }

    fn calls(&self, method: &str) -> Vec<(String, Option<Value>)> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _, _)| m == method)
            .map(|(_, path, body)| (path.clone(), body.clone()))
            .collect()
    }
}

fn active_database() -> Value {
    json!({
        "uid": 1,
        "status": "active",
        "authentication_redis_pass": "pass",
        "endpoint_ip": ["10.0.2.4"],
        "dns_address_master": "domain.com:11909",
    })
}

async fn create_db(State(cluster): State<Cluster>, body: Bytes) -> Json<Value> {
    cluster.record("POST", "/v1/bdbs".to_string(), &body);
    Json(active_database())
}

async fn get_db(State(cluster): State<Cluster>, Path(uid): Path<u64>) -> Json<Value> {
    cluster.record("GET", format!("/v1/bdbs/{uid}"), &Bytes::new());
    Json(active_database())
}

async fn update_db(
    State(cluster): State<Cluster>,
    Path(uid): Path<u64>,
    body: Bytes,
) -> Json<Value> {
    cluster.record("PUT", format!("/v1/bdbs/{uid}"), &body);
    Json(json!({ "uid": uid }))
}

async fn delete_db(State(cluster): State<Cluster>, Path(uid): Path<u64>) -> StatusCode {
    cluster.record("DELETE", format!("/v1/bdbs/{uid}"), &Bytes::new());
    StatusCode::OK
}

async fn spawn_cluster(cluster: Cluster) -> String {
    let router = Router::new()
        .route("/v1/bdbs", post(create_db))
        .route("/v1/bdbs/{uid}", get(get_db).put(update_db).delete(delete_db))
        .with_state(cluster);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

// ── Broker harness ─────────────────────────────────────────────

fn plan(id: &str, memory_limit: u64, replication: bool, shard_count: u32) -> ServicePlanConfig {
    ServicePlanConfig {
        id: id.to_string(),
        name: id.to_string(),
        description: String::new(),
        settings: ServiceInstanceConfig {
            memory_limit,
            replication,
            shard_count,
            ..ServiceInstanceConfig::default()
        },
    }
}

struct Harness {
    router: Router,
    cluster: Cluster,
    state_path: std::path::PathBuf,
    _dir: tempfile::TempDir,
}

async fn harness() -> Harness {
    let cluster = Cluster::default();
    let address = spawn_cluster(cluster.clone()).await;

    let client = ClusterClient::new(&ClusterConfig {
        address,
        auth: AuthConfig {
            username: "admin".to_string(),
            password: "admin".to_string(),
        },
        accept_invalid_certs: false,
        poll_interval_ms: 10,
        create_timeout_secs: 5,
        request_timeout_secs: 5,
    })
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("state.json");
    let persister = Arc::new(LocalPersister::new(&state_path));

    let credentials = AuthConfig {
        username: "broker".to_string(),
        password: "secret".to_string(),
    };
    let config = ServiceBrokerConfig {
        auth: credentials.clone(),
        service_id: "test-service".to_string(),
        name: "redislabs".to_string(),
        plans: vec![
            plan("test-plan-1", 200000000, false, 1),
            plan("test-plan-2", 700000000, true, 2),
        ],
        ..ServiceBrokerConfig::default()
    };

    let broker = ServiceBroker::new(
        config,
        Arc::new(DefaultCreator::new(Arc::new(client), persister.clone())),
        Arc::new(DefaultBinder::new(persister)),
    );

    Harness {
        router: build_router(Arc::new(broker), credentials),
        cluster,
        state_path,
        _dir: dir,
    }
}

impl Harness {
    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", BROKER_AUTH);
        let body = match body {
            Some(body) => {
                req = req.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&body).unwrap())
            }
            None => Body::empty(),
        };

        let resp = self.router.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn provision(&self, id: &str) -> (StatusCode, Value) {
        self.send(
            "PUT",
            &format!("/v2/service_instances/{id}"),
            Some(json!({
                "service_id": "test-service",
                "plan_id": "test-plan-1",
                "organization_guid": "org",
                "space_guid": "space",
                "parameters": { "name": "test" },
            })),
        )
        .await
    }

    fn state(&self) -> Value {
        serde_json::from_slice(&std::fs::read(&self.state_path).unwrap()).unwrap()
    }
}

// ── Auth and catalog ───────────────────────────────────────────

#[tokio::test]
async fn requests_without_credentials_are_rejected() {
    let h = harness().await;

    let req = Request::builder()
        .uri("/v2/catalog")
        .body(Body::empty())
        .unwrap();
    let resp = h.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key("www-authenticate"));

    let req = Request::builder()
        .uri("/v2/catalog")
        .header("authorization", "Basic YnJva2VyOndyb25n")
        .body(Body::empty())
        .unwrap();
    let resp = h.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn catalog_lists_plans() {
    let h = harness().await;

    let (status, body) = h.send("GET", "/v2/catalog", None).await;

    assert_eq!(status, StatusCode::OK);
    let service = &body["services"][0];
    assert_eq!(service["id"], "test-service");
    assert_eq!(service["tags"], json!(["redislabs"]));
    assert_eq!(service["plans"][1]["id"], "test-plan-2");
    assert_eq!(service["plan_updateable"], true);
}

// ── Provision ──────────────────────────────────────────────────

#[tokio::test]
async fn provision_stores_cluster_credentials() {
    let h = harness().await;

    let (status, body) = h.provision("some-id").await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    assert_eq!(
        h.state(),
        json!({
            "AvailableInstances": [{
                "ID": "some-id",
                "Credentials": {
                    "UID": 1,
                    "Port": 11909,
                    "IPList": ["10.0.2.4"],
                    "Password": "pass",
                },
            }],
        })
    );

    let creates = h.cluster.calls("POST");
    assert_eq!(creates.len(), 1);
    let sent = creates[0].1.as_ref().unwrap();
    assert_eq!(sent["name"], "test-some-id");
    assert_eq!(sent["memory_size"], 200000000);
    assert_eq!(sent["authentication_redis_pass"].as_str().unwrap().len(), 48);
}

#[tokio::test]
async fn provision_twice_conflicts_without_second_create() {
    let h = harness().await;

    assert_eq!(h.provision("some-id").await.0, StatusCode::CREATED);
    let (status, _) = h.provision("some-id").await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(h.cluster.calls("POST").len(), 1);
}

#[tokio::test]
async fn provision_without_name_is_bad_request() {
    let h = harness().await;

    let (status, body) = h
        .send(
            "PUT",
            "/v2/service_instances/some-id",
            Some(json!({ "service_id": "test-service", "plan_id": "test-plan-1" })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["description"], "database name is required");
    assert!(h.cluster.calls("POST").is_empty());
}

#[tokio::test]
async fn provision_with_malformed_body_is_unprocessable() {
    let h = harness().await;

    let (status, _) = h
        .send(
            "PUT",
            "/v2/service_instances/some-id",
            Some(json!({ "plan_id": "test-plan-1" })),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

// ── Update ─────────────────────────────────────────────────────

#[tokio::test]
async fn update_to_sharded_plan_sends_plan_fields() {
    let h = harness().await;
    h.provision("some-id").await;

    let (status, _) = h
        .send(
            "PATCH",
            "/v2/service_instances/some-id",
            Some(json!({ "service_id": "test-service", "plan_id": "test-plan-2" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let updates = h.cluster.calls("PUT");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, "/v1/bdbs/1");
    let sent = updates[0].1.as_ref().unwrap().as_object().unwrap();
    let mut keys: Vec<&str> = sent.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        vec![
            "implicit_shard_key",
            "memory_size",
            "replication",
            "shard_key_regex",
            "sharding",
            "shards_count",
        ]
    );
    assert_eq!(sent["memory_size"], 700000000);
    assert_eq!(sent["replication"], true);
    assert_eq!(sent["shards_count"], 2);
}

#[tokio::test]
async fn update_params_override_plan() {
    let h = harness().await;
    h.provision("some-id").await;

    let (status, _) = h
        .send(
            "PATCH",
            "/v2/service_instances/some-id",
            Some(json!({
                "service_id": "test-service",
                "plan_id": "test-plan-1",
                "parameters": { "memory_size": 400000000 },
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let updates = h.cluster.calls("PUT");
    assert_eq!(updates[0].1.as_ref().unwrap()["memory_size"], 400000000);
}

#[tokio::test]
async fn update_with_unknown_param_is_rejected() {
    let h = harness().await;
    h.provision("some-id").await;

    let (status, body) = h
        .send(
            "PATCH",
            "/v2/service_instances/some-id",
            Some(json!({
                "service_id": "test-service",
                "parameters": { "unknown": 0 },
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["description"], "unknown property is not supported");
    assert!(h.cluster.calls("PUT").is_empty());
}

#[tokio::test]
async fn update_unknown_instance_is_not_found() {
    let h = harness().await;

    let (status, _) = h
        .send(
            "PATCH",
            "/v2/service_instances/missing",
            Some(json!({ "service_id": "test-service", "plan_id": "test-plan-1" })),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Bind ───────────────────────────────────────────────────────

#[tokio::test]
async fn bind_returns_credentials() {
    let h = harness().await;
    h.provision("some-id").await;

    let (status, body) = h
        .send(
            "PUT",
            "/v2/service_instances/some-id/service_bindings/binding-1",
            Some(json!({ "service_id": "test-service", "plan_id": "test-plan-1", "app_guid": "app" })),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        body,
        json!({ "credentials": { "port": 11909, "ip_list": ["10.0.2.4"], "password": "pass" } })
    );

    let (status, _) = h
        .send(
            "DELETE",
            "/v2/service_instances/some-id/service_bindings/binding-1",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn bind_unknown_instance_is_not_found() {
    let h = harness().await;

    let (status, _) = h
        .send(
            "PUT",
            "/v2/service_instances/missing/service_bindings/binding-1",
            Some(json!({ "service_id": "test-service", "plan_id": "test-plan-1" })),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Deprovision ────────────────────────────────────────────────

#[tokio::test]
async fn deprovision_once_then_gone() {
    let h = harness().await;
    h.provision("some-id").await;
    h.provision("other-id").await;

    let (status, _) = h.send("DELETE", "/v2/service_instances/some-id", None).await;
    assert_eq!(status, StatusCode::OK);

    let state = h.state();
    let instances = state["AvailableInstances"].as_array().unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0]["ID"], "other-id");
    assert_eq!(h.cluster.calls("DELETE").len(), 1);

    let (status, _) = h.send("DELETE", "/v2/service_instances/some-id", None).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(h.cluster.calls("DELETE").len(), 1);
}

#[tokio::test]
async fn deprovision_unknown_instance_makes_no_cluster_call() {
    let h = harness().await;

    let (status, body) = h.send("DELETE", "/v2/service_instances/missing", None).await;

    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body, json!({}));
    assert!(h.cluster.calls("DELETE").is_empty());
}

#[tokio::test]
async fn last_operation_reports_success() {
    let h = harness().await;

    let (status, body) = h
        .send("GET", "/v2/service_instances/any/last_operation", None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "state": "succeeded" }));
}
