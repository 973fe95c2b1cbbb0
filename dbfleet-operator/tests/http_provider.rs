//! HttpProvider tests against a mock provider API served by axum.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get};
use axum::{Json, Router};
use dbfleet_api::deployment::ClusterType;
use dbfleet_operator::observe::{Observed, observe, observe_search_deployment};
use dbfleet_operator::provider::http::{Credentials, HttpProvider};
use dbfleet_operator::provider::types::Cluster;
use dbfleet_operator::provider::{ClusterApi, GlobalClusterApi, SearchApi};
use serde_json::{Value, json};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct MockState {
    /// Authorization headers seen, in order.
    auth: Arc<Mutex<Vec<String>>>,
    /// Query strings of namespace deletions.
    namespace_deletes: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

async fn get_cluster(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path((project, name)): Path<(String, String)>,
) -> (StatusCode, Json<Value>) {
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        state.auth.lock().unwrap().push(auth.to_string());
    }
    if name == "c1" {
        (
            StatusCode::OK,
            Json(json!({
                "id": "cluster-1",
                "name": name,
                "stateName": "IDLE",
                "clusterType": "REPLICASET",
                "mongoDBVersion": "8.0.4",
                "terminationProtectionEnabled": true,
                "replicationSpecs": [{
                    "id": "zone-1",
                    "zoneName": "Zone 1",
                    "regionConfigs": [{
                        "providerName": "AWS",
                        "regionName": "US_EAST_1",
                        "priority": 7,
                        "electableSpecs": {"instanceSize": "M10", "nodeCount": 3}
                    }]
                }],
                "connectionStrings": {"standardSrv": "mongodb+srv://c1.example.net"},
                "tags": {"project": project}
            })),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({
                "errorCode": "CLUSTER_NOT_FOUND",
                "detail": format!("No cluster named {} exists", name)
            })),
        )
    }
}

async fn get_search_deployment() -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "errorCode": "SEARCH_DEPLOYMENT_NOT_FOUND",
            "detail": "no search deployment"
        })),
    )
}

async fn list_search_indexes() -> Json<Value> {
    Json(json!({
        "results": [
            {"indexID": "i1", "name": "idx1", "database": "shop", "collectionName": "orders",
             "type": "search", "status": "READY"}
        ],
        "totalCount": 1
    }))
}

async fn delete_managed_namespace(
    State(state): State<MockState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.namespace_deletes.lock().unwrap().push(params);
    Json(json!({"customZoneMapping": {}, "managedNamespaces": []}))
}

async fn unavailable() -> (StatusCode, Json<Value>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"errorCode": "SERVICE_UNAVAILABLE", "detail": "try later"})),
    )
}

async fn spawn_mock() -> (SocketAddr, MockState) {
    let state = MockState::default();
    let router = Router::new()
        .route(
            "/api/atlas/v2/groups/{project}/clusters/{name}",
            get(get_cluster),
        )
        .route(
            "/api/atlas/v2/groups/{project}/clusters/{name}/search/deployment",
            get(get_search_deployment),
        )
        .route(
            "/api/atlas/v2/groups/{project}/clusters/{name}/search/indexes",
            get(list_search_indexes),
        )
        .route(
            "/api/atlas/v2/groups/{project}/clusters/{name}/globalWrites/managedNamespaces",
            delete(delete_managed_namespace),
        )
        .route(
            "/api/atlas/v2/groups/{project}/clusters/{name}/processArgs",
            get(unavailable),
        )
        .with_state(state.clone());

    let port = portpicker::pick_unused_port().expect("No available port");
    let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
    let listener = TcpListener::bind(addr).await.expect("Failed to bind");
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, state)
}

fn make_provider(addr: SocketAddr) -> HttpProvider {
    HttpProvider::new(
        &format!("http://{}", addr),
        Some(Credentials {
            public_key: "pub".to_string(),
            private_key: "priv".to_string(),
        }),
        Duration::from_secs(5),
    )
    .unwrap()
}

// =============================================================================
// Clusters
// =============================================================================

#[tokio::test]
async fn test_get_cluster_decodes_and_authenticates() {
    let (addr, state) = spawn_mock().await;
    let provider = make_provider(addr);

    let cluster: Cluster = provider.get_cluster("proj-1", "c1").await.unwrap();
    assert_eq!(cluster.id.as_deref(), Some("cluster-1"));
    assert_eq!(cluster.state_name, "IDLE");
    assert_eq!(cluster.tags.get("project").map(String::as_str), Some("proj-1"));

    let auth = state.auth.lock().unwrap().clone();
    assert_eq!(auth.len(), 1);
    assert!(auth[0].starts_with("Basic "));
}

#[tokio::test]
async fn test_get_cluster_decodes_camel_case_fields() {
    let (addr, _) = spawn_mock().await;
    let provider = make_provider(addr);

    let cluster = provider.get_cluster("proj-1", "c1").await.unwrap();
    assert_eq!(cluster.cluster_type, ClusterType::ReplicaSet);
    assert_eq!(cluster.mongodb_version.as_deref(), Some("8.0.4"));
    assert!(cluster.termination_protection_enabled);
    assert_eq!(cluster.zone_names().get("zone-1").map(String::as_str), Some("Zone 1"));

    let region = &cluster.replication_specs[0].region_configs[0];
    assert_eq!(region.region_name, "US_EAST_1");
    assert_eq!(region.electable_specs.as_ref().map(|s| s.node_count), Some(3));
    assert_eq!(
        cluster.connection_strings.and_then(|c| c.standard_srv).as_deref(),
        Some("mongodb+srv://c1.example.net")
    );
}

#[test]
fn test_cluster_encodes_provider_field_names() {
    let cluster = Cluster {
        name: "c1".to_string(),
        state_name: "IDLE".to_string(),
        mongodb_major_version: Some("8.0".to_string()),
        ..Default::default()
    };
    let value = serde_json::to_value(&cluster).unwrap();
    assert_eq!(value["stateName"], "IDLE");
    assert_eq!(value["mongoDBMajorVersion"], "8.0");
    assert_eq!(value["terminationProtectionEnabled"], false);
    assert!(value.get("state_name").is_none());
}

#[tokio::test]
async fn test_missing_cluster_is_absent() {
    let (addr, _) = spawn_mock().await;
    let provider = make_provider(addr);

    let err = provider.get_cluster("proj-1", "gone").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("CLUSTER_NOT_FOUND"));

    let observed = observe(provider.get_cluster("proj-1", "gone").await).unwrap();
    assert!(matches!(observed, Observed::Absent));
}

#[tokio::test]
async fn test_server_errors_are_transient() {
    let (addr, _) = spawn_mock().await;
    let provider = make_provider(addr);

    let err = provider.get_process_args("proj-1", "c1").await.unwrap_err();
    assert!(err.is_transient());
    assert!(!err.is_not_found());
}

#[tokio::test]
async fn test_unreachable_provider_is_transient() {
    let port = portpicker::pick_unused_port().expect("No available port");
    let provider = HttpProvider::new(
        &format!("http://127.0.0.1:{}", port),
        None,
        Duration::from_secs(2),
    )
    .unwrap();

    let err = provider.get_cluster("proj-1", "c1").await.unwrap_err();
    assert!(err.is_transient());
}

// =============================================================================
// Search
// =============================================================================

#[tokio::test]
async fn test_search_deployment_bad_request_is_absent() {
    let (addr, _) = spawn_mock().await;
    let provider = make_provider(addr);

    let result = provider.get_search_deployment("proj-1", "c1").await;
    assert!(result.as_ref().unwrap_err().is_bad_request());
    let observed = observe_search_deployment(result).unwrap();
    assert!(matches!(observed, Observed::Absent));
}

#[tokio::test]
async fn test_list_search_indexes_unwraps_page() {
    let (addr, _) = spawn_mock().await;
    let provider = make_provider(addr);

    let indexes = provider.list_search_indexes("proj-1", "c1").await.unwrap();
    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0].name, "idx1");
    assert_eq!(indexes[0].index_id.as_deref(), Some("i1"));
    assert_eq!(indexes[0].status.as_deref(), Some("READY"));
}

// =============================================================================
// Global writes
// =============================================================================

#[tokio::test]
async fn test_delete_managed_namespace_sends_query() {
    let (addr, state) = spawn_mock().await;
    let provider = make_provider(addr);

    provider
        .delete_managed_namespace("proj-1", "c1", "shop", "orders")
        .await
        .unwrap();

    let deletes = state.namespace_deletes.lock().unwrap().clone();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].get("db").map(String::as_str), Some("shop"));
    assert_eq!(deletes[0].get("collection").map(String::as_str), Some("orders"));
}
