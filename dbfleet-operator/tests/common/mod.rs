//! Shared test utilities for dbfleet-operator integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dbfleet_api::backup::{
    BackupPolicyItem, BackupPolicySpec, BackupPolicyStatus, BackupScheduleSpec, BackupScheduleStatus,
};
use dbfleet_api::deployment::{
    AdvancedDeploymentSpec, ClusterType, ConnectionStrings, DeploymentSpec, DeploymentStatus,
    FlexProviderSettings, FlexSpec, HardwareSpec, RegionConfig, ReplicationSpec,
};
use dbfleet_api::meta::ResourceRef;
use dbfleet_api::search::SearchIndexConfigSpec;
use dbfleet_api::user::{DatabaseUserSpec, DatabaseUserStatus, SecretData};
use dbfleet_api::{
    BackupPolicy, BackupSchedule, Condition, ConditionType, DatabaseUser, Deployment, MemoryStore,
    ObjectKey, ObjectMeta, Resource, SearchIndexConfig, Secret, Store, StoreExt,
};
use dbfleet_operator::events::{EventRecorder, create_event_recorder};
use dbfleet_operator::provider::fake::FakeProvider;
use dbfleet_operator::provider::types::{Cluster, FlexInstance, STATE_IDLE};
use dbfleet_operator::workflow::Requeue;
use dbfleet_operator::{DeploymentReconciler, OperatorConfig};

pub const NAMESPACE: &str = "default";
pub const PROJECT: &str = "proj-1";

/// Store, fake provider and a reconciler wired together.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub provider: Arc<FakeProvider>,
    pub events: Arc<EventRecorder>,
    pub reconciler: DeploymentReconciler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: OperatorConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(FakeProvider::new());
        let events = create_event_recorder();
        let reconciler = DeploymentReconciler::new(
            store.clone(),
            provider.clone(),
            config,
            Arc::clone(&events),
        );
        Self {
            store,
            provider,
            events,
            reconciler,
        }
    }

    /// A second reconciler over the same store and provider, as after a restart.
    pub fn restarted(&self) -> DeploymentReconciler {
        DeploymentReconciler::new(
            self.store.clone(),
            self.provider.clone(),
            test_config(),
            create_event_recorder(),
        )
    }

    pub fn dyn_store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub async fn create<R: Resource>(&self, record: &R) -> R {
        self.store.create(record).await.expect("Failed to create record")
    }

    pub async fn reconcile(&self, name: &str) -> Requeue {
        self.reconciler.reconcile(&key(name)).await
    }

    pub async fn deployment(&self, name: &str) -> Option<Deployment> {
        self.store.get::<Deployment>(&key(name)).await.unwrap()
    }

    pub async fn schedule(&self, name: &str) -> BackupSchedule {
        self.store.fetch::<BackupSchedule>(&key(name)).await.unwrap()
    }

    pub async fn policy(&self, name: &str) -> BackupPolicy {
        self.store.fetch::<BackupPolicy>(&key(name)).await.unwrap()
    }

    /// Requests deletion of a deployment record.
    pub async fn delete_deployment(&self, name: &str) {
        self.store.delete::<Deployment>(&key(name)).await.unwrap();
    }

    /// Adds an annotation to a stored deployment.
    pub async fn annotate(&self, name: &str, annotation: &str, value: &str) {
        let mut d = self.deployment(name).await.expect("deployment exists");
        d.meta
            .annotations
            .insert(annotation.to_string(), value.to_string());
        self.store.update(&d).await.unwrap();
    }
}

pub fn test_config() -> OperatorConfig {
    OperatorConfig {
        default_retry: Duration::from_secs(10),
        pass_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

pub fn key(name: &str) -> ObjectKey {
    ObjectKey::new(NAMESPACE, name)
}

pub fn condition(d: &Deployment, type_: ConditionType) -> Option<&Condition> {
    dbfleet_api::condition::find(&d.status.conditions, type_)
}

// =============================================================================
// Record builders
// =============================================================================

pub fn make_replication_spec(zone_name: Option<&str>) -> ReplicationSpec {
    ReplicationSpec {
        id: None,
        zone_name: zone_name.map(str::to_string),
        region_configs: vec![RegionConfig {
            provider_name: "AWS".to_string(),
            backing_provider_name: None,
            region_name: "US_EAST_1".to_string(),
            priority: 7,
            electable_specs: Some(HardwareSpec {
                instance_size: "M10".to_string(),
                node_count: 3,
            }),
        }],
    }
}

pub fn make_advanced_spec(name: &str) -> AdvancedDeploymentSpec {
    AdvancedDeploymentSpec {
        name: name.to_string(),
        cluster_type: ClusterType::ReplicaSet,
        replication_specs: vec![make_replication_spec(None)],
        ..Default::default()
    }
}

pub fn make_deployment(name: &str, spec: AdvancedDeploymentSpec) -> Deployment {
    Deployment {
        meta: ObjectMeta::new(NAMESPACE, name),
        spec: DeploymentSpec {
            project_id: PROJECT.to_string(),
            deployment_spec: Some(spec),
            ..Default::default()
        },
        status: DeploymentStatus::default(),
    }
}

pub fn make_flex_deployment(name: &str) -> Deployment {
    Deployment {
        meta: ObjectMeta::new(NAMESPACE, name),
        spec: DeploymentSpec {
            project_id: PROJECT.to_string(),
            project_name: Some("Team Project".to_string()),
            flex_spec: Some(FlexSpec {
                name: name.to_string(),
                provider_settings: FlexProviderSettings {
                    backing_provider_name: "AWS".to_string(),
                    region_name: "US_EAST_1".to_string(),
                },
                termination_protection_enabled: false,
                tags: BTreeMap::new(),
            }),
            ..Default::default()
        },
        status: DeploymentStatus::default(),
    }
}

/// The provider's view of an advanced deployment that already converged.
pub fn make_settled_cluster(spec: &AdvancedDeploymentSpec) -> Cluster {
    Cluster {
        id: Some(format!("{}-id", spec.name)),
        name: spec.name.clone(),
        state_name: STATE_IDLE.to_string(),
        cluster_type: spec.cluster_type,
        backup_enabled: spec.backup_enabled,
        termination_protection_enabled: spec.termination_protection_enabled,
        paused: spec.paused,
        replication_specs: spec
            .replication_specs
            .iter()
            .enumerate()
            .map(|(i, r)| ReplicationSpec {
                id: Some(format!("zone-id-{}", i)),
                ..r.clone()
            })
            .collect(),
        tags: spec.tags.clone(),
        mongodb_version: Some("8.0.4".to_string()),
        ..Default::default()
    }
}

pub fn make_settled_flex(name: &str) -> FlexInstance {
    FlexInstance {
        id: Some(format!("{}-id", name)),
        name: name.to_string(),
        state_name: STATE_IDLE.to_string(),
        provider_settings: FlexProviderSettings {
            backing_provider_name: "AWS".to_string(),
            region_name: "US_EAST_1".to_string(),
        },
        mongodb_version: Some("8.0.4".to_string()),
        connection_strings: Some(ConnectionStrings {
            standard: Some("mongodb://h1:27017,h2:27017/?ssl=true".to_string()),
            standard_srv: Some(format!("mongodb+srv://{}.example.net", name)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn make_schedule(name: &str, policy: &str) -> BackupSchedule {
    BackupSchedule {
        meta: ObjectMeta::new(NAMESPACE, name),
        spec: BackupScheduleSpec {
            policy_ref: ResourceRef {
                name: policy.to_string(),
                namespace: None,
            },
            reference_hour_of_day: 3,
            restore_window_days: 2,
            ..Default::default()
        },
        status: BackupScheduleStatus::default(),
    }
}

pub fn make_policy(name: &str) -> BackupPolicy {
    BackupPolicy {
        meta: ObjectMeta::new(NAMESPACE, name),
        spec: BackupPolicySpec {
            items: vec![BackupPolicyItem {
                frequency_type: "daily".to_string(),
                frequency_interval: 1,
                retention_unit: "days".to_string(),
                retention_value: 7,
            }],
        },
        status: BackupPolicyStatus::default(),
    }
}

pub fn make_search_config(name: &str, analyzer: &str) -> SearchIndexConfig {
    SearchIndexConfig {
        meta: ObjectMeta::new(NAMESPACE, name),
        spec: SearchIndexConfigSpec {
            analyzer: Some(analyzer.to_string()),
            ..Default::default()
        },
    }
}

pub fn make_user(name: &str, username: &str, password_secret: &str) -> DatabaseUser {
    DatabaseUser {
        meta: ObjectMeta::new(NAMESPACE, name),
        spec: DatabaseUserSpec {
            project_id: PROJECT.to_string(),
            username: username.to_string(),
            password_secret_ref: ResourceRef {
                name: password_secret.to_string(),
                namespace: None,
            },
            scopes: Vec::new(),
        },
        status: DatabaseUserStatus {
            conditions: vec![Condition::ready(ConditionType::Ready, Utc::now())],
        },
    }
}

pub fn make_password_secret(name: &str, password: &str) -> Secret {
    Secret {
        meta: ObjectMeta::new(NAMESPACE, name),
        spec: SecretData {
            data: BTreeMap::from([("password".to_string(), password.to_string())]),
        },
    }
}
