//! In-memory provider for tests.
//!
//! Mirrors the provider's observable behaviour closely enough to drive whole
//! reconciliation passes: newly created entities start in a non-idle state,
//! a missing search deployment answers with a bad request, and custom zone
//! mappings can only be dropped all at once. Any call can be made to fail
//! once with [`FakeProvider::fail_next`].

use std::collections::HashMap;

use async_trait::async_trait;
use dbfleet_api::deployment::{CustomZoneMapping, ManagedNamespace, ProcessArgs, SearchNodeSpec};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::error::{ProviderError, Result};
use super::types::{
    BackupSchedule, Cluster, FlexInstance, GeoSharding, SearchDeployment, SearchIndexDefinition,
    ServerlessEndpoint, ServerlessInstance, ENDPOINT_AVAILABLE, ENDPOINT_RESERVED, STATE_CREATING,
    STATE_IDLE, STATE_UPDATING,
};
use super::{BackupApi, ClusterApi, FlexApi, GlobalClusterApi, SearchApi, ServerlessApi};

type Key = (String, String);

fn key(project_id: &str, name: &str) -> Key {
    (project_id.to_string(), name.to_string())
}

/// Process arguments as the provider reports them back: unset options carry
/// their server defaults and the retired read concern is dropped.
fn as_reported(args: &ProcessArgs) -> ProcessArgs {
    ProcessArgs {
        default_read_concern: None,
        default_write_concern: Some(
            args.default_write_concern
                .clone()
                .unwrap_or_else(|| "majority".to_string()),
        ),
        minimum_enabled_tls_protocol: Some(
            args.minimum_enabled_tls_protocol
                .clone()
                .unwrap_or_else(|| "TLS1_2".to_string()),
        ),
        javascript_enabled: Some(args.javascript_enabled.unwrap_or(true)),
        no_table_scan: Some(args.no_table_scan.unwrap_or(false)),
        oplog_size_mb: args.oplog_size_mb,
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Default)]
struct State {
    clusters: HashMap<Key, Cluster>,
    process_args: HashMap<Key, ProcessArgs>,
    serverless: HashMap<Key, ServerlessInstance>,
    endpoints: HashMap<Key, Vec<ServerlessEndpoint>>,
    flex: HashMap<Key, FlexInstance>,
    backup_schedules: HashMap<Key, BackupSchedule>,
    search_deployments: HashMap<Key, SearchDeployment>,
    search_indexes: HashMap<Key, Vec<SearchIndexDefinition>>,
    geo: HashMap<Key, GeoSharding>,
    failures: HashMap<String, ProviderError>,
    calls: Vec<String>,
}

impl State {
    fn enter(&mut self, op: &str) -> Result<()> {
        self.calls.push(op.to_string());
        match self.failures.remove(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Provider backed by process memory.
#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<State>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call to `op` fail with `err`.
    pub async fn fail_next(&self, op: &str, err: ProviderError) {
        self.state.lock().await.failures.insert(op.to_string(), err);
    }

    /// Names of the calls made so far, in order.
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    /// Calls made so far that mutate provider state.
    pub async fn mutations(&self) -> Vec<String> {
        self.calls()
            .await
            .into_iter()
            .filter(|c| !c.starts_with("get_") && !c.starts_with("list_"))
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    pub async fn insert_cluster(&self, project_id: &str, cluster: Cluster) {
        self.state
            .lock()
            .await
            .clusters
            .insert(key(project_id, &cluster.name), cluster);
    }

    pub async fn cluster(&self, project_id: &str, name: &str) -> Option<Cluster> {
        self.state
            .lock()
            .await
            .clusters
            .get(&key(project_id, name))
            .cloned()
    }

    pub async fn set_cluster_state(&self, project_id: &str, name: &str, state_name: &str) {
        if let Some(c) = self
            .state
            .lock()
            .await
            .clusters
            .get_mut(&key(project_id, name))
        {
            c.state_name = state_name.to_string();
        }
    }

    pub async fn process_args(&self, project_id: &str, name: &str) -> Option<ProcessArgs> {
        self.state
            .lock()
            .await
            .process_args
            .get(&key(project_id, name))
            .cloned()
    }

    pub async fn insert_serverless(&self, project_id: &str, instance: ServerlessInstance) {
        self.state
            .lock()
            .await
            .serverless
            .insert(key(project_id, &instance.name), instance);
    }

    pub async fn set_serverless_state(&self, project_id: &str, name: &str, state_name: &str) {
        if let Some(s) = self
            .state
            .lock()
            .await
            .serverless
            .get_mut(&key(project_id, name))
        {
            s.state_name = state_name.to_string();
        }
    }

    pub async fn serverless_endpoints(&self, project_id: &str, name: &str) -> Vec<ServerlessEndpoint> {
        self.state
            .lock()
            .await
            .endpoints
            .get(&key(project_id, name))
            .cloned()
            .unwrap_or_default()
    }

    pub async fn insert_flex(&self, project_id: &str, instance: FlexInstance) {
        self.state
            .lock()
            .await
            .flex
            .insert(key(project_id, &instance.name), instance);
    }

    pub async fn flex(&self, project_id: &str, name: &str) -> Option<FlexInstance> {
        self.state
            .lock()
            .await
            .flex
            .get(&key(project_id, name))
            .cloned()
    }

    pub async fn set_flex_state(&self, project_id: &str, name: &str, state_name: &str) {
        if let Some(f) = self.state.lock().await.flex.get_mut(&key(project_id, name)) {
            f.state_name = state_name.to_string();
        }
    }

    pub async fn insert_backup_schedule(&self, project_id: &str, schedule: BackupSchedule) {
        self.state
            .lock()
            .await
            .backup_schedules
            .insert(key(project_id, &schedule.cluster_name), schedule);
    }

    pub async fn backup_schedule(&self, project_id: &str, cluster: &str) -> Option<BackupSchedule> {
        self.state
            .lock()
            .await
            .backup_schedules
            .get(&key(project_id, cluster))
            .cloned()
    }

    pub async fn insert_search_deployment(
        &self,
        project_id: &str,
        cluster: &str,
        deployment: SearchDeployment,
    ) {
        self.state
            .lock()
            .await
            .search_deployments
            .insert(key(project_id, cluster), deployment);
    }

    pub async fn search_deployment(&self, project_id: &str, cluster: &str) -> Option<SearchDeployment> {
        self.state
            .lock()
            .await
            .search_deployments
            .get(&key(project_id, cluster))
            .cloned()
    }

    pub async fn set_search_state(&self, project_id: &str, cluster: &str, state_name: &str) {
        if let Some(d) = self
            .state
            .lock()
            .await
            .search_deployments
            .get_mut(&key(project_id, cluster))
        {
            d.state_name = state_name.to_string();
        }
    }

    pub async fn insert_search_index(
        &self,
        project_id: &str,
        cluster: &str,
        mut index: SearchIndexDefinition,
    ) {
        if index.index_id.is_none() {
            index.index_id = Some(new_id());
        }
        self.state
            .lock()
            .await
            .search_indexes
            .entry(key(project_id, cluster))
            .or_default()
            .push(index);
    }

    pub async fn search_indexes(&self, project_id: &str, cluster: &str) -> Vec<SearchIndexDefinition> {
        self.state
            .lock()
            .await
            .search_indexes
            .get(&key(project_id, cluster))
            .cloned()
            .unwrap_or_default()
    }

    pub async fn set_index_status(&self, project_id: &str, cluster: &str, name: &str, status: &str) {
        let mut state = self.state.lock().await;
        if let Some(indexes) = state.search_indexes.get_mut(&key(project_id, cluster)) {
            for index in indexes.iter_mut().filter(|i| i.name == name) {
                index.status = Some(status.to_string());
            }
        }
    }

    pub async fn set_geo_sharding(&self, project_id: &str, cluster: &str, geo: GeoSharding) {
        self.state
            .lock()
            .await
            .geo
            .insert(key(project_id, cluster), geo);
    }

    pub async fn geo_sharding(&self, project_id: &str, cluster: &str) -> GeoSharding {
        self.state
            .lock()
            .await
            .geo
            .get(&key(project_id, cluster))
            .cloned()
            .unwrap_or_default()
    }

    pub async fn set_endpoint_status(&self, project_id: &str, instance: &str, comment: &str, status: &str) {
        let mut state = self.state.lock().await;
        if let Some(endpoints) = state.endpoints.get_mut(&key(project_id, instance)) {
            for e in endpoints
                .iter_mut()
                .filter(|e| e.comment.as_deref() == Some(comment))
            {
                e.status = status.to_string();
            }
        }
    }
}

#[async_trait]
impl ClusterApi for FakeProvider {
    async fn get_cluster(&self, project_id: &str, name: &str) -> Result<Cluster> {
        let mut state = self.state.lock().await;
        state.enter("get_cluster")?;
        state
            .clusters
            .get(&key(project_id, name))
            .cloned()
            .ok_or_else(|| ProviderError::not_found(format!("cluster {}", name)))
    }

    async fn create_cluster(&self, project_id: &str, cluster: &Cluster) -> Result<Cluster> {
        let mut state = self.state.lock().await;
        state.enter("create_cluster")?;
        let k = key(project_id, &cluster.name);
        if state.clusters.contains_key(&k) {
            return Err(ProviderError::api(409, "DUPLICATE_CLUSTER_NAME", &cluster.name));
        }
        let mut created = cluster.clone();
        created.id = Some(new_id());
        created.state_name = STATE_CREATING.to_string();
        for spec in created.replication_specs.iter_mut() {
            if spec.id.is_none() {
                spec.id = Some(new_id());
            }
        }
        state.clusters.insert(k, created.clone());
        Ok(created)
    }

    async fn update_cluster(&self, project_id: &str, name: &str, cluster: &Cluster) -> Result<Cluster> {
        let mut state = self.state.lock().await;
        state.enter("update_cluster")?;
        let existing = state
            .clusters
            .get_mut(&key(project_id, name))
            .ok_or_else(|| ProviderError::not_found(format!("cluster {}", name)))?;
        let id = existing.id.clone();
        let connection_strings = existing.connection_strings.clone();
        let mongodb_version = existing.mongodb_version.clone();
        *existing = cluster.clone();
        existing.id = id;
        existing.connection_strings = connection_strings;
        existing.mongodb_version = mongodb_version;
        existing.state_name = STATE_UPDATING.to_string();
        for spec in existing.replication_specs.iter_mut() {
            if spec.id.is_none() {
                spec.id = Some(new_id());
            }
        }
        Ok(existing.clone())
    }

    async fn delete_cluster(&self, project_id: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter("delete_cluster")?;
        state
            .clusters
            .remove(&key(project_id, name))
            .map(|_| ())
            .ok_or_else(|| ProviderError::not_found(format!("cluster {}", name)))
    }

    async fn upgrade_tenant(&self, project_id: &str, cluster: &Cluster) -> Result<Cluster> {
        let mut state = self.state.lock().await;
        state.enter("upgrade_tenant")?;
        let existing = state
            .clusters
            .get_mut(&key(project_id, &cluster.name))
            .ok_or_else(|| ProviderError::not_found(format!("cluster {}", cluster.name)))?;
        let id = existing.id.clone();
        *existing = cluster.clone();
        existing.id = id;
        existing.state_name = STATE_UPDATING.to_string();
        Ok(existing.clone())
    }

    async fn get_process_args(&self, project_id: &str, name: &str) -> Result<ProcessArgs> {
        let mut state = self.state.lock().await;
        state.enter("get_process_args")?;
        Ok(state
            .process_args
            .get(&key(project_id, name))
            .cloned()
            .unwrap_or_else(|| as_reported(&ProcessArgs::default())))
    }

    async fn update_process_args(
        &self,
        project_id: &str,
        name: &str,
        args: &ProcessArgs,
    ) -> Result<ProcessArgs> {
        let mut state = self.state.lock().await;
        state.enter("update_process_args")?;
        let stored = as_reported(args);
        state.process_args.insert(key(project_id, name), stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl ServerlessApi for FakeProvider {
    async fn get_serverless(&self, project_id: &str, name: &str) -> Result<ServerlessInstance> {
        let mut state = self.state.lock().await;
        state.enter("get_serverless")?;
        state
            .serverless
            .get(&key(project_id, name))
            .cloned()
            .ok_or_else(|| ProviderError::not_found(format!("serverless instance {}", name)))
    }

    async fn create_serverless(
        &self,
        project_id: &str,
        instance: &ServerlessInstance,
    ) -> Result<ServerlessInstance> {
        let mut state = self.state.lock().await;
        state.enter("create_serverless")?;
        let mut created = instance.clone();
        created.id = Some(new_id());
        created.state_name = STATE_CREATING.to_string();
        state
            .serverless
            .insert(key(project_id, &instance.name), created.clone());
        Ok(created)
    }

    async fn update_serverless(
        &self,
        project_id: &str,
        name: &str,
        instance: &ServerlessInstance,
    ) -> Result<ServerlessInstance> {
        let mut state = self.state.lock().await;
        state.enter("update_serverless")?;
        let existing = state
            .serverless
            .get_mut(&key(project_id, name))
            .ok_or_else(|| ProviderError::not_found(format!("serverless instance {}", name)))?;
        existing.termination_protection_enabled = instance.termination_protection_enabled;
        existing.tags = instance.tags.clone();
        existing.state_name = STATE_UPDATING.to_string();
        Ok(existing.clone())
    }

    async fn delete_serverless(&self, project_id: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter("delete_serverless")?;
        state
            .serverless
            .remove(&key(project_id, name))
            .map(|_| ())
            .ok_or_else(|| ProviderError::not_found(format!("serverless instance {}", name)))
    }

    async fn list_serverless_endpoints(
        &self,
        project_id: &str,
        instance: &str,
    ) -> Result<Vec<ServerlessEndpoint>> {
        let mut state = self.state.lock().await;
        state.enter("list_serverless_endpoints")?;
        Ok(state
            .endpoints
            .get(&key(project_id, instance))
            .cloned()
            .unwrap_or_default())
    }

    async fn create_serverless_endpoint(
        &self,
        project_id: &str,
        instance: &str,
        comment: &str,
    ) -> Result<ServerlessEndpoint> {
        let mut state = self.state.lock().await;
        state.enter("create_serverless_endpoint")?;
        let provider_name = state
            .serverless
            .get(&key(project_id, instance))
            .map(|s| s.provider_settings.backing_provider_name.clone());
        let endpoint = ServerlessEndpoint {
            id: new_id(),
            comment: Some(comment.to_string()),
            status: ENDPOINT_RESERVED.to_string(),
            provider_name,
            endpoint_service_name: Some(format!("svc-{}", comment)),
            ..Default::default()
        };
        state
            .endpoints
            .entry(key(project_id, instance))
            .or_default()
            .push(endpoint.clone());
        Ok(endpoint)
    }

    async fn update_serverless_endpoint(
        &self,
        project_id: &str,
        instance: &str,
        endpoint: &ServerlessEndpoint,
    ) -> Result<ServerlessEndpoint> {
        let mut state = self.state.lock().await;
        state.enter("update_serverless_endpoint")?;
        let existing = state
            .endpoints
            .get_mut(&key(project_id, instance))
            .and_then(|list| list.iter_mut().find(|e| e.id == endpoint.id))
            .ok_or_else(|| ProviderError::not_found(format!("endpoint {}", endpoint.id)))?;
        existing.cloud_provider_endpoint_id = endpoint.cloud_provider_endpoint_id.clone();
        existing.private_endpoint_ip_address = endpoint.private_endpoint_ip_address.clone();
        existing.status = ENDPOINT_AVAILABLE.to_string();
        Ok(existing.clone())
    }

    async fn delete_serverless_endpoint(
        &self,
        project_id: &str,
        instance: &str,
        endpoint_id: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter("delete_serverless_endpoint")?;
        if let Some(list) = state.endpoints.get_mut(&key(project_id, instance)) {
            list.retain(|e| e.id != endpoint_id);
        }
        Ok(())
    }
}

#[async_trait]
impl FlexApi for FakeProvider {
    async fn get_flex(&self, project_id: &str, name: &str) -> Result<FlexInstance> {
        let mut state = self.state.lock().await;
        state.enter("get_flex")?;
        state
            .flex
            .get(&key(project_id, name))
            .cloned()
            .ok_or_else(|| ProviderError::not_found(format!("flex cluster {}", name)))
    }

    async fn create_flex(&self, project_id: &str, instance: &FlexInstance) -> Result<FlexInstance> {
        let mut state = self.state.lock().await;
        state.enter("create_flex")?;
        let mut created = instance.clone();
        created.id = Some(new_id());
        created.state_name = STATE_CREATING.to_string();
        state
            .flex
            .insert(key(project_id, &instance.name), created.clone());
        Ok(created)
    }

    async fn update_flex(
        &self,
        project_id: &str,
        name: &str,
        instance: &FlexInstance,
    ) -> Result<FlexInstance> {
        let mut state = self.state.lock().await;
        state.enter("update_flex")?;
        let existing = state
            .flex
            .get_mut(&key(project_id, name))
            .ok_or_else(|| ProviderError::not_found(format!("flex cluster {}", name)))?;
        existing.termination_protection_enabled = instance.termination_protection_enabled;
        existing.tags = instance.tags.clone();
        existing.state_name = STATE_UPDATING.to_string();
        Ok(existing.clone())
    }

    async fn delete_flex(&self, project_id: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter("delete_flex")?;
        state
            .flex
            .remove(&key(project_id, name))
            .map(|_| ())
            .ok_or_else(|| ProviderError::not_found(format!("flex cluster {}", name)))
    }
}

#[async_trait]
impl BackupApi for FakeProvider {
    async fn get_backup_schedule(&self, project_id: &str, cluster: &str) -> Result<BackupSchedule> {
        let mut state = self.state.lock().await;
        state.enter("get_backup_schedule")?;
        state
            .backup_schedules
            .get(&key(project_id, cluster))
            .cloned()
            .ok_or_else(|| ProviderError::not_found(format!("backup schedule of {}", cluster)))
    }

    async fn update_backup_schedule(
        &self,
        project_id: &str,
        cluster: &str,
        schedule: &BackupSchedule,
    ) -> Result<BackupSchedule> {
        let mut state = self.state.lock().await;
        state.enter("update_backup_schedule")?;
        let mut stored = schedule.clone();
        for policy in stored.policies.iter_mut() {
            for item in policy.policy_items.iter_mut() {
                if item.id.is_none() {
                    item.id = Some(new_id());
                }
            }
        }
        state
            .backup_schedules
            .insert(key(project_id, cluster), stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl SearchApi for FakeProvider {
    async fn get_search_deployment(&self, project_id: &str, cluster: &str) -> Result<SearchDeployment> {
        let mut state = self.state.lock().await;
        state.enter("get_search_deployment")?;
        // the real endpoint answers 400 rather than 404 when nothing is configured
        state
            .search_deployments
            .get(&key(project_id, cluster))
            .cloned()
            .ok_or_else(|| {
                ProviderError::api(400, "SEARCH_DEPLOYMENT_NOT_FOUND", "no search deployment")
            })
    }

    async fn create_search_deployment(
        &self,
        project_id: &str,
        cluster: &str,
        specs: &[SearchNodeSpec],
    ) -> Result<SearchDeployment> {
        let mut state = self.state.lock().await;
        state.enter("create_search_deployment")?;
        let deployment = SearchDeployment {
            id: Some(new_id()),
            state_name: STATE_UPDATING.to_string(),
            specs: specs.to_vec(),
        };
        state
            .search_deployments
            .insert(key(project_id, cluster), deployment.clone());
        Ok(deployment)
    }

    async fn update_search_deployment(
        &self,
        project_id: &str,
        cluster: &str,
        specs: &[SearchNodeSpec],
    ) -> Result<SearchDeployment> {
        let mut state = self.state.lock().await;
        state.enter("update_search_deployment")?;
        let existing = state
            .search_deployments
            .get_mut(&key(project_id, cluster))
            .ok_or_else(|| ProviderError::not_found(format!("search deployment of {}", cluster)))?;
        existing.specs = specs.to_vec();
        existing.state_name = STATE_UPDATING.to_string();
        Ok(existing.clone())
    }

    async fn delete_search_deployment(&self, project_id: &str, cluster: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter("delete_search_deployment")?;
        state.search_deployments.remove(&key(project_id, cluster));
        Ok(())
    }

    async fn list_search_indexes(
        &self,
        project_id: &str,
        cluster: &str,
    ) -> Result<Vec<SearchIndexDefinition>> {
        let mut state = self.state.lock().await;
        state.enter("list_search_indexes")?;
        Ok(state
            .search_indexes
            .get(&key(project_id, cluster))
            .cloned()
            .unwrap_or_default())
    }

    async fn create_search_index(
        &self,
        project_id: &str,
        cluster: &str,
        index: &SearchIndexDefinition,
    ) -> Result<SearchIndexDefinition> {
        let mut state = self.state.lock().await;
        state.enter("create_search_index")?;
        let mut created = index.clone();
        created.index_id = Some(new_id());
        created.status = Some("NOT STARTED".to_string());
        state
            .search_indexes
            .entry(key(project_id, cluster))
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn update_search_index(
        &self,
        project_id: &str,
        cluster: &str,
        index_id: &str,
        index: &SearchIndexDefinition,
    ) -> Result<SearchIndexDefinition> {
        let mut state = self.state.lock().await;
        state.enter("update_search_index")?;
        let existing = state
            .search_indexes
            .get_mut(&key(project_id, cluster))
            .and_then(|list| {
                list.iter_mut()
                    .find(|i| i.index_id.as_deref() == Some(index_id))
            })
            .ok_or_else(|| ProviderError::not_found(format!("search index {}", index_id)))?;
        *existing = index.clone();
        existing.index_id = Some(index_id.to_string());
        existing.status = Some("IN_PROGRESS".to_string());
        Ok(existing.clone())
    }

    async fn delete_search_index(&self, project_id: &str, cluster: &str, index_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter("delete_search_index")?;
        if let Some(list) = state.search_indexes.get_mut(&key(project_id, cluster)) {
            list.retain(|i| i.index_id.as_deref() != Some(index_id));
        }
        Ok(())
    }
}

#[async_trait]
impl GlobalClusterApi for FakeProvider {
    async fn get_geo_sharding(&self, project_id: &str, cluster: &str) -> Result<GeoSharding> {
        let mut state = self.state.lock().await;
        state.enter("get_geo_sharding")?;
        Ok(state
            .geo
            .get(&key(project_id, cluster))
            .cloned()
            .unwrap_or_default())
    }

    async fn create_custom_zone_mappings(
        &self,
        project_id: &str,
        cluster: &str,
        mappings: &[CustomZoneMapping],
    ) -> Result<GeoSharding> {
        let mut state = self.state.lock().await;
        state.enter("create_custom_zone_mappings")?;
        let zones = state
            .clusters
            .get(&key(project_id, cluster))
            .map(|c| c.zone_names())
            .unwrap_or_default();
        let mut resolved = Vec::with_capacity(mappings.len());
        for m in mappings {
            let zone_id = zones
                .iter()
                .find(|(_, name)| **name == m.zone)
                .map(|(id, _)| id.clone())
                .ok_or_else(|| {
                    ProviderError::api(400, "INVALID_ZONE", format!("unknown zone {}", m.zone))
                })?;
            resolved.push((m.location.clone(), zone_id));
        }
        let geo = state.geo.entry(key(project_id, cluster)).or_default();
        geo.custom_zone_mapping.extend(resolved);
        Ok(geo.clone())
    }

    async fn delete_custom_zone_mappings(&self, project_id: &str, cluster: &str) -> Result<GeoSharding> {
        let mut state = self.state.lock().await;
        state.enter("delete_custom_zone_mappings")?;
        let geo = state.geo.entry(key(project_id, cluster)).or_default();
        geo.custom_zone_mapping.clear();
        Ok(geo.clone())
    }

    async fn create_managed_namespace(
        &self,
        project_id: &str,
        cluster: &str,
        namespace: &ManagedNamespace,
    ) -> Result<GeoSharding> {
        let mut state = self.state.lock().await;
        state.enter("create_managed_namespace")?;
        let geo = state.geo.entry(key(project_id, cluster)).or_default();
        geo.managed_namespaces.push(namespace.clone());
        Ok(geo.clone())
    }

    async fn delete_managed_namespace(
        &self,
        project_id: &str,
        cluster: &str,
        db: &str,
        collection: &str,
    ) -> Result<GeoSharding> {
        let mut state = self.state.lock().await;
        state.enter("delete_managed_namespace")?;
        let geo = state.geo.entry(key(project_id, cluster)).or_default();
        geo.managed_namespaces
            .retain(|ns| !(ns.db == db && ns.collection == collection));
        Ok(geo.clone())
    }
}

/// Marks every entity the fake knows about as settled.
impl FakeProvider {
    pub async fn settle_all(&self) {
        let mut state = self.state.lock().await;
        for c in state.clusters.values_mut() {
            c.state_name = STATE_IDLE.to_string();
        }
        for s in state.serverless.values_mut() {
            s.state_name = STATE_IDLE.to_string();
        }
        for f in state.flex.values_mut() {
            f.state_name = STATE_IDLE.to_string();
        }
        for d in state.search_deployments.values_mut() {
            d.state_name = STATE_IDLE.to_string();
        }
        for list in state.search_indexes.values_mut() {
            for i in list.iter_mut() {
                i.status = Some("READY".to_string());
            }
        }
    }
}
