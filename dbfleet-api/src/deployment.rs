//! Deployment record.
//!
//! A deployment spec carries exactly one kind payload. The kind is a closed
//! tag: controllers dispatch on [`DeploymentKind`] rather than on the payload
//! shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::impl_resource;
use crate::meta::{ObjectMeta, ResourceRef};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub meta: ObjectMeta,
    pub spec: DeploymentSpec,
    #[serde(default)]
    pub status: DeploymentStatus,
}

impl_resource!(Deployment, "Deployment");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeploymentKind {
    /// Dedicated or shared-tier cluster.
    Advanced,
    Serverless,
    Flex,
}

impl DeploymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentKind::Advanced => "advanced",
            DeploymentKind::Serverless => "serverless",
            DeploymentKind::Flex => "flex",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    pub project_id: String,
    /// Human-readable project name used for connection secret names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    /// Project is managed outside of this operator; ready deployments are
    /// resynced periodically instead of on project events.
    #[serde(default)]
    pub external_project: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_spec: Option<AdvancedDeploymentSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serverless_spec: Option<ServerlessSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flex_spec: Option<FlexSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_schedule_ref: Option<ResourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_args: Option<ProcessArgs>,
    /// Migrate a shared-tier cluster to a dedicated tier.
    #[serde(default)]
    pub upgrade_to_dedicated: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterType {
    #[default]
    #[serde(rename = "REPLICASET")]
    ReplicaSet,
    Sharded,
    #[serde(rename = "GEOSHARDED")]
    GeoSharded,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedDeploymentSpec {
    pub name: String,
    #[serde(default)]
    pub cluster_type: ClusterType,
    #[serde(rename = "mongoDBMajorVersion", default, skip_serializing_if = "Option::is_none")]
    pub mongodb_major_version: Option<String>,
    #[serde(default)]
    pub backup_enabled: bool,
    #[serde(default)]
    pub termination_protection_enabled: bool,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub replication_specs: Vec<ReplicationSpec>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub search_nodes: Vec<SearchNodeSpec>,
    #[serde(default)]
    pub search_indexes: Vec<SearchIndex>,
    #[serde(default)]
    pub custom_zone_mapping: Vec<CustomZoneMapping>,
    #[serde(default)]
    pub managed_namespaces: Vec<ManagedNamespace>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationSpec {
    /// Provider-assigned zone id; empty until created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_name: Option<String>,
    #[serde(default)]
    pub region_configs: Vec<RegionConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionConfig {
    pub provider_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backing_provider_name: Option<String>,
    pub region_name: String,
    #[serde(default)]
    pub priority: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub electable_specs: Option<HardwareSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareSpec {
    pub instance_size: String,
    #[serde(default)]
    pub node_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchNodeSpec {
    pub instance_size: String,
    pub node_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIndex {
    pub name: String,
    pub database: String,
    pub collection_name: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchIndexSearch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_search: Option<VectorSearch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIndexSearch {
    #[serde(default)]
    pub mappings: serde_json::Value,
    #[serde(default)]
    pub synonyms: Vec<Synonym>,
    pub search_configuration_ref: ResourceRef,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Synonym {
    pub name: String,
    pub analyzer: String,
    pub source_collection: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorSearch {
    #[serde(default)]
    pub fields: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomZoneMapping {
    pub location: String,
    pub zone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedNamespace {
    pub db: String,
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_shard_key: Option<String>,
    #[serde(default)]
    pub is_custom_shard_key_hashed: bool,
    #[serde(default)]
    pub is_shard_key_unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_initial_chunks: Option<u32>,
    #[serde(default)]
    pub presplit_hashed_zones: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessSpec {
    pub name: String,
    pub provider_settings: ServerlessProviderSettings,
    #[serde(default)]
    pub termination_protection_enabled: bool,
    #[serde(default)]
    pub private_endpoints: Vec<ServerlessPrivateEndpoint>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessProviderSettings {
    pub backing_provider_name: String,
    pub provider_name: String,
    pub region_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessPrivateEndpoint {
    /// Client-chosen name, stored as the provider-side comment.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_provider_endpoint_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_endpoint_ip_address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlexSpec {
    pub name: String,
    pub provider_settings: FlexProviderSettings,
    #[serde(default)]
    pub termination_protection_enabled: bool,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlexProviderSettings {
    pub backing_provider_name: String,
    pub region_name: String,
}

/// Advanced process configuration applied to running clusters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_read_concern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_write_concern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_enabled_tls_protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub javascript_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_table_scan: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oplog_size_mb: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    #[serde(default)]
    pub observed_generation: u64,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_name: Option<String>,
    #[serde(rename = "mongoDBVersion", default, skip_serializing_if = "Option::is_none")]
    pub mongodb_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_strings: Option<ConnectionStrings>,
    #[serde(default)]
    pub search_indexes: Vec<SearchIndexStatus>,
    #[serde(default)]
    pub serverless_private_endpoints: Vec<ServerlessPrivateEndpointStatus>,
    /// Location to zone id, as last applied.
    #[serde(default)]
    pub custom_zone_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub managed_namespaces: Vec<ManagedNamespaceStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStrings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_srv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_srv: Option<String>,
    #[serde(default)]
    pub private_endpoints: Vec<PrivateEndpointConnection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateEndpointConnection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srv_connection_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srv_shard_optimized_connection_string: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIndexStatus {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessPrivateEndpointStatus {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedNamespaceStatus {
    pub db: String,
    pub collection: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Deployment {
    /// The closed kind tag. `None` when the spec carries no kind payload.
    pub fn kind(&self) -> Option<DeploymentKind> {
        if self.spec.deployment_spec.is_some() {
            Some(DeploymentKind::Advanced)
        } else if self.spec.serverless_spec.is_some() {
            Some(DeploymentKind::Serverless)
        } else if self.spec.flex_spec.is_some() {
            Some(DeploymentKind::Flex)
        } else {
            None
        }
    }

    /// Provider-side name of the deployment.
    pub fn deployment_name(&self) -> &str {
        if let Some(spec) = &self.spec.deployment_spec {
            &spec.name
        } else if let Some(spec) = &self.spec.serverless_spec {
            &spec.name
        } else if let Some(spec) = &self.spec.flex_spec {
            &spec.name
        } else {
            ""
        }
    }

    pub fn project_name(&self) -> &str {
        self.spec
            .project_name
            .as_deref()
            .unwrap_or(&self.spec.project_id)
    }

    /// Shared-tier clusters are advanced deployments on the TENANT provider.
    pub fn is_tenant(&self) -> bool {
        self.spec.deployment_spec.as_ref().is_some_and(|spec| {
            spec.replication_specs
                .iter()
                .flat_map(|r| r.region_configs.iter())
                .any(|rc| rc.provider_name == "TENANT")
        })
    }

    pub fn termination_protection_enabled(&self) -> bool {
        match self.kind() {
            Some(DeploymentKind::Advanced) => self
                .spec
                .deployment_spec
                .as_ref()
                .is_some_and(|s| s.termination_protection_enabled),
            Some(DeploymentKind::Serverless) => self
                .spec
                .serverless_spec
                .as_ref()
                .is_some_and(|s| s.termination_protection_enabled),
            Some(DeploymentKind::Flex) => self
                .spec
                .flex_spec
                .as_ref()
                .is_some_and(|s| s.termination_protection_enabled),
            None => false,
        }
    }
}
