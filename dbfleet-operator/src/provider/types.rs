//! Provider-side representations of managed entities.

use std::collections::BTreeMap;

use dbfleet_api::deployment::{
    ClusterType, ConnectionStrings, CustomZoneMapping, FlexProviderSettings, ManagedNamespace,
    ReplicationSpec, SearchNodeSpec, ServerlessProviderSettings, Synonym,
};
use serde::{Deserialize, Serialize};

pub const STATE_IDLE: &str = "IDLE";
pub const STATE_CREATING: &str = "CREATING";
pub const STATE_UPDATING: &str = "UPDATING";
pub const STATE_REPAIRING: &str = "REPAIRING";
pub const STATE_DELETING: &str = "DELETING";
pub const STATE_DELETED: &str = "DELETED";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub state_name: String,
    #[serde(default)]
    pub cluster_type: ClusterType,
    #[serde(rename = "mongoDBMajorVersion", default, skip_serializing_if = "Option::is_none")]
    pub mongodb_major_version: Option<String>,
    #[serde(rename = "mongoDBVersion", default, skip_serializing_if = "Option::is_none")]
    pub mongodb_version: Option<String>,
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_strings: Option<ConnectionStrings>,
}

impl Cluster {
    pub fn is_tenant(&self) -> bool {
        self.replication_specs
            .iter()
            .flat_map(|r| r.region_configs.iter())
            .any(|rc| rc.provider_name == "TENANT")
    }

    /// Provider zone id to zone name, from the replication specs.
    pub fn zone_names(&self) -> BTreeMap<String, String> {
        self.replication_specs
            .iter()
            .filter_map(|r| Some((r.id.clone()?, r.zone_name.clone()?)))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessInstance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub state_name: String,
    pub provider_settings: ServerlessProviderSettings,
    #[serde(default)]
    pub termination_protection_enabled: bool,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(rename = "mongoDBVersion", default, skip_serializing_if = "Option::is_none")]
    pub mongodb_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_strings: Option<ConnectionStrings>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlexInstance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub state_name: String,
    pub provider_settings: FlexProviderSettings,
    #[serde(default)]
    pub termination_protection_enabled: bool,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(rename = "mongoDBVersion", default, skip_serializing_if = "Option::is_none")]
    pub mongodb_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_strings: Option<ConnectionStrings>,
}

pub const ENDPOINT_RESERVED: &str = "RESERVED";
pub const ENDPOINT_AVAILABLE: &str = "AVAILABLE";
pub const ENDPOINT_DELETING: &str = "DELETING";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessEndpoint {
    pub id: String,
    /// Carries the client-chosen endpoint name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_provider_endpoint_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_endpoint_ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDeployment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub state_name: String,
    #[serde(default)]
    pub specs: Vec<SearchNodeSpec>,
}

pub const INDEX_READY: &str = "READY";
pub const INDEX_FAILED: &str = "FAILED";

/// A search index as the provider stores it. Analyzer settings of search-type
/// indexes are inlined from the referenced configuration record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIndexDefinition {
    #[serde(rename = "indexID", default, skip_serializing_if = "Option::is_none")]
    pub index_id: Option<String>,
    pub name: String,
    pub database: String,
    pub collection_name: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_analyzer: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub analyzers: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_source: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mappings: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<Synonym>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSchedule {
    pub cluster_name: String,
    #[serde(default)]
    pub reference_hour_of_day: u32,
    #[serde(default)]
    pub reference_minute_of_hour: u32,
    #[serde(default)]
    pub restore_window_days: u32,
    #[serde(default)]
    pub auto_export_enabled: bool,
    #[serde(default)]
    pub use_org_and_group_names_in_export_prefix: bool,
    #[serde(default)]
    pub copy_settings: Vec<BackupCopySetting>,
    #[serde(default)]
    pub policies: Vec<BackupPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_snapshot: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupCopySetting {
    pub cloud_provider: String,
    pub region_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,
    #[serde(default)]
    pub should_copy_oplogs: bool,
    #[serde(default)]
    pub frequencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub policy_items: Vec<BackupPolicyItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPolicyItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub frequency_type: String,
    pub frequency_interval: u32,
    pub retention_unit: String,
    pub retention_value: u32,
}

/// Global-write configuration of a geo-sharded cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoSharding {
    /// Location code to provider zone id.
    #[serde(default)]
    pub custom_zone_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub managed_namespaces: Vec<ManagedNamespace>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomZoneMappingRequest {
    pub custom_zone_mappings: Vec<CustomZoneMapping>,
}
