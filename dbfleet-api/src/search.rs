//! Search index configuration record, shared by search-type indexes.

use serde::{Deserialize, Serialize};

use crate::impl_resource;
use crate::meta::ObjectMeta;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIndexConfig {
    pub meta: ObjectMeta,
    pub spec: SearchIndexConfigSpec,
}

impl_resource!(SearchIndexConfig, "SearchIndexConfig");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIndexConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_analyzer: Option<String>,
    #[serde(default)]
    pub analyzers: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_source: Option<serde_json::Value>,
}
