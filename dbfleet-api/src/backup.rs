//! Backup schedule and policy records.
//!
//! Both are shared records: one policy may be used by many schedules and one
//! schedule by many deployments. Their status lists the dependents currently
//! attached; the operator keeps the finalizer in step with that list.

use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::impl_resource;
use crate::meta::{ObjectMeta, ResourceRef};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSchedule {
    pub meta: ObjectMeta,
    pub spec: BackupScheduleSpec,
    #[serde(default)]
    pub status: BackupScheduleStatus,
}

impl_resource!(BackupSchedule, "BackupSchedule");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupScheduleSpec {
    pub policy_ref: ResourceRef,
    #[serde(default)]
    pub reference_hour_of_day: u32,
    #[serde(default)]
    pub reference_minute_of_hour: u32,
    #[serde(default = "default_restore_window_days")]
    pub restore_window_days: u32,
    #[serde(default)]
    pub auto_export_enabled: bool,
    #[serde(default)]
    pub use_org_and_group_names_in_export_prefix: bool,
    #[serde(default)]
    pub copy_settings: Vec<CopySetting>,
}

fn default_restore_window_days() -> u32 {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopySetting {
    pub cloud_provider: String,
    pub region_name: String,
    #[serde(default)]
    pub should_copy_oplogs: bool,
    #[serde(default)]
    pub frequencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupScheduleStatus {
    /// Provider-side names of the deployments using this schedule.
    #[serde(default)]
    pub deployment_ids: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPolicy {
    pub meta: ObjectMeta,
    pub spec: BackupPolicySpec,
    #[serde(default)]
    pub status: BackupPolicyStatus,
}

impl_resource!(BackupPolicy, "BackupPolicy");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPolicySpec {
    pub items: Vec<BackupPolicyItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPolicyItem {
    pub frequency_type: String,
    pub frequency_interval: u32,
    pub retention_unit: String,
    pub retention_value: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPolicyStatus {
    /// `namespace/name` keys of the schedules using this policy.
    #[serde(default)]
    pub backup_schedule_ids: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
