//! Status conditions.
//!
//! A record carries at most one condition per [`ConditionType`]. Conditions
//! are overwritten in place every pass and removed when the sub-resource they
//! describe is no longer managed.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    Ready,
    DeploymentReady,
    BackupReady,
    SearchIndexesReady,
    SearchNodesReady,
    ZoneMappingReady,
    ManagedNamespacesReady,
    PrivateEndpointReady,
    ValidationSucceeded,
}

impl ConditionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::Ready => "Ready",
            ConditionType::DeploymentReady => "DeploymentReady",
            ConditionType::BackupReady => "BackupReady",
            ConditionType::SearchIndexesReady => "SearchIndexesReady",
            ConditionType::SearchNodesReady => "SearchNodesReady",
            ConditionType::ZoneMappingReady => "ZoneMappingReady",
            ConditionType::ManagedNamespacesReady => "ManagedNamespacesReady",
            ConditionType::PrivateEndpointReady => "PrivateEndpointReady",
            ConditionType::ValidationSucceeded => "ValidationSucceeded",
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of reasons a condition can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reason {
    // General
    Internal,
    FinalizerNotSet,
    FinalizerNotRemoved,
    UnsupportedFeature,
    ProviderUnavailable,
    ReconciliationSkipped,

    // Deployment
    DeploymentNotCreatedInProvider,
    DeploymentNotUpdatedInProvider,
    DeploymentNotDeletedInProvider,
    DeploymentCreating,
    DeploymentUpdating,
    DeploymentConnectionSecretsNotCreated,
    DeploymentAdvancedOptionsNotUpdated,
    DedicatedMigrationProgressing,
    DedicatedMigrationFailed,

    // Backup
    BackupNotConfigured,
    BackupScheduleNotUpdated,

    // Search nodes
    SearchNodesCreating,
    SearchNodesUpdating,
    SearchNodesDeleting,
    SearchNodesNotUpserted,
    SearchNodesNotDeleted,
    SearchNodesOperationAborted,

    // Search indexes
    SearchIndexesNamesNotUnique,
    SearchIndexesNotReady,

    // Global clusters
    ZoneMappingFailed,
    ManagedNamespacesFailed,

    // Serverless private endpoints
    PrivateEndpointInProgress,
    PrivateEndpointFailed,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Internal => "Internal",
            Reason::FinalizerNotSet => "FinalizerNotSet",
            Reason::FinalizerNotRemoved => "FinalizerNotRemoved",
            Reason::UnsupportedFeature => "UnsupportedFeature",
            Reason::ProviderUnavailable => "ProviderUnavailable",
            Reason::ReconciliationSkipped => "ReconciliationSkipped",
            Reason::DeploymentNotCreatedInProvider => "DeploymentNotCreatedInProvider",
            Reason::DeploymentNotUpdatedInProvider => "DeploymentNotUpdatedInProvider",
            Reason::DeploymentNotDeletedInProvider => "DeploymentNotDeletedInProvider",
            Reason::DeploymentCreating => "DeploymentCreating",
            Reason::DeploymentUpdating => "DeploymentUpdating",
            Reason::DeploymentConnectionSecretsNotCreated => {
                "DeploymentConnectionSecretsNotCreated"
            }
            Reason::DeploymentAdvancedOptionsNotUpdated => "DeploymentAdvancedOptionsNotUpdated",
            Reason::DedicatedMigrationProgressing => "DedicatedMigrationProgressing",
            Reason::DedicatedMigrationFailed => "DedicatedMigrationFailed",
            Reason::BackupNotConfigured => "BackupNotConfigured",
            Reason::BackupScheduleNotUpdated => "BackupScheduleNotUpdated",
            Reason::SearchNodesCreating => "SearchNodesCreating",
            Reason::SearchNodesUpdating => "SearchNodesUpdating",
            Reason::SearchNodesDeleting => "SearchNodesDeleting",
            Reason::SearchNodesNotUpserted => "SearchNodesNotUpserted",
            Reason::SearchNodesNotDeleted => "SearchNodesNotDeleted",
            Reason::SearchNodesOperationAborted => "SearchNodesOperationAborted",
            Reason::SearchIndexesNamesNotUnique => "SearchIndexesNamesNotUnique",
            Reason::SearchIndexesNotReady => "SearchIndexesNotReady",
            Reason::ZoneMappingFailed => "ZoneMappingFailed",
            Reason::ManagedNamespacesFailed => "ManagedNamespacesFailed",
            Reason::PrivateEndpointInProgress => "PrivateEndpointInProgress",
            Reason::PrivateEndpointFailed => "PrivateEndpointFailed",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn ready(type_: ConditionType, now: DateTime<Utc>) -> Self {
        Self {
            type_,
            status: true,
            reason: None,
            message: String::new(),
            last_transition_time: now,
        }
    }

    pub fn not_ready(
        type_: ConditionType,
        reason: Reason,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            type_,
            status: false,
            reason: Some(reason),
            message: message.into(),
            last_transition_time: now,
        }
    }
}

pub fn find(conditions: &[Condition], type_: ConditionType) -> Option<&Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Writes `condition`, replacing any existing condition of the same type.
///
/// The transition time of the existing condition is kept when the boolean
/// status does not change.
pub fn set(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
            *existing = condition;
        }
        None => conditions.push(condition),
    }
}

/// Removes the condition of the given type. Returns true if one was removed.
pub fn unset(conditions: &mut Vec<Condition>, type_: ConditionType) -> bool {
    let before = conditions.len();
    conditions.retain(|c| c.type_ != type_);
    before != conditions.len()
}
