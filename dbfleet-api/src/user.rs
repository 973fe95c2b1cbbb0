//! Database users and the secrets connection details are projected into.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::condition::{self, Condition, ConditionType};
use crate::impl_resource;
use crate::meta::{ObjectMeta, ResourceRef};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseUser {
    pub meta: ObjectMeta,
    pub spec: DatabaseUserSpec,
    #[serde(default)]
    pub status: DatabaseUserStatus,
}

impl_resource!(DatabaseUser, "DatabaseUser");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseUserSpec {
    pub project_id: String,
    pub username: String,
    pub password_secret_ref: ResourceRef,
    /// Deployments this user may connect to. Empty means all.
    #[serde(default)]
    pub scopes: Vec<UserScope>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserScope {
    pub name: String,
    #[serde(rename = "type", default = "default_scope_type")]
    pub type_: String,
}

fn default_scope_type() -> String {
    "CLUSTER".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseUserStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl DatabaseUser {
    pub fn is_ready(&self) -> bool {
        condition::find(&self.status.conditions, ConditionType::Ready).is_some_and(|c| c.status)
    }

    /// A user is granted a deployment when it has no scopes or one names it.
    pub fn grants(&self, deployment_name: &str) -> bool {
        self.spec.scopes.is_empty() || self.spec.scopes.iter().any(|s| s.name == deployment_name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub meta: ObjectMeta,
    #[serde(default)]
    pub spec: SecretData,
}

impl_resource!(Secret, "Secret");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretData {
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Secret {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.spec.data.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_user(scopes: &[&str]) -> DatabaseUser {
        DatabaseUser {
            meta: ObjectMeta::new("default", "app"),
            spec: DatabaseUserSpec {
                project_id: "proj-1".to_string(),
                username: "app".to_string(),
                password_secret_ref: ResourceRef {
                    name: "app-password".to_string(),
                    namespace: None,
                },
                scopes: scopes
                    .iter()
                    .map(|s| UserScope {
                        name: s.to_string(),
                        type_: default_scope_type(),
                    })
                    .collect(),
            },
            status: DatabaseUserStatus::default(),
        }
    }

    #[test]
    fn test_unscoped_user_grants_everything() {
        assert!(make_user(&[]).grants("any"));
    }

    #[test]
    fn test_scoped_user_grants_listed_only() {
        let user = make_user(&["c1", "c2"]);
        assert!(user.grants("c2"));
        assert!(!user.grants("c3"));
    }

    #[test]
    fn test_readiness_follows_condition() {
        let mut user = make_user(&[]);
        assert!(!user.is_ready());
        user.status
            .conditions
            .push(Condition::ready(ConditionType::Ready, chrono::Utc::now()));
        assert!(user.is_ready());
    }
}
