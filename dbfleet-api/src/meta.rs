//! Object metadata shared by every stored record.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Finalizer placed on records whose deletion must wait for the operator.
pub const FINALIZER: &str = "dbfleet.io/finalizer";

/// Annotation controlling what happens to provider resources on deletion.
pub const RESOURCE_POLICY_ANNOTATION: &str = "dbfleet.io/resource-policy";
pub const RESOURCE_POLICY_KEEP: &str = "keep";

/// Annotation that pauses reconciliation of a record.
pub const RECONCILIATION_POLICY_ANNOTATION: &str = "dbfleet.io/reconciliation-policy";
pub const RECONCILIATION_POLICY_SKIP: &str = "skip";

/// Identity of a record in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A reference to another record. The namespace defaults to the referrer's.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ResourceRef {
    pub fn key(&self, default_namespace: &str) -> ObjectKey {
        ObjectKey::new(
            self.namespace
                .clone()
                .unwrap_or_else(|| default_namespace.to_string()),
            self.name.clone(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,
    /// Bumped by the store on every successful write.
    #[serde(default)]
    pub resource_version: u64,
    /// Bumped by the store when the spec changes.
    #[serde(default)]
    pub generation: u64,
    #[serde(default)]
    pub finalizers: Vec<String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Adds the finalizer. Returns false if it was already present.
    pub fn set_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.finalizers.push(finalizer.to_string());
        true
    }

    /// Removes the finalizer. Returns false if it was not present.
    pub fn unset_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        before != self.finalizers.len()
    }

    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    pub fn keep_on_delete(&self) -> bool {
        self.annotation(RESOURCE_POLICY_ANNOTATION) == Some(RESOURCE_POLICY_KEEP)
    }

    pub fn skip_reconciliation(&self) -> bool {
        self.annotation(RECONCILIATION_POLICY_ANNOTATION) == Some(RECONCILIATION_POLICY_SKIP)
    }
}

/// A record type that can live in the store.
pub trait Resource: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Kind name, used as the store partition and in events.
    const KIND: &'static str;

    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn key(&self) -> ObjectKey {
        self.meta().key()
    }
}

/// Implements [`Resource`] for a record with a `meta` field.
#[macro_export]
macro_rules! impl_resource {
    ($ty:ty, $kind:literal) => {
        impl $crate::meta::Resource for $ty {
            const KIND: &'static str = $kind;

            fn meta(&self) -> &$crate::meta::ObjectMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut $crate::meta::ObjectMeta {
                &mut self.meta
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalizer_roundtrip() {
        let mut meta = ObjectMeta::new("ns", "a");
        assert!(meta.set_finalizer(FINALIZER));
        assert!(!meta.set_finalizer(FINALIZER));
        assert_eq!(meta.finalizers.len(), 1);
        assert!(meta.unset_finalizer(FINALIZER));
        assert!(!meta.unset_finalizer(FINALIZER));
        assert!(meta.finalizers.is_empty());
    }

    #[test]
    fn test_resource_ref_defaults_namespace() {
        let r = ResourceRef {
            name: "policy".to_string(),
            namespace: None,
        };
        assert_eq!(r.key("team-a"), ObjectKey::new("team-a", "policy"));

        let r = ResourceRef {
            name: "policy".to_string(),
            namespace: Some("shared".to_string()),
        };
        assert_eq!(r.key("team-a").to_string(), "shared/policy");
    }

    #[test]
    fn test_policy_annotations() {
        let mut meta = ObjectMeta::new("ns", "a");
        assert!(!meta.keep_on_delete());
        assert!(!meta.skip_reconciliation());

        meta.annotations
            .insert(RESOURCE_POLICY_ANNOTATION.to_string(), "keep".to_string());
        meta.annotations.insert(
            RECONCILIATION_POLICY_ANNOTATION.to_string(),
            "skip".to_string(),
        );
        assert!(meta.keep_on_delete());
        assert!(meta.skip_reconciliation());
    }
}
