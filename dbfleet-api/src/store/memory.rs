//! In-memory store backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use super::error::{Result, StoreError};
use super::event::Event;
use super::traits::{RawObject, Store};
use crate::meta::{ObjectKey, ObjectMeta};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Default)]
struct Inner {
    /// Monotonic resource version source shared by all kinds.
    revision: u64,
    records: BTreeMap<(String, ObjectKey), RawObject>,
}

impl Inner {
    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }
}

/// A store that keeps every record in process memory.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    events: broadcast::Sender<Event>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: RwLock::new(Inner::default()),
            events,
        }
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

fn read_meta(object: &RawObject) -> Result<ObjectMeta> {
    let meta = object
        .get("meta")
        .cloned()
        .ok_or_else(|| StoreError::Internal("record has no meta".to_string()))?;
    Ok(serde_json::from_value(meta)?)
}

fn write_meta(object: &mut RawObject, meta: &ObjectMeta) -> Result<()> {
    let value = serde_json::to_value(meta)?;
    match object.as_object_mut() {
        Some(map) => {
            map.insert("meta".to_string(), value);
            Ok(())
        }
        None => Err(StoreError::Internal("record is not an object".to_string())),
    }
}

fn spec_of(object: &RawObject) -> Option<&serde_json::Value> {
    object.get("spec")
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_raw(&self, kind: &str, key: &ObjectKey) -> Result<Option<RawObject>> {
        let inner = self.inner.read().await;
        Ok(inner.records.get(&(kind.to_string(), key.clone())).cloned())
    }

    async fn list_raw(&self, kind: &str, namespace: Option<&str>) -> Result<Vec<RawObject>> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .filter(|((k, key), _)| k == kind && namespace.is_none_or(|ns| key.namespace == ns))
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn create_raw(&self, kind: &str, mut object: RawObject) -> Result<RawObject> {
        let mut meta = read_meta(&object)?;
        let key = meta.key();
        let mut inner = self.inner.write().await;

        let slot = (kind.to_string(), key.clone());
        if inner.records.contains_key(&slot) {
            return Err(StoreError::AlreadyExists(format!("{} {}", kind, key)));
        }

        meta.resource_version = inner.next_revision();
        meta.generation = 1;
        meta.deletion_timestamp = None;
        write_meta(&mut object, &meta)?;

        inner.records.insert(slot, object.clone());
        drop(inner);

        debug!("Created {} {} at version {}", kind, key, meta.resource_version);
        self.emit(Event::Applied {
            kind: kind.to_string(),
            key,
        });
        Ok(object)
    }

    async fn update_raw(&self, kind: &str, mut object: RawObject) -> Result<RawObject> {
        let mut meta = read_meta(&object)?;
        let key = meta.key();
        let mut inner = self.inner.write().await;

        let slot = (kind.to_string(), key.clone());
        let current = inner
            .records
            .get(&slot)
            .ok_or_else(|| StoreError::NotFound(format!("{} {}", kind, key)))?;
        let current_meta = read_meta(current)?;

        if meta.resource_version != current_meta.resource_version {
            return Err(StoreError::VersionMismatch {
                expected: meta.resource_version,
                actual: current_meta.resource_version,
            });
        }

        meta.generation = if spec_of(current) != spec_of(&object) {
            current_meta.generation + 1
        } else {
            current_meta.generation
        };
        // a pending deletion cannot be withdrawn through an update
        meta.deletion_timestamp = current_meta.deletion_timestamp;
        meta.resource_version = inner.next_revision();
        write_meta(&mut object, &meta)?;

        if meta.is_deleting() && meta.finalizers.is_empty() {
            inner.records.remove(&slot);
            drop(inner);
            debug!("Removed {} {} after last finalizer", kind, key);
            self.emit(Event::Deleted {
                kind: kind.to_string(),
                key,
            });
            return Ok(object);
        }

        inner.records.insert(slot, object.clone());
        drop(inner);

        debug!("Updated {} {} to version {}", kind, key, meta.resource_version);
        self.emit(Event::Applied {
            kind: kind.to_string(),
            key,
        });
        Ok(object)
    }

    async fn delete_raw(&self, kind: &str, key: &ObjectKey) -> Result<()> {
        let mut inner = self.inner.write().await;
        let slot = (kind.to_string(), key.clone());
        let current = inner
            .records
            .get(&slot)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{} {}", kind, key)))?;
        let mut meta = read_meta(&current)?;

        if meta.finalizers.is_empty() {
            inner.records.remove(&slot);
            drop(inner);
            debug!("Deleted {} {}", kind, key);
            self.emit(Event::Deleted {
                kind: kind.to_string(),
                key: key.clone(),
            });
            return Ok(());
        }

        if meta.deletion_timestamp.is_none() {
            meta.deletion_timestamp = Some(Utc::now());
            meta.resource_version = inner.next_revision();
            let mut object = current;
            write_meta(&mut object, &meta)?;
            inner.records.insert(slot, object);
        }
        drop(inner);

        debug!("Marked {} {} for deletion, waiting on {:?}", kind, key, meta.finalizers);
        self.emit(Event::Applied {
            kind: kind.to_string(),
            key: key.clone(),
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::{BackupPolicy, BackupPolicySpec, BackupPolicyStatus};
    use crate::meta::FINALIZER;
    use crate::store::StoreExt;

    fn make_policy(name: &str) -> BackupPolicy {
        BackupPolicy {
            meta: ObjectMeta::new("default", name),
            spec: BackupPolicySpec::default(),
            status: BackupPolicyStatus::default(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryStore::new();
        let created = store.create(&make_policy("p1")).await.unwrap();
        assert_eq!(created.meta.generation, 1);
        assert!(created.meta.resource_version > 0);

        let fetched: BackupPolicy = store
            .fetch(&ObjectKey::new("default", "p1"))
            .await
            .unwrap();
        assert_eq!(fetched.meta, created.meta);

        let err = store.create(&make_policy("p1")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_stale_update_is_rejected() {
        let store = MemoryStore::new();
        let created = store.create(&make_policy("p1")).await.unwrap();

        let mut first = created.clone();
        first.status.backup_schedule_ids.push("default/s1".to_string());
        store.update(&first).await.unwrap();

        let mut stale = created;
        stale.status.backup_schedule_ids.push("default/s2".to_string());
        let err = store.update(&stale).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_generation_tracks_spec_only() {
        let store = MemoryStore::new();
        let created = store.create(&make_policy("p1")).await.unwrap();

        let mut status_only = created.clone();
        status_only.status.backup_schedule_ids.push("x".to_string());
        let updated = store.update(&status_only).await.unwrap();
        assert_eq!(updated.meta.generation, 1);

        let mut spec_change = updated.clone();
        spec_change.spec.items.push(Default::default());
        let updated = store.update(&spec_change).await.unwrap();
        assert_eq!(updated.meta.generation, 2);
    }

    #[tokio::test]
    async fn test_finalizer_blocks_deletion() {
        let store = MemoryStore::new();
        let mut policy = make_policy("p1");
        policy.meta.set_finalizer(FINALIZER);
        store.create(&policy).await.unwrap();

        let key = ObjectKey::new("default", "p1");
        store.delete::<BackupPolicy>(&key).await.unwrap();

        let mut marked: BackupPolicy = store.fetch(&key).await.unwrap();
        assert!(marked.meta.is_deleting());

        marked.meta.unset_finalizer(FINALIZER);
        store.update(&marked).await.unwrap();
        assert!(store.get::<BackupPolicy>(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();

        store.create(&make_policy("p1")).await.unwrap();
        store
            .delete::<BackupPolicy>(&ObjectKey::new("default", "p1"))
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind(), "BackupPolicy");
        assert!(matches!(first, Event::Applied { .. }));
        assert!(matches!(rx.recv().await.unwrap(), Event::Deleted { .. }));
    }

    #[tokio::test]
    async fn test_list_filters_by_namespace() {
        let store = MemoryStore::new();
        store.create(&make_policy("a")).await.unwrap();
        let mut other = make_policy("b");
        other.meta.namespace = "other".to_string();
        store.create(&other).await.unwrap();

        let all: Vec<BackupPolicy> = store.list(None).await.unwrap();
        assert_eq!(all.len(), 2);
        let scoped: Vec<BackupPolicy> = store.list(Some("other")).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].meta.name, "b");
    }
}
