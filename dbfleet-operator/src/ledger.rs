//! Ownership ledger for shared records.
//!
//! A shared record (backup schedule, backup policy) lists the records that
//! depend on it in its status. The ledger keeps that list and the record's
//! finalizer in lockstep: the finalizer is present exactly while the list is
//! non-empty, so a shared record cannot disappear from under a dependent.
//!
//! Every change is an optimistic read-modify-write against the store and is
//! retried immediately on a resource-version conflict.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dbfleet_api::meta::{FINALIZER, ObjectKey, Resource};
use dbfleet_api::{BackupPolicy, BackupSchedule, Store, StoreError, StoreExt};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("{kind} {key}: still conflicting after {attempts} attempts")]
    ConflictRetriesExhausted {
        kind: &'static str,
        key: ObjectKey,
        attempts: usize,
    },

    #[error("garbage collection task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// A record other records can depend on.
pub trait Shared: Resource {
    fn dependents(&self) -> &[String];
    fn dependents_mut(&mut self) -> &mut Vec<String>;
}

impl Shared for BackupSchedule {
    fn dependents(&self) -> &[String] {
        &self.status.deployment_ids
    }

    fn dependents_mut(&mut self) -> &mut Vec<String> {
        &mut self.status.deployment_ids
    }
}

impl Shared for BackupPolicy {
    fn dependents(&self) -> &[String] {
        &self.status.backup_schedule_ids
    }

    fn dependents_mut(&mut self) -> &mut Vec<String> {
        &mut self.status.backup_schedule_ids
    }
}

/// Applies the guard rule. Returns true if the finalizer changed.
fn sync_guard<S: Shared>(record: &mut S) -> bool {
    if record.dependents().is_empty() {
        record.meta_mut().unset_finalizer(FINALIZER)
    } else {
        record.meta_mut().set_finalizer(FINALIZER)
    }
}

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
    conflict_retries: usize,
    gc_concurrency: usize,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>, conflict_retries: usize, gc_concurrency: usize) -> Self {
        Self {
            store,
            conflict_retries,
            gc_concurrency: gc_concurrency.max(1),
        }
    }

    /// Records `dependent` on the shared record at `key`.
    ///
    /// Fails with [`StoreError::NotFound`] if the shared record does not exist.
    pub async fn attach<S: Shared>(&self, key: &ObjectKey, dependent: &str) -> Result<S> {
        let updated = self
            .modify::<S, _>(key, |list| {
                if list.iter().any(|d| d == dependent) {
                    return false;
                }
                list.push(dependent.to_string());
                true
            })
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("{} {}", S::KIND, key)))?;

        if updated.meta().is_deleting() {
            warn!(
                "{} {} is being deleted but is still referenced by {}",
                S::KIND,
                key,
                dependent
            );
        }
        Ok(updated)
    }

    /// Removes `dependent` from the shared record at `key`. A missing shared
    /// record is not an error; `None` is returned instead.
    pub async fn detach<S: Shared>(&self, key: &ObjectKey, dependent: &str) -> Result<Option<S>> {
        self.modify::<S, _>(key, |list| {
            let before = list.len();
            list.retain(|d| d != dependent);
            before != list.len()
        })
        .await
    }

    async fn modify<S, F>(&self, key: &ObjectKey, change: F) -> Result<Option<S>>
    where
        S: Shared,
        F: Fn(&mut Vec<String>) -> bool + Send + Sync,
    {
        let attempts = self.conflict_retries + 1;
        for attempt in 1..=attempts {
            let Some(mut record) = self.store.get::<S>(key).await? else {
                return Ok(None);
            };

            let list_changed = change(record.dependents_mut());
            let guard_changed = sync_guard(&mut record);
            if !list_changed && !guard_changed {
                return Ok(Some(record));
            }

            match self.store.update(&record).await {
                Ok(updated) => {
                    debug!(
                        "{} {} now has {} dependents",
                        S::KIND,
                        key,
                        updated.dependents().len()
                    );
                    return Ok(Some(updated));
                }
                Err(e) if e.is_conflict() => {
                    debug!("conflict on {} {} (attempt {}/{})", S::KIND, key, attempt, attempts);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::ConflictRetriesExhausted {
            kind: S::KIND,
            key: key.clone(),
            attempts,
        })
    }

    /// Detaches a deployment from every backup schedule that lists it, except
    /// the one at `keep`. A schedule left without deployments is in turn
    /// detached from its policy.
    ///
    /// Schedules are processed concurrently. The first failure stops tasks that
    /// have not started yet; tasks already running are allowed to finish.
    pub async fn release_deployment(
        &self,
        deployment: &str,
        keep: Option<&ObjectKey>,
    ) -> Result<usize> {
        let schedules = self.store.list::<BackupSchedule>(None).await?;
        let owners: Vec<ObjectKey> = schedules
            .iter()
            .filter(|s| s.status.deployment_ids.iter().any(|d| d == deployment))
            .map(|s| s.key())
            .filter(|k| Some(k) != keep)
            .collect();

        if owners.is_empty() {
            return Ok(0);
        }

        let permits = Arc::new(Semaphore::new(self.gc_concurrency));
        let failed = Arc::new(AtomicBool::new(false));
        let mut tasks = JoinSet::new();

        for key in owners {
            let ledger = self.clone();
            let permits = Arc::clone(&permits);
            let failed = Arc::clone(&failed);
            let deployment = deployment.to_string();
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| LedgerError::Task(e.to_string()))?;
                if failed.load(Ordering::SeqCst) {
                    return Ok(false);
                }
                let result = ledger.release_schedule(&key, &deployment).await;
                if result.is_err() {
                    failed.store(true, Ordering::SeqCst);
                }
                result.map(|_| true)
            });
        }

        let mut released = 0;
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(true)) => released += 1,
                Ok(Ok(false)) => {}
                Ok(Err(e)) => {
                    failed.store(true, Ordering::SeqCst);
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    failed.store(true, Ordering::SeqCst);
                    first_error.get_or_insert(LedgerError::Task(e.to_string()));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("released deployment {} from {} backup schedules", deployment, released);
                Ok(released)
            }
        }
    }

    async fn release_schedule(&self, key: &ObjectKey, deployment: &str) -> Result<()> {
        let Some(schedule) = self.detach::<BackupSchedule>(key, deployment).await? else {
            return Ok(());
        };
        if !schedule.status.deployment_ids.is_empty() {
            return Ok(());
        }

        let policy_key = schedule.spec.policy_ref.key(&key.namespace);
        debug!("backup schedule {} lost its last deployment, releasing policy {}", key, policy_key);
        self.detach::<BackupPolicy>(&policy_key, &key.to_string())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use dbfleet_api::backup::{BackupPolicySpec, BackupScheduleSpec};
    use dbfleet_api::meta::{ObjectMeta, ResourceRef};
    use dbfleet_api::store::RawObject;
    use dbfleet_api::{Event, MemoryStore};
    use tokio::sync::broadcast;

    use super::*;

    fn make_policy(name: &str) -> BackupPolicy {
        BackupPolicy {
            meta: ObjectMeta::new("default", name),
            spec: BackupPolicySpec::default(),
            status: Default::default(),
        }
    }

    fn make_schedule(name: &str, policy: &str) -> BackupSchedule {
        BackupSchedule {
            meta: ObjectMeta::new("default", name),
            spec: BackupScheduleSpec {
                policy_ref: ResourceRef {
                    name: policy.to_string(),
                    namespace: None,
                },
                ..Default::default()
            },
            status: Default::default(),
        }
    }

    async fn setup() -> (Arc<MemoryStore>, Ledger) {
        let store = Arc::new(MemoryStore::new());
        store.create(&make_policy("p1")).await.unwrap();
        store.create(&make_schedule("s1", "p1")).await.unwrap();
        store.create(&make_schedule("s2", "p1")).await.unwrap();
        let ledger = Ledger::new(store.clone(), 5, 8);
        (store, ledger)
    }

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new("default", name)
    }

    #[tokio::test]
    async fn test_attach_sets_guard_and_is_idempotent() {
        let (store, ledger) = setup().await;
        let s: BackupSchedule = ledger.attach(&key("s1"), "c1").await.unwrap();
        assert!(s.meta.has_finalizer(FINALIZER));
        let version = s.meta.resource_version;

        let again: BackupSchedule = ledger.attach(&key("s1"), "c1").await.unwrap();
        assert_eq!(again.status.deployment_ids, vec!["c1".to_string()]);
        assert_eq!(again.meta.resource_version, version);

        let stored: BackupSchedule = store.fetch(&key("s1")).await.unwrap();
        assert_eq!(stored.status.deployment_ids.len(), 1);
    }

    #[tokio::test]
    async fn test_detach_clears_guard_on_last_dependent() {
        let (_, ledger) = setup().await;
        ledger.attach::<BackupSchedule>(&key("s1"), "c1").await.unwrap();
        ledger.attach::<BackupSchedule>(&key("s1"), "c2").await.unwrap();

        let s = ledger
            .detach::<BackupSchedule>(&key("s1"), "c1")
            .await
            .unwrap()
            .unwrap();
        assert!(s.meta.has_finalizer(FINALIZER));

        let s = ledger
            .detach::<BackupSchedule>(&key("s1"), "c2")
            .await
            .unwrap()
            .unwrap();
        assert!(!s.meta.has_finalizer(FINALIZER));
        assert!(s.status.deployment_ids.is_empty());
    }

    #[tokio::test]
    async fn test_attach_missing_shared_record_fails() {
        let (_, ledger) = setup().await;
        let err = ledger
            .attach::<BackupSchedule>(&key("nope"), "c1")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Store(StoreError::NotFound(_))));
        assert!(ledger
            .detach::<BackupSchedule>(&key("nope"), "c1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_two_hop_release_clears_both_guards() {
        let (store, ledger) = setup().await;
        ledger.attach::<BackupSchedule>(&key("s1"), "c1").await.unwrap();
        ledger
            .attach::<BackupPolicy>(&key("p1"), "default/s1")
            .await
            .unwrap();

        let released = ledger.release_deployment("c1", None).await.unwrap();
        assert_eq!(released, 1);

        let s: BackupSchedule = store.fetch(&key("s1")).await.unwrap();
        assert!(s.status.deployment_ids.is_empty());
        assert!(!s.meta.has_finalizer(FINALIZER));
        let p: BackupPolicy = store.fetch(&key("p1")).await.unwrap();
        assert!(p.status.backup_schedule_ids.is_empty());
        assert!(!p.meta.has_finalizer(FINALIZER));
    }

    #[tokio::test]
    async fn test_release_keeps_policy_while_schedule_is_shared() {
        let (store, ledger) = setup().await;
        ledger.attach::<BackupSchedule>(&key("s1"), "c1").await.unwrap();
        ledger.attach::<BackupSchedule>(&key("s1"), "c2").await.unwrap();
        ledger
            .attach::<BackupPolicy>(&key("p1"), "default/s1")
            .await
            .unwrap();

        ledger.release_deployment("c1", None).await.unwrap();
        let p: BackupPolicy = store.fetch(&key("p1")).await.unwrap();
        assert_eq!(p.status.backup_schedule_ids, vec!["default/s1".to_string()]);
        assert!(p.meta.has_finalizer(FINALIZER));
    }

    #[tokio::test]
    async fn test_release_with_exclusion() {
        let (store, ledger) = setup().await;
        ledger.attach::<BackupSchedule>(&key("s1"), "c1").await.unwrap();
        ledger.attach::<BackupSchedule>(&key("s2"), "c1").await.unwrap();

        ledger
            .release_deployment("c1", Some(&key("s2")))
            .await
            .unwrap();
        let s1: BackupSchedule = store.fetch(&key("s1")).await.unwrap();
        let s2: BackupSchedule = store.fetch(&key("s2")).await.unwrap();
        assert!(s1.status.deployment_ids.is_empty());
        assert_eq!(s2.status.deployment_ids, vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn test_release_removes_deleting_schedule() {
        let (store, ledger) = setup().await;
        ledger.attach::<BackupSchedule>(&key("s1"), "c1").await.unwrap();
        store.delete::<BackupSchedule>(&key("s1")).await.unwrap();
        let s: BackupSchedule = store.fetch(&key("s1")).await.unwrap();
        assert!(s.meta.is_deleting());

        ledger.release_deployment("c1", None).await.unwrap();
        assert!(store.get::<BackupSchedule>(&key("s1")).await.unwrap().is_none());
    }

    /// Fails the first `conflicts` updates with a version mismatch.
    struct ConflictingStore {
        inner: MemoryStore,
        conflicts: AtomicUsize,
    }

    #[async_trait]
    impl Store for ConflictingStore {
        async fn get_raw(&self, kind: &str, key: &ObjectKey) -> dbfleet_api::store::Result<Option<RawObject>> {
            self.inner.get_raw(kind, key).await
        }

        async fn list_raw(&self, kind: &str, ns: Option<&str>) -> dbfleet_api::store::Result<Vec<RawObject>> {
            self.inner.list_raw(kind, ns).await
        }

        async fn create_raw(&self, kind: &str, object: RawObject) -> dbfleet_api::store::Result<RawObject> {
            self.inner.create_raw(kind, object).await
        }

        async fn update_raw(&self, kind: &str, object: RawObject) -> dbfleet_api::store::Result<RawObject> {
            let left = self.conflicts.load(Ordering::SeqCst);
            if left > 0 {
                self.conflicts.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::VersionMismatch {
                    expected: 0,
                    actual: 1,
                });
            }
            self.inner.update_raw(kind, object).await
        }

        async fn delete_raw(&self, kind: &str, key: &ObjectKey) -> dbfleet_api::store::Result<()> {
            self.inner.delete_raw(kind, key).await
        }

        fn subscribe(&self) -> broadcast::Receiver<Event> {
            self.inner.subscribe()
        }
    }

    async fn make_conflicting(conflicts: usize) -> Arc<ConflictingStore> {
        let inner = MemoryStore::new();
        inner.create(&make_schedule("s1", "p1")).await.unwrap();
        Arc::new(ConflictingStore {
            inner,
            conflicts: AtomicUsize::new(conflicts),
        })
    }

    #[tokio::test]
    async fn test_conflicts_are_retried() {
        let store = make_conflicting(3).await;
        let ledger = Ledger::new(store.clone(), 5, 8);
        let s: BackupSchedule = ledger.attach(&key("s1"), "c1").await.unwrap();
        assert_eq!(s.status.deployment_ids, vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn test_conflict_retries_are_bounded() {
        let store = make_conflicting(10).await;
        let ledger = Ledger::new(store.clone(), 2, 8);
        let err = ledger
            .attach::<BackupSchedule>(&key("s1"), "c1")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::ConflictRetriesExhausted { attempts: 3, .. }
        ));
    }

    /// Rejects every update of one backup schedule with a non-conflict error.
    struct FailingStore {
        inner: Arc<MemoryStore>,
        broken: String,
    }

    #[async_trait]
    impl Store for FailingStore {
        async fn get_raw(&self, kind: &str, key: &ObjectKey) -> dbfleet_api::store::Result<Option<RawObject>> {
            self.inner.get_raw(kind, key).await
        }

        async fn list_raw(&self, kind: &str, ns: Option<&str>) -> dbfleet_api::store::Result<Vec<RawObject>> {
            self.inner.list_raw(kind, ns).await
        }

        async fn create_raw(&self, kind: &str, object: RawObject) -> dbfleet_api::store::Result<RawObject> {
            self.inner.create_raw(kind, object).await
        }

        async fn update_raw(&self, kind: &str, object: RawObject) -> dbfleet_api::store::Result<RawObject> {
            if kind == BackupSchedule::KIND && object["meta"]["name"] == self.broken.as_str() {
                return Err(StoreError::Internal("disk full".to_string()));
            }
            self.inner.update_raw(kind, object).await
        }

        async fn delete_raw(&self, kind: &str, key: &ObjectKey) -> dbfleet_api::store::Result<()> {
            self.inner.delete_raw(kind, key).await
        }

        fn subscribe(&self) -> broadcast::Receiver<Event> {
            self.inner.subscribe()
        }
    }

    const SCHEDULES: [&str; 4] = ["s0", "s1", "s2", "s3"];

    /// Every schedule lists `c1` and is itself listed on `p1`. Updates of
    /// `broken` fail once the records are in place.
    async fn make_failing(broken: &str, gc_concurrency: usize) -> (Arc<FailingStore>, Ledger) {
        let inner = Arc::new(MemoryStore::new());
        inner.create(&make_policy("p1")).await.unwrap();
        for name in SCHEDULES {
            inner.create(&make_schedule(name, "p1")).await.unwrap();
        }
        let setup = Ledger::new(inner.clone(), 5, 8);
        for name in SCHEDULES {
            setup.attach::<BackupSchedule>(&key(name), "c1").await.unwrap();
            setup
                .attach::<BackupPolicy>(&key("p1"), &format!("default/{}", name))
                .await
                .unwrap();
        }
        let store = Arc::new(FailingStore {
            inner,
            broken: broken.to_string(),
        });
        let ledger = Ledger::new(store.clone(), 5, gc_concurrency);
        (store, ledger)
    }

    /// Guards match dependent lists, and the policy lists every schedule that
    /// still has deployments.
    async fn assert_consistent(store: &FailingStore) {
        let policy: BackupPolicy = store.fetch(&key("p1")).await.unwrap();
        assert_eq!(
            policy.meta.has_finalizer(FINALIZER),
            !policy.status.backup_schedule_ids.is_empty()
        );
        for name in SCHEDULES {
            let s: BackupSchedule = store.fetch(&key(name)).await.unwrap();
            assert_eq!(
                s.meta.has_finalizer(FINALIZER),
                !s.status.deployment_ids.is_empty(),
                "schedule {}",
                name
            );
            if !s.status.deployment_ids.is_empty() {
                let id = format!("default/{}", name);
                assert!(policy.status.backup_schedule_ids.contains(&id), "policy lost {}", id);
            }
        }
    }

    #[tokio::test]
    async fn test_release_failure_stops_pending_schedules() {
        let (store, ledger) = make_failing("s0", 1).await;

        let err = ledger.release_deployment("c1", None).await.unwrap_err();
        assert!(matches!(err, LedgerError::Store(StoreError::Internal(_))));

        for name in SCHEDULES {
            let s: BackupSchedule = store.fetch(&key(name)).await.unwrap();
            assert_eq!(s.status.deployment_ids, vec!["c1".to_string()], "schedule {}", name);
        }
        assert_consistent(&store).await;
    }

    #[tokio::test]
    async fn test_release_failure_leaves_other_schedules_consistent() {
        let (store, ledger) = make_failing("s2", 8).await;

        let err = ledger.release_deployment("c1", None).await.unwrap_err();
        assert!(matches!(err, LedgerError::Store(StoreError::Internal(_))));

        let broken: BackupSchedule = store.fetch(&key("s2")).await.unwrap();
        assert_eq!(broken.status.deployment_ids, vec!["c1".to_string()]);
        assert_consistent(&store).await;

        // Once the store recovers a later release finishes the job.
        let healed = Ledger::new(store.inner.clone(), 5, 8);
        healed.release_deployment("c1", None).await.unwrap();
        let policy: BackupPolicy = store.fetch(&key("p1")).await.unwrap();
        assert!(policy.status.backup_schedule_ids.is_empty());
        assert!(!policy.meta.has_finalizer(FINALIZER));
    }
}
