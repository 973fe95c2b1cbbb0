//! Work loop driving the deployment controller.
//!
//! Store events are mapped to the deployments they affect and queued. At
//! most one pass runs per deployment at a time; a deployment that changes
//! while its pass is running is queued again once the pass finishes.
//! Requeue hints become timers, fatal passes back off exponentially.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dbfleet_api::{
    BackupPolicy, BackupSchedule, DatabaseUser, Deployment, Event, ObjectKey, Resource,
    SearchIndexConfig, Store, StoreError, StoreExt,
};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::{interval_at, Instant, Interval};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::config::OperatorConfig;
use crate::controller::DeploymentReconciler;
use crate::workflow::Requeue;

/// Drives [`DeploymentReconciler`] passes from store events and timers.
pub struct Runner {
    store: Arc<dyn Store>,
    reconciler: Arc<DeploymentReconciler>,
    config: OperatorConfig,
}

#[derive(Debug, Default)]
struct KeyState {
    queued: bool,
    running: bool,
    /// Changed while running.
    dirty: bool,
    failures: u32,
    timer: Option<AbortHandle>,
}

/// The parts of a deployment record whose change warrants a pass. Status
/// and finalizer writes by the controller itself are not among them.
#[derive(Debug, Clone, PartialEq)]
struct Trigger {
    generation: u64,
    deleting: bool,
    annotations: BTreeMap<String, String>,
}

impl Trigger {
    fn of(d: &Deployment) -> Self {
        Self {
            generation: d.meta.generation,
            deleting: d.meta.is_deleting(),
            annotations: d.meta.annotations.clone(),
        }
    }
}

#[derive(Default)]
struct Queue {
    keys: HashMap<ObjectKey, KeyState>,
    pending: VecDeque<ObjectKey>,
    triggers: HashMap<ObjectKey, Trigger>,
}

impl Queue {
    fn enqueue(&mut self, key: ObjectKey) {
        let state = self.keys.entry(key.clone()).or_default();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if state.running {
            state.dirty = true;
        } else if !state.queued {
            state.queued = true;
            self.pending.push_back(key);
        }
    }

    fn next_ready(&mut self) -> Option<ObjectKey> {
        let key = self.pending.pop_front()?;
        let state = self.keys.entry(key.clone()).or_default();
        state.queued = false;
        state.running = true;
        Some(key)
    }

    fn complete(
        &mut self,
        key: ObjectKey,
        requeue: Requeue,
        config: &OperatorConfig,
        timers: &mpsc::UnboundedSender<ObjectKey>,
    ) {
        let state = self.keys.entry(key.clone()).or_default();
        state.running = false;

        let delay = match requeue {
            Requeue::Never => {
                state.failures = 0;
                None
            }
            Requeue::After(d) => {
                state.failures = 0;
                Some(d)
            }
            Requeue::Fatal(err) => {
                state.failures += 1;
                let d = backoff(config.default_retry, state.failures, config.max_backoff);
                warn!(
                    deployment = %key,
                    "pass failed ({} in a row), retrying in {:?}: {}",
                    state.failures,
                    d,
                    err
                );
                Some(d)
            }
        };

        if std::mem::take(&mut state.dirty) {
            self.enqueue(key);
        } else if let Some(delay) = delay {
            state.timer = Some(schedule(key, delay, timers.clone()));
        }
    }

    fn forget(&mut self, key: &ObjectKey) {
        if let Some(state) = self.keys.remove(key) {
            if let Some(timer) = state.timer {
                timer.abort();
            }
        }
        self.pending.retain(|k| k != key);
        self.triggers.remove(key);
    }
}

fn schedule(key: ObjectKey, delay: Duration, timers: mpsc::UnboundedSender<ObjectKey>) -> AbortHandle {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = timers.send(key);
    })
    .abort_handle()
}

/// Exponential backoff starting at `base`, capped at `max`.
fn backoff(base: Duration, failures: u32, max: Duration) -> Duration {
    let exp = failures.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exp).min(max)
}

async fn tick(resync: &mut Option<Interval>) {
    match resync {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl Runner {
    pub fn new(store: Arc<dyn Store>, reconciler: Arc<DeploymentReconciler>) -> Self {
        let config = reconciler.config().clone();
        Self {
            store,
            reconciler,
            config,
        }
    }

    /// Runs until `shutdown` resolves, then waits for in-flight passes.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let mut events = BroadcastStream::new(self.store.subscribe());
        let (timer_tx, mut timer_rx) = mpsc::unbounded_channel::<ObjectKey>();
        let mut queue = Queue::default();
        let mut tasks: JoinSet<(ObjectKey, Requeue)> = JoinSet::new();

        let initial = self
            .resync(&mut queue)
            .await
            .context("Failed to list deployments on startup")?;
        info!("Starting with {} deployments", initial);

        let mut resync = self
            .config
            .resync_period
            .map(|period| interval_at(Instant::now() + period, period));

        tokio::pin!(shutdown);
        loop {
            self.dispatch(&mut queue, &mut tasks);

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down, waiting for {} running passes", tasks.len());
                    break;
                }
                Some(event) = events.next() => match event {
                    Ok(event) => self.on_event(event, &mut queue).await,
                    Err(BroadcastStreamRecvError::Lagged(missed)) => {
                        warn!("Missed {} store events, resyncing", missed);
                        if let Err(e) = self.resync(&mut queue).await {
                            error!("Resync failed: {}", e);
                        }
                    }
                },
                Some(key) = timer_rx.recv() => queue.enqueue(key),
                Some(joined) = tasks.join_next() => match joined {
                    Ok((key, requeue)) => queue.complete(key, requeue, &self.config, &timer_tx),
                    Err(e) => error!("Pass task failed: {}", e),
                },
                _ = tick(&mut resync) => {
                    debug!("Periodic resync");
                    if let Err(e) = self.resync(&mut queue).await {
                        error!("Resync failed: {}", e);
                    }
                }
            }
        }

        while tasks.join_next().await.is_some() {}
        Ok(())
    }

    /// Starts passes for queued deployments up to the concurrency limit.
    fn dispatch(&self, queue: &mut Queue, tasks: &mut JoinSet<(ObjectKey, Requeue)>) {
        while tasks.len() < self.config.max_concurrent_reconciles.max(1) {
            let Some(key) = queue.next_ready() else {
                break;
            };
            let reconciler = Arc::clone(&self.reconciler);
            let timeout = self.config.pass_timeout;
            tasks.spawn(async move {
                let pass_key = key.clone();
                let pass = tokio::spawn(async move {
                    match tokio::time::timeout(timeout, reconciler.reconcile(&pass_key)).await {
                        Ok(requeue) => requeue,
                        Err(_) => Requeue::Fatal(format!("pass timed out after {:?}", timeout)),
                    }
                });
                let requeue = pass
                    .await
                    .unwrap_or_else(|e| Requeue::Fatal(format!("pass aborted: {}", e)));
                (key, requeue)
            });
        }
    }

    /// Queues every deployment. Returns how many there are.
    async fn resync(&self, queue: &mut Queue) -> std::result::Result<usize, StoreError> {
        let deployments = self.store.list::<Deployment>(None).await?;
        let count = deployments.len();
        for d in deployments {
            let key = d.key();
            queue.triggers.insert(key.clone(), Trigger::of(&d));
            queue.enqueue(key);
        }
        Ok(count)
    }

    async fn on_event(&self, event: Event, queue: &mut Queue) {
        if event.kind() == Deployment::KIND {
            match &event {
                Event::Deleted { key, .. } => queue.forget(key),
                Event::Applied { key, .. } => match self.store.get::<Deployment>(key).await {
                    Ok(Some(d)) => {
                        let trigger = Trigger::of(&d);
                        if queue.triggers.get(key) != Some(&trigger) {
                            queue.triggers.insert(key.clone(), trigger);
                            queue.enqueue(key.clone());
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("Failed to read deployment {}: {}", key, e);
                        queue.enqueue(key.clone());
                    }
                },
            }
            return;
        }

        match deployments_for(self.store.as_ref(), &event).await {
            Ok(keys) => {
                for key in keys {
                    debug!("{} {} affects deployment {}", event.kind(), event.key(), key);
                    queue.enqueue(key);
                }
            }
            Err(e) => warn!(
                "Failed to map {} {} to deployments: {}",
                event.kind(),
                event.key(),
                e
            ),
        }
    }
}

/// Deployments affected by a change to a record of another kind.
///
/// A policy affects the deployments of every schedule using it. A user
/// affects every deployment of its project; deleted users are not mapped.
pub async fn deployments_for(
    store: &dyn Store,
    event: &Event,
) -> std::result::Result<Vec<ObjectKey>, StoreError> {
    let key = event.key();
    let kind = event.kind();

    let matches: Box<dyn Fn(&Deployment) -> bool + Send> = if kind == BackupPolicy::KIND {
        let schedules: HashSet<ObjectKey> = store
            .list::<BackupSchedule>(None)
            .await?
            .into_iter()
            .filter(|s| s.spec.policy_ref.key(&s.meta.namespace) == *key)
            .map(|s| s.key())
            .collect();
        if schedules.is_empty() {
            return Ok(Vec::new());
        }
        Box::new(move |d| {
            d.spec
                .backup_schedule_ref
                .as_ref()
                .is_some_and(|r| schedules.contains(&r.key(&d.meta.namespace)))
        })
    } else if kind == BackupSchedule::KIND {
        let key = key.clone();
        Box::new(move |d| {
            d.spec
                .backup_schedule_ref
                .as_ref()
                .is_some_and(|r| r.key(&d.meta.namespace) == key)
        })
    } else if kind == SearchIndexConfig::KIND {
        let key = key.clone();
        Box::new(move |d| {
            d.spec.deployment_spec.as_ref().is_some_and(|spec| {
                spec.search_indexes.iter().any(|i| {
                    i.search
                        .as_ref()
                        .is_some_and(|s| s.search_configuration_ref.key(&d.meta.namespace) == key)
                })
            })
        })
    } else if kind == DatabaseUser::KIND {
        if matches!(event, Event::Deleted { .. }) {
            return Ok(Vec::new());
        }
        let Some(user) = store.get::<DatabaseUser>(key).await? else {
            return Ok(Vec::new());
        };
        let project_id = user.spec.project_id;
        Box::new(move |d| d.spec.project_id == project_id)
    } else {
        return Ok(Vec::new());
    };

    Ok(store
        .list::<Deployment>(None)
        .await?
        .into_iter()
        .filter(|d| matches(d))
        .map(|d| d.key())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let base = Duration::from_secs(10);
        let max = Duration::from_secs(300);
        assert_eq!(backoff(base, 1, max), Duration::from_secs(10));
        assert_eq!(backoff(base, 2, max), Duration::from_secs(20));
        assert_eq!(backoff(base, 3, max), Duration::from_secs(40));
        assert_eq!(backoff(base, 6, max), Duration::from_secs(300));
        assert_eq!(backoff(base, 60, max), Duration::from_secs(300));
    }

    #[test]
    fn test_queue_serializes_per_key() {
        let mut queue = Queue::default();
        let key = ObjectKey::new("default", "c1");

        queue.enqueue(key.clone());
        queue.enqueue(key.clone());
        assert_eq!(queue.pending.len(), 1);

        assert_eq!(queue.next_ready(), Some(key.clone()));
        assert!(queue.next_ready().is_none());

        // changes while running are remembered, not run concurrently
        queue.enqueue(key.clone());
        assert!(queue.pending.is_empty());
        assert!(queue.keys[&key].dirty);
    }

    #[tokio::test]
    async fn test_dirty_key_is_requeued_on_completion() {
        let mut queue = Queue::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = OperatorConfig::default();
        let key = ObjectKey::new("default", "c1");

        queue.enqueue(key.clone());
        queue.next_ready();
        queue.enqueue(key.clone());
        queue.complete(key.clone(), Requeue::Never, &config, &tx);

        assert_eq!(queue.next_ready(), Some(key.clone()));
        assert!(queue.keys[&key].timer.is_none());
    }

    #[tokio::test]
    async fn test_fatal_completion_counts_failures_and_arms_timer() {
        let mut queue = Queue::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = OperatorConfig::default();
        let key = ObjectKey::new("default", "c1");

        for expected in 1..=2 {
            queue.enqueue(key.clone());
            queue.next_ready();
            queue.complete(key.clone(), Requeue::Fatal("boom".to_string()), &config, &tx);
            assert_eq!(queue.keys[&key].failures, expected);
            assert!(queue.keys[&key].timer.is_some());
        }

        queue.enqueue(key.clone());
        queue.next_ready();
        queue.complete(key.clone(), Requeue::Never, &config, &tx);
        assert_eq!(queue.keys[&key].failures, 0);

        queue.forget(&key);
        assert!(!queue.keys.contains_key(&key));
    }
}
