//! Deployment controller.
//!
//! One [`DeploymentReconciler::reconcile`] call is one pass over one
//! deployment record: load the record, converge the provider towards it, and
//! persist the resulting status. Sub-resources live in their own modules as
//! `impl DeploymentReconciler` blocks; their outcomes are folded through
//! [`crate::workflow::aggregate`].

mod advanced;
mod backup;
mod connection_secrets;
mod deletion;
mod flex;
mod namespaces;
mod private_endpoints;
mod process_args;
mod search_indexes;
mod search_nodes;
mod serverless;
mod zone_mapping;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dbfleet_api::deployment::{ConnectionStrings, DeploymentStatus};
use dbfleet_api::meta::FINALIZER;
use dbfleet_api::{
    ConditionType, Deployment, DeploymentKind, ObjectKey, Reason, Resource, Store, StoreError,
    StoreExt,
};
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::OperatorConfig;
use crate::events::EventRecorder;
use crate::ledger::Ledger;
use crate::provider::types::{
    STATE_CREATING, STATE_DELETED, STATE_DELETING, STATE_IDLE, STATE_REPAIRING, STATE_UPDATING,
};
use crate::provider::Provider;
use crate::workflow::{Context, Outcome, Requeue};

pub use connection_secrets::{secret_name, CREDENTIALS_TYPE, LABEL_CLUSTER, LABEL_PROJECT, LABEL_TYPE};

/// Reconciles deployment records against the provider.
pub struct DeploymentReconciler {
    store: Arc<dyn Store>,
    provider: Arc<dyn Provider>,
    config: OperatorConfig,
    events: Arc<EventRecorder>,
    ledger: Ledger,
}

impl DeploymentReconciler {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn Provider>,
        config: OperatorConfig,
        events: Arc<EventRecorder>,
    ) -> Self {
        let ledger = Ledger::new(
            Arc::clone(&store),
            config.conflict_retries,
            config.gc_concurrency,
        );
        Self {
            store,
            provider,
            config,
            events,
            ledger,
        }
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    /// Runs one pass over the deployment at `key`.
    pub async fn reconcile(&self, key: &ObjectKey) -> Requeue {
        let span = info_span!("reconcile", deployment = %key, pass = %Uuid::new_v4().simple());
        self.reconcile_pass(key).instrument(span).await
    }

    async fn reconcile_pass(&self, key: &ObjectKey) -> Requeue {
        let mut deployment = match self.store.get::<Deployment>(key).await {
            Ok(Some(d)) => d,
            Ok(None) => {
                debug!("deployment no longer exists");
                return Requeue::Never;
            }
            Err(e) => {
                error!("failed to load deployment: {}", e);
                return Requeue::Fatal(e.to_string());
            }
        };

        if deployment.meta.skip_reconciliation() {
            info!("skipping reconciliation as requested by annotation");
            self.events.reconciliation_skipped(key);
            if deployment.meta.is_deleting() {
                if let Err(e) = self.remove_finalizer(key).await {
                    error!("failed to remove finalizer: {}", e);
                    return Requeue::Fatal(e.to_string());
                }
            }
            return Requeue::Never;
        }

        let mut ctx = Context::new(deployment.status.clone());

        if deployment.meta.is_deleting() {
            let outcome = self.delete_deployment(&deployment).await;
            if outcome.is_ok() {
                return Requeue::Never;
            }
            return self.finish(&deployment, ctx, outcome).await;
        }

        let outcome = match self.ensure_finalizer(key).await {
            Ok(updated) => {
                deployment = updated;
                self.dispatch(&deployment, &mut ctx).await
            }
            Err(e) => Outcome::terminate(Reason::FinalizerNotSet, e),
        };

        let outcome = if outcome.is_ok() && deployment.spec.external_project {
            outcome.with_retry(self.config.independent_sync_period)
        } else {
            outcome
        };
        self.finish(&deployment, ctx, outcome).await
    }

    async fn dispatch(&self, deployment: &Deployment, ctx: &mut Context) -> Outcome {
        match deployment.kind() {
            Some(DeploymentKind::Advanced) => self.reconcile_advanced(deployment, ctx).await,
            Some(DeploymentKind::Serverless) => self.reconcile_serverless(deployment, ctx).await,
            Some(DeploymentKind::Flex) => self.reconcile_flex(deployment, ctx).await,
            None => Outcome::terminate(Reason::Internal, "deployment spec carries no deployment kind"),
        }
    }

    /// Records the pass outcome in the status, persists it and decides the requeue.
    async fn finish(&self, deployment: &Deployment, mut ctx: Context, outcome: Outcome) -> Requeue {
        if !outcome.is_ok() {
            ctx.set_condition_from(ConditionType::DeploymentReady, &outcome);
            ctx.set_condition_from(ConditionType::Ready, &outcome);
        }
        ctx.status_mut().observed_generation = deployment.meta.generation;

        let key = deployment.key();
        if let Err(e) = self.persist_status(&key, ctx.into_status()).await {
            error!("failed to persist status: {}", e);
            return Requeue::Fatal(e.to_string());
        }

        let requeue = outcome.requeue(self.config.default_retry);
        match &requeue {
            Requeue::Fatal(err) => {
                let reason = outcome.reason().map_or("Internal", |r| r.as_str());
                self.events.pass_failed(&key, reason, err);
            }
            Requeue::After(d) => debug!("{}; requeue in {:?}", outcome, d),
            Requeue::Never => debug!("{}", outcome),
        }
        requeue
    }

    /// Read-modify-write of the deployment record, retried on conflicts.
    /// `change` returns false when there is nothing to write.
    async fn modify_deployment<F>(&self, key: &ObjectKey, change: F) -> Result<Option<Deployment>, StoreError>
    where
        F: Fn(&mut Deployment) -> bool + Send + Sync,
    {
        let mut last = None;
        for _ in 0..=self.config.conflict_retries {
            let Some(mut deployment) = self.store.get::<Deployment>(key).await? else {
                return Ok(None);
            };
            if !change(&mut deployment) {
                return Ok(Some(deployment));
            }
            match self.store.update(&deployment).await {
                Ok(updated) => return Ok(Some(updated)),
                Err(e) if e.is_conflict() => {
                    debug!("conflict writing deployment {}, retrying", key);
                    last = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or_else(|| StoreError::Internal(format!("no attempt made for {}", key))))
    }

    async fn ensure_finalizer(&self, key: &ObjectKey) -> Result<Deployment, StoreError> {
        let added = AtomicBool::new(false);
        let updated = self
            .modify_deployment(key, |d| {
                let changed = d.meta.set_finalizer(FINALIZER);
                added.fetch_or(changed, Ordering::Relaxed);
                changed
            })
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Deployment {}", key)))?;
        if added.load(Ordering::Relaxed) {
            self.events.finalizer_set(key);
        }
        Ok(updated)
    }

    async fn remove_finalizer(&self, key: &ObjectKey) -> Result<(), StoreError> {
        self.modify_deployment(key, |d| d.meta.unset_finalizer(FINALIZER))
            .await?;
        self.events.finalizer_removed(key);
        Ok(())
    }

    async fn persist_status(&self, key: &ObjectKey, status: DeploymentStatus) -> Result<(), StoreError> {
        self.modify_deployment(key, |d| {
            if d.status == status {
                return false;
            }
            d.status = status.clone();
            true
        })
        .await?;
        Ok(())
    }

    /// Marks the deployment ready and records what the provider reports.
    fn ready(
        &self,
        ctx: &mut Context,
        state: &str,
        version: Option<String>,
        connection_strings: Option<ConnectionStrings>,
    ) -> Outcome {
        ctx.set_condition_true(ConditionType::DeploymentReady);
        ctx.set_condition_true(ConditionType::Ready);
        record_provider_state(ctx, state, version);
        ctx.status_mut().connection_strings = connection_strings;
        Outcome::ok()
    }
}

fn record_provider_state(ctx: &mut Context, state: &str, version: Option<String>) {
    let status = ctx.status_mut();
    status.state_name = Some(state.to_string());
    if version.is_some() {
        status.mongodb_version = version;
    }
}

/// Outcome of the provider lifecycle for a deployment that is not IDLE;
/// `None` when it is.
fn lifecycle_outcome(state: &str) -> Option<Outcome> {
    match state {
        STATE_IDLE => None,
        STATE_CREATING => Some(Outcome::in_progress(
            Reason::DeploymentCreating,
            "deployment is provisioning",
        )),
        STATE_UPDATING | STATE_REPAIRING => Some(Outcome::in_progress(
            Reason::DeploymentUpdating,
            "deployment is updating",
        )),
        STATE_DELETING | STATE_DELETED => Some(Outcome::ok()),
        other => Some(Outcome::terminate(
            Reason::Internal,
            format!("unknown deployment state: {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_switch() {
        assert!(lifecycle_outcome("IDLE").is_none());

        let o = lifecycle_outcome("CREATING").unwrap();
        assert_eq!(o.reason(), Some(Reason::DeploymentCreating));
        assert_eq!(o.message(), "deployment is provisioning");

        for state in ["UPDATING", "REPAIRING"] {
            let o = lifecycle_outcome(state).unwrap();
            assert_eq!(o.reason(), Some(Reason::DeploymentUpdating));
            assert_eq!(o.message(), "deployment is updating");
        }

        assert!(lifecycle_outcome("DELETING").unwrap().is_ok());
        assert!(lifecycle_outcome("DELETED").unwrap().is_ok());

        let o = lifecycle_outcome("LOST").unwrap();
        assert!(o.is_terminate());
        assert_eq!(o.reason(), Some(Reason::Internal));
        assert_eq!(o.message(), "unknown deployment state: LOST");
    }
}
