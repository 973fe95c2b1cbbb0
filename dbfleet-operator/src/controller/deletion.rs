//! Deletion of deployment records.
//!
//! The finalizer is only removed once the provider side has been dealt with:
//! deleted, kept on request, or found already gone.

use dbfleet_api::meta::FINALIZER;
use dbfleet_api::{Deployment, DeploymentKind, Reason, Resource};
use tracing::{info, warn};

use super::DeploymentReconciler;
use crate::observe::observe;
use crate::provider::Result as ProviderResult;
use crate::workflow::Outcome;

impl DeploymentReconciler {
    pub(super) async fn delete_deployment(&self, d: &Deployment) -> Outcome {
        if !d.meta.has_finalizer(FINALIZER) {
            return Outcome::ok();
        }
        let key = d.key();
        let name = d.deployment_name();

        let exists = match self.exists_in_provider(d).await {
            Ok(exists) => exists,
            Err(e) => return Outcome::terminate(Reason::Internal, e),
        };

        if !exists {
            info!("Deployment {} is already gone from the provider", name);
            return self.release_and_unfinalize(d).await;
        }

        if d.meta.keep_on_delete() || self.config.deletion_protection {
            info!("Keeping deployment {} in the provider", name);
            self.events.deployment_kept(&key, name);
            return self.release_and_unfinalize(d).await;
        }

        if d.termination_protection_enabled() {
            warn!("Deployment {} has termination protection enabled, not deleting", name);
            return Outcome::terminate(
                Reason::DeploymentNotDeletedInProvider,
                "termination protection enabled",
            );
        }

        if let Err(e) = self.ledger.release_deployment(name, None).await {
            return Outcome::terminate(
                Reason::Internal,
                format!("failed to cleanup deployment bindings (backups): {}", e),
            );
        }

        if let Err(e) = self.delete_connection_secrets(d).await {
            return Outcome::terminate(Reason::Internal, format!("{:#}", e));
        }

        info!("Deleting deployment {} from the provider", name);
        match self.delete_from_provider(d).await {
            Ok(()) => self.events.deployment_deleted(&key, name),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Outcome::provider_failure(Reason::DeploymentNotDeletedInProvider, &e),
        }

        match self.remove_finalizer(&key).await {
            Ok(()) => Outcome::ok(),
            Err(e) => Outcome::terminate(Reason::FinalizerNotRemoved, e),
        }
    }

    async fn release_and_unfinalize(&self, d: &Deployment) -> Outcome {
        if let Err(e) = self.ledger.release_deployment(d.deployment_name(), None).await {
            return Outcome::terminate(
                Reason::Internal,
                format!("failed to cleanup deployment bindings (backups): {}", e),
            );
        }
        match self.remove_finalizer(&d.key()).await {
            Ok(()) => Outcome::ok(),
            Err(e) => Outcome::terminate(Reason::FinalizerNotRemoved, e),
        }
    }

    async fn exists_in_provider(&self, d: &Deployment) -> ProviderResult<bool> {
        let project_id = d.spec.project_id.as_str();
        let name = d.deployment_name();
        Ok(match d.kind() {
            Some(DeploymentKind::Advanced) => {
                observe(self.provider.get_cluster(project_id, name).await)?.is_present()
            }
            Some(DeploymentKind::Serverless) => {
                observe(self.provider.get_serverless(project_id, name).await)?.is_present()
            }
            Some(DeploymentKind::Flex) => {
                observe(self.provider.get_flex(project_id, name).await)?.is_present()
            }
            None => false,
        })
    }

    async fn delete_from_provider(&self, d: &Deployment) -> ProviderResult<()> {
        let project_id = d.spec.project_id.as_str();
        let name = d.deployment_name();
        match d.kind() {
            Some(DeploymentKind::Advanced) => self.provider.delete_cluster(project_id, name).await,
            Some(DeploymentKind::Serverless) => self.provider.delete_serverless(project_id, name).await,
            Some(DeploymentKind::Flex) => self.provider.delete_flex(project_id, name).await,
            None => Ok(()),
        }
    }
}
