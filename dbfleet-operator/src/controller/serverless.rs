use dbfleet_api::deployment::ServerlessSpec;
use dbfleet_api::{Deployment, Reason, Resource};
use tracing::{error, info};

use super::{lifecycle_outcome, record_provider_state, DeploymentReconciler};
use crate::observe::{observe, Observed};
use crate::provider::types::ServerlessInstance;
use crate::workflow::{aggregate, Context, Outcome};

impl DeploymentReconciler {
    pub(super) async fn reconcile_serverless(&self, d: &Deployment, ctx: &mut Context) -> Outcome {
        let Some(spec) = d.spec.serverless_spec.as_ref() else {
            return Outcome::terminate(Reason::Internal, "serverless spec is missing");
        };
        let project_id = d.spec.project_id.as_str();

        let observed = match observe(self.provider.get_serverless(project_id, &spec.name).await) {
            Ok(o) => o,
            Err(e) => return Outcome::terminate(Reason::Internal, e),
        };

        let instance = match observed {
            Observed::Present(instance) => instance,
            Observed::Absent => {
                info!("Creating serverless instance {} in project {}", spec.name, project_id);
                match self
                    .provider
                    .create_serverless(project_id, &desired_instance(spec))
                    .await
                {
                    Ok(instance) => {
                        self.events.deployment_created(&d.key(), &spec.name);
                        instance
                    }
                    Err(e) => {
                        error!("Failed to create serverless instance {}: {}", spec.name, e);
                        return Outcome::provider_failure(Reason::DeploymentNotCreatedInProvider, &e);
                    }
                }
            }
        };
        record_provider_state(ctx, &instance.state_name, instance.mongodb_version.clone());

        if let Some(outcome) = lifecycle_outcome(&instance.state_name) {
            return outcome;
        }

        if instance.termination_protection_enabled != spec.termination_protection_enabled
            || instance.tags != spec.tags
        {
            info!("Updating serverless instance {}", spec.name);
            let mut changes = instance.clone();
            changes.termination_protection_enabled = spec.termination_protection_enabled;
            changes.tags = spec.tags.clone();
            return match self
                .provider
                .update_serverless(project_id, &spec.name, &changes)
                .await
            {
                Ok(updated) => {
                    self.events.deployment_updated(&d.key(), &spec.name);
                    record_provider_state(ctx, &updated.state_name, updated.mongodb_version);
                    Outcome::in_progress(Reason::DeploymentUpdating, "deployment is updating")
                }
                Err(e) => Outcome::provider_failure(Reason::DeploymentNotUpdatedInProvider, &e),
            };
        }

        let outcome = aggregate([
            self.ensure_private_endpoints(d, spec, ctx).await,
            self.ensure_connection_secrets(d, instance.connection_strings.as_ref())
                .await,
        ]);
        if !outcome.is_ok() {
            return outcome;
        }

        self.ready(
            ctx,
            &instance.state_name,
            instance.mongodb_version,
            instance.connection_strings,
        )
    }
}

fn desired_instance(spec: &ServerlessSpec) -> ServerlessInstance {
    ServerlessInstance {
        name: spec.name.clone(),
        provider_settings: spec.provider_settings.clone(),
        termination_protection_enabled: spec.termination_protection_enabled,
        tags: spec.tags.clone(),
        ..Default::default()
    }
}
