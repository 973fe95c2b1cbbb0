use dbfleet_api::deployment::FlexSpec;
use dbfleet_api::{Deployment, Reason, Resource};
use tracing::{error, info};

use super::{lifecycle_outcome, record_provider_state, DeploymentReconciler};
use crate::observe::{observe, Observed};
use crate::provider::types::FlexInstance;
use crate::workflow::{Context, Outcome};

impl DeploymentReconciler {
    /// Flex clusters have fixed provider settings; only protection and
    /// tags are updated in place.
    pub(super) async fn reconcile_flex(&self, d: &Deployment, ctx: &mut Context) -> Outcome {
        let Some(spec) = d.spec.flex_spec.as_ref() else {
            return Outcome::terminate(Reason::Internal, "flex spec is missing");
        };
        let project_id = d.spec.project_id.as_str();

        let observed = match observe(self.provider.get_flex(project_id, &spec.name).await) {
            Ok(o) => o,
            Err(e) => return Outcome::terminate(Reason::Internal, e),
        };

        let instance = match observed {
            Observed::Present(instance) => instance,
            Observed::Absent => {
                info!("Creating flex cluster {} in project {}", spec.name, project_id);
                match self.provider.create_flex(project_id, &desired_instance(spec)).await {
                    Ok(instance) => {
                        self.events.deployment_created(&d.key(), &spec.name);
                        instance
                    }
                    Err(e) => {
                        error!("Failed to create flex cluster {}: {}", spec.name, e);
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
            info!("Updating flex cluster {}", spec.name);
            let mut changes = instance.clone();
            changes.termination_protection_enabled = spec.termination_protection_enabled;
            changes.tags = spec.tags.clone();
            return match self.provider.update_flex(project_id, &spec.name, &changes).await {
                Ok(updated) => {
                    self.events.deployment_updated(&d.key(), &spec.name);
                    record_provider_state(ctx, &updated.state_name, updated.mongodb_version);
                    Outcome::in_progress(Reason::DeploymentUpdating, "deployment is updating")
                }
                Err(e) => Outcome::provider_failure(Reason::DeploymentNotUpdatedInProvider, &e),
            };
        }

        let secrets = self
            .ensure_connection_secrets(d, instance.connection_strings.as_ref())
            .await;
        if !secrets.is_ok() {
            return secrets;
        }

        self.ready(
            ctx,
            &instance.state_name,
            instance.mongodb_version,
            instance.connection_strings,
        )
    }
}

fn desired_instance(spec: &FlexSpec) -> FlexInstance {
    FlexInstance {
        name: spec.name.clone(),
        provider_settings: spec.provider_settings.clone(),
        termination_protection_enabled: spec.termination_protection_enabled,
        tags: spec.tags.clone(),
        ..Default::default()
    }
}
