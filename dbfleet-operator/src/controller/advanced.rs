//! Advanced (dedicated and shared-tier) clusters.

use dbfleet_api::deployment::{AdvancedDeploymentSpec, ReplicationSpec};
use dbfleet_api::{Deployment, Reason, Resource};
use tracing::{error, info};

use super::{lifecycle_outcome, record_provider_state, DeploymentReconciler};
use crate::observe::{observe, Observed};
use crate::provider::types::{Cluster, STATE_UPDATING};
use crate::workflow::{aggregate, Context, Outcome};

impl DeploymentReconciler {
    pub(super) async fn reconcile_advanced(&self, d: &Deployment, ctx: &mut Context) -> Outcome {
        let Some(spec) = d.spec.deployment_spec.as_ref() else {
            return Outcome::terminate(Reason::Internal, "advanced deployment spec is missing");
        };
        let project_id = d.spec.project_id.as_str();
        let desired = desired_cluster(spec);

        let observed = match observe(self.provider.get_cluster(project_id, &spec.name).await) {
            Ok(o) => o,
            Err(e) => return Outcome::terminate(Reason::Internal, e),
        };

        let cluster = match observed {
            Observed::Present(cluster) => cluster,
            Observed::Absent => {
                info!("Creating cluster {} in project {}", spec.name, project_id);
                match self.provider.create_cluster(project_id, &desired).await {
                    Ok(cluster) => {
                        self.events.deployment_created(&d.key(), &spec.name);
                        cluster
                    }
                    Err(e) => {
                        error!("Failed to create cluster {}: {}", spec.name, e);
                        return Outcome::provider_failure(Reason::DeploymentNotCreatedInProvider, &e);
                    }
                }
            }
        };
        record_provider_state(ctx, &cluster.state_name, cluster.mongodb_version.clone());

        if d.spec.upgrade_to_dedicated && cluster.is_tenant() {
            return self.upgrade_to_dedicated(d, &desired, &cluster).await;
        }

        if let Some(outcome) = lifecycle_outcome(&cluster.state_name) {
            return outcome;
        }

        if let Some(changes) = compute_changes(&desired, &cluster) {
            info!("Updating cluster {}", spec.name);
            return match self.provider.update_cluster(project_id, &spec.name, &changes).await {
                Ok(updated) => {
                    self.events.deployment_updated(&d.key(), &spec.name);
                    record_provider_state(ctx, &updated.state_name, updated.mongodb_version);
                    Outcome::in_progress(Reason::DeploymentUpdating, "deployment is updating")
                }
                Err(e) => Outcome::provider_failure(Reason::DeploymentNotUpdatedInProvider, &e),
            };
        }

        let backup = self.ensure_backup(d, spec, &cluster, ctx).await;
        if !backup.is_ok() {
            return backup;
        }

        let args = self.ensure_process_args(d, &cluster).await;
        if !args.is_ok() {
            return args;
        }

        let outcome = aggregate([
            self.ensure_search_nodes(d, spec, ctx).await,
            self.ensure_search_indexes(d, spec, ctx).await,
            self.ensure_zone_mapping(d, spec, &cluster, ctx).await,
            self.ensure_managed_namespaces(d, spec, ctx).await,
            self.ensure_connection_secrets(d, cluster.connection_strings.as_ref())
                .await,
        ]);
        if !outcome.is_ok() {
            return outcome;
        }

        self.ready(
            ctx,
            &cluster.state_name,
            cluster.mongodb_version,
            cluster.connection_strings,
        )
    }

    async fn upgrade_to_dedicated(&self, d: &Deployment, desired: &Cluster, current: &Cluster) -> Outcome {
        if current.state_name == STATE_UPDATING {
            return Outcome::in_progress(Reason::DeploymentUpdating, "deployment is updating");
        }

        info!("Upgrading shared-tier cluster {} to a dedicated tier", desired.name);
        match self.provider.upgrade_tenant(&d.spec.project_id, desired).await {
            Ok(_) => Outcome::in_progress(
                Reason::DedicatedMigrationProgressing,
                "cluster upgrade to dedicated instance initiated, the process may take several minutes",
            ),
            Err(e) => Outcome::terminate(
                Reason::DedicatedMigrationFailed,
                format!("failed to upgrade cluster: {}", e),
            ),
        }
    }
}

/// Provider representation of the declared cluster.
fn desired_cluster(spec: &AdvancedDeploymentSpec) -> Cluster {
    Cluster {
        name: spec.name.clone(),
        cluster_type: spec.cluster_type,
        mongodb_major_version: spec.mongodb_major_version.clone(),
        backup_enabled: spec.backup_enabled,
        termination_protection_enabled: spec.termination_protection_enabled,
        paused: spec.paused,
        replication_specs: spec.replication_specs.clone(),
        tags: spec.tags.clone(),
        ..Default::default()
    }
}

/// Returns the update to submit, or `None` when the observed cluster already
/// carries the declared settings. Provider-assigned zone ids are carried
/// over so existing zones are modified in place.
fn compute_changes(desired: &Cluster, observed: &Cluster) -> Option<Cluster> {
    let same = desired.cluster_type == observed.cluster_type
        && desired.backup_enabled == observed.backup_enabled
        && desired.termination_protection_enabled == observed.termination_protection_enabled
        && desired.paused == observed.paused
        && desired.tags == observed.tags
        && (desired.mongodb_major_version.is_none()
            || desired.mongodb_major_version == observed.mongodb_major_version)
        && strip_ids(&desired.replication_specs) == strip_ids(&observed.replication_specs);
    if same {
        return None;
    }

    let mut changes = desired.clone();
    for (i, spec) in changes.replication_specs.iter_mut().enumerate() {
        let existing = observed
            .replication_specs
            .iter()
            .find(|o| spec.zone_name.is_some() && o.zone_name == spec.zone_name)
            .or_else(|| observed.replication_specs.get(i));
        spec.id = existing.and_then(|o| o.id.clone());
    }
    Some(changes)
}

fn strip_ids(specs: &[ReplicationSpec]) -> Vec<ReplicationSpec> {
    specs
        .iter()
        .map(|s| ReplicationSpec {
            id: None,
            ..s.clone()
        })
        .collect()
}
