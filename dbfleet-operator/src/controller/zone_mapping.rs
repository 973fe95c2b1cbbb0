use dbfleet_api::deployment::{AdvancedDeploymentSpec, ClusterType};
use dbfleet_api::{ConditionType, Deployment, Reason};
use tracing::info;

use super::DeploymentReconciler;
use crate::diff::compare_zone_mappings;
use crate::provider::types::Cluster;
use crate::workflow::{Context, Outcome};

impl DeploymentReconciler {
    /// Converges the location to zone mapping of a geo-sharded cluster.
    pub(super) async fn ensure_zone_mapping(
        &self,
        d: &Deployment,
        spec: &AdvancedDeploymentSpec,
        cluster: &Cluster,
        ctx: &mut Context,
    ) -> Outcome {
        if spec.cluster_type != ClusterType::GeoSharded {
            ctx.unset_condition(ConditionType::ZoneMappingReady);
            ctx.status_mut().custom_zone_mapping.clear();
            return Outcome::unmanaged();
        }

        let outcome = self.sync_zone_mapping(d, spec, cluster, ctx).await;
        if outcome.is_unmanaged() {
            ctx.unset_condition(ConditionType::ZoneMappingReady);
        } else if outcome.is_ok() {
            ctx.set_condition_true(ConditionType::ZoneMappingReady);
        } else {
            ctx.set_condition_from(ConditionType::ZoneMappingReady, &outcome);
        }
        outcome
    }

    async fn sync_zone_mapping(
        &self,
        d: &Deployment,
        spec: &AdvancedDeploymentSpec,
        cluster: &Cluster,
        ctx: &mut Context,
    ) -> Outcome {
        let project_id = d.spec.project_id.as_str();
        let geo = match self.provider.get_geo_sharding(project_id, &spec.name).await {
            Ok(geo) => geo,
            Err(e) => return Outcome::terminate(Reason::ZoneMappingFailed, e),
        };

        if spec.custom_zone_mapping.is_empty() && geo.custom_zone_mapping.is_empty() {
            ctx.status_mut().custom_zone_mapping.clear();
            return Outcome::unmanaged();
        }

        let (should_create, should_delete) = compare_zone_mappings(
            &geo.custom_zone_mapping,
            &spec.custom_zone_mapping,
            &cluster.zone_names(),
        );

        let mut current = geo.custom_zone_mapping;
        if should_delete {
            info!("Removing custom zone mappings of {}", spec.name);
            match self
                .provider
                .delete_custom_zone_mappings(project_id, &spec.name)
                .await
            {
                Ok(geo) => current = geo.custom_zone_mapping,
                Err(e) => {
                    return Outcome::terminate(
                        Reason::ZoneMappingFailed,
                        format!("failed to delete custom zone mapping: {}", e),
                    )
                }
            }
        }

        if should_create {
            info!("Applying {} custom zone mappings to {}", spec.custom_zone_mapping.len(), spec.name);
            match self
                .provider
                .create_custom_zone_mappings(project_id, &spec.name, &spec.custom_zone_mapping)
                .await
            {
                Ok(geo) => current = geo.custom_zone_mapping,
                Err(e) => {
                    return Outcome::terminate(
                        Reason::ZoneMappingFailed,
                        format!("failed to create custom zone mapping: {}", e),
                    )
                }
            }
        }

        ctx.status_mut().custom_zone_mapping = current;
        if spec.custom_zone_mapping.is_empty() {
            Outcome::unmanaged()
        } else {
            Outcome::ok()
        }
    }
}
