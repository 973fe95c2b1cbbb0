//! Managed namespaces of geo-sharded clusters.
//!
//! Namespaces are matched by `db.collection` only. The provider does not
//! modify a namespace once created, so a changed shard key is not applied.

use dbfleet_api::deployment::{AdvancedDeploymentSpec, ClusterType, ManagedNamespaceStatus};
use dbfleet_api::{ConditionType, Deployment, Reason};
use tracing::{info, warn};

use super::DeploymentReconciler;
use crate::diff::diff;
use crate::workflow::{Context, Outcome};

const NAMESPACE_CREATED: &str = "CREATED";
const NAMESPACE_FAILED: &str = "FAILED";

impl DeploymentReconciler {
    pub(super) async fn ensure_managed_namespaces(
        &self,
        d: &Deployment,
        spec: &AdvancedDeploymentSpec,
        ctx: &mut Context,
    ) -> Outcome {
        if spec.cluster_type != ClusterType::GeoSharded {
            ctx.unset_condition(ConditionType::ManagedNamespacesReady);
            ctx.status_mut().managed_namespaces.clear();
            return Outcome::unmanaged();
        }

        let project_id = d.spec.project_id.as_str();
        let geo = match self.provider.get_geo_sharding(project_id, &spec.name).await {
            Ok(geo) => geo,
            Err(e) => {
                let outcome = Outcome::terminate(Reason::ManagedNamespacesFailed, e);
                ctx.set_condition_from(ConditionType::ManagedNamespacesReady, &outcome);
                return outcome;
            }
        };

        if spec.managed_namespaces.is_empty() && geo.managed_namespaces.is_empty() {
            ctx.unset_condition(ConditionType::ManagedNamespacesReady);
            ctx.status_mut().managed_namespaces.clear();
            return Outcome::unmanaged();
        }

        let changes = diff(
            &spec.managed_namespaces,
            &geo.managed_namespaces,
            |ns| (ns.db.clone(), ns.collection.clone()),
            |_, _| true,
        );

        let mut statuses = Vec::new();
        let mut errors = Vec::new();

        for (ns, _) in &changes.to_keep {
            statuses.push(namespace_status(&ns.db, &ns.collection, NAMESPACE_CREATED, None));
        }

        for ns in &changes.to_create {
            info!("Creating managed namespace {}.{}", ns.db, ns.collection);
            match self
                .provider
                .create_managed_namespace(project_id, &spec.name, ns)
                .await
            {
                Ok(_) => statuses.push(namespace_status(&ns.db, &ns.collection, NAMESPACE_CREATED, None)),
                Err(e) => {
                    warn!("failed to create managed namespace {}.{}: {}", ns.db, ns.collection, e);
                    statuses.push(namespace_status(
                        &ns.db,
                        &ns.collection,
                        NAMESPACE_FAILED,
                        Some(e.to_string()),
                    ));
                    errors.push(format!("{}.{}: {}", ns.db, ns.collection, e));
                }
            }
        }

        for ns in &changes.to_delete {
            info!("Deleting managed namespace {}.{}", ns.db, ns.collection);
            if let Err(e) = self
                .provider
                .delete_managed_namespace(project_id, &spec.name, &ns.db, &ns.collection)
                .await
            {
                warn!("failed to delete managed namespace {}.{}: {}", ns.db, ns.collection, e);
                statuses.push(namespace_status(
                    &ns.db,
                    &ns.collection,
                    NAMESPACE_FAILED,
                    Some(e.to_string()),
                ));
                errors.push(format!("{}.{}: {}", ns.db, ns.collection, e));
            }
        }

        ctx.status_mut().managed_namespaces = statuses;

        if !errors.is_empty() {
            let outcome = Outcome::terminate(
                Reason::ManagedNamespacesFailed,
                format!("failed to converge managed namespaces: {}", errors.join("; ")),
            );
            ctx.set_condition_from(ConditionType::ManagedNamespacesReady, &outcome);
            return outcome;
        }

        if spec.managed_namespaces.is_empty() {
            ctx.unset_condition(ConditionType::ManagedNamespacesReady);
            return Outcome::unmanaged();
        }
        ctx.set_condition_true(ConditionType::ManagedNamespacesReady);
        Outcome::ok()
    }
}

fn namespace_status(db: &str, collection: &str, status: &str, error: Option<String>) -> ManagedNamespaceStatus {
    ManagedNamespaceStatus {
        db: db.to_string(),
        collection: collection.to_string(),
        status: status.to_string(),
        error,
    }
}
