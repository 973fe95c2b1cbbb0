//! Dedicated search nodes, converged through [`crate::convergence`].

use async_trait::async_trait;
use dbfleet_api::deployment::{AdvancedDeploymentSpec, SearchNodeSpec};
use dbfleet_api::{ConditionType, Deployment, Reason};

use super::DeploymentReconciler;
use crate::convergence::{converge, Convergent, Reasons};
use crate::observe::{observe_search_deployment, Observed};
use crate::provider::types::SearchDeployment;
use crate::provider::{Provider, Result};
use crate::workflow::{Context, Outcome};

struct SearchNodes<'a> {
    provider: &'a dyn Provider,
    project_id: &'a str,
    cluster: &'a str,
    specs: &'a [SearchNodeSpec],
}

#[async_trait]
impl Convergent for SearchNodes<'_> {
    type Snapshot = SearchDeployment;

    const CONDITION: ConditionType = ConditionType::SearchNodesReady;
    const REASONS: Reasons = Reasons {
        creating: Reason::SearchNodesCreating,
        updating: Reason::SearchNodesUpdating,
        deleting: Reason::SearchNodesDeleting,
        not_upserted: Reason::SearchNodesNotUpserted,
        not_deleted: Reason::SearchNodesNotDeleted,
        aborted: Reason::SearchNodesOperationAborted,
    };
    const NOUN: &'static str = "search nodes";

    fn is_desired(&self) -> bool {
        !self.specs.is_empty()
    }

    fn matches(&self, observed: &SearchDeployment) -> bool {
        observed.specs == self.specs
    }

    fn state_name<'a>(&self, observed: &'a SearchDeployment) -> &'a str {
        &observed.state_name
    }

    async fn observe(&self) -> Result<Observed<SearchDeployment>> {
        observe_search_deployment(
            self.provider
                .get_search_deployment(self.project_id, self.cluster)
                .await,
        )
    }

    async fn create(&self) -> Result<SearchDeployment> {
        self.provider
            .create_search_deployment(self.project_id, self.cluster, self.specs)
            .await
    }

    async fn update(&self) -> Result<SearchDeployment> {
        self.provider
            .update_search_deployment(self.project_id, self.cluster, self.specs)
            .await
    }

    async fn delete(&self) -> Result<()> {
        self.provider
            .delete_search_deployment(self.project_id, self.cluster)
            .await
    }
}

impl DeploymentReconciler {
    pub(super) async fn ensure_search_nodes(
        &self,
        d: &Deployment,
        spec: &AdvancedDeploymentSpec,
        ctx: &mut Context,
    ) -> Outcome {
        let nodes = SearchNodes {
            provider: self.provider.as_ref(),
            project_id: &d.spec.project_id,
            cluster: &spec.name,
            specs: &spec.search_nodes,
        };
        converge(&nodes, ctx).await
    }
}
