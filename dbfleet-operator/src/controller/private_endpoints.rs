//! Serverless private endpoints.
//!
//! Endpoints are matched by name, which the provider keeps as the endpoint
//! comment. A new endpoint is first reserved; once reserved it is linked to
//! the client's cloud endpoint.

use dbfleet_api::deployment::{ServerlessPrivateEndpoint, ServerlessPrivateEndpointStatus, ServerlessSpec};
use dbfleet_api::{ConditionType, Deployment, Reason};
use tracing::info;

use super::DeploymentReconciler;
use crate::diff::diff_by;
use crate::provider::types::{ServerlessEndpoint, ENDPOINT_AVAILABLE, ENDPOINT_RESERVED};
use crate::workflow::{Context, Outcome};

impl DeploymentReconciler {
    pub(super) async fn ensure_private_endpoints(
        &self,
        d: &Deployment,
        spec: &ServerlessSpec,
        ctx: &mut Context,
    ) -> Outcome {
        if spec.provider_settings.backing_provider_name == "GCP" {
            if spec.private_endpoints.is_empty() {
                ctx.unset_condition(ConditionType::PrivateEndpointReady);
                return Outcome::unmanaged();
            }
            let outcome = Outcome::terminate(
                Reason::UnsupportedFeature,
                "serverless private endpoints are not supported for GCP",
            );
            ctx.set_condition_from(ConditionType::PrivateEndpointReady, &outcome);
            return outcome;
        }

        let outcome = self.sync_private_endpoints(d, spec, ctx).await;
        if outcome.is_unmanaged() {
            ctx.unset_condition(ConditionType::PrivateEndpointReady);
        } else if outcome.is_ok() {
            ctx.set_condition_true(ConditionType::PrivateEndpointReady);
        } else {
            ctx.set_condition_from(ConditionType::PrivateEndpointReady, &outcome);
        }
        outcome
    }

    async fn sync_private_endpoints(
        &self,
        d: &Deployment,
        spec: &ServerlessSpec,
        ctx: &mut Context,
    ) -> Outcome {
        let project_id = d.spec.project_id.as_str();
        let provider_name = spec.provider_settings.backing_provider_name.as_str();

        let observed = match self
            .provider
            .list_serverless_endpoints(project_id, &spec.name)
            .await
        {
            Ok(endpoints) => endpoints,
            Err(e) => return Outcome::terminate(Reason::PrivateEndpointFailed, e),
        };

        let changes = diff_by(
            &spec.private_endpoints,
            &observed,
            |pe| pe.name.clone(),
            |ep| ep.comment.clone().unwrap_or_default(),
            |pe, ep| !needs_link(pe, ep, provider_name),
        );

        for pe in &changes.to_create {
            info!("Reserving private endpoint {} for {}", pe.name, spec.name);
            if let Err(e) = self
                .provider
                .create_serverless_endpoint(project_id, &spec.name, &pe.name)
                .await
            {
                return Outcome::terminate(
                    Reason::PrivateEndpointFailed,
                    format!("failed to create private endpoint {}: {}", pe.name, e),
                );
            }
        }

        for &(pe, ep) in &changes.to_update {
            info!("Linking private endpoint {} of {}", pe.name, spec.name);
            let linked = ServerlessEndpoint {
                provider_name: Some(provider_name.to_string()),
                cloud_provider_endpoint_id: pe.cloud_provider_endpoint_id.clone(),
                private_endpoint_ip_address: pe.private_endpoint_ip_address.clone(),
                ..ep.clone()
            };
            if let Err(e) = self
                .provider
                .update_serverless_endpoint(project_id, &spec.name, &linked)
                .await
            {
                return Outcome::terminate(
                    Reason::PrivateEndpointFailed,
                    format!("failed to update private endpoint {}: {}", pe.name, e),
                );
            }
        }

        for ep in &changes.to_delete {
            info!("Deleting private endpoint {} of {}", ep.id, spec.name);
            if let Err(e) = self
                .provider
                .delete_serverless_endpoint(project_id, &spec.name, &ep.id)
                .await
            {
                return Outcome::terminate(
                    Reason::PrivateEndpointFailed,
                    format!("failed to delete private endpoint {}: {}", ep.id, e),
                );
            }
        }

        let current = match self
            .provider
            .list_serverless_endpoints(project_id, &spec.name)
            .await
        {
            Ok(endpoints) => endpoints,
            Err(e) => return Outcome::terminate(Reason::PrivateEndpointFailed, e),
        };
        ctx.status_mut().serverless_private_endpoints = current.iter().map(endpoint_status).collect();

        if spec.private_endpoints.is_empty() && current.is_empty() {
            return Outcome::unmanaged();
        }
        if current.iter().all(|ep| ep.status == ENDPOINT_AVAILABLE) && current.len() == spec.private_endpoints.len() {
            return Outcome::ok();
        }
        Outcome::in_progress(
            Reason::PrivateEndpointInProgress,
            "Waiting serverless private endpoint to be configured",
        )
    }
}

/// A reserved endpoint is linked once the client declares its cloud
/// endpoint. Azure also needs the endpoint IP address.
fn needs_link(desired: &ServerlessPrivateEndpoint, observed: &ServerlessEndpoint, provider_name: &str) -> bool {
    if observed.status != ENDPOINT_RESERVED || desired.cloud_provider_endpoint_id.is_none() {
        return false;
    }
    provider_name != "AZURE" || desired.private_endpoint_ip_address.is_some()
}

fn endpoint_status(ep: &ServerlessEndpoint) -> ServerlessPrivateEndpointStatus {
    ServerlessPrivateEndpointStatus {
        id: ep.id.clone(),
        name: ep.comment.clone().unwrap_or_default(),
        status: ep.status.clone(),
        endpoint_service_name: ep.endpoint_service_name.clone(),
        error_message: ep.error_message.clone(),
    }
}
