use dbfleet_api::deployment::ProcessArgs;
use dbfleet_api::{Deployment, Reason};
use tracing::{info, warn};

use super::DeploymentReconciler;
use crate::provider::types::Cluster;
use crate::workflow::Outcome;

const DEFAULT_TLS_PROTOCOL: &str = "TLS1_2";

impl DeploymentReconciler {
    /// Applies advanced process configuration. Shared-tier clusters do not
    /// support it and are skipped.
    pub(super) async fn ensure_process_args(&self, d: &Deployment, cluster: &Cluster) -> Outcome {
        let Some(desired) = d.spec.process_args.as_ref() else {
            return Outcome::ok();
        };
        if cluster.is_tenant() {
            return Outcome::ok();
        }
        if desired.default_read_concern.is_some() {
            warn!("default read concern is no longer configurable and has no effect");
        }

        let project_id = d.spec.project_id.as_str();
        let current = match self.provider.get_process_args(project_id, &cluster.name).await {
            Ok(args) => args,
            Err(e) => return Outcome::terminate(Reason::DeploymentAdvancedOptionsNotUpdated, e),
        };
        if in_sync(desired, &current) {
            return Outcome::ok();
        }

        info!("Updating process arguments of {}", cluster.name);
        match self
            .provider
            .update_process_args(project_id, &cluster.name, desired)
            .await
        {
            Ok(_) => Outcome::in_progress(Reason::DeploymentUpdating, "deployment is updating"),
            Err(e) => Outcome::provider_failure(Reason::DeploymentAdvancedOptionsNotUpdated, &e),
        }
    }
}

/// Fills in the server defaults the provider reports for unset options and
/// clears the retired read concern.
fn normalize(args: &ProcessArgs) -> ProcessArgs {
    ProcessArgs {
        default_read_concern: None,
        javascript_enabled: Some(args.javascript_enabled.unwrap_or(true)),
        minimum_enabled_tls_protocol: Some(
            args.minimum_enabled_tls_protocol
                .clone()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_TLS_PROTOCOL.to_string()),
        ),
        no_table_scan: Some(args.no_table_scan.unwrap_or(false)),
        ..args.clone()
    }
}

/// Options left unset in the record accept whatever the provider runs with.
fn in_sync(desired: &ProcessArgs, current: &ProcessArgs) -> bool {
    let current = normalize(current);
    let mut desired = normalize(desired);
    if desired.default_write_concern.is_none() {
        desired.default_write_concern = current.default_write_concern.clone();
    }
    if desired.oplog_size_mb.is_none() {
        desired.oplog_size_mb = current.oplog_size_mb;
    }
    desired == current
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_reported() -> ProcessArgs {
        ProcessArgs {
            default_read_concern: None,
            default_write_concern: Some("majority".to_string()),
            minimum_enabled_tls_protocol: Some("TLS1_2".to_string()),
            javascript_enabled: Some(true),
            no_table_scan: Some(false),
            oplog_size_mb: Some(2048),
        }
    }

    #[test]
    fn test_partial_args_match_reported_defaults() {
        let desired = ProcessArgs {
            oplog_size_mb: Some(2048),
            default_read_concern: Some("local".to_string()),
            ..Default::default()
        };
        assert!(in_sync(&desired, &make_reported()));
        assert!(in_sync(&ProcessArgs::default(), &make_reported()));
    }

    #[test]
    fn test_explicit_difference_is_detected() {
        let desired = ProcessArgs {
            javascript_enabled: Some(false),
            ..Default::default()
        };
        assert!(!in_sync(&desired, &make_reported()));

        let desired = ProcessArgs {
            oplog_size_mb: Some(4096),
            ..Default::default()
        };
        assert!(!in_sync(&desired, &make_reported()));
    }
}
