//! Backup schedule attachment and provider sync.

use dbfleet_api::deployment::AdvancedDeploymentSpec;
use dbfleet_api::{BackupPolicy, BackupSchedule, ConditionType, Deployment, Reason, Resource};
use tracing::{debug, info};

use super::DeploymentReconciler;
use crate::observe::observe;
use crate::provider::types::{self, BackupCopySetting, Cluster};
use crate::workflow::{Context, Outcome};

impl DeploymentReconciler {
    pub(super) async fn ensure_backup(
        &self,
        d: &Deployment,
        spec: &AdvancedDeploymentSpec,
        cluster: &Cluster,
        ctx: &mut Context,
    ) -> Outcome {
        let outcome = self.sync_backup(d, spec, cluster).await;
        if outcome.is_unmanaged() {
            ctx.unset_condition(ConditionType::BackupReady);
        } else if outcome.is_terminate() {
            ctx.set_condition_from(ConditionType::BackupReady, &outcome);
        } else {
            ctx.set_condition_true(ConditionType::BackupReady);
        }
        outcome
    }

    async fn sync_backup(&self, d: &Deployment, spec: &AdvancedDeploymentSpec, cluster: &Cluster) -> Outcome {
        let name = spec.name.as_str();
        let project_id = d.spec.project_id.as_str();

        let Some(schedule_ref) = d.spec.backup_schedule_ref.as_ref().filter(|r| !r.name.is_empty()) else {
            debug!("no backup schedule referenced by {}", name);
            return match self.ledger.release_deployment(name, None).await {
                Ok(_) => Outcome::unmanaged(),
                Err(e) => Outcome::terminate(Reason::Internal, e),
            };
        };

        if !spec.backup_enabled {
            return Outcome::terminate(
                Reason::BackupNotConfigured,
                format!(
                    "can not proceed with backup configuration. Backups are not enabled for cluster {}",
                    name
                ),
            );
        }

        let schedule_key = schedule_ref.key(&d.meta.namespace);
        if let Err(e) = self.ledger.release_deployment(name, Some(&schedule_key)).await {
            return Outcome::terminate(Reason::Internal, e);
        }

        let schedule: BackupSchedule = match self.ledger.attach(&schedule_key, name).await {
            Ok(s) => s,
            Err(e) => {
                return Outcome::terminate(
                    Reason::Internal,
                    format!("backup schedule {} is not available: {}", schedule_key, e),
                )
            }
        };

        let policy_key = schedule.spec.policy_ref.key(&schedule.meta.namespace);
        let policy: BackupPolicy = match self.ledger.attach(&policy_key, &schedule_key.to_string()).await {
            Ok(p) => p,
            Err(e) => {
                return Outcome::terminate(
                    Reason::Internal,
                    format!("backup policy {} is not available: {}", policy_key, e),
                )
            }
        };

        let current = match observe(self.provider.get_backup_schedule(project_id, name).await) {
            Ok(s) => s.present().unwrap_or_default(),
            Err(e) => {
                return Outcome::terminate(
                    Reason::Internal,
                    format!(
                        "unable to get current backup configuration for project {}:{}, {}",
                        project_id, name, e
                    ),
                )
            }
        };

        let zone_id = cluster.replication_specs.first().and_then(|r| r.id.clone());
        let desired = desired_schedule(name, &schedule, &policy, &current, zone_id);
        if normalize(&current) == normalize(&desired) {
            debug!("backup schedule of {} is up to date", name);
            return Outcome::ok();
        }

        info!("Updating backup schedule of {} from {}", name, schedule.key());
        match self.provider.update_backup_schedule(project_id, name, &desired).await {
            Ok(_) => Outcome::in_progress(Reason::DeploymentUpdating, "deployment is updating"),
            Err(e) => Outcome::terminate(
                Reason::BackupScheduleNotUpdated,
                format!("unable to update backup schedule for {}: {}", name, e),
            ),
        }
    }
}

/// Provider schedule for `name` built from the referenced records. The
/// provider's policy id is reused; copy settings target the first zone.
fn desired_schedule(
    name: &str,
    schedule: &BackupSchedule,
    policy: &BackupPolicy,
    current: &types::BackupSchedule,
    zone_id: Option<String>,
) -> types::BackupSchedule {
    let spec = &schedule.spec;
    types::BackupSchedule {
        cluster_name: name.to_string(),
        reference_hour_of_day: spec.reference_hour_of_day,
        reference_minute_of_hour: spec.reference_minute_of_hour,
        restore_window_days: spec.restore_window_days,
        auto_export_enabled: spec.auto_export_enabled,
        use_org_and_group_names_in_export_prefix: spec.use_org_and_group_names_in_export_prefix,
        copy_settings: spec
            .copy_settings
            .iter()
            .map(|c| BackupCopySetting {
                cloud_provider: c.cloud_provider.clone(),
                region_name: c.region_name.clone(),
                zone_id: zone_id.clone(),
                should_copy_oplogs: c.should_copy_oplogs,
                frequencies: c.frequencies.clone(),
            })
            .collect(),
        policies: vec![types::BackupPolicy {
            id: current.policies.first().and_then(|p| p.id.clone()),
            policy_items: policy
                .spec
                .items
                .iter()
                .map(|i| types::BackupPolicyItem {
                    id: None,
                    frequency_type: i.frequency_type.clone(),
                    frequency_interval: i.frequency_interval,
                    retention_unit: i.retention_unit.clone(),
                    retention_value: i.retention_value,
                })
                .collect(),
        }],
        next_snapshot: None,
    }
}

/// Drops provider-assigned fields before comparing schedules.
fn normalize(schedule: &types::BackupSchedule) -> types::BackupSchedule {
    let mut s = schedule.clone();
    s.next_snapshot = None;
    for c in &mut s.copy_settings {
        c.zone_id = None;
    }
    for p in &mut s.policies {
        p.id = None;
        for item in &mut p.policy_items {
            item.id = None;
        }
    }
    s
}
