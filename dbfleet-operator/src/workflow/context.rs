use chrono::{DateTime, Utc};
use dbfleet_api::condition;
use dbfleet_api::deployment::DeploymentStatus;
use dbfleet_api::{Condition, ConditionType, Reason};

use super::result::Outcome;

/// Working state of one pass.
///
/// Sub-reconcilers write conditions and status fields here; the controller
/// persists the result once at the end of the pass. A pass that is dropped
/// before that point leaves the stored status untouched.
#[derive(Debug, Clone)]
pub struct Context {
    status: DeploymentStatus,
    now: DateTime<Utc>,
}

impl Context {
    pub fn new(status: DeploymentStatus) -> Self {
        Self {
            status,
            now: Utc::now(),
        }
    }

    pub fn status(&self) -> &DeploymentStatus {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut DeploymentStatus {
        &mut self.status
    }

    pub fn into_status(self) -> DeploymentStatus {
        self.status
    }

    pub fn condition(&self, type_: ConditionType) -> Option<&Condition> {
        condition::find(&self.status.conditions, type_)
    }

    /// Reason persisted by the previous pass, if any.
    pub fn last_reason(&self, type_: ConditionType) -> Option<Reason> {
        self.condition(type_).and_then(|c| c.reason)
    }

    /// Records the outcome under `type_`. Unmanaged outcomes remove the condition.
    pub fn set_condition_from(&mut self, type_: ConditionType, outcome: &Outcome) {
        if outcome.is_unmanaged() {
            self.unset_condition(type_);
            return;
        }
        condition::set(
            &mut self.status.conditions,
            outcome.to_condition(type_, self.now),
        );
    }

    pub fn set_condition_true(&mut self, type_: ConditionType) {
        condition::set(
            &mut self.status.conditions,
            Condition::ready(type_, self.now),
        );
    }

    pub fn unset_condition(&mut self, type_: ConditionType) {
        condition::unset(&mut self.status.conditions, type_);
    }
}
