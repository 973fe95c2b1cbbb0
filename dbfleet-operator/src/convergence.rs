//! Convergence state machine for asynchronous sub-resources.
//!
//! A sub-resource that the provider builds in the background (search nodes)
//! has no in-memory phase. The phase is re-derived every pass from the reason
//! of the condition persisted by the previous pass:
//!
//! | persisted reason | handler   |
//! |------------------|-----------|
//! | creating, updating | upserting |
//! | deleting         | deleting  |
//! | anything else    | pending   |
//!
//! Each handler writes a detailed message to the sub-resource condition and
//! returns a coarse one for the parent.

use async_trait::async_trait;
use dbfleet_api::{ConditionType, Reason};
use tracing::{debug, error};

use crate::observe::Observed;
use crate::provider::Result;
use crate::provider::types::STATE_IDLE;
use crate::workflow::{Context, Outcome};

/// Reasons a convergent sub-resource reports in its condition.
#[derive(Debug, Clone, Copy)]
pub struct Reasons {
    pub creating: Reason,
    pub updating: Reason,
    pub deleting: Reason,
    pub not_upserted: Reason,
    pub not_deleted: Reason,
    pub aborted: Reason,
}

/// A sub-resource driven by [`converge`].
#[async_trait]
pub trait Convergent: Send + Sync {
    /// Provider-side snapshot.
    type Snapshot: Send + Sync;

    const CONDITION: ConditionType;
    const REASONS: Reasons;
    /// Plural noun used in messages, e.g. "search nodes".
    const NOUN: &'static str;

    /// Whether the desired state asks for the sub-resource at all.
    fn is_desired(&self) -> bool;

    /// Whether the observed snapshot already carries the desired spec.
    fn matches(&self, observed: &Self::Snapshot) -> bool;

    fn state_name<'a>(&self, observed: &'a Self::Snapshot) -> &'a str;

    async fn observe(&self) -> Result<Observed<Self::Snapshot>>;
    async fn create(&self) -> Result<Self::Snapshot>;
    async fn update(&self) -> Result<Self::Snapshot>;
    async fn delete(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pending,
    Upserting(Reason),
    Deleting,
}

fn phase_of<C: Convergent>(ctx: &Context) -> Phase {
    match ctx.last_reason(C::CONDITION) {
        Some(r) if r == C::REASONS.creating || r == C::REASONS.updating => Phase::Upserting(r),
        Some(r) if r == C::REASONS.deleting => Phase::Deleting,
        _ => Phase::Pending,
    }
}

/// Runs one step of the state machine for `c`.
pub async fn converge<C: Convergent>(c: &C, ctx: &mut Context) -> Outcome {
    let phase = phase_of::<C>(ctx);
    debug!(noun = C::NOUN, ?phase, "converging");
    let mut step = Step { c, ctx };
    match phase {
        Phase::Pending => step.handle_pending().await,
        Phase::Upserting(reason) => step.handle_upserting(reason).await,
        Phase::Deleting => step.handle_deleting().await,
    }
}

struct Step<'a, C: Convergent> {
    c: &'a C,
    ctx: &'a mut Context,
}

impl<C: Convergent> Step<'_, C> {
    async fn handle_pending(&mut self) -> Outcome {
        let observed = match self.c.observe().await {
            Ok(o) => o,
            Err(e) => return self.terminate(Reason::Internal, e),
        };

        match (self.c.is_desired(), observed) {
            (true, Observed::Absent) => self.create().await,
            (true, Observed::Present(snapshot)) => self.update(&snapshot).await,
            (false, Observed::Present(_)) => self.delete().await,
            (false, Observed::Absent) => self.unmanage(),
        }
    }

    async fn handle_upserting(&mut self, reason: Reason) -> Outcome {
        let reasons = C::REASONS;
        if !self.c.is_desired() {
            return self.terminate(
                reasons.aborted,
                format!("aborting update/create: no {} specified", C::NOUN),
            );
        }

        let snapshot = match self.c.observe().await {
            Ok(Observed::Present(s)) => s,
            Ok(Observed::Absent) => {
                return self.terminate(reasons.not_upserted, format!("no {} found", C::NOUN));
            }
            Err(e) => return self.terminate(reasons.not_upserted, e),
        };

        if !self.c.matches(&snapshot) {
            return self.terminate(reasons.aborted, "aborting update/create: spec has changed");
        }

        let state = self.c.state_name(&snapshot);
        if state != STATE_IDLE {
            let fine = format!("{} are not ready yet: provider state is {:?}", C::NOUN, state);
            let coarse = format!("waiting for {} to become ready", C::NOUN);
            return self.progress(reason, fine, coarse);
        }
        self.idle()
    }

    async fn handle_deleting(&mut self) -> Outcome {
        let reasons = C::REASONS;
        if self.c.is_desired() {
            return self.terminate(
                reasons.aborted,
                format!("aborting deletion: {} are specified", C::NOUN),
            );
        }

        match self.c.observe().await {
            Err(e) => self.terminate(reasons.not_upserted, e),
            Ok(Observed::Present(snapshot)) => {
                let fine = format!(
                    "{} are being deleted, provider state: {:?}",
                    C::NOUN,
                    self.c.state_name(&snapshot)
                );
                self.progress(reasons.deleting, fine, format!("deleting {}", C::NOUN))
            }
            Ok(Observed::Absent) => self.unmanage(),
        }
    }

    async fn create(&mut self) -> Outcome {
        debug!(noun = C::NOUN, "creating");
        match self.c.create().await {
            Ok(snapshot) => {
                let fine = format!(
                    "{} are not ready yet: provider state is {:?}",
                    C::NOUN,
                    self.c.state_name(&snapshot)
                );
                self.progress(C::REASONS.creating, fine, format!("creating {}", C::NOUN))
            }
            Err(e) => self.failed(C::REASONS.not_upserted, e),
        }
    }

    async fn update(&mut self, observed: &C::Snapshot) -> Outcome {
        let updating = C::REASONS.updating;
        if !self.c.matches(observed) {
            debug!(noun = C::NOUN, "updating");
            return match self.c.update().await {
                Ok(snapshot) => {
                    let fine = format!(
                        "{} are not ready yet: provider state is {:?}",
                        C::NOUN,
                        self.c.state_name(&snapshot)
                    );
                    self.progress(updating, fine, format!("updating {}", C::NOUN))
                }
                Err(e) => self.failed(C::REASONS.not_upserted, e),
            };
        }

        let state = self.c.state_name(observed);
        if state != STATE_IDLE {
            let fine = format!("{} are not ready yet: provider state is {:?}", C::NOUN, state);
            return self.progress(updating, fine, format!("updating {}", C::NOUN));
        }
        self.idle()
    }

    async fn delete(&mut self) -> Outcome {
        debug!(noun = C::NOUN, "deleting");
        match self.c.delete().await {
            Ok(()) => {
                let msg = format!("deleting {}", C::NOUN);
                self.progress(C::REASONS.deleting, msg.clone(), msg)
            }
            Err(e) => self.failed(C::REASONS.not_deleted, e),
        }
    }

    fn progress(&mut self, reason: Reason, fine: String, coarse: String) -> Outcome {
        self.ctx
            .set_condition_from(C::CONDITION, &Outcome::in_progress(reason, fine));
        Outcome::in_progress(reason, coarse)
    }

    fn terminate(&mut self, reason: Reason, err: impl std::fmt::Display) -> Outcome {
        error!(noun = C::NOUN, %reason, "{}", err);
        let result = Outcome::terminate(reason, err);
        self.ctx.set_condition_from(C::CONDITION, &result);
        result
    }

    fn failed(&mut self, reason: Reason, err: crate::provider::ProviderError) -> Outcome {
        let result = Outcome::provider_failure(reason, &err);
        if result.is_terminate() {
            return self.terminate(reason, err);
        }
        self.ctx.set_condition_from(C::CONDITION, &result);
        result
    }

    fn unmanage(&mut self) -> Outcome {
        self.ctx.unset_condition(C::CONDITION);
        Outcome::unmanaged()
    }

    fn idle(&mut self) -> Outcome {
        self.ctx.set_condition_true(C::CONDITION);
        Outcome::ok()
    }
}
