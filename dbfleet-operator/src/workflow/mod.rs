//! Reconciliation results and the per-pass working context.
//!
//! Every sub-reconciler returns an [`Outcome`]. Outcomes are folded by
//! [`aggregate`] and finally mapped to a [`Requeue`] decision for the runner.

mod aggregate;
mod context;
mod result;

pub use aggregate::aggregate;
pub use context::Context;
pub use result::{Outcome, OutcomeKind, Requeue, Retry};
