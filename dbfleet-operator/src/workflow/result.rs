use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dbfleet_api::{Condition, ConditionType, Reason};

use crate::provider::ProviderError;

/// Tri-state result of one reconciliation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeKind {
    /// Converged. `unmanaged` means the sub-resource is absent on both sides
    /// and its condition should be cleared rather than set.
    Ok { unmanaged: bool },
    InProgress { reason: Reason, message: String },
    Terminate { reason: Reason, error: String },
}

/// Retry hint attached to an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retry {
    /// Use the operator's default retry interval.
    #[default]
    Default,
    After(Duration),
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    kind: OutcomeKind,
    retry: Retry,
}

/// What the runner does after a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requeue {
    /// Wait for an external trigger.
    Never,
    After(Duration),
    /// Back off and retry; a Terminate condition has been persisted.
    Fatal(String),
}

impl Outcome {
    pub fn ok() -> Self {
        Self {
            kind: OutcomeKind::Ok { unmanaged: false },
            retry: Retry::Default,
        }
    }

    pub fn unmanaged() -> Self {
        Self {
            kind: OutcomeKind::Ok { unmanaged: true },
            retry: Retry::Default,
        }
    }

    pub fn in_progress(reason: Reason, message: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::InProgress {
                reason,
                message: message.into(),
            },
            retry: Retry::Default,
        }
    }

    pub fn terminate(reason: Reason, error: impl fmt::Display) -> Self {
        Self {
            kind: OutcomeKind::Terminate {
                reason,
                error: error.to_string(),
            },
            retry: Retry::Default,
        }
    }

    /// Outcome of a failed provider mutation. Transient failures are retried
    /// as progress; anything else terminates with `reason`.
    pub fn provider_failure(reason: Reason, err: &ProviderError) -> Self {
        if err.is_transient() {
            Self::in_progress(Reason::ProviderUnavailable, err.to_string())
        } else {
            Self::terminate(reason, err)
        }
    }

    pub fn with_retry(mut self, after: Duration) -> Self {
        self.retry = Retry::After(after);
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.retry = Retry::Never;
        self
    }

    pub(crate) fn with_retry_hint(mut self, retry: Retry) -> Self {
        self.retry = retry;
        self
    }

    pub fn kind(&self) -> &OutcomeKind {
        &self.kind
    }

    pub fn retry(&self) -> Retry {
        self.retry
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.kind, OutcomeKind::Ok { .. })
    }

    pub fn is_unmanaged(&self) -> bool {
        matches!(self.kind, OutcomeKind::Ok { unmanaged: true })
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self.kind, OutcomeKind::InProgress { .. })
    }

    pub fn is_terminate(&self) -> bool {
        matches!(self.kind, OutcomeKind::Terminate { .. })
    }

    pub fn reason(&self) -> Option<Reason> {
        match &self.kind {
            OutcomeKind::Ok { .. } => None,
            OutcomeKind::InProgress { reason, .. } | OutcomeKind::Terminate { reason, .. } => {
                Some(*reason)
            }
        }
    }

    /// Progress message or error text; empty for OK.
    pub fn message(&self) -> &str {
        match &self.kind {
            OutcomeKind::Ok { .. } => "",
            OutcomeKind::InProgress { message, .. } => message,
            OutcomeKind::Terminate { error, .. } => error,
        }
    }

    /// Condition of the given type describing this outcome.
    pub fn to_condition(&self, type_: ConditionType, now: DateTime<Utc>) -> Condition {
        match self.reason() {
            None => Condition::ready(type_, now),
            Some(reason) => Condition::not_ready(type_, reason, self.message(), now),
        }
    }

    /// Maps the outcome of a whole pass to the runner's requeue decision.
    pub fn requeue(&self, default_retry: Duration) -> Requeue {
        match (&self.kind, self.retry) {
            (OutcomeKind::Ok { .. }, Retry::After(d)) => Requeue::After(d),
            (OutcomeKind::Ok { .. }, _) => Requeue::Never,
            (OutcomeKind::InProgress { .. }, Retry::After(d)) => Requeue::After(d),
            (OutcomeKind::InProgress { .. }, Retry::Default) => Requeue::After(default_retry),
            (OutcomeKind::InProgress { .. }, Retry::Never) => Requeue::Never,
            (OutcomeKind::Terminate { .. }, Retry::Never) => Requeue::Never,
            (OutcomeKind::Terminate { error, .. }, _) => Requeue::Fatal(error.clone()),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OutcomeKind::Ok { unmanaged: false } => write!(f, "ok"),
            OutcomeKind::Ok { unmanaged: true } => write!(f, "ok (unmanaged)"),
            OutcomeKind::InProgress { reason, message } => {
                write!(f, "in progress ({}): {}", reason, message)
            }
            OutcomeKind::Terminate { reason, error } => {
                write!(f, "terminated ({}): {}", reason, error)
            }
        }
    }
}
