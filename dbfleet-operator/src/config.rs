//! Operator runtime settings.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Requeue interval for in-progress passes without an explicit hint.
    pub default_retry: Duration,
    /// Resync period for ready deployments of externally managed projects.
    pub independent_sync_period: Duration,
    /// Periodic full resync of every deployment. `None` disables it.
    pub resync_period: Option<Duration>,
    pub max_concurrent_reconciles: usize,
    pub gc_concurrency: usize,
    pub conflict_retries: usize,
    /// Never delete provider deployments when their record is deleted.
    pub deletion_protection: bool,
    /// Upper bound for a single pass; the pass is cancelled when exceeded.
    pub pass_timeout: Duration,
    /// Cap for the backoff applied after fatal passes.
    pub max_backoff: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            default_retry: Duration::from_secs(10),
            independent_sync_period: Duration::from_secs(900),
            resync_period: None,
            max_concurrent_reconciles: 4,
            gc_concurrency: 8,
            conflict_retries: 5,
            deletion_protection: false,
            pass_timeout: Duration::from_secs(300),
            max_backoff: Duration::from_secs(300),
        }
    }
}
