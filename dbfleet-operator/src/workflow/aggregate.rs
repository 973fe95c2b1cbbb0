use std::time::Duration;

use super::result::{Outcome, OutcomeKind, Retry};

/// Folds independent sub-results into one parent outcome.
///
/// The first Terminate wins, then the first InProgress, then OK. If every
/// input is unmanaged (or there is none) the result is unmanaged too, so the
/// parent clears its condition. The smallest explicit retry among non-OK
/// inputs is carried over.
pub fn aggregate<I>(results: I) -> Outcome
where
    I: IntoIterator<Item = Outcome>,
{
    let mut terminate: Option<Outcome> = None;
    let mut in_progress: Option<Outcome> = None;
    let mut all_unmanaged = true;
    let mut shortest: Option<Duration> = None;

    for result in results {
        if !result.is_ok() {
            if let Retry::After(d) = result.retry() {
                shortest = Some(shortest.map_or(d, |s| s.min(d)));
            }
        }

        match result.kind() {
            OutcomeKind::Terminate { .. } => {
                all_unmanaged = false;
                if terminate.is_none() {
                    terminate = Some(result);
                }
            }
            OutcomeKind::InProgress { .. } => {
                all_unmanaged = false;
                if in_progress.is_none() {
                    in_progress = Some(result);
                }
            }
            OutcomeKind::Ok { unmanaged } => {
                all_unmanaged &= *unmanaged;
            }
        }
    }

    let picked = match (terminate, in_progress) {
        (Some(t), _) => t,
        (None, Some(p)) => p,
        (None, None) if all_unmanaged => return Outcome::unmanaged(),
        (None, None) => return Outcome::ok(),
    };

    match (picked.retry(), shortest) {
        (Retry::Never, _) | (_, None) => picked,
        (_, Some(d)) => picked.with_retry_hint(Retry::After(d)),
    }
}
