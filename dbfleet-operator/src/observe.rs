//! Observation adapter.
//!
//! Turns provider lookups into [`Observed`] snapshots. Only errors that mean
//! "nothing there" become [`Observed::Absent`]; everything else propagates.

use crate::provider::types::SearchDeployment;
use crate::provider::{ProviderError, Result};

/// A provider-side entity as seen by one pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Observed<T> {
    Absent,
    Present(T),
}

impl<T> Observed<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Observed::Present(_))
    }

    pub fn present(self) -> Option<T> {
        match self {
            Observed::Absent => None,
            Observed::Present(v) => Some(v),
        }
    }
}

impl<T> From<Option<T>> for Observed<T> {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => Observed::Present(v),
            None => Observed::Absent,
        }
    }
}

/// Maps a lookup result to an observation; not-found is absence.
pub fn observe<T>(result: Result<T>) -> Result<Observed<T>> {
    match result {
        Ok(v) => Ok(Observed::Present(v)),
        Err(e) if e.is_not_found() => Ok(Observed::Absent),
        Err(e) => Err(e),
    }
}

/// The search deployment endpoint answers 400 instead of 404 when no search
/// nodes were ever configured. Remove once the provider is fixed.
fn search_deployment_missing_quirk(err: &ProviderError) -> bool {
    err.is_bad_request()
}

/// Observes the search node deployment of a cluster.
///
/// A deployment with no specs is reported as absent.
pub fn observe_search_deployment(
    result: Result<SearchDeployment>,
) -> Result<Observed<SearchDeployment>> {
    let result = match result {
        Err(e) if search_deployment_missing_quirk(&e) => return Ok(Observed::Absent),
        other => other,
    };
    Ok(match observe(result)? {
        Observed::Present(d) if d.specs.is_empty() => Observed::Absent,
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbfleet_api::deployment::SearchNodeSpec;

    fn make_search_deployment(specs: Vec<SearchNodeSpec>) -> SearchDeployment {
        SearchDeployment {
            id: Some("sd-1".to_string()),
            state_name: "IDLE".to_string(),
            specs,
        }
    }

    #[test]
    fn test_not_found_is_absent() {
        let r: Result<u32> = Err(ProviderError::not_found("cluster"));
        assert_eq!(observe(r).unwrap(), Observed::Absent);
        assert_eq!(observe(Ok(3)).unwrap(), Observed::Present(3));
    }

    #[test]
    fn test_other_errors_propagate() {
        let r: Result<u32> = Err(ProviderError::api(500, "", "down"));
        assert!(observe(r).is_err());

        // the bad-request quirk is search-deployment only
        let r: Result<u32> = Err(ProviderError::api(400, "INVALID", "x"));
        assert!(observe(r).is_err());
    }

    #[test]
    fn test_search_deployment_bad_request_is_absent() {
        let r = Err(ProviderError::api(400, "SEARCH_DEPLOYMENT_NOT_FOUND", "x"));
        assert_eq!(observe_search_deployment(r).unwrap(), Observed::Absent);
    }

    #[test]
    fn test_search_deployment_without_specs_is_absent() {
        let r = Ok(make_search_deployment(vec![]));
        assert_eq!(observe_search_deployment(r).unwrap(), Observed::Absent);

        let spec = SearchNodeSpec {
            instance_size: "S20_HIGHCPU_NVME".to_string(),
            node_count: 2,
        };
        let observed = observe_search_deployment(Ok(make_search_deployment(vec![spec.clone()])))
            .unwrap();
        match observed {
            Observed::Present(d) => assert_eq!(d.specs, vec![spec]),
            Observed::Absent => panic!("deployment with specs must be present"),
        }
    }

    #[test]
    fn test_search_deployment_server_error_propagates() {
        let r = Err(ProviderError::api(503, "", "unavailable"));
        assert!(observe_search_deployment(r).is_err());
    }
}
