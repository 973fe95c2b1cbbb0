//! dbfleet-operator: converges managed database deployments with the
//! records declared in the control-plane store.

pub mod config;
pub mod controller;
pub mod convergence;
pub mod diff;
pub mod events;
pub mod ledger;
pub mod observe;
pub mod provider;
pub mod runner;
pub mod workflow;

pub use config::OperatorConfig;
pub use controller::DeploymentReconciler;
pub use runner::Runner;
