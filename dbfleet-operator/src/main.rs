//! dbfleet-operator: control loop for managed database deployments.
//!
//! Loads declared records into the control-plane store and keeps the
//! provider converged with them until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dbfleet_api::{MemoryStore, Store};
use dbfleet_operator::events::create_event_recorder;
use dbfleet_operator::provider::http::{Credentials, HttpProvider};
use dbfleet_operator::{DeploymentReconciler, OperatorConfig, Runner};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod manifests;

/// dbfleet deployment operator
#[derive(Parser, Debug)]
#[command(name = "dbfleet-operator", version, about)]
struct Args {
    /// Provider API endpoint
    #[arg(long, default_value = "https://cloud.mongodb.com")]
    provider_endpoint: String,

    /// Provider API public key
    #[arg(long, env = "DBFLEET_PUBLIC_KEY")]
    public_key: Option<String>,

    /// Provider API private key
    #[arg(long, env = "DBFLEET_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// Directory of JSON records loaded at startup
    #[arg(long, default_value = "./manifests")]
    manifest_dir: PathBuf,

    /// Requeue interval in seconds for passes still in progress
    #[arg(long, default_value = "10")]
    default_retry_secs: u64,

    /// Resync interval in seconds for deployments of external projects
    #[arg(long, default_value = "900")]
    independent_sync_secs: u64,

    /// Full resync interval in seconds (0 disables)
    #[arg(long, default_value = "0")]
    resync_secs: u64,

    /// Maximum number of passes running at once
    #[arg(long, default_value = "4")]
    max_concurrent_reconciles: usize,

    /// Parallelism of dependent cleanup on deletion
    #[arg(long, default_value = "8")]
    gc_concurrency: usize,

    /// Attempts for store writes that hit a version conflict
    #[arg(long, default_value = "5")]
    conflict_retries: usize,

    /// Keep provider deployments when their records are deleted
    #[arg(long)]
    deletion_protection: bool,

    /// Upper bound in seconds for a single pass
    #[arg(long, default_value = "300")]
    pass_timeout_secs: u64,

    /// Cap in seconds for the backoff after failed passes
    #[arg(long, default_value = "300")]
    max_backoff_secs: u64,

    /// Timeout in seconds for provider requests
    #[arg(long, default_value = "30")]
    request_timeout_secs: u64,
}

impl Args {
    fn operator_config(&self) -> OperatorConfig {
        OperatorConfig {
            default_retry: Duration::from_secs(self.default_retry_secs),
            independent_sync_period: Duration::from_secs(self.independent_sync_secs),
            resync_period: (self.resync_secs > 0).then(|| Duration::from_secs(self.resync_secs)),
            max_concurrent_reconciles: self.max_concurrent_reconciles,
            gc_concurrency: self.gc_concurrency,
            conflict_retries: self.conflict_retries,
            deletion_protection: self.deletion_protection,
            pass_timeout: Duration::from_secs(self.pass_timeout_secs),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
        }
    }

    fn credentials(&self) -> Option<Credentials> {
        match (&self.public_key, &self.private_key) {
            (Some(public_key), Some(private_key)) => Some(Credentials {
                public_key: public_key.clone(),
                private_key: private_key.clone(),
            }),
            (None, None) => None,
            _ => {
                warn!("Only one of --public-key and --private-key given, sending no credentials");
                None
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dbfleet_operator=info,reqwest=warn,hyper=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = args.operator_config();

    info!("Starting dbfleet-operator");
    info!("Provider endpoint: {}", args.provider_endpoint);

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    if args.manifest_dir.exists() {
        manifests::load_dir(store.as_ref(), &args.manifest_dir).await?;
    } else {
        warn!(
            "Manifest directory {} does not exist, starting empty",
            args.manifest_dir.display()
        );
    }

    let provider = HttpProvider::new(
        &args.provider_endpoint,
        args.credentials(),
        Duration::from_secs(args.request_timeout_secs),
    )
    .context("Failed to create provider client")?;

    let reconciler = Arc::new(DeploymentReconciler::new(
        Arc::clone(&store),
        Arc::new(provider),
        config,
        create_event_recorder(),
    ));

    Runner::new(store, reconciler)
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("Operator stopped");
    Ok(())
}
