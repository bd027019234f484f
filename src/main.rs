//! atlas-upgrader - version-gated upgrade orchestrator for the Atlas platform.
//!
//! Compares the installed platform version against the version bundled with
//! this binary, builds an ordered upgrade plan, and executes it against the
//! live cluster, converging one component at a time.

mod charts;
mod config;
mod decision;
mod error;
mod images;
mod k8s;
mod plan;
mod platform;
mod registry;
mod upgrader;
mod version;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use config::Config;
use error::UpgradeError;
use plan::Plan;
use upgrader::Upgrader;
use version::Version;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "atlas-upgrader", version, about = "Upgrade a running Atlas platform")]
struct Cli {
    /// Path to the upgrader configuration file.
    #[arg(long, default_value = "/etc/atlas/upgrader.yaml")]
    config: PathBuf,

    /// Kubeconfig override.
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Externally managed registry domain.
    #[arg(long, env = "ATLAS_REGISTRY_DOMAIN")]
    registry_domain: Option<String>,

    /// Externally managed registry username.
    #[arg(long, env = "ATLAS_REGISTRY_USERNAME")]
    registry_username: Option<String>,

    /// Externally managed registry password.
    #[arg(long, env = "ATLAS_REGISTRY_PASSWORD", hide_env_values = true)]
    registry_password: Option<String>,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    if let Err(e) = init_tracing() {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    info!("Starting atlas-upgrader v{}", VERSION);

    if let Err(e) = run().await {
        error!("Upgrade failed: {:#}", e);
        std::process::exit(1);
    }

    info!("Upgrade completed");
}

/// Initialize tracing subscriber for CLI output.
fn init_tracing() -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("Failed to initialize log filter: {e}"))?;

    fmt().with_env_filter(filter).with_target(false).init();

    Ok(())
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    config.apply_overrides(
        cli.kubeconfig,
        cli.registry_domain,
        cli.registry_username,
        cli.registry_password,
    );

    let client = k8s::client::from_kubeconfig(&config.kubeconfig).await?;
    info!("Connected to Kubernetes API server");

    // A previous install may have left its self-hosted registry settings in
    // the cluster; a missing ConfigMap means an external registry backs it.
    if config.registry.self_hosted.is_none() {
        config.registry.self_hosted =
            platform::info::discover_self_hosted(&client, &config.namespace).await?;
    }

    let installed = platform::info::version_info(&client).await?;
    let installer: Version = images::PLATFORM_VERSION.parse()?;

    let endpoint = config
        .registry
        .active()
        .ok_or_else(|| UpgradeError::Config("no registry configured".to_string()))?;

    let path = decision::decide(
        &installed.version,
        &installer,
        &installed.provider_versions,
        images::PROVIDER_VERSIONS,
        &endpoint.domain,
        &endpoint.namespace,
    )?;
    info!(
        "Upgrading platform from {} to {}",
        installed.version, installer
    );

    let plan = Plan::build(&path, &config.registry).without_skipped(&config.skip_steps)?;
    if plan.is_empty() {
        info!("Every planned step is skipped, nothing to do");
        return Ok(());
    }
    plan.log();

    Upgrader::new(client, config, path).run(&plan).await
}
