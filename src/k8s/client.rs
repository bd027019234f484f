//! Kubernetes client builder.
//!
//! The upgrader runs next to the cluster, not in it: the client comes from a
//! kubeconfig file rather than the in-cluster environment.

use std::path::Path;

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use tracing::debug;

use crate::error::UpgradeError;

/// Build a Kubernetes client from the given kubeconfig file.
pub async fn from_kubeconfig(path: &Path) -> Result<kube::Client> {
    let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
        UpgradeError::Config(format!("failed to read kubeconfig {}: {e}", path.display()))
    })?;
    debug!("Loaded kubeconfig from {}", path.display());

    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| UpgradeError::Config(format!("invalid kubeconfig: {e}")))?;

    let client =
        kube::Client::try_from(config).context("Failed to build Kubernetes client")?;

    Ok(client)
}
