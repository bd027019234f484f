//! Container registry collaborator.
//!
//! Sequences the external docker operations the plan needs: install the
//! registry's trust anchor, log in, then load/tag/push the bundled images.
//! Any nonzero docker exit is fatal for the run.

use std::path::Path;

use secrecy::ExposeSecret;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::RegistryEndpoint;
use crate::error::UpgradeError;
use crate::images::Manifest;

const DOCKER_CERTS_DIR: &str = "/etc/docker/certs.d";

/// Install the registry CA under docker's per-domain certs directory so the
/// subsequent login trusts the self-hosted endpoint.
pub async fn ensure_trust_anchor(domain: &str, ca_file: &Path) -> Result<(), UpgradeError> {
    let dir = Path::new(DOCKER_CERTS_DIR).join(domain);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| UpgradeError::Registry(format!("failed to create {}: {e}", dir.display())))?;

    let ca = tokio::fs::read(ca_file).await.map_err(|e| {
        UpgradeError::Registry(format!("failed to read CA file {}: {e}", ca_file.display()))
    })?;
    let target = dir.join("ca.crt");
    tokio::fs::write(&target, ca).await.map_err(|e| {
        UpgradeError::Registry(format!("failed to write {}: {e}", target.display()))
    })?;

    debug!("Installed registry trust anchor for {}", domain);
    Ok(())
}

/// Log docker in to the registry.
pub async fn login(endpoint: &RegistryEndpoint) -> Result<(), UpgradeError> {
    info!("Logging in to registry {}", endpoint.domain);
    run_docker(&[
        "login",
        "--username",
        &endpoint.username,
        "--password",
        endpoint.password.expose_secret(),
        &endpoint.domain,
    ])
    .await
}

/// Load the local image bundle into the docker daemon.
pub async fn load_bundle(bundle: &Path) -> Result<(), UpgradeError> {
    info!("Loading image bundle {}", bundle.display());
    let bundle = bundle.display().to_string();
    run_docker(&["load", "-i", &bundle]).await
}

/// Tag every bundled image for the registry.
pub async fn tag_images(
    manifest: &Manifest,
    endpoint: &RegistryEndpoint,
) -> Result<(), UpgradeError> {
    for image in manifest.all() {
        let target = image.full_name(&endpoint.domain, &endpoint.namespace);
        debug!("Tagging {} as {}", image.local_name(), target);
        run_docker(&["tag", &image.local_name(), &target]).await?;
    }
    Ok(())
}

/// Push every bundled image to the registry.
pub async fn push_images(
    manifest: &Manifest,
    endpoint: &RegistryEndpoint,
) -> Result<(), UpgradeError> {
    for image in manifest.all() {
        let target = image.full_name(&endpoint.domain, &endpoint.namespace);
        info!("Pushing {}", target);
        run_docker(&["push", &target]).await?;
    }
    Ok(())
}

async fn run_docker(args: &[&str]) -> Result<(), UpgradeError> {
    let verb = args.first().copied().unwrap_or("docker");

    let output = Command::new("docker")
        .args(args)
        .output()
        .await
        .map_err(|e| UpgradeError::Registry(format!("failed to run docker {verb}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(UpgradeError::Registry(format!(
            "docker {verb} failed: {}",
            stderr.trim()
        )));
    }
    Ok(())
}
