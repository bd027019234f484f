//! Baseline chart import.
//!
//! Pushes the bundled chart packages into the self-hosted registry's chart
//! API so a freshly upgraded platform starts with the current catalog.

use std::path::Path;

use secrecy::ExposeSecret;
use tracing::info;

use crate::config::RegistryEndpoint;
use crate::error::UpgradeError;

pub fn chart_api_url(domain: &str, namespace: &str) -> String {
    format!("https://{domain}/chart/api/{namespace}/charts")
}

/// Upload every `*.tgz` under `charts_dir` to the registry's chart API.
pub async fn import_baseline(
    endpoint: &RegistryEndpoint,
    charts_dir: &Path,
) -> Result<(), UpgradeError> {
    let url = chart_api_url(&endpoint.domain, &endpoint.namespace);

    // The self-hosted registry serves a platform-issued certificate that is
    // not in the system roots.
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(|e| UpgradeError::Registry(format!("failed to build HTTP client: {e}")))?;

    let mut entries = tokio::fs::read_dir(charts_dir).await.map_err(|e| {
        UpgradeError::Registry(format!(
            "failed to read charts dir {}: {e}",
            charts_dir.display()
        ))
    })?;

    let mut imported = 0usize;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| UpgradeError::Registry(format!("failed to list charts: {e}")))?
    {
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "tgz") {
            continue;
        }

        let body = tokio::fs::read(&path).await.map_err(|e| {
            UpgradeError::Registry(format!("failed to read chart {}: {e}", path.display()))
        })?;

        let response = client
            .post(&url)
            .basic_auth(&endpoint.username, Some(endpoint.password.expose_secret()))
            .body(body)
            .send()
            .await
            .map_err(|e| {
                UpgradeError::Registry(format!(
                    "chart import of {} failed: {e}",
                    path.display()
                ))
            })?;

        if !response.status().is_success() {
            return Err(UpgradeError::Registry(format!(
                "chart import of {} failed: {}",
                path.display(),
                response.status()
            )));
        }
        imported += 1;
    }

    info!("Imported {} baseline charts", imported);
    Ok(())
}
