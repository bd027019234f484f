//! Installed-state probes against the cluster-info ConfigMap, plus the
//! in-cluster registry configuration lookup.

use k8s_openapi::api::core::v1::ConfigMap;
use kube::Api;
use kube::api::PostParams;
use secrecy::SecretString;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::RegistryEndpoint;
use crate::error::UpgradeError;
use crate::version::Version;

const CLUSTER_INFO_NAMESPACE: &str = "kube-public";
const CLUSTER_INFO_NAME: &str = "cluster-info";
const VERSION_KEY: &str = "platformVersion";
const VARIANTS_KEY: &str = "providerVersions";

const REGISTRY_CM_NAME: &str = "atlas-registry-api";
const REGISTRY_CM_KEY: &str = "registry-config.yaml";

/// What the running platform says about itself.
#[derive(Debug, Clone)]
pub struct PlatformInfo {
    pub version: Version,
    /// Provisioner variants the installed platform can drive, oldest first.
    pub provider_versions: Vec<String>,
}

/// Read the installed platform version and its provisioner variant list.
pub async fn version_info(client: &kube::Client) -> Result<PlatformInfo, UpgradeError> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), CLUSTER_INFO_NAMESPACE);
    let cm = api
        .get(CLUSTER_INFO_NAME)
        .await
        .map_err(|e| UpgradeError::k8s(CLUSTER_INFO_NAME, &e))?;
    parse_cluster_info(&cm)
}

fn parse_cluster_info(cm: &ConfigMap) -> Result<PlatformInfo, UpgradeError> {
    let data = cm.data.as_ref().ok_or_else(|| {
        UpgradeError::KubernetesApi(
            CLUSTER_INFO_NAME.to_string(),
            "ConfigMap has no data".to_string(),
        )
    })?;

    let version: Version = data
        .get(VERSION_KEY)
        .ok_or_else(|| {
            UpgradeError::KubernetesApi(
                CLUSTER_INFO_NAME.to_string(),
                format!("missing {VERSION_KEY} key"),
            )
        })?
        .parse()?;

    let provider_versions = match data.get(VARIANTS_KEY) {
        Some(raw) => serde_yaml::from_str(raw).map_err(|e| {
            UpgradeError::Config(format!("invalid {VARIANTS_KEY} in cluster-info: {e}"))
        })?,
        None => Vec::new(),
    };

    Ok(PlatformInfo {
        version,
        provider_versions,
    })
}

/// Record the new platform version and full variant list after the core
/// services have converged, so the next run's decision sees them.
pub async fn patch_version_record(
    client: &kube::Client,
    version: &Version,
    variants: &[&str],
) -> Result<(), UpgradeError> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), CLUSTER_INFO_NAMESPACE);
    let mut cm = api
        .get(CLUSTER_INFO_NAME)
        .await
        .map_err(|e| UpgradeError::k8s(CLUSTER_INFO_NAME, &e))?;

    let data = cm.data.get_or_insert_with(Default::default);
    data.insert(VERSION_KEY.to_string(), version.to_string());
    data.insert(
        VARIANTS_KEY.to_string(),
        serde_yaml::to_string(variants)
            .map_err(|e| UpgradeError::Config(format!("failed to encode {VARIANTS_KEY}: {e}")))?,
    );

    api.replace(CLUSTER_INFO_NAME, &PostParams::default(), &cm)
        .await
        .map_err(|e| UpgradeError::k8s(CLUSTER_INFO_NAME, &e))?;
    info!("Recorded platform version {} in cluster-info", version);
    Ok(())
}

/// Shape of the registry API's own config file, as stored in its ConfigMap.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryApiConfig {
    domain_suffix: String,
    security: RegistrySecurity,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrySecurity {
    admin_username: String,
    admin_password: String,
}

/// Read the self-hosted registry settings the previous install left in the
/// cluster. Returns `None` when no such ConfigMap exists, which means the
/// install is backed by an external registry.
pub async fn discover_self_hosted(
    client: &kube::Client,
    namespace: &str,
) -> Result<Option<RegistryEndpoint>, UpgradeError> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let cm = match api.get(REGISTRY_CM_NAME).await {
        Ok(cm) => cm,
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            debug!("ConfigMap {} not found", REGISTRY_CM_NAME);
            return Ok(None);
        }
        Err(e) => return Err(UpgradeError::k8s(REGISTRY_CM_NAME, &e)),
    };

    let raw = cm
        .data
        .as_ref()
        .and_then(|d| d.get(REGISTRY_CM_KEY))
        .ok_or_else(|| {
            UpgradeError::KubernetesApi(
                REGISTRY_CM_NAME.to_string(),
                format!("missing {REGISTRY_CM_KEY} key"),
            )
        })?;
    let parsed = parse_registry_config(raw)?;
    info!("Discovered self-hosted registry {}", parsed.domain);
    Ok(Some(parsed))
}

fn parse_registry_config(raw: &str) -> Result<RegistryEndpoint, UpgradeError> {
    let config: RegistryApiConfig = serde_yaml::from_str(raw)
        .map_err(|e| UpgradeError::Config(format!("invalid {REGISTRY_CM_KEY}: {e}")))?;
    Ok(RegistryEndpoint {
        domain: config.domain_suffix,
        namespace: "library".to_string(),
        username: config.security.admin_username,
        password: SecretString::from(config.security.admin_password),
    })
}
