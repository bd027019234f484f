//! Upgrader configuration: file-backed settings plus CLI overrides.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::UpgradeError;

/// Top-level configuration, loaded from a YAML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Kubeconfig for the cluster hosting the platform.
    #[serde(default = "default_kubeconfig")]
    pub kubeconfig: PathBuf,

    /// Namespace the control-plane components run in.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Local image bundle fed to `docker load`.
    #[serde(default = "default_image_bundle")]
    pub image_bundle: PathBuf,

    /// Directory of baseline chart packages (`*.tgz`) to import.
    #[serde(default)]
    pub charts_dir: Option<PathBuf>,

    /// CA certificate installed as the registry trust anchor before login.
    #[serde(default = "default_registry_ca_file")]
    pub registry_ca_file: PathBuf,

    /// Step names to drop from the plan before execution. Names must match
    /// the step enumeration exactly; unknown names are a configuration error.
    #[serde(default)]
    pub skip_steps: Vec<String>,

    #[serde(default)]
    pub registry: RegistryConfig,
}

/// Registry backing the installation. At most one of the two is used for any
/// given operation; an externally managed (third-party) registry wins.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    #[serde(default)]
    pub third_party: Option<RegistryEndpoint>,

    #[serde(default)]
    pub self_hosted: Option<RegistryEndpoint>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEndpoint {
    pub domain: String,

    #[serde(default = "default_registry_namespace")]
    pub namespace: String,

    #[serde(default)]
    pub username: String,

    #[serde(default = "empty_secret")]
    pub password: SecretString,
}

impl RegistryConfig {
    /// True when image hosting is externally managed: the images are already
    /// reachable and the local load/tag/push cycle is unnecessary.
    pub const fn is_external(&self) -> bool {
        self.third_party.is_some()
    }

    /// The endpoint image references resolve against.
    pub fn active(&self) -> Option<&RegistryEndpoint> {
        self.third_party.as_ref().or(self.self_hosted.as_ref())
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, UpgradeError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            UpgradeError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_yaml::from_str(&raw)
            .map_err(|e| UpgradeError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Apply command-line overrides on top of the file-backed settings.
    ///
    /// Registry credentials only take effect for an already-configured
    /// third-party registry unless a domain is also given, so a stray env
    /// var cannot flip the install to the external-registry path.
    pub fn apply_overrides(
        &mut self,
        kubeconfig: Option<PathBuf>,
        registry_domain: Option<String>,
        registry_username: Option<String>,
        registry_password: Option<String>,
    ) {
        if let Some(path) = kubeconfig {
            self.kubeconfig = path;
        }
        if let Some(domain) = registry_domain {
            let endpoint = self
                .registry
                .third_party
                .get_or_insert_with(RegistryEndpoint::empty);
            endpoint.domain = domain;
        }
        if let Some(endpoint) = self.registry.third_party.as_mut() {
            if let Some(user) = registry_username {
                endpoint.username = user;
            }
            if let Some(pass) = registry_password {
                endpoint.password = SecretString::from(pass);
            }
        }
    }
}

impl RegistryEndpoint {
    fn empty() -> Self {
        Self {
            domain: String::new(),
            namespace: default_registry_namespace(),
            username: String::new(),
            password: empty_secret(),
        }
    }
}

fn default_kubeconfig() -> PathBuf {
    PathBuf::from("/etc/atlas/kubeconfig")
}

fn default_namespace() -> String {
    "atlas".to_string()
}

fn default_image_bundle() -> PathBuf {
    PathBuf::from("/opt/atlas/images.tar.gz")
}

fn default_registry_ca_file() -> PathBuf {
    PathBuf::from("/opt/atlas/ca.crt")
}

fn default_registry_namespace() -> String {
    "library".to_string()
}

fn empty_secret() -> SecretString {
    SecretString::from("")
}
