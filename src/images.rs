//! Image catalog bundled with this installer build.
//!
//! Component tags track the platform release; the provisioner image has its
//! own tag, pinned to the newest bundled variant.

/// Platform version shipped with this binary.
pub const PLATFORM_VERSION: &str = "2.1.0";

/// Cluster-provisioner variants this build can drive, oldest first.
///
/// The length of this list is the installer's capability set size; the
/// installed platform records its own list in the cluster-info ConfigMap.
pub const PROVIDER_VERSIONS: &[&str] = &["1.28.4", "1.29.6", "1.30.2"];

/// Latest shipped versions of the cluster add-on controllers.
pub const TAPP_LATEST_VERSION: &str = "v1.9.0";
pub const CRONHPA_LATEST_VERSION: &str = "v1.1.0";

/// A bundled container image. `name` doubles as the workload name for
/// control-plane components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Image {
    pub name: &'static str,
    pub tag: &'static str,
}

impl Image {
    /// Image reference as loaded from the local bundle.
    pub fn local_name(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }

    /// Fully qualified reference under the given registry domain and namespace.
    pub fn full_name(&self, domain: &str, namespace: &str) -> String {
        format!("{domain}/{namespace}/{}:{}", self.name, self.tag)
    }
}

/// The complete set of images shipped with this release.
#[derive(Debug, Clone, Copy)]
pub struct Manifest {
    pub platform_api: Image,
    pub platform_controller: Image,
    pub monitor_api: Image,
    pub monitor_controller: Image,
    pub application_api: Image,
    pub application_controller: Image,
    pub logagent_api: Image,
    pub logagent_controller: Image,
    pub gateway: Image,
    pub provider_res: Image,
}

impl Manifest {
    /// Every bundled image, for tag/push loops.
    pub const fn all(&self) -> [&Image; 10] {
        [
            &self.platform_api,
            &self.platform_controller,
            &self.monitor_api,
            &self.monitor_controller,
            &self.application_api,
            &self.application_controller,
            &self.logagent_api,
            &self.logagent_controller,
            &self.gateway,
            &self.provider_res,
        ]
    }
}

const fn component(name: &'static str) -> Image {
    Image {
        name,
        tag: PLATFORM_VERSION,
    }
}

/// The manifest for this build.
pub const fn bundled() -> Manifest {
    Manifest {
        platform_api: component("atlas-platform-api"),
        platform_controller: component("atlas-platform-controller"),
        monitor_api: component("atlas-monitor-api"),
        monitor_controller: component("atlas-monitor-controller"),
        application_api: component("atlas-application-api"),
        application_controller: component("atlas-application-controller"),
        logagent_api: component("atlas-logagent-api"),
        logagent_controller: component("atlas-logagent-controller"),
        gateway: component("atlas-gateway"),
        provider_res: Image {
            name: "atlas-provider-res",
            tag: "1.30.2",
        },
    }
}

/// Reference for a provisioner image variant other than the bundled one.
pub fn provider_res_image(domain: &str, namespace: &str, variant: &str) -> String {
    format!("{domain}/{namespace}/atlas-provider-res:{variant}")
}
