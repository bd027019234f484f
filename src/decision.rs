//! Upgrade path decision.
//!
//! The single branch point for all downstream planning. Evaluated exactly
//! once per run, before anything is mutated.

use crate::error::UpgradeError;
use crate::images;
use crate::version::Version;

/// Which shape of plan applies to this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradePath {
    /// Installed version equals the installer version but supports fewer
    /// provisioner variants: top up the provisioner image and re-confirm the
    /// platform controller, nothing else moves.
    CapabilityRefresh { provider_image: String },

    /// Installed version is older: the full component-by-component plan runs.
    Full { provider_image: String },
}

impl UpgradePath {
    /// Provisioner image the platform controller's init container is set to.
    pub fn provider_image(&self) -> &str {
        match self {
            Self::CapabilityRefresh { provider_image } | Self::Full { provider_image } => {
                provider_image
            }
        }
    }
}

/// Classify the installed-vs-installer situation.
///
/// Rejections are fatal and happen before any plan exists:
/// - installed newer than the installer: the installer never moves a
///   platform backward;
/// - versions equal with identical capability-set sizes: nothing to do.
pub fn decide(
    installed: &Version,
    installer: &Version,
    installed_variants: &[String],
    bundled_variants: &[&str],
    registry_domain: &str,
    registry_namespace: &str,
) -> Result<UpgradePath, UpgradeError> {
    if installed > installer {
        return Err(UpgradeError::UpgradeNotPossible(format!(
            "platform version {installed} is higher than installer version {installer}"
        )));
    }

    if installed == installer {
        if installed_variants.len() == bundled_variants.len() {
            return Err(UpgradeError::UpgradeNotPossible(format!(
                "platform version {installed} is equal to installer version {installer} \
                 and no new provisioner variants are bundled; prepare custom upgrade images first"
            )));
        }

        // Top up to the newest variant the installed platform already records.
        let newest = installed_variants.last().ok_or_else(|| {
            UpgradeError::UpgradeNotPossible(
                "installed platform records no provisioner variants".to_string(),
            )
        })?;
        return Ok(UpgradePath::CapabilityRefresh {
            provider_image: images::provider_res_image(registry_domain, registry_namespace, newest),
        });
    }

    Ok(UpgradePath::Full {
        provider_image: images::bundled()
            .provider_res
            .full_name(registry_domain, registry_namespace),
    })
}
