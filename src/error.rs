//! Custom error types for atlas-upgrader.

use thiserror::Error;

/// Errors that can occur while planning or executing a platform upgrade.
#[derive(Error, Debug)]
pub enum UpgradeError {
    #[error("Invalid version format: {0}")]
    InvalidVersion(String),

    #[error("Upgrade not possible: {0}")]
    UpgradeNotPossible(String),

    #[error("Kubernetes API error for {0}: {1}")]
    KubernetesApi(String, String),

    #[error("{workload} has no {slot}")]
    MissingContainers {
        workload: String,
        slot: &'static str,
    },

    #[error("{workload} did not become ready within {waited_secs}s")]
    DeadlineExceeded { workload: String, waited_secs: u64 },

    #[error("Registry operation failed: {0}")]
    Registry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown step name in skipSteps: {0:?}")]
    UnknownSkipStep(String),
}

impl UpgradeError {
    /// Wrap a kube client error, recording which object the call targeted.
    pub fn k8s(target: &str, err: &kube::Error) -> Self {
        Self::KubernetesApi(target.to_string(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_invalid_version() {
        let err = UpgradeError::InvalidVersion("abc".to_string());
        assert_eq!(err.to_string(), "Invalid version format: abc");
    }

    #[test]
    fn test_error_display_upgrade_not_possible() {
        let err = UpgradeError::UpgradeNotPossible("platform is newer".to_string());
        assert_eq!(err.to_string(), "Upgrade not possible: platform is newer");
    }

    #[test]
    fn test_error_display_missing_containers() {
        let err = UpgradeError::MissingContainers {
            workload: "atlas-platform-controller".to_string(),
            slot: "initContainers",
        };
        assert_eq!(
            err.to_string(),
            "atlas-platform-controller has no initContainers"
        );
    }

    #[test]
    fn test_error_display_deadline_exceeded() {
        let err = UpgradeError::DeadlineExceeded {
            workload: "atlas-gateway".to_string(),
            waited_secs: 600,
        };
        assert_eq!(
            err.to_string(),
            "atlas-gateway did not become ready within 600s"
        );
    }

    #[test]
    fn test_error_display_unknown_skip_step() {
        let err = UpgradeError::UnknownSkipStep("Upgrade gatway".to_string());
        assert!(err.to_string().contains("Upgrade gatway"));
    }
}
