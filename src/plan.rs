//! Plan construction and filtering.
//!
//! Planning is a pure function of the decided upgrade path and the registry
//! configuration; execution never re-plans. Steps carry a closed name
//! enumeration so the skip list can be validated instead of silently
//! matching nothing.

use std::fmt;

use tracing::info;

use crate::config::RegistryConfig;
use crate::decision::UpgradePath;
use crate::error::UpgradeError;

/// Every step the upgrader knows how to run. The display string is the
/// user-facing name, used for both progress reporting and skip matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepName {
    LoginRegistry,
    LoadImages,
    TagImages,
    PushImages,
    UpgradePlatformApi,
    UpgradePlatformController,
    UpgradeMonitorApi,
    UpgradeMonitorController,
    UpgradeApplicationApi,
    UpgradeApplicationController,
    UpgradeLogagentApi,
    UpgradeLogagentController,
    UpgradeGateway,
    PatchPlatformVersion,
    UpgradeTapp,
    UpgradeCronHpa,
    ImportCharts,
}

impl StepName {
    pub const ALL: [Self; 17] = [
        Self::LoginRegistry,
        Self::LoadImages,
        Self::TagImages,
        Self::PushImages,
        Self::UpgradePlatformApi,
        Self::UpgradePlatformController,
        Self::UpgradeMonitorApi,
        Self::UpgradeMonitorController,
        Self::UpgradeApplicationApi,
        Self::UpgradeApplicationController,
        Self::UpgradeLogagentApi,
        Self::UpgradeLogagentController,
        Self::UpgradeGateway,
        Self::PatchPlatformVersion,
        Self::UpgradeTapp,
        Self::UpgradeCronHpa,
        Self::ImportCharts,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoginRegistry => "Login registry",
            Self::LoadImages => "Load images",
            Self::TagImages => "Tag images",
            Self::PushImages => "Push images",
            Self::UpgradePlatformApi => "Upgrade atlas-platform-api",
            Self::UpgradePlatformController => "Upgrade atlas-platform-controller",
            Self::UpgradeMonitorApi => "Upgrade atlas-monitor-api",
            Self::UpgradeMonitorController => "Upgrade atlas-monitor-controller",
            Self::UpgradeApplicationApi => "Upgrade atlas-application-api",
            Self::UpgradeApplicationController => "Upgrade atlas-application-controller",
            Self::UpgradeLogagentApi => "Upgrade atlas-logagent-api",
            Self::UpgradeLogagentController => "Upgrade atlas-logagent-controller",
            Self::UpgradeGateway => "Upgrade atlas-gateway",
            Self::PatchPlatformVersion => "Patch platform version",
            Self::UpgradeTapp => "Upgrade TAPP",
            Self::UpgradeCronHpa => "Upgrade CronHPA",
            Self::ImportCharts => "Import charts",
        }
    }

    /// Exact-name lookup, used to validate the configured skip list.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core service convergence order: families run platform, monitor,
/// application, log-agent, and each family upgrades its API server before
/// its controller. The gateway is deliberately absent here; it fronts every
/// other API and must converge only after all of them are done.
const CORE_SERVICE_STEPS: [StepName; 8] = [
    StepName::UpgradePlatformApi,
    StepName::UpgradePlatformController,
    StepName::UpgradeMonitorApi,
    StepName::UpgradeMonitorController,
    StepName::UpgradeApplicationApi,
    StepName::UpgradeApplicationController,
    StepName::UpgradeLogagentApi,
    StepName::UpgradeLogagentController,
];

/// The fully determined, ordered sequence of upgrade steps for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    steps: Vec<StepName>,
}

impl Plan {
    /// Build the plan for the decided upgrade path.
    pub fn build(path: &UpgradePath, registry: &RegistryConfig) -> Self {
        let mut steps = Vec::new();

        match path {
            UpgradePath::CapabilityRefresh { .. } => {
                if registry.self_hosted.is_some() {
                    steps.extend([
                        StepName::LoginRegistry,
                        StepName::TagImages,
                        StepName::PushImages,
                    ]);
                }
                steps.push(StepName::UpgradePlatformController);
            }
            UpgradePath::Full { .. } => {
                if !registry.is_external() {
                    steps.extend([
                        StepName::LoginRegistry,
                        StepName::LoadImages,
                        StepName::TagImages,
                        StepName::PushImages,
                    ]);
                }
                steps.extend(CORE_SERVICE_STEPS);
                steps.push(StepName::UpgradeGateway);
                steps.push(StepName::PatchPlatformVersion);
                steps.push(StepName::UpgradeTapp);
                steps.push(StepName::UpgradeCronHpa);
                if registry.third_party.is_none() && registry.self_hosted.is_some() {
                    steps.push(StepName::ImportCharts);
                }
            }
        }

        Self { steps }
    }

    /// Drop every step whose name appears in the skip list, preserving the
    /// relative order of the rest. A skip name that matches no known step is
    /// a configuration error rather than a silent no-op.
    pub fn without_skipped(self, skip: &[String]) -> Result<Self, UpgradeError> {
        for name in skip {
            if StepName::parse(name).is_none() {
                return Err(UpgradeError::UnknownSkipStep(name.clone()));
            }
        }
        let steps = self
            .steps
            .into_iter()
            .filter(|step| !skip.iter().any(|name| name == step.as_str()))
            .collect();
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[StepName] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Emit the numbered step listing before execution begins.
    pub fn log(&self) {
        info!("Steps:");
        for (i, step) in self.steps.iter().enumerate() {
            info!("{} {}", i, step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_hosted_registry() -> RegistryConfig {
        serde_yaml::from_str("selfHosted: {domain: registry.atlas.local}").unwrap()
    }

    fn external_registry() -> RegistryConfig {
        serde_yaml::from_str("thirdParty: {domain: hub.example.com}").unwrap()
    }

    fn full_path() -> UpgradePath {
        UpgradePath::Full {
            provider_image: "registry.atlas.local/library/atlas-provider-res:1.30.2".to_string(),
        }
    }

    fn refresh_path() -> UpgradePath {
        UpgradePath::CapabilityRefresh {
            provider_image: "registry.atlas.local/library/atlas-provider-res:1.29.6".to_string(),
        }
    }

    fn position(plan: &Plan, step: StepName) -> usize {
        plan.steps().iter().position(|s| *s == step).unwrap()
    }

    #[test]
    fn test_full_plan_self_hosted() {
        let plan = Plan::build(&full_path(), &self_hosted_registry());
        let expected = [
            StepName::LoginRegistry,
            StepName::LoadImages,
            StepName::TagImages,
            StepName::PushImages,
            StepName::UpgradePlatformApi,
            StepName::UpgradePlatformController,
            StepName::UpgradeMonitorApi,
            StepName::UpgradeMonitorController,
            StepName::UpgradeApplicationApi,
            StepName::UpgradeApplicationController,
            StepName::UpgradeLogagentApi,
            StepName::UpgradeLogagentController,
            StepName::UpgradeGateway,
            StepName::PatchPlatformVersion,
            StepName::UpgradeTapp,
            StepName::UpgradeCronHpa,
            StepName::ImportCharts,
        ];
        assert_eq!(plan.steps(), expected);
    }

    #[test]
    fn test_full_plan_external_registry() {
        let plan = Plan::build(&full_path(), &external_registry());
        assert!(!plan.steps().contains(&StepName::LoginRegistry));
        assert!(!plan.steps().contains(&StepName::LoadImages));
        assert!(!plan.steps().contains(&StepName::ImportCharts));
        assert_eq!(plan.steps()[0], StepName::UpgradePlatformApi);
    }

    #[test]
    fn test_gateway_converges_last_of_services() {
        let plan = Plan::build(&full_path(), &self_hosted_registry());
        let gateway = position(&plan, StepName::UpgradeGateway);
        for step in CORE_SERVICE_STEPS {
            assert!(position(&plan, step) < gateway, "{step} must precede gateway");
        }
    }

    #[test]
    fn test_version_patch_precedes_addons() {
        let plan = Plan::build(&full_path(), &self_hosted_registry());
        let patch = position(&plan, StepName::PatchPlatformVersion);
        assert!(patch > position(&plan, StepName::UpgradeGateway));
        assert!(patch < position(&plan, StepName::UpgradeTapp));
        assert!(position(&plan, StepName::UpgradeTapp) < position(&plan, StepName::UpgradeCronHpa));
    }

    #[test]
    fn test_refresh_plan_self_hosted() {
        let plan = Plan::build(&refresh_path(), &self_hosted_registry());
        assert_eq!(
            plan.steps(),
            [
                StepName::LoginRegistry,
                StepName::TagImages,
                StepName::PushImages,
                StepName::UpgradePlatformController,
            ]
        );
    }

    #[test]
    fn test_refresh_plan_external_registry() {
        let plan = Plan::build(&refresh_path(), &external_registry());
        assert_eq!(plan.steps(), [StepName::UpgradePlatformController]);
    }

    #[test]
    fn test_skip_filter_preserves_order() {
        let plan = Plan::build(&full_path(), &self_hosted_registry());
        let original_len = plan.len();
        let skip = vec!["Load images".to_string(), "Upgrade CronHPA".to_string()];
        let filtered = plan.without_skipped(&skip).unwrap();

        assert_eq!(filtered.len(), original_len - 2);
        assert!(!filtered.steps().contains(&StepName::LoadImages));
        assert!(!filtered.steps().contains(&StepName::UpgradeCronHpa));
        // Retained steps keep their relative order.
        assert!(
            position(&filtered, StepName::LoginRegistry)
                < position(&filtered, StepName::TagImages)
        );
        assert!(
            position(&filtered, StepName::UpgradeGateway)
                < position(&filtered, StepName::UpgradeTapp)
        );
    }

    #[test]
    fn test_skip_unknown_name_is_config_error() {
        let plan = Plan::build(&full_path(), &self_hosted_registry());
        let err = plan
            .without_skipped(&["Upgrade gatway".to_string()])
            .unwrap_err();
        assert!(matches!(err, UpgradeError::UnknownSkipStep(_)));
    }

    #[test]
    fn test_skip_known_name_absent_from_plan_is_noop() {
        let plan = Plan::build(&refresh_path(), &external_registry());
        let filtered = plan
            .clone()
            .without_skipped(&["Import charts".to_string()])
            .unwrap();
        assert_eq!(filtered, plan);
    }

    #[test]
    fn test_step_name_parse_roundtrip() {
        for step in StepName::ALL {
            assert_eq!(StepName::parse(step.as_str()), Some(step));
        }
        assert_eq!(StepName::parse("not a step"), None);
    }
}
