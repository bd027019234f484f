//! Step execution.
//!
//! Runs the planned steps strictly in order; the first failing step aborts
//! the remainder and its error is surfaced with the step name attached.
//! Nothing here re-plans: the plan was fully determined before the first
//! step ran.

use anyhow::{Context, Result};
use tracing::info;

use crate::charts;
use crate::config::{Config, RegistryEndpoint};
use crate::decision::UpgradePath;
use crate::error::UpgradeError;
use crate::images::{self, Image, Manifest};
use crate::k8s::workload::{self, ImageUpdate, RetryPolicy};
use crate::plan::{Plan, StepName};
use crate::platform;
use crate::registry;
use crate::version::Version;

pub struct Upgrader {
    client: kube::Client,
    config: Config,
    path: UpgradePath,
    manifest: Manifest,
    policy: RetryPolicy,
}

impl Upgrader {
    pub fn new(client: kube::Client, config: Config, path: UpgradePath) -> Self {
        Self {
            client,
            config,
            path,
            manifest: images::bundled(),
            policy: RetryPolicy::default(),
        }
    }

    /// Execute the plan in order, aborting at the first failure.
    pub async fn run(&self, plan: &Plan) -> Result<()> {
        for (i, step) in plan.steps().iter().enumerate() {
            info!("Step {}/{}: {}", i + 1, plan.len(), step);
            self.execute(*step)
                .await
                .with_context(|| format!("step \"{step}\" failed"))?;
        }
        Ok(())
    }

    async fn execute(&self, step: StepName) -> Result<()> {
        match step {
            StepName::LoginRegistry => {
                let endpoint = self.registry()?;
                registry::ensure_trust_anchor(&endpoint.domain, &self.config.registry_ca_file)
                    .await?;
                registry::login(endpoint).await?;
            }
            StepName::LoadImages => registry::load_bundle(&self.config.image_bundle).await?,
            StepName::TagImages => registry::tag_images(&self.manifest, self.registry()?).await?,
            StepName::PushImages => registry::push_images(&self.manifest, self.registry()?).await?,
            StepName::UpgradePlatformApi => self.converge(&self.manifest.platform_api).await?,
            StepName::UpgradePlatformController => {
                // The platform controller carries two image slots: its main
                // container and the provisioner init container, updated
                // together in a single mutation.
                let update = ImageUpdate {
                    container: self.image_ref(&self.manifest.platform_controller)?,
                    init_container: Some(self.path.provider_image().to_string()),
                };
                workload::converge_deployment(
                    &self.client,
                    &self.config.namespace,
                    self.manifest.platform_controller.name,
                    &update,
                    &self.policy,
                )
                .await?;
            }
            StepName::UpgradeMonitorApi => self.converge(&self.manifest.monitor_api).await?,
            StepName::UpgradeMonitorController => {
                self.converge(&self.manifest.monitor_controller).await?;
            }
            StepName::UpgradeApplicationApi => {
                self.converge(&self.manifest.application_api).await?;
            }
            StepName::UpgradeApplicationController => {
                self.converge(&self.manifest.application_controller).await?;
            }
            StepName::UpgradeLogagentApi => self.converge(&self.manifest.logagent_api).await?,
            StepName::UpgradeLogagentController => {
                self.converge(&self.manifest.logagent_controller).await?;
            }
            StepName::UpgradeGateway => {
                workload::converge_daemonset(
                    &self.client,
                    &self.config.namespace,
                    self.manifest.gateway.name,
                    &self.image_ref(&self.manifest.gateway)?,
                    &self.policy,
                )
                .await?;
            }
            StepName::PatchPlatformVersion => {
                let version: Version = images::PLATFORM_VERSION.parse()?;
                platform::info::patch_version_record(
                    &self.client,
                    &version,
                    images::PROVIDER_VERSIONS,
                )
                .await?;
            }
            StepName::UpgradeTapp => platform::addon::upgrade_tapp_controllers(&self.client).await?,
            StepName::UpgradeCronHpa => platform::addon::upgrade_cron_hpas(&self.client).await?,
            StepName::ImportCharts => {
                let endpoint = self.config.registry.self_hosted.as_ref().ok_or_else(|| {
                    UpgradeError::Config("chart import requires a self-hosted registry".to_string())
                })?;
                let charts_dir = self.config.charts_dir.as_deref().ok_or_else(|| {
                    UpgradeError::Config("chartsDir is not configured".to_string())
                })?;
                charts::import_baseline(endpoint, charts_dir).await?;
            }
        }
        Ok(())
    }

    /// Converge a single-container Deployment to its bundled image.
    async fn converge(&self, image: &Image) -> Result<(), UpgradeError> {
        workload::converge_deployment(
            &self.client,
            &self.config.namespace,
            image.name,
            &ImageUpdate::container_only(self.image_ref(image)?),
            &self.policy,
        )
        .await
    }

    fn image_ref(&self, image: &Image) -> Result<String, UpgradeError> {
        let endpoint = self.registry()?;
        Ok(image.full_name(&endpoint.domain, &endpoint.namespace))
    }

    fn registry(&self) -> Result<&RegistryEndpoint, UpgradeError> {
        self.config
            .registry
            .active()
            .ok_or_else(|| UpgradeError::Config("no registry configured".to_string()))
    }
}
