//! Cluster add-on version patchers.
//!
//! Add-ons are independently versioned custom resources. Upgrading a kind
//! means overwriting the version field on every live instance; the first
//! failed submission aborts the run and instances already updated stay on
//! the new version.

use std::fmt::Debug;
use std::future::Future;

use kube::{Api, CustomResource, ResourceExt};
use kube::api::{ListParams, PostParams};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::UpgradeError;
use crate::images;

/// Elastic-batch-workload controller add-on.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(group = "platform.atlas.io", version = "v1", kind = "TappController")]
#[serde(rename_all = "camelCase")]
pub struct TappControllerSpec {
    /// Cluster the controller is installed into.
    pub cluster_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Scheduled-autoscaling controller add-on.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(group = "platform.atlas.io", version = "v1", kind = "CronHPA")]
#[serde(rename_all = "camelCase")]
pub struct CronHPASpec {
    /// Cluster the controller is installed into.
    pub cluster_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Upgrade every live `TappController` to the bundled latest version.
pub async fn upgrade_tapp_controllers(client: &kube::Client) -> Result<(), UpgradeError> {
    let api: Api<TappController> = Api::all(client.clone());
    patch_all(&api, "TappController", images::TAPP_LATEST_VERSION, |t| {
        &mut t.spec.version
    })
    .await
}

/// Upgrade every live `CronHPA` to the bundled latest version.
pub async fn upgrade_cron_hpas(client: &kube::Client) -> Result<(), UpgradeError> {
    let api: Api<CronHPA> = Api::all(client.clone());
    patch_all(&api, "CronHPA", images::CRONHPA_LATEST_VERSION, |c| {
        &mut c.spec.version
    })
    .await
}

/// List every instance of an add-on kind and rewrite its version field.
async fn patch_all<K>(
    api: &Api<K>,
    kind: &str,
    latest: &str,
    version_slot: impl Fn(&mut K) -> &mut Option<String>,
) -> Result<(), UpgradeError>
where
    K: kube::Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug,
{
    info!("Upgrading {} instances, latest version is {}", kind, latest);

    let list = api
        .list(&ListParams::default())
        .await
        .map_err(|e| UpgradeError::k8s(kind, &e))?;

    let mut instances: Vec<K> = list.into_iter().collect();
    for instance in &mut instances {
        let name = instance.name_any();
        let slot = version_slot(instance);
        info!(
            "Upgrading {} {} from {} to {}",
            kind,
            name,
            slot.as_deref().unwrap_or("unset"),
            latest
        );
        *slot = Some(latest.to_string());
    }

    let updated = submit_each(instances, |instance| {
        let api = api.clone();
        async move {
            let name = instance.name_any();
            api.replace(&name, &PostParams::default(), &instance)
                .await
                .map(|_| ())
                .map_err(|e| UpgradeError::k8s(&name, &e))
        }
    })
    .await?;

    info!("Upgraded {} {} instances", updated, kind);
    Ok(())
}

/// Submit each instance in listing order, stopping at the first failure.
/// Returns how many submissions succeeded.
async fn submit_each<T, F, Fut>(instances: Vec<T>, mut submit: F) -> Result<usize, UpgradeError>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<(), UpgradeError>>,
{
    let mut updated = 0;
    for instance in instances {
        submit(instance).await?;
        updated += 1;
    }
    Ok(updated)
}
