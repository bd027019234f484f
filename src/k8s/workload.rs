//! Converging workload updates.
//!
//! "Converge" means: mutate a workload's image reference(s), submit the
//! update, then poll the orchestrator-observed rollout state until the new
//! version is healthy or the deadline passes. Probe transport errors count
//! as "not ready yet"; only the deadline turns them into a failure.

use std::future::Future;
use std::time::Duration;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use kube::Api;
use kube::api::PostParams;
use tracing::{debug, info};

use crate::error::UpgradeError;

/// Fixed-interval polling bounds for rollout convergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            deadline: Duration::from_secs(10 * 60),
        }
    }
}

/// Image references to apply in a single mutation. The init-container slot
/// is only used by the platform controller, which carries the provisioner
/// image alongside its main container.
#[derive(Debug, Clone)]
pub struct ImageUpdate {
    pub container: String,
    pub init_container: Option<String>,
}

impl ImageUpdate {
    pub fn container_only(image: String) -> Self {
        Self {
            container: image,
            init_container: None,
        }
    }
}

/// Update a Deployment's images and wait for the rollout to become healthy.
pub async fn converge_deployment(
    client: &kube::Client,
    namespace: &str,
    name: &str,
    images: &ImageUpdate,
    policy: &RetryPolicy,
) -> Result<(), UpgradeError> {
    let api: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let mut depl = api.get(name).await.map_err(|e| UpgradeError::k8s(name, &e))?;

    let pod = depl
        .spec
        .as_mut()
        .and_then(|s| s.template.spec.as_mut())
        .ok_or_else(|| UpgradeError::MissingContainers {
            workload: name.to_string(),
            slot: "pod template",
        })?;

    let container = pod
        .containers
        .first_mut()
        .ok_or_else(|| UpgradeError::MissingContainers {
            workload: name.to_string(),
            slot: "containers",
        })?;
    container.image = Some(images.container.clone());

    if let Some(init_image) = &images.init_container {
        let init = pod
            .init_containers
            .as_mut()
            .and_then(|c| c.first_mut())
            .ok_or_else(|| UpgradeError::MissingContainers {
                workload: name.to_string(),
                slot: "initContainers",
            })?;
        init.image = Some(init_image.clone());
    }

    api.replace(name, &PostParams::default(), &depl)
        .await
        .map_err(|e| UpgradeError::k8s(name, &e))?;
    info!("Updated {} to {}, waiting for rollout", name, images.container);

    wait_until_ready(policy, name, || {
        let api = api.clone();
        async move { api.get(name).await.map(|d| deployment_ready(&d)) }
    })
    .await
}

/// Update a DaemonSet's image and wait for the rollout to become healthy.
pub async fn converge_daemonset(
    client: &kube::Client,
    namespace: &str,
    name: &str,
    image: &str,
    policy: &RetryPolicy,
) -> Result<(), UpgradeError> {
    let api: Api<DaemonSet> = Api::namespaced(client.clone(), namespace);
    let mut ds = api.get(name).await.map_err(|e| UpgradeError::k8s(name, &e))?;

    let container = ds
        .spec
        .as_mut()
        .and_then(|s| s.template.spec.as_mut())
        .and_then(|p| p.containers.first_mut())
        .ok_or_else(|| UpgradeError::MissingContainers {
            workload: name.to_string(),
            slot: "containers",
        })?;
    container.image = Some(image.to_string());

    api.replace(name, &PostParams::default(), &ds)
        .await
        .map_err(|e| UpgradeError::k8s(name, &e))?;
    info!("Updated {} to {}, waiting for rollout", name, image);

    wait_until_ready(policy, name, || {
        let api = api.clone();
        async move { api.get(name).await.map(|d| daemonset_ready(&d)) }
    })
    .await
}

/// Poll `probe` at the policy's fixed interval until it reports ready.
///
/// The first probe fires immediately. A probe error is retried on the next
/// tick like a not-ready result; only ready/not-ready and the deadline end
/// the loop.
pub async fn wait_until_ready<F, Fut, E>(
    policy: &RetryPolicy,
    workload: &str,
    mut probe: F,
) -> Result<(), UpgradeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::fmt::Display,
{
    let deadline = tokio::time::Instant::now() + policy.deadline;

    loop {
        match probe().await {
            Ok(true) => return Ok(()),
            Ok(false) => debug!("{} not ready yet", workload),
            Err(e) => debug!("Probe for {} failed, treating as not ready: {}", workload, e),
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(UpgradeError::DeadlineExceeded {
                workload: workload.to_string(),
                waited_secs: policy.deadline.as_secs(),
            });
        }
        tokio::time::sleep(policy.interval).await;
    }
}

/// Rollout health for a Deployment: the observed generation has caught up
/// and every desired replica is both updated and available.
pub fn deployment_ready(depl: &Deployment) -> bool {
    let desired = depl.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let Some(status) = &depl.status else {
        return false;
    };
    let generation_observed = match (depl.metadata.generation, status.observed_generation) {
        (Some(generation), Some(observed)) => observed >= generation,
        _ => true,
    };

    generation_observed
        && status.updated_replicas.unwrap_or(0) >= desired
        && status.available_replicas.unwrap_or(0) >= desired
}

/// Rollout health for a DaemonSet, against its scheduled pod count.
pub fn daemonset_ready(ds: &DaemonSet) -> bool {
    let Some(status) = &ds.status else {
        return false;
    };
    let generation_observed = match (ds.metadata.generation, status.observed_generation) {
        (Some(generation), Some(observed)) => observed >= generation,
        _ => true,
    };
    let desired = status.desired_number_scheduled;

    generation_observed
        && status.updated_number_scheduled.unwrap_or(0) >= desired
        && status.number_available.unwrap_or(0) >= desired
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{
        DaemonSetStatus, DeploymentSpec, DeploymentStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::cell::Cell;

    fn test_policy() -> RetryPolicy {
        RetryPolicy {
            interval: Duration::from_secs(5),
            deadline: Duration::from_secs(30),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_ready_on_first_poll_probes_once() {
        let calls = Cell::new(0u32);
        let result = wait_until_ready(&test_policy(), "atlas-platform-api", || {
            calls.set(calls.get() + 1);
            async { Ok::<bool, std::convert::Infallible>(true) }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_after_deadline() {
        let policy = test_policy();
        let calls = Cell::new(0u32);
        let started = tokio::time::Instant::now();

        let err = wait_until_ready(&policy, "atlas-gateway", || {
            calls.set(calls.get() + 1);
            async { Ok::<bool, std::convert::Infallible>(false) }
        })
        .await
        .unwrap_err();

        match err {
            UpgradeError::DeadlineExceeded {
                workload,
                waited_secs,
            } => {
                assert_eq!(workload, "atlas-gateway");
                assert_eq!(waited_secs, 30);
            }
            other => panic!("expected deadline error, got {other:?}"),
        }
        // Immediate first probe plus one per interval up to the deadline.
        assert_eq!(calls.get(), 7);
        let elapsed = started.elapsed();
        assert!(elapsed >= policy.deadline);
        assert!(elapsed <= policy.deadline + policy.interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_swallows_probe_errors() {
        let calls = Cell::new(0u32);
        let result = wait_until_ready(&test_policy(), "atlas-monitor-api", || {
            calls.set(calls.get() + 1);
            let attempt = calls.get();
            async move {
                if attempt < 3 {
                    Err("transient transport error".to_string())
                } else {
                    Ok(true)
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.get(), 3);
    }

    fn deployment(
        generation: i64,
        observed: Option<i64>,
        desired: i32,
        updated: Option<i32>,
        available: Option<i32>,
    ) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                generation: Some(generation),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(desired),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                observed_generation: observed,
                updated_replicas: updated,
                available_replicas: available,
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_deployment_ready() {
        assert!(deployment_ready(&deployment(2, Some(2), 3, Some(3), Some(3))));
    }

    #[test]
    fn test_deployment_not_ready_stale_generation() {
        assert!(!deployment_ready(&deployment(3, Some(2), 1, Some(1), Some(1))));
    }

    #[test]
    fn test_deployment_not_ready_unavailable_replicas() {
        assert!(!deployment_ready(&deployment(2, Some(2), 3, Some(3), Some(2))));
        assert!(!deployment_ready(&deployment(2, Some(2), 3, Some(2), Some(3))));
    }

    #[test]
    fn test_deployment_not_ready_without_status() {
        let depl = Deployment::default();
        assert!(!deployment_ready(&depl));
    }

    fn daemonset(desired: i32, updated: Option<i32>, available: Option<i32>) -> DaemonSet {
        DaemonSet {
            metadata: ObjectMeta {
                generation: Some(1),
                ..Default::default()
            },
            spec: None,
            status: Some(DaemonSetStatus {
                observed_generation: Some(1),
                desired_number_scheduled: desired,
                updated_number_scheduled: updated,
                number_available: available,
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_daemonset_ready() {
        assert!(daemonset_ready(&daemonset(3, Some(3), Some(3))));
    }

    #[test]
    fn test_daemonset_not_ready() {
        assert!(!daemonset_ready(&daemonset(3, Some(2), Some(3))));
        assert!(!daemonset_ready(&daemonset(3, Some(3), None)));
        assert!(!daemonset_ready(&DaemonSet::default()));
    }

    #[test]
    fn test_default_policy_bounds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(5));
        assert_eq!(policy.deadline, Duration::from_secs(600));
    }
}
