//! # Job Action
//!
//! Submits a batch Job built from the template embedded in the CertWatcher.
//! The watched Secret is mounted into every container of the template.

use crate::constants::{DEFAULT_JOB_MOUNT_PATH, DEFAULT_JOB_VOLUME_NAME, JOB_NAME_SUFFIX_LEN};
use crate::crd::{CertWatcher, JobAction};
use crate::error::{CertWatchError, Result};
use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{SecretVolumeSource, Volume, VolumeMount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, PostParams};
use kube::Client;

/// Random lowercase hex suffix for Job names
pub fn random_suffix() -> String {
    let mut suffix = uuid::Uuid::new_v4().simple().to_string();
    suffix.truncate(JOB_NAME_SUFFIX_LEN);
    suffix
}

/// Build the Job for `action`. The Job lives in the watched Secret's
/// namespace and is named `<watcher>-<action name>-<suffix>`.
pub fn build_job(watcher: &CertWatcher, action: &JobAction, suffix: &str) -> Result<Job> {
    let mut spec: JobSpec = serde_json::from_value(action.spec.clone())
        .map_err(|e| CertWatchError::Config(format!("invalid job template: {e}")))?;

    let volume_name = action
        .volume_name
        .as_deref()
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_JOB_VOLUME_NAME);
    let mount_path = action
        .mount_path
        .as_deref()
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_JOB_MOUNT_PATH);
    let secret = &watcher.spec.secret;

    let pod = spec.template.spec.as_mut().ok_or_else(|| {
        CertWatchError::Config("invalid job template: template.spec is required".to_string())
    })?;

    pod.volumes.get_or_insert_with(Vec::new).push(Volume {
        name: volume_name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret.name.clone()),
            ..SecretVolumeSource::default()
        }),
        ..Volume::default()
    });
    for container in &mut pod.containers {
        container
            .volume_mounts
            .get_or_insert_with(Vec::new)
            .push(VolumeMount {
                name: volume_name.to_string(),
                mount_path: mount_path.to_string(),
                ..VolumeMount::default()
            });
    }

    let watcher_name = watcher.metadata.name.as_deref().unwrap_or("unknown");
    Ok(Job {
        metadata: ObjectMeta {
            name: Some(format!("{watcher_name}-{}-{suffix}", action.name)),
            namespace: Some(secret.namespace.clone()),
            ..ObjectMeta::default()
        },
        spec: Some(spec),
        ..Job::default()
    })
}

/// Submits Jobs for external execution
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    async fn submit(&self, job: &Job) -> Result<()>;
}

#[derive(Clone)]
pub struct KubeJobSubmitter {
    client: Client,
}

impl std::fmt::Debug for KubeJobSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeJobSubmitter").finish_non_exhaustive()
    }
}

impl KubeJobSubmitter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobSubmitter for KubeJobSubmitter {
    async fn submit(&self, job: &Job) -> Result<()> {
        let namespace = job.metadata.namespace.as_deref().unwrap_or("default");
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), job)
            .await
            .map_err(|e| {
                CertWatchError::Submission(format!(
                    "unable to create job {}/{}: {e}",
                    namespace,
                    job.metadata.name.as_deref().unwrap_or("unknown")
                ))
            })?;
        Ok(())
    }
}
