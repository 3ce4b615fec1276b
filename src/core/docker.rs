/// Docker runtime integration
///
/// All bollard calls live here: snapshotting the visible containers for
/// discovery and spawning the ephemeral backup-process container.

use anyhow::{Context, Result};
use bollard::container::{
    Config as ContainerCreateConfig, CreateContainerOptions, ListContainersOptions, LogsOptions,
    NetworkingConfig, RemoveContainerOptions, WaitContainerOptions,
};
use bollard::models::{ContainerInspectResponse, EndpointSettings, HostConfig};
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::core::container::VolumeMap;
use crate::core::discovery::RunningContainers;

/// Everything needed to spawn the backup-process container. Mirrors the
/// calling container: same image, same environment, plus the marker labels
/// and the volume set assembled from the group.
pub struct BackupProcessSpec<'a> {
    pub image: &'a str,
    pub command: Vec<String>,
    pub volumes: &'a VolumeMap,
    pub environment: Vec<String>,
    pub labels: HashMap<String, String>,
    /// The container we run in; the spawned process joins its network so it
    /// can reach the databases by service name.
    pub source_container_id: &'a str,
}

#[derive(Clone)]
pub struct DockerManager {
    docker: Docker,
}

impl DockerManager {
    pub fn new() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker daemon. Is the socket mounted?")?;
        Ok(Self { docker })
    }

    /// Snapshot every container visible to the runtime, with the full
    /// inspect payload (the list endpoint omits environment and state).
    pub async fn list_containers(&self) -> Result<Vec<ContainerInspectResponse>> {
        let options = Some(ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        });

        let summaries = self
            .docker
            .list_containers(options)
            .await
            .context("Failed to list containers")?;

        let mut records = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let Some(id) = summary.id else { continue };
            let record = self
                .docker
                .inspect_container(&id, None)
                .await
                .with_context(|| format!("Failed to inspect container {}", id))?;
            records.push(record);
        }

        debug!(count = records.len(), "container snapshot taken");
        Ok(records)
    }

    /// Run discovery for the given process host identifier.
    pub async fn discover(&self, hostname: &str) -> Result<RunningContainers> {
        let records = self.list_containers().await?;
        Ok(RunningContainers::detect(records, hostname)?)
    }

    /// Spawn the backup-process container, block until it exits, and return
    /// its exit code together with its captured output.
    pub async fn spawn_backup_process(
        &self,
        spec: BackupProcessSpec<'_>,
    ) -> Result<(i64, String)> {
        let networking_config = self.source_network(spec.source_container_id).await;

        let config = ContainerCreateConfig {
            image: Some(spec.image.to_string()),
            cmd: Some(spec.command),
            env: Some(spec.environment),
            labels: Some(spec.labels),
            host_config: Some(HostConfig {
                binds: Some(to_binds(spec.volumes)),
                ..Default::default()
            }),
            networking_config,
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
            .context("Failed to create backup process container")?;
        let id = created.id;
        info!(container = %id, "backup process container created");

        self.docker
            .start_container::<String>(&id, None)
            .await
            .context("Failed to start backup process container")?;

        let exit_code = self.wait_for_exit(&id).await;
        let logs = self.collect_logs(&id).await;

        if let Err(err) = self
            .docker
            .remove_container(
                &id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            warn!(%err, container = %id, "failed to remove backup process container");
        }

        Ok((exit_code?, logs))
    }

    /// Network of the source container, so the spawned process lands on the
    /// same compose network.
    async fn source_network(
        &self,
        source_container_id: &str,
    ) -> Option<NetworkingConfig<String>> {
        let inspect = self
            .docker
            .inspect_container(source_container_id, None)
            .await
            .ok()?;

        let network = inspect
            .network_settings?
            .networks?
            .keys()
            .next()?
            .to_string();

        let mut endpoints_config = HashMap::new();
        endpoints_config.insert(network, EndpointSettings::default());
        Some(NetworkingConfig { endpoints_config })
    }

    async fn wait_for_exit(&self, id: &str) -> Result<i64> {
        let mut wait = self
            .docker
            .wait_container(id, None::<WaitContainerOptions<String>>);

        match wait.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit as an error variant
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(err)) => Err(err).context("Failed waiting for backup process container"),
            None => Ok(1),
        }
    }

    async fn collect_logs(&self, id: &str) -> String {
        let options = Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: "all".to_string(),
            ..Default::default()
        });

        let mut stream = self.docker.logs(id, options);
        let mut collected = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(output) => collected.push_str(&String::from_utf8_lossy(&output.into_bytes())),
                Err(err) => {
                    warn!(%err, container = %id, "failed reading backup process logs");
                    break;
                }
            }
        }
        collected
    }
}

/// Convert a volume mapping into docker bind strings.
fn to_binds(volumes: &VolumeMap) -> Vec<String> {
    let mut binds: Vec<String> = volumes
        .iter()
        .map(|(source, bind)| format!("{}:{}:{}", source, bind.bind, bind.mode.as_str()))
        .collect();
    // Deterministic ordering helps log comparison across runs
    binds.sort();
    binds
}
