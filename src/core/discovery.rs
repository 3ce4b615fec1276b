/// Running-group discovery
///
/// Takes a point-in-time snapshot of every container visible to the runtime
/// and partitions it: the container this process runs in, an already-running
/// backup process if any, and the peers of the same compose project.

use bollard::models::ContainerInspectResponse;
use tracing::debug;

use crate::core::container::{BindMode, Container, VolumeMap};
use crate::core::error::BackupError;

/// The discovered deployment group. Read-only after construction; rebuilt
/// fresh on every invocation.
pub struct RunningContainers {
    this_container: Container,
    backup_process_container: Option<Container>,
    containers: Vec<Container>,
}

impl RunningContainers {
    /// Partition a container snapshot around our own identity.
    ///
    /// `hostname` is the identifier of the calling process's container
    /// (docker sets the container hostname to the truncated id). It must
    /// prefix exactly one record's id; zero or several matches mean we
    /// cannot reason about ourselves and discovery fails.
    pub fn detect(
        records: Vec<ContainerInspectResponse>,
        hostname: &str,
    ) -> Result<Self, BackupError> {
        let all = records
            .into_iter()
            .map(Container::new)
            .collect::<Result<Vec<_>, _>>()?;

        let mut matches = all.iter().filter(|c| c.id().starts_with(hostname));
        let this_container = match (matches.next(), matches.next()) {
            (Some(found), None) => found.clone(),
            _ => return Err(BackupError::SelfNotFound(hostname.to_string())),
        };

        let mut backup_process_container = None;
        let mut containers = Vec::new();

        for container in all {
            // First match wins should more than one marker exist
            if container.is_backup_process_container() && backup_process_container.is_none() {
                debug!(
                    container = container.name(),
                    "found a running backup process container"
                );
                backup_process_container = Some(container.clone());
            }

            if container.project_name() == this_container.project_name()
                && container.is_running()
                && !container.is_oneoff()
                && container.id() != this_container.id()
            {
                containers.push(container);
            }
        }

        Ok(Self {
            this_container,
            backup_process_container,
            containers,
        })
    }

    /// The container this process runs in.
    pub fn this_container(&self) -> &Container {
        &self.this_container
    }

    pub fn backup_process_container(&self) -> Option<&Container> {
        self.backup_process_container.as_ref()
    }

    /// Is a backup process container running anywhere in the group?
    pub fn backup_process_running(&self) -> bool {
        self.backup_process_container.is_some()
    }

    /// Name of the compose project.
    pub fn project_name(&self) -> &str {
        self.this_container.project_name()
    }

    /// Peers of the same project: running, not one-off, not us.
    pub fn containers(&self) -> &[Container] {
        &self.containers
    }

    /// All peers with backup enabled in any shape or form.
    pub fn containers_for_backup(&self) -> Vec<&Container> {
        self.containers.iter().filter(|c| c.backup_enabled()).collect()
    }

    /// Union of the read-only backup mounts for every peer with volume
    /// backup enabled, keyed by host source (last write wins on collision).
    pub fn generate_backup_mounts(&self, dest_prefix: &str) -> VolumeMap {
        let mut mounts = VolumeMap::new();
        for container in self.containers_for_backup() {
            if container.volume_backup_enabled() {
                mounts.extend(container.volumes_for_backup(dest_prefix, BindMode::ReadOnly));
            }
        }
        mounts
    }

    pub fn get_service(&self, name: &str) -> Option<&Container> {
        self.containers.iter().find(|c| c.service_name() == name)
    }
}
