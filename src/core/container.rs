/// Container and mount models
///
/// Normalizes the raw docker inspect records into the entities the backup
/// logic reasons about: which mounts a container has, which backup labels it
/// carries, and what a spawned backup process would need to mount.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use bollard::models::{ContainerInspectResponse, MountPoint, MountPointTypeEnum};

use crate::core::error::BackupError;
use crate::utils::{
    is_true, strip_leading_slash, BACKUP_PROCESS_MARKER, LABEL_BACKUP_PROCESS,
    LABEL_COMPOSE_ONEOFF, LABEL_COMPOSE_PROJECT, LABEL_COMPOSE_SERVICE, LABEL_MARIADB,
    LABEL_MYSQL, LABEL_POSTGRES, LABEL_VOLUMES, LABEL_VOLUMES_EXCLUDE, LABEL_VOLUMES_INCLUDE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    Bind,
    Volume,
}

/// A bind path or named volume attached to a container.
#[derive(Debug, Clone)]
pub struct Mount {
    kind: MountKind,
    name: Option<String>,
    source: String,
    destination: String,
}

impl Mount {
    fn from_record(point: MountPoint) -> Result<Self, BackupError> {
        let kind = match point.typ {
            Some(MountPointTypeEnum::BIND) => MountKind::Bind,
            Some(MountPointTypeEnum::VOLUME) => MountKind::Volume,
            other => {
                return Err(BackupError::MalformedRecord(format!(
                    "unsupported mount type {:?}",
                    other
                )))
            }
        };

        let name = point.name.filter(|n| !n.is_empty());
        if kind == MountKind::Volume && name.is_none() {
            return Err(BackupError::MalformedRecord(
                "volume mount without a name".to_string(),
            ));
        }

        Ok(Self {
            kind,
            name,
            source: point.source.unwrap_or_default(),
            destination: point.destination.unwrap_or_default(),
        })
    }

    /// Host path (bind) or the volume's data directory on the host.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Mount path inside the owning container.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Stable identity used for deduplication: volumes are identified by
    /// name, binds by their host source path.
    pub fn identity(&self) -> &str {
        match self.kind {
            // Name presence is enforced at construction
            MountKind::Volume => self.name.as_deref().unwrap_or(&self.source),
            MountKind::Bind => &self.source,
        }
    }
}

impl PartialEq for Mount {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Mount {}

impl Hash for Mount {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    ReadOnly,
    ReadWrite,
}

impl BindMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindMode::ReadOnly => "ro",
            BindMode::ReadWrite => "rw",
        }
    }
}

/// Where and how a source path is mounted into a spawned container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeBind {
    pub bind: String,
    pub mode: BindMode,
}

/// Host source (or volume data dir) -> bind target, docker-py volumes shape.
pub type VolumeMap = HashMap<String, VolumeBind>;

/// A running container, normalized from a point-in-time inspect snapshot.
///
/// Constructed fresh on every discovery pass and never mutated. Equality is
/// by container id only.
#[derive(Debug, Clone)]
pub struct Container {
    id: String,
    name: String,
    image: String,
    labels: HashMap<String, String>,
    environment: Vec<String>,
    mounts: Vec<Mount>,
    running: bool,
    include: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
}

impl Container {
    /// Build a Container from a raw inspect record.
    ///
    /// Fails with [`BackupError::MalformedRecord`] when the running-state
    /// block, the configuration block, or its labels map is absent. Absent
    /// backup labels are fine (backup disabled); absent metadata is not.
    pub fn new(record: ContainerInspectResponse) -> Result<Self, BackupError> {
        let id = record
            .id
            .ok_or_else(|| BackupError::MalformedRecord("Id".to_string()))?;
        let state = record
            .state
            .ok_or_else(|| BackupError::MalformedRecord("State".to_string()))?;
        let config = record
            .config
            .ok_or_else(|| BackupError::MalformedRecord("Config".to_string()))?;
        let labels = config
            .labels
            .ok_or_else(|| BackupError::MalformedRecord("Config.Labels".to_string()))?;

        let mounts = record
            .mounts
            .unwrap_or_default()
            .into_iter()
            .map(Mount::from_record)
            .collect::<Result<Vec<_>, _>>()?;

        let name = record
            .name
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_else(|| id.clone());

        let include = parse_pattern(labels.get(LABEL_VOLUMES_INCLUDE));
        let exclude = parse_pattern(labels.get(LABEL_VOLUMES_EXCLUDE));

        Ok(Self {
            id,
            name,
            image: config.image.unwrap_or_default(),
            labels,
            environment: config.env.unwrap_or_default(),
            mounts,
            running: state.running.unwrap_or(false),
            include,
            exclude,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 12 character hostname docker derives from the container id.
    pub fn hostname(&self) -> &str {
        self.id.get(..12).unwrap_or(&self.id)
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// All configured env vars, as the raw ordered "KEY=VALUE" list.
    pub fn environment(&self) -> &[String] {
        &self.environment
    }

    /// Look up an env var from the container's configuration.
    pub fn get_config_env(&self, name: &str) -> Option<&str> {
        // Later entries win, matching how docker resolves duplicates
        self.environment.iter().rev().find_map(|entry| {
            entry
                .split_once('=')
                .filter(|(key, _)| *key == name)
                .map(|(_, value)| value)
        })
    }

    pub fn get_label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Compose service name, empty when not started by compose.
    pub fn service_name(&self) -> &str {
        self.get_label(LABEL_COMPOSE_SERVICE).unwrap_or("")
    }

    /// Compose project name, empty when not started by compose.
    pub fn project_name(&self) -> &str {
        self.get_label(LABEL_COMPOSE_PROJECT).unwrap_or("")
    }

    /// Was this container started with `docker compose run`?
    pub fn is_oneoff(&self) -> bool {
        self.get_label(LABEL_COMPOSE_ONEOFF) == Some("True")
    }

    pub fn volume_backup_enabled(&self) -> bool {
        is_true(self.get_label(LABEL_VOLUMES))
    }

    pub fn mysql_backup_enabled(&self) -> bool {
        is_true(self.get_label(LABEL_MYSQL))
    }

    pub fn mariadb_backup_enabled(&self) -> bool {
        is_true(self.get_label(LABEL_MARIADB))
    }

    pub fn postgres_backup_enabled(&self) -> bool {
        is_true(self.get_label(LABEL_POSTGRES))
    }

    /// Is database backup enabled in any shape or form?
    pub fn database_backup_enabled(&self) -> bool {
        self.mysql_backup_enabled()
            || self.mariadb_backup_enabled()
            || self.postgres_backup_enabled()
    }

    pub fn backup_enabled(&self) -> bool {
        self.volume_backup_enabled() || self.database_backup_enabled()
    }

    /// Is this container the running backup process?
    pub fn is_backup_process_container(&self) -> bool {
        self.get_label(LABEL_BACKUP_PROCESS) == Some(BACKUP_PROCESS_MARKER)
    }

    /// All mounts matching the include/exclude filters.
    ///
    /// An include list wins over an exclude list; with neither, every mount
    /// is kept in order. Matching is case-sensitive substring containment
    /// against the mount source.
    pub fn filter_mounts(&self) -> Vec<&Mount> {
        if let Some(include) = &self.include {
            self.mounts
                .iter()
                .filter(|m| include.iter().any(|p| m.source().contains(p.as_str())))
                .collect()
        } else if let Some(exclude) = &self.exclude {
            self.mounts
                .iter()
                .filter(|m| !exclude.iter().any(|p| m.source().contains(p.as_str())))
                .collect()
        } else {
            self.mounts.iter().collect()
        }
    }

    /// Full mapping of this container's own mounts, read-write.
    ///
    /// Used to mirror the calling container's mounts into the spawned backup
    /// process so it sees the same configuration and repository cache.
    pub fn volumes(&self) -> VolumeMap {
        self.mounts
            .iter()
            .map(|mount| {
                (
                    mount.source().to_string(),
                    VolumeBind {
                        bind: mount.destination().to_string(),
                        mode: BindMode::ReadWrite,
                    },
                )
            })
            .collect()
    }

    /// Mapping of the filtered mounts, re-rooted under
    /// `source_prefix/service_name/`.
    pub fn volumes_for_backup(&self, source_prefix: &str, mode: BindMode) -> VolumeMap {
        self.filter_mounts()
            .into_iter()
            .map(|mount| {
                let bind = format!(
                    "{}/{}/{}",
                    source_prefix,
                    self.service_name(),
                    strip_leading_slash(mount.destination())
                );
                (mount.source().to_string(), VolumeBind { bind, mode })
            })
            .collect()
    }
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Container {}

/// Parse a comma separated include/exclude pattern label.
///
/// Malformed or empty values mean "no filter", never an error.
fn parse_pattern(value: Option<&String>) -> Option<Vec<String>> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    Some(value.split(',').map(str::to_string).collect())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::HashMap;

    use bollard::models::{
        ContainerConfig, ContainerInspectResponse, ContainerState, MountPoint,
        MountPointTypeEnum,
    };

    pub fn bind_mount(source: &str, destination: &str) -> MountPoint {
        MountPoint {
            typ: Some(MountPointTypeEnum::BIND),
            source: Some(source.to_string()),
            destination: Some(destination.to_string()),
            ..Default::default()
        }
    }

    pub fn volume_mount(name: &str, destination: &str) -> MountPoint {
        MountPoint {
            typ: Some(MountPointTypeEnum::VOLUME),
            name: Some(name.to_string()),
            source: Some(format!("/var/lib/docker/volumes/{}/_data", name)),
            destination: Some(destination.to_string()),
            ..Default::default()
        }
    }

    pub fn record(
        id: &str,
        labels: &[(&str, &str)],
        mounts: Vec<MountPoint>,
    ) -> ContainerInspectResponse {
        let labels: HashMap<String, String> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        ContainerInspectResponse {
            id: Some(id.to_string()),
            name: Some(format!("/{}", id)),
            state: Some(ContainerState {
                running: Some(true),
                ..Default::default()
            }),
            config: Some(ContainerConfig {
                image: Some("docker.io/library/test:latest".to_string()),
                env: Some(vec![]),
                labels: Some(labels),
                ..Default::default()
            }),
            mounts: Some(mounts),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{bind_mount, record, volume_mount};
    use super::*;
    use bollard::models::{ContainerConfig, ContainerState};

    #[test]
    fn test_missing_state_is_malformed() {
        let mut raw = record("c1", &[], vec![]);
        raw.state = None;
        match Container::new(raw) {
            Err(BackupError::MalformedRecord(what)) => assert_eq!(what, "State"),
            other => panic!("expected MalformedRecord, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_config_is_malformed() {
        let mut raw = record("c1", &[], vec![]);
        raw.config = None;
        assert!(matches!(
            Container::new(raw),
            Err(BackupError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_missing_labels_is_malformed() {
        let mut raw = record("c1", &[], vec![]);
        raw.config = Some(ContainerConfig {
            labels: None,
            ..Default::default()
        });
        assert!(matches!(
            Container::new(raw),
            Err(BackupError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_unknown_mount_type_fails_fast() {
        let mut mount = bind_mount("/srv/data", "/data");
        mount.typ = Some(bollard::models::MountPointTypeEnum::TMPFS);
        let raw = record("c1", &[], vec![mount]);
        assert!(matches!(
            Container::new(raw),
            Err(BackupError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_label_capabilities() {
        let container = Container::new(record(
            "c1",
            &[("backup.volumes", "true"), ("com.docker.compose.service", "web")],
            vec![],
        ))
        .unwrap();

        assert!(container.volume_backup_enabled());
        assert!(!container.database_backup_enabled());
        assert!(container.backup_enabled());
        assert!(!container.is_backup_process_container());
        assert_eq!(container.service_name(), "web");
    }

    #[test]
    fn test_backup_disabled_without_labels() {
        let container = Container::new(record("c1", &[], vec![])).unwrap();
        assert!(!container.backup_enabled());
    }

    #[test]
    fn test_hostname_truncation() {
        let long = Container::new(record("0123456789abcdef", &[], vec![])).unwrap();
        assert_eq!(long.hostname(), "0123456789ab");

        // Short test ids must not panic
        let short = Container::new(record("abc", &[], vec![])).unwrap();
        assert_eq!(short.hostname(), "abc");
    }

    #[test]
    fn test_get_config_env_last_wins() {
        let mut raw = record("c1", &[], vec![]);
        raw.config = Some(ContainerConfig {
            env: Some(vec![
                "MYSQL_USER=first".to_string(),
                "MYSQL_USER=second".to_string(),
            ]),
            labels: Some(Default::default()),
            ..Default::default()
        });
        raw.state = Some(ContainerState {
            running: Some(true),
            ..Default::default()
        });
        let container = Container::new(raw).unwrap();
        assert_eq!(container.get_config_env("MYSQL_USER"), Some("second"));
        assert_eq!(container.get_config_env("MISSING"), None);
    }

    #[test]
    fn test_filter_mounts_include() {
        let container = Container::new(record(
            "c1",
            &[("backup.volumes.include", "media")],
            vec![
                bind_mount("/srv/files/media", "/srv/media"),
                bind_mount("/srv/files/stuff", "/srv/stuff"),
            ],
        ))
        .unwrap();

        let mounts = container.filter_mounts();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].source(), "/srv/files/media");
    }

    #[test]
    fn test_filter_mounts_include_can_match_nothing() {
        let container = Container::new(record(
            "c1",
            &[("backup.volumes.include", "nomatch")],
            vec![bind_mount("/srv/files/media", "/srv/media")],
        ))
        .unwrap();
        assert!(container.filter_mounts().is_empty());
    }

    #[test]
    fn test_filter_mounts_exclude() {
        let container = Container::new(record(
            "c1",
            &[("backup.volumes.exclude", "stuff")],
            vec![
                bind_mount("/srv/files/media", "/srv/media"),
                bind_mount("/srv/files/stuff", "/srv/stuff"),
            ],
        ))
        .unwrap();

        let mounts = container.filter_mounts();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].source(), "/srv/files/media");
    }

    #[test]
    fn test_include_wins_over_exclude() {
        let container = Container::new(record(
            "c1",
            &[
                ("backup.volumes.include", "media"),
                ("backup.volumes.exclude", "media"),
            ],
            vec![
                bind_mount("/srv/files/media", "/srv/media"),
                bind_mount("/srv/files/stuff", "/srv/stuff"),
            ],
        ))
        .unwrap();

        let mounts = container.filter_mounts();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].source(), "/srv/files/media");
    }

    #[test]
    fn test_no_filter_keeps_all_in_order() {
        let container = Container::new(record(
            "c1",
            &[],
            vec![
                bind_mount("/srv/files/media", "/srv/media"),
                bind_mount("/srv/files/stuff", "/srv/stuff"),
            ],
        ))
        .unwrap();

        let mounts = container.filter_mounts();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0].source(), "/srv/files/media");
        assert_eq!(mounts[1].source(), "/srv/files/stuff");
    }

    #[test]
    fn test_blank_pattern_means_no_filter() {
        let container = Container::new(record(
            "c1",
            &[("backup.volumes.include", "  ")],
            vec![bind_mount("/srv/files/media", "/srv/media")],
        ))
        .unwrap();
        assert_eq!(container.filter_mounts().len(), 1);
    }

    #[test]
    fn test_volumes_for_backup_paths() {
        let container = Container::new(record(
            "c1",
            &[("com.docker.compose.service", "web")],
            vec![bind_mount("/srv/files/media", "/srv/media")],
        ))
        .unwrap();

        let volumes = container.volumes_for_backup("/volumes", BindMode::ReadOnly);
        let bind = volumes.get("/srv/files/media").unwrap();
        assert_eq!(bind.bind, "/volumes/web/srv/media");
        assert_eq!(bind.mode, BindMode::ReadOnly);
    }

    #[test]
    fn test_volumes_for_backup_idempotent() {
        let container = Container::new(record(
            "c1",
            &[("com.docker.compose.service", "web")],
            vec![
                bind_mount("/srv/files/media", "/srv/media"),
                volume_mount("web_data", "/var/www"),
            ],
        ))
        .unwrap();

        let first = container.volumes_for_backup("/volumes", BindMode::ReadOnly);
        let second = container.volumes_for_backup("/volumes", BindMode::ReadOnly);
        assert_eq!(first, second);
    }

    #[test]
    fn test_own_volumes_are_read_write() {
        let container = Container::new(record(
            "c1",
            &[],
            vec![bind_mount("/srv/app", "/app")],
        ))
        .unwrap();

        let volumes = container.volumes();
        let bind = volumes.get("/srv/app").unwrap();
        assert_eq!(bind.bind, "/app");
        assert_eq!(bind.mode, BindMode::ReadWrite);
    }

    #[test]
    fn test_mount_identity() {
        let volume = Mount::from_record(volume_mount("web_data", "/var/www")).unwrap();
        assert_eq!(volume.identity(), "web_data");

        let bind = Mount::from_record(bind_mount("/srv/app", "/app")).unwrap();
        assert_eq!(bind.identity(), "/srv/app");
    }
}
