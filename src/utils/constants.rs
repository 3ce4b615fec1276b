/// Label names and fixed defaults
///
/// Backup behaviour is driven entirely by labels on the sibling containers,
/// plus the standard labels docker-compose stamps on every container it starts.

/// Enables plain file/volume backup for a container.
pub const LABEL_VOLUMES: &str = "backup.volumes";

/// Comma separated substring patterns selecting mounts to back up.
pub const LABEL_VOLUMES_INCLUDE: &str = "backup.volumes.include";

/// Comma separated substring patterns selecting mounts to skip.
pub const LABEL_VOLUMES_EXCLUDE: &str = "backup.volumes.exclude";

/// Enables mysqldump-based backup for a MySQL container.
pub const LABEL_MYSQL: &str = "backup.mysql";

/// Enables mysqldump-based backup for a MariaDB container.
pub const LABEL_MARIADB: &str = "backup.mariadb";

/// Enables pg_dump-based backup for a PostgreSQL container.
pub const LABEL_POSTGRES: &str = "backup.postgres";

/// Marks the ephemeral container performing the actual backup. The value is
/// the exact string "True"; this is the single-flight signal.
pub const LABEL_BACKUP_PROCESS: &str = "backup.backup_process";

/// Sentinel value for [`LABEL_BACKUP_PROCESS`].
pub const BACKUP_PROCESS_MARKER: &str = "True";

// Standard docker-compose orchestration labels
pub const LABEL_COMPOSE_PROJECT: &str = "com.docker.compose.project";
pub const LABEL_COMPOSE_SERVICE: &str = "com.docker.compose.service";
pub const LABEL_COMPOSE_ONEOFF: &str = "com.docker.compose.oneoff";

/// Mount point inside the backup-process container for peer volumes.
pub const VOLUME_DEST_PREFIX: &str = "/volumes";

/// Command executed inside the spawned backup-process container.
pub const BACKUP_PROCESS_COMMAND: &[&str] = &["compose-backup", "start-backup-process"];
