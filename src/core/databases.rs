/// Database backup variants
///
/// A container with a database backup label gets a specialized view that
/// knows how to read connection credentials from the container environment,
/// check liveness, and produce the dump command whose output is streamed
/// into the restic repository.

use anyhow::{Context, Result};
use std::process::Stdio;
use tokio::process::Command;

use crate::core::container::Container;
use crate::core::error::BackupError;
use crate::core::restic;

/// Connection parameters extracted from a database container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: Option<String>,
}

/// Fixed capability interface every database variant implements.
pub trait DatabaseTarget {
    fn container(&self) -> &Container;
    fn engine(&self) -> &'static str;
    fn credentials(&self) -> Credentials;
    /// Liveness probe argv, exit code 0 when the service is reachable.
    fn ping_command(&self) -> Vec<String>;
    /// Dump argv whose stdout is the backup payload.
    fn dump_command(&self) -> Vec<String>;
    /// Snapshot path the dump is stored under in the repository.
    fn dump_filename(&self) -> String;
    /// Extra env vars for the dump/ping child processes.
    fn child_env(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

pub struct MariadbBackup<'a> {
    container: &'a Container,
}

pub struct MysqlBackup<'a> {
    container: &'a Container,
}

pub struct PostgresBackup<'a> {
    container: &'a Container,
}

/// MySQL and MariaDB share client tooling and env var conventions.
fn mysql_family_credentials(container: &Container) -> Credentials {
    Credentials {
        host: container.service_name().to_string(),
        port: 3306,
        username: container.get_config_env("MYSQL_USER").unwrap_or("").to_string(),
        password: container
            .get_config_env("MYSQL_PASSWORD")
            .unwrap_or("")
            .to_string(),
        database: None,
    }
}

fn mysql_family_ping(creds: &Credentials) -> Vec<String> {
    vec![
        "mysqladmin".to_string(),
        "ping".to_string(),
        format!("--host={}", creds.host),
        format!("--port={}", creds.port),
        format!("--user={}", creds.username),
        format!("--password={}", creds.password),
    ]
}

fn mysql_family_dump(creds: &Credentials) -> Vec<String> {
    vec![
        "mysqldump".to_string(),
        format!("--host={}", creds.host),
        format!("--port={}", creds.port),
        format!("--user={}", creds.username),
        format!("--password={}", creds.password),
        "--all-databases".to_string(),
    ]
}

impl DatabaseTarget for MariadbBackup<'_> {
    fn container(&self) -> &Container {
        self.container
    }

    fn engine(&self) -> &'static str {
        "mariadb"
    }

    fn credentials(&self) -> Credentials {
        mysql_family_credentials(self.container)
    }

    fn ping_command(&self) -> Vec<String> {
        mysql_family_ping(&self.credentials())
    }

    fn dump_command(&self) -> Vec<String> {
        mysql_family_dump(&self.credentials())
    }

    fn dump_filename(&self) -> String {
        format!("/databases/{}/all_databases.sql", self.container.service_name())
    }
}

impl DatabaseTarget for MysqlBackup<'_> {
    fn container(&self) -> &Container {
        self.container
    }

    fn engine(&self) -> &'static str {
        "mysql"
    }

    fn credentials(&self) -> Credentials {
        mysql_family_credentials(self.container)
    }

    fn ping_command(&self) -> Vec<String> {
        mysql_family_ping(&self.credentials())
    }

    fn dump_command(&self) -> Vec<String> {
        mysql_family_dump(&self.credentials())
    }

    fn dump_filename(&self) -> String {
        format!("/databases/{}/all_databases.sql", self.container.service_name())
    }
}

impl DatabaseTarget for PostgresBackup<'_> {
    fn container(&self) -> &Container {
        self.container
    }

    fn engine(&self) -> &'static str {
        "postgres"
    }

    fn credentials(&self) -> Credentials {
        Credentials {
            host: self.container.service_name().to_string(),
            port: 5432,
            username: self
                .container
                .get_config_env("POSTGRES_USER")
                .unwrap_or("")
                .to_string(),
            password: self
                .container
                .get_config_env("POSTGRES_PASSWORD")
                .unwrap_or("")
                .to_string(),
            // The postgres image creates a database named after the user's
            // POSTGRES_DB, falling back to the default "postgres" database
            database: Some(
                self.container
                    .get_config_env("POSTGRES_DB")
                    .unwrap_or("postgres")
                    .to_string(),
            ),
        }
    }

    fn ping_command(&self) -> Vec<String> {
        let creds = self.credentials();
        vec![
            "pg_isready".to_string(),
            format!("--host={}", creds.host),
            format!("--port={}", creds.port),
            format!("--username={}", creds.username),
        ]
    }

    fn dump_command(&self) -> Vec<String> {
        let creds = self.credentials();
        vec![
            "pg_dump".to_string(),
            format!("--host={}", creds.host),
            format!("--port={}", creds.port),
            format!("--user={}", creds.username),
            creds.database.unwrap_or_default(),
        ]
    }

    fn dump_filename(&self) -> String {
        let creds = self.credentials();
        format!(
            "/databases/{}/{}.sql",
            self.container.service_name(),
            creds.database.as_deref().unwrap_or_default()
        )
    }

    fn child_env(&self) -> Vec<(String, String)> {
        vec![("PGPASSWORD".to_string(), self.credentials().password)]
    }
}

/// Closed union of container specializations.
///
/// Selected once from the backup labels; a container whose labels enable
/// several engines resolves deterministically to the first match in the
/// order MariaDB, MySQL, PostgreSQL.
pub enum Instance<'a> {
    Plain(&'a Container),
    Mariadb(MariadbBackup<'a>),
    Mysql(MysqlBackup<'a>),
    Postgres(PostgresBackup<'a>),
}

impl Container {
    /// Get the service specific specialization for this container.
    ///
    /// Returns the plain view unless a database backup label is set.
    pub fn instance(&self) -> Instance<'_> {
        if self.mariadb_backup_enabled() {
            Instance::Mariadb(MariadbBackup { container: self })
        } else if self.mysql_backup_enabled() {
            Instance::Mysql(MysqlBackup { container: self })
        } else if self.postgres_backup_enabled() {
            Instance::Postgres(PostgresBackup { container: self })
        } else {
            Instance::Plain(self)
        }
    }
}

impl<'a> Instance<'a> {
    fn target(&self, operation: &'static str) -> Result<&dyn DatabaseTarget, BackupError> {
        match self {
            Instance::Plain(container) => Err(BackupError::NotApplicable {
                container: container.name().to_string(),
                operation,
            }),
            Instance::Mariadb(t) => Ok(t),
            Instance::Mysql(t) => Ok(t),
            Instance::Postgres(t) => Ok(t),
        }
    }

    /// Engine name for logging, `None` for the plain view.
    pub fn engine(&self) -> Option<&'static str> {
        self.target("engine").ok().map(|t| t.engine())
    }

    pub fn credentials(&self) -> Result<Credentials, BackupError> {
        Ok(self.target("credentials")?.credentials())
    }

    pub fn dump_command(&self) -> Result<Vec<String>, BackupError> {
        Ok(self.target("dump_command")?.dump_command())
    }

    /// Check the availability of the database service, returning the probe's
    /// exit code.
    pub async fn ping(&self) -> Result<i64> {
        let target = self.target("ping")?;
        let argv = target.ping_command();

        let status = Command::new(&argv[0])
            .args(&argv[1..])
            .envs(target.child_env())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .with_context(|| format!("failed to run {}", argv[0]))?;

        Ok(status.code().unwrap_or(1) as i64)
    }

    /// Stream a dump of this database into the repository.
    pub async fn backup(&self, repository: &str) -> Result<i64> {
        let target = self.target("backup")?;
        restic::backup_from_stdin(
            repository,
            &target.dump_filename(),
            &target.dump_command(),
            &target.child_env(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::container::fixtures::record;

    fn db_container(labels: &[(&str, &str)], env: &[&str]) -> Container {
        let mut raw = record("db01", labels, vec![]);
        raw.config.as_mut().unwrap().env =
            Some(env.iter().map(|e| e.to_string()).collect());
        Container::new(raw).unwrap()
    }

    #[test]
    fn test_plain_container_is_not_applicable() {
        let container = db_container(&[("backup.volumes", "true")], &[]);
        let instance = container.instance();

        assert!(matches!(instance, Instance::Plain(_)));
        assert!(matches!(
            instance.credentials(),
            Err(BackupError::NotApplicable { .. })
        ));
        assert!(matches!(
            instance.dump_command(),
            Err(BackupError::NotApplicable { .. })
        ));
    }

    #[test]
    fn test_variant_priority_mariadb_first() {
        let container = db_container(
            &[
                ("backup.postgres", "true"),
                ("backup.mysql", "true"),
                ("backup.mariadb", "true"),
            ],
            &[],
        );
        assert_eq!(container.instance().engine(), Some("mariadb"));
    }

    #[test]
    fn test_variant_priority_mysql_before_postgres() {
        let container = db_container(
            &[("backup.postgres", "true"), ("backup.mysql", "true")],
            &[],
        );
        assert_eq!(container.instance().engine(), Some("mysql"));
    }

    #[test]
    fn test_mysql_credentials_and_dump() {
        let container = db_container(
            &[
                ("backup.mysql", "true"),
                ("com.docker.compose.service", "mysql"),
            ],
            &["MYSQL_USER=backup", "MYSQL_PASSWORD=secret"],
        );
        let instance = container.instance();

        let creds = instance.credentials().unwrap();
        assert_eq!(creds.host, "mysql");
        assert_eq!(creds.port, 3306);
        assert_eq!(creds.username, "backup");
        assert_eq!(creds.password, "secret");

        let dump = instance.dump_command().unwrap();
        assert_eq!(
            dump,
            vec![
                "mysqldump",
                "--host=mysql",
                "--port=3306",
                "--user=backup",
                "--password=secret",
                "--all-databases",
            ]
        );
    }

    #[test]
    fn test_postgres_credentials_and_dump() {
        let container = db_container(
            &[
                ("backup.postgres", "true"),
                ("com.docker.compose.service", "pg"),
            ],
            &[
                "POSTGRES_USER=pguser",
                "POSTGRES_PASSWORD=pgpass",
                "POSTGRES_DB=app",
            ],
        );
        let instance = container.instance();

        let creds = instance.credentials().unwrap();
        assert_eq!(creds.port, 5432);
        assert_eq!(creds.database.as_deref(), Some("app"));

        let dump = instance.dump_command().unwrap();
        assert_eq!(
            dump,
            vec!["pg_dump", "--host=pg", "--port=5432", "--user=pguser", "app"]
        );

        match &instance {
            Instance::Postgres(target) => {
                assert_eq!(target.dump_filename(), "/databases/pg/app.sql");
                assert_eq!(
                    target.child_env(),
                    vec![("PGPASSWORD".to_string(), "pgpass".to_string())]
                );
            }
            _ => panic!("expected postgres variant"),
        }
    }

    #[test]
    fn test_postgres_defaults_database_name() {
        let container = db_container(
            &[
                ("backup.postgres", "true"),
                ("com.docker.compose.service", "pg"),
            ],
            &["POSTGRES_USER=pguser", "POSTGRES_PASSWORD=pgpass"],
        );
        let instance = container.instance();

        let creds = instance.credentials().unwrap();
        assert_eq!(creds.database.as_deref(), Some("postgres"));

        let dump = instance.dump_command().unwrap();
        assert_eq!(dump.last().map(String::as_str), Some("postgres"));

        match &instance {
            Instance::Postgres(target) => {
                assert_eq!(target.dump_filename(), "/databases/pg/postgres.sql");
            }
            _ => panic!("expected postgres variant"),
        }
    }

    #[test]
    fn test_mariadb_dump_filename() {
        let container = db_container(
            &[
                ("backup.mariadb", "true"),
                ("com.docker.compose.service", "mariadb"),
            ],
            &[],
        );
        match container.instance() {
            Instance::Mariadb(target) => {
                assert_eq!(target.dump_filename(), "/databases/mariadb/all_databases.sql");
            }
            _ => panic!("expected mariadb variant"),
        }
    }
}
