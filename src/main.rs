mod cli;
mod core;
mod utils;

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashMap;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::core::alerts::{self, Severity};
use crate::core::discovery::RunningContainers;
use crate::core::docker::BackupProcessSpec;
use crate::core::{restic, BackupError, Config, DockerManager};
use crate::utils::{
    BACKUP_PROCESS_COMMAND, BACKUP_PROCESS_MARKER, LABEL_BACKUP_PROCESS, LABEL_COMPOSE_PROJECT,
    VOLUME_DEST_PREFIX,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    setup_logging(cli.log_level.as_deref().unwrap_or(&config.log_level))?;

    // Our own identity is injected, not read ad hoc deeper down: docker sets
    // the container hostname to the truncated container id.
    let hostname = std::env::var("HOSTNAME")
        .context("HOSTNAME is not set; cannot identify our own container")?;

    let docker = DockerManager::new()?;
    let containers = docker.discover(&hostname).await?;
    tracing::debug!(
        id = containers.this_container().hostname(),
        "identified own container"
    );

    let exit_code = match cli.command {
        Commands::Status => handle_status(&config, &containers).await?,
        Commands::Snapshots => handle_snapshots(&config).await?,
        Commands::Backup => handle_backup(&config, &docker, &containers).await?,
        Commands::StartBackupProcess => {
            handle_start_backup_process(&config, &containers).await?
        }
        Commands::Cleanup => handle_cleanup(&config).await?,
        Commands::Alert => handle_alert(&config, &containers).await?,
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

fn setup_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .with_context(|| format!("invalid log level '{}'", level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// Output the backup plan detected for the compose project.
async fn handle_status(_config: &Config, containers: &RunningContainers) -> Result<i32> {
    info!(project = containers.project_name(), "status for compose project");
    info!(
        running = containers.backup_process_running(),
        "backup process container"
    );

    let backup_containers = containers.containers_for_backup();
    for container in &backup_containers {
        info!(service = container.service_name(), "backup enabled");

        if container.volume_backup_enabled() {
            for mount in container.filter_mounts() {
                info!(service = container.service_name(), volume = mount.source(), "will back up");
            }
        }

        if container.database_backup_enabled() {
            let instance = container.instance();
            let engine = instance.engine().unwrap_or("unknown");
            match instance.ping().await {
                Ok(0) => info!(service = container.service_name(), engine, "database is ready"),
                Ok(code) => error!(
                    service = container.service_name(),
                    engine, code, "database cannot be reached"
                ),
                Err(err) => error!(
                    service = container.service_name(),
                    engine, %err, "database ping failed"
                ),
            }
        }
    }

    if backup_containers.is_empty() {
        info!("no containers in the project carry backup labels");
    }

    Ok(0)
}

/// Advisory single-flight guard; see README for the accepted TOCTOU gap.
/// Refusing here means nothing gets spawned at all.
fn ensure_no_backup_process(containers: &RunningContainers) -> Result<(), BackupError> {
    if containers.backup_process_running() {
        return Err(BackupError::AlreadyRunning);
    }
    Ok(())
}

/// Per-target results of a backup run. A failing target is recorded and never
/// aborts the remaining ones; retention only runs after a clean sweep.
#[derive(Debug, Default)]
struct BackupRun {
    failed_targets: Vec<String>,
}

impl BackupRun {
    fn record(&mut self, target: &str, result: Result<i64>) {
        match result {
            Ok(0) => {}
            Ok(code) => {
                error!(code, "backup of '{}' exited with non-zero code", target);
                self.failed_targets.push(target.to_string());
            }
            Err(err) => {
                error!(%err, "backup of '{}' failed", target);
                self.failed_targets.push(target.to_string());
            }
        }
    }

    fn should_run_cleanup(&self) -> bool {
        self.failed_targets.is_empty()
    }

    fn exit_code(&self) -> i32 {
        if self.failed_targets.is_empty() {
            0
        } else {
            1
        }
    }
}

/// Outer phase: guard, prepare the repository, and spawn the backup process
/// container with every volume it needs mounted.
async fn handle_backup(
    config: &Config,
    docker: &DockerManager,
    containers: &RunningContainers,
) -> Result<i32> {
    ensure_no_backup_process(containers)?;

    info!("initializing repository (no-op if it already exists)");
    let init_code = restic::init_repo(&config.repository).await?;
    if init_code != 0 {
        warn!(code = init_code, "repository init failed, proceeding anyway");
    }

    // The backup process mirrors our own mounts, plus the read-only mounts
    // of every peer with volume backup enabled
    let this = containers.this_container();
    let mut volumes = this.volumes();
    volumes.extend(containers.generate_backup_mounts(VOLUME_DEST_PREFIX));

    let mut labels = HashMap::new();
    labels.insert(
        LABEL_BACKUP_PROCESS.to_string(),
        BACKUP_PROCESS_MARKER.to_string(),
    );
    labels.insert(
        LABEL_COMPOSE_PROJECT.to_string(),
        containers.project_name().to_string(),
    );

    let spec = BackupProcessSpec {
        image: this.image(),
        command: BACKUP_PROCESS_COMMAND.iter().map(|s| s.to_string()).collect(),
        volumes: &volumes,
        environment: this.environment().to_vec(),
        labels,
        source_container_id: this.id(),
    };

    let (exit_code, output) = match docker.spawn_backup_process(spec).await {
        Ok(result) => result,
        Err(err) => {
            error!(%err, "failed to run backup process container");
            alerts::send(
                config,
                "Exception during backup",
                &format!("{:#}", err),
                Severity::Error,
            )
            .await;
            return Ok(1);
        }
    };

    info!(exit_code, "backup process container finished");
    if exit_code != 0 {
        alerts::send(
            config,
            "Backup process exited with non-zero code",
            &output,
            Severity::Error,
        )
        .await;
        return Ok(1);
    }

    Ok(0)
}

/// Inner phase, running inside the spawned container: back up the collected
/// volumes and every database peer, then clean up if everything succeeded.
async fn handle_start_backup_process(
    config: &Config,
    containers: &RunningContainers,
) -> Result<i32> {
    let recognized = containers
        .backup_process_container()
        .map(|process| process == containers.this_container())
        .unwrap_or(false);
    if !recognized {
        error!(
            "cannot run the backup process in this container; use the backup \
             command instead, which spawns a container with the necessary mounts"
        );
        return Ok(1);
    }

    handle_status(config, containers).await?;
    let mut run = BackupRun::default();

    info!("backing up volumes");
    run.record(
        "volumes",
        restic::backup_files(&config.repository, VOLUME_DEST_PREFIX).await,
    );

    for container in containers.containers_for_backup() {
        if !container.database_backup_enabled() {
            continue;
        }

        let instance = container.instance();
        let engine = instance.engine().unwrap_or("unknown");
        info!(service = container.service_name(), engine, "backing up database");
        run.record(
            container.service_name(),
            instance.backup(&config.repository).await,
        );
    }

    if !run.should_run_cleanup() {
        // Retention is skipped on partial failure: the snapshot set from
        // this run is incomplete, pruning against it would lose data
        error!("one or more backup targets failed, skipping cleanup");
        return Ok(run.exit_code());
    }

    handle_cleanup(config).await
}

/// Run forget / prune to minimize storage space.
async fn handle_cleanup(config: &Config) -> Result<i32> {
    info!("forgetting outdated snapshots");
    let forget_code = restic::forget(&config.repository, &config.retention).await?;

    info!("pruning stale data");
    let prune_code = restic::prune(&config.repository).await?;

    if forget_code == 0 && prune_code == 0 {
        Ok(0)
    } else {
        error!(forget_code, prune_code, "cleanup failed");
        Ok(1)
    }
}

async fn handle_snapshots(config: &Config) -> Result<i32> {
    let (stdout, stderr) = restic::snapshots(&config.repository, true).await?;
    print!("{}", stdout);
    if !stderr.is_empty() {
        eprint!("{}", stderr);
    }
    Ok(0)
}

async fn handle_alert(config: &Config, containers: &RunningContainers) -> Result<i32> {
    info!("sending test alert");
    alerts::send(
        config,
        &format!("{}: Test Alert", containers.project_name()),
        "Test message",
        Severity::Info,
    )
    .await;
    Ok(0)
}
