/// CLI argument parsing

use clap::{Parser, Subcommand};

// Build timestamp injected at compile time
pub const VERSION_WITH_BUILD: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (built: ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser)]
#[command(name = "compose-backup")]
#[command(author, version = VERSION_WITH_BUILD, about, long_about = None)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the detected backup configuration for the compose project
    Status,

    /// List the most recent snapshots in the repository
    Snapshots,

    /// Spawn a backup process container and run a full backup
    Backup,

    /// Entrypoint of the spawned backup process container (internal)
    StartBackupProcess,

    /// Forget and prune outdated snapshots
    Cleanup,

    /// Send a test alert through the configured sinks
    Alert,
}
