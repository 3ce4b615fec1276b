/// Error taxonomy for discovery and backup dispatch
///
/// Delegate failures (docker, restic, webhooks) stay as `anyhow::Error` with
/// context attached; the variants below are the ones callers pattern-match on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    /// A container record from the docker API is missing a required block.
    /// Discovery cannot continue on a partial snapshot.
    #[error("container record missing required metadata: {0}")]
    MalformedRecord(String),

    /// The hostname of this process does not prefix exactly one container id.
    /// Without knowing which container we are, we cannot reason about the
    /// deployment group.
    #[error("cannot identify own container from hostname '{0}'")]
    SelfNotFound(String),

    /// Another backup-process container already carries the marker label.
    /// Advisory guard only; see the concurrency notes in the README.
    #[error("a backup process container is already running")]
    AlreadyRunning,

    /// A database operation was invoked on a container without a database
    /// backup label. Configuration or programmer error.
    #[error("container '{container}' has no database backup label; {operation} is not applicable")]
    NotApplicable {
        container: String,
        operation: &'static str,
    },
}
