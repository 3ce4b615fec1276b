/// Thin wrappers around the restic binary
///
/// Repository credentials (RESTIC_PASSWORD and any backend-specific vars) are
/// inherited from the process environment; only the repository reference is
/// passed explicitly.

use anyhow::{Context, Result};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

fn restic(repository: &str, args: &[&str]) -> Command {
    let mut cmd = Command::new("restic");
    cmd.arg("-r").arg(repository);
    cmd.args(args);
    cmd
}

async fn run(repository: &str, args: &[&str]) -> Result<i64> {
    debug!(?args, "running restic");
    let status = restic(repository, args)
        .status()
        .await
        .context("failed to run restic")?;
    Ok(status.code().unwrap_or(1) as i64)
}

/// Initialize the repository. Tolerates a repository that already exists so
/// repeated backup runs do not fail on a no-op init.
pub async fn init_repo(repository: &str) -> Result<i64> {
    let output = restic(repository, &["init"])
        .output()
        .await
        .context("failed to run restic init")?;

    if output.status.success() {
        return Ok(0);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("already initialized") || stderr.contains("already exists") {
        debug!("repository already initialized");
        return Ok(0);
    }

    warn!(stderr = %stderr.trim(), "restic init failed");
    Ok(output.status.code().unwrap_or(1) as i64)
}

/// Back up a directory tree into the repository.
pub async fn backup_files(repository: &str, source: &str) -> Result<i64> {
    run(repository, &["--verbose", "backup", source]).await
}

/// Pipe the stdout of `source_command` into `restic backup --stdin`.
///
/// A non-zero exit from the dump command marks the backup failed even when
/// restic itself stored the (truncated) stream successfully.
pub async fn backup_from_stdin(
    repository: &str,
    filename: &str,
    source_command: &[String],
    extra_env: &[(String, String)],
) -> Result<i64> {
    debug!(command = ?source_command, filename, "streaming dump into repository");

    let mut dump = Command::new(&source_command[0])
        .args(&source_command[1..])
        .envs(extra_env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdout(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn {}", source_command[0]))?;

    let mut dump_stdout = dump
        .stdout
        .take()
        .context("dump command has no stdout handle")?;

    let mut store = restic(
        repository,
        &["backup", "--stdin", "--stdin-filename", filename],
    )
    .stdin(Stdio::piped())
    .spawn()
    .context("failed to spawn restic backup --stdin")?;

    let mut store_stdin = store
        .stdin
        .take()
        .context("restic has no stdin handle")?;

    tokio::io::copy(&mut dump_stdout, &mut store_stdin)
        .await
        .context("streaming dump output into restic failed")?;
    // Close restic's stdin so it finalizes the snapshot
    drop(store_stdin);

    let dump_status = dump.wait().await.context("waiting for dump command")?;
    let store_status = store.wait().await.context("waiting for restic")?;

    if !dump_status.success() {
        return Ok(dump_status.code().unwrap_or(1) as i64);
    }
    Ok(store_status.code().unwrap_or(1) as i64)
}

/// Retention policy forwarded verbatim to `restic forget`.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub keep_daily: String,
    pub keep_weekly: String,
    pub keep_monthly: String,
    pub keep_yearly: String,
}

fn forget_args(policy: &RetentionPolicy) -> Vec<String> {
    vec![
        "forget".to_string(),
        "--group-by".to_string(),
        "paths".to_string(),
        "--keep-daily".to_string(),
        policy.keep_daily.clone(),
        "--keep-weekly".to_string(),
        policy.keep_weekly.clone(),
        "--keep-monthly".to_string(),
        policy.keep_monthly.clone(),
        "--keep-yearly".to_string(),
        policy.keep_yearly.clone(),
    ]
}

/// Forget snapshots outside the retention policy.
pub async fn forget(repository: &str, policy: &RetentionPolicy) -> Result<i64> {
    let args = forget_args(policy);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    run(repository, &args).await
}

/// Prune unreferenced repository data.
pub async fn prune(repository: &str) -> Result<i64> {
    run(repository, &["prune"]).await
}

/// List snapshots, returning captured stdout and stderr.
pub async fn snapshots(repository: &str, last: bool) -> Result<(String, String)> {
    let mut args = vec!["snapshots"];
    if last {
        args.push("--last");
    }

    let output = restic(repository, &args)
        .output()
        .await
        .context("failed to run restic snapshots")?;

    Ok((
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forget_args() {
        let policy = RetentionPolicy {
            keep_daily: "7".to_string(),
            keep_weekly: "4".to_string(),
            keep_monthly: "12".to_string(),
            keep_yearly: "3".to_string(),
        };

        assert_eq!(
            forget_args(&policy),
            vec![
                "forget",
                "--group-by",
                "paths",
                "--keep-daily",
                "7",
                "--keep-weekly",
                "4",
                "--keep-monthly",
                "12",
                "--keep-yearly",
                "3",
            ]
        );
    }
}
