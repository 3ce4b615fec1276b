/// Alert delivery for failed backup runs
///
/// Two webhook sinks: a generic JSON webhook and a Discord-compatible one.
/// Unconfigured sinks are skipped silently; a failing sink is logged but
/// never escalates, since alerting already happens on the failure path.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};

use crate::core::config::Config;

/// Discord rejects messages over 2000 characters.
const DISCORD_MESSAGE_LIMIT: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

impl Severity {
    fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Error => "ERROR",
        }
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    body: &'a str,
    severity: &'a str,
    timestamp: String,
}

/// Send an alert through every configured sink.
pub async fn send(config: &Config, subject: &str, body: &str, severity: Severity) {
    if config.alert_webhook_url.is_none() && config.discord_webhook_url.is_none() {
        info!(subject, "no alert sinks configured, skipping alert");
        return;
    }

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            error!(%err, "failed to build alert http client");
            return;
        }
    };

    if let Some(url) = &config.alert_webhook_url {
        if let Err(err) = send_webhook(&client, url, subject, body, severity).await {
            error!(%err, "failed to deliver webhook alert");
        }
    }

    if let Some(url) = &config.discord_webhook_url {
        if let Err(err) = send_discord(&client, url, subject, body).await {
            error!(%err, "failed to deliver discord alert");
        }
    }
}

async fn send_webhook(
    client: &reqwest::Client,
    url: &str,
    subject: &str,
    body: &str,
    severity: Severity,
) -> Result<()> {
    let payload = WebhookPayload {
        subject,
        body,
        severity: severity.as_str(),
        timestamp: Utc::now().to_rfc3339(),
    };

    client
        .post(url)
        .json(&payload)
        .send()
        .await?
        .error_for_status()?;

    info!(subject, "alert delivered to webhook");
    Ok(())
}

async fn send_discord(
    client: &reqwest::Client,
    url: &str,
    subject: &str,
    body: &str,
) -> Result<()> {
    let payload = serde_json::json!({
        "content": discord_message(subject, body),
    });

    client
        .post(url)
        .json(&payload)
        .send()
        .await?
        .error_for_status()?;

    info!(subject, "alert delivered to discord");
    Ok(())
}

/// Format subject and body as a fenced discord message, truncating the body
/// to stay under the message size limit.
fn discord_message(subject: &str, body: &str) -> String {
    let framing = format!("**{}**\n```\n\n```", subject);
    let budget = DISCORD_MESSAGE_LIMIT.saturating_sub(framing.len());

    let mut body = body.trim().to_string();
    if body.len() > budget {
        // Back off to a char boundary so truncation cannot panic
        let mut end = budget;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }

    format!("**{}**\n```\n{}\n```", subject, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discord_message_format() {
        let message = discord_message("Backup failed", "something broke");
        assert!(message.starts_with("**Backup failed**\n```\n"));
        assert!(message.ends_with("\n```"));
        assert!(message.contains("something broke"));
    }

    #[test]
    fn test_discord_message_truncated() {
        let body = "x".repeat(5000);
        let message = discord_message("Backup failed", &body);
        assert!(message.len() <= DISCORD_MESSAGE_LIMIT);
    }

    #[test]
    fn test_discord_message_truncates_on_char_boundary() {
        let body = "é".repeat(3000);
        let message = discord_message("Backup failed", &body);
        assert!(message.len() <= DISCORD_MESSAGE_LIMIT);
    }
}
