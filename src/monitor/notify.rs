//! Best-effort alert delivery.
//!
//! Every configured channel implements one capability interface and is
//! invoked concurrently. Outcomes are logged per channel and never
//! aggregated: a dead webhook must not block the others, and delivery has no
//! bearing on latch state (the alert was already persisted when dispatch
//! starts).

use std::time::Duration;

use async_trait::async_trait;

use crate::config::NotifierConfig;
use crate::error::{HostwatchError, Result};
use crate::monitor::alerts::Alert;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name used for logging (e.g. `"slack"`).
    fn name(&self) -> &str;

    async fn send(&self, alert: &Alert) -> Result<()>;
}

/// Build the channels that have endpoints configured. A channel with no
/// configuration is simply absent, never an error.
pub fn build_notifiers(config: &NotifierConfig) -> Vec<Box<dyn Notifier>> {
    let client = http_client();
    let mut notifiers: Vec<Box<dyn Notifier>> = Vec::new();

    if let Some(url) = &config.slack_webhook {
        notifiers.push(Box::new(SlackNotifier {
            webhook_url: url.clone(),
            client: client.clone(),
        }));
    }
    if let Some(url) = &config.discord_webhook {
        notifiers.push(Box::new(DiscordNotifier {
            webhook_url: url.clone(),
            client: client.clone(),
        }));
    }
    if let Some(url) = &config.webhook_url {
        notifiers.push(Box::new(WebhookNotifier {
            url: url.clone(),
            client,
        }));
    }

    if notifiers.is_empty() {
        log::info!("no notifier channels configured; alerts are persisted only");
    }
    notifiers
}

/// Fan one alert out to all channels concurrently. Failures are contained
/// per channel.
pub async fn dispatch_all(notifiers: &[Box<dyn Notifier>], alert: &Alert) {
    let sends = notifiers.iter().map(|notifier| async move {
        match notifier.send(alert).await {
            Ok(()) => log::debug!("alert {} delivered via {}", alert.id, notifier.name()),
            Err(e) => log::warn!("alert delivery via {} failed: {}", notifier.name(), e),
        }
    });
    futures::future::join_all(sends).await;
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|e| {
            log::warn!("falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        })
}

/// Slack incoming-webhook channel.
pub struct SlackNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &str {
        "slack"
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let payload = serde_json::json!({
            "text": format!("*{}*\n{}", alert.subject, alert.body),
        });
        post_json(&self.client, &self.webhook_url, &payload, self.name()).await
    }
}

/// Discord webhook channel.
pub struct DiscordNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let payload = serde_json::json!({
            "content": format!("**{}**\n{}", alert.subject, alert.body),
        });
        post_json(&self.client, &self.webhook_url, &payload, self.name()).await
    }
}

/// Generic JSON webhook: posts the whole alert record for custom sinks and
/// bridge daemons.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let payload = serde_json::to_value(alert)
            .map_err(|e| HostwatchError::notifier(format!("serialize alert: {}", e)))?;
        post_json(&self.client, &self.url, &payload, self.name()).await
    }
}

async fn post_json(
    client: &reqwest::Client,
    url: &str,
    payload: &serde_json::Value,
    channel: &str,
) -> Result<()> {
    let response = client
        .post(url)
        .json(payload)
        .send()
        .await
        .map_err(|e| HostwatchError::notifier(format!("{}: {}", channel, e)))?;

    response
        .error_for_status()
        .map_err(|e| HostwatchError::notifier(format!("{}: {}", channel, e)))?;
    Ok(())
}
