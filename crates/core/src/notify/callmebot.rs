use crate::config::Settings;
use crate::notify::Notifier;
use anyhow::{Context, Result};
use std::time::Duration;

const DEFAULT_WEBHOOK_URL: &str = "https://api.callmebot.com/whatsapp.php";
const TIMEOUT_SECS: u64 = 15;

/// WhatsApp delivery through the CallMeBot GET webhook. Not retried.
#[derive(Debug, Clone)]
pub struct CallMeBotNotifier {
    http: reqwest::Client,
    webhook_url: String,
    api_key: Option<String>,
}

impl CallMeBotNotifier {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .context("failed to build notifier http client")?;

        Ok(Self {
            http,
            webhook_url: settings
                .notify_webhook_url
                .clone()
                .unwrap_or_else(|| DEFAULT_WEBHOOK_URL.to_string()),
            api_key: settings.notify_api_key.clone().filter(|k| !k.trim().is_empty()),
        })
    }

    fn params<'a>(&'a self, recipient: &'a str, text: &'a str) -> Vec<(&'static str, &'a str)> {
        let mut params = vec![("phone", recipient), ("text", text)];
        if let Some(key) = self.api_key.as_deref() {
            params.push(("apikey", key));
        }
        params
    }
}

#[async_trait::async_trait]
impl Notifier for CallMeBotNotifier {
    fn channel(&self) -> &'static str {
        "callmebot_whatsapp"
    }

    async fn send(&self, recipient: &str, text: &str) -> Result<()> {
        let res = self
            .http
            .get(&self.webhook_url)
            .query(&self.params(recipient, text))
            .send()
            .await
            .context("notification request failed")?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!(
                "notification HTTP {status}: {}",
                body.chars().take(200).collect::<String>()
            );
        }
        tracing::info!(http_status = %status, "notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(api_key: Option<&str>) -> Settings {
        Settings {
            notify_api_key: api_key.map(str::to_string),
            ..Settings::default()
        }
    }

    #[test]
    fn api_key_is_appended_only_when_configured() {
        let with_key = CallMeBotNotifier::from_settings(&settings(Some("k123"))).unwrap();
        assert_eq!(
            with_key.params("+85200000000", "hi"),
            vec![("phone", "+85200000000"), ("text", "hi"), ("apikey", "k123")]
        );

        let blank = CallMeBotNotifier::from_settings(&settings(Some("  "))).unwrap();
        assert_eq!(blank.params("+852", "hi").len(), 2);
        assert_eq!(blank.webhook_url, DEFAULT_WEBHOOK_URL);
    }
}
