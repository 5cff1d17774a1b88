pub mod callmebot;

use anyhow::Result;

/// Delivers a finished digest.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> &'static str;

    async fn send(&self, recipient: &str, text: &str) -> Result<()>;
}

/// Writes the digest to the log instead of delivering it. Used when no recipient is
/// configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    fn channel(&self) -> &'static str {
        "log"
    }

    async fn send(&self, recipient: &str, text: &str) -> Result<()> {
        tracing::info!(recipient, chars = text.chars().count(), "digest:\n{text}");
        Ok(())
    }
}
