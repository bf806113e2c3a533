use std::sync::Arc;

use async_trait::async_trait;

/// Outbound delivery of verification links.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: &str, url: &str) -> anyhow::Result<()>;
}

/// Stand-in for a mail relay: writes the link to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, email: &str, url: &str) -> anyhow::Result<()> {
        tracing::info!("Send verification email to {} with URL: {}", email, url);
        Ok(())
    }
}

/// Fires the notification on a detached task. The caller has already
/// committed; a failed send is logged and nothing is rolled back.
pub fn dispatch(notifier: Arc<dyn Notifier>, email: String, url: String) {
    tokio::spawn(async move {
        if let Err(e) = notifier.send(&email, &url).await {
            tracing::warn!("verification email to {} failed: {:#}", email, e);
        }
    });
}
