//! Notification side-channel
//!
//! One human-readable line per decision or state change. Strictly
//! fire-and-forget: a failed push is logged and never propagated into
//! the trading path.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Trait for notification implementations
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Push a single line of text
    async fn push(&self, text: &str);
}

/// Notifier that only writes to the log
///
/// Used when no push URL is configured, and in tests.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn push(&self, text: &str) {
        tracing::info!(notification = %text, "Notification");
    }
}

/// Notifier POSTing `{"text": ...}` to a configured URL
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

#[derive(Serialize)]
struct PushBody<'a> {
    text: &'a str,
}

impl WebhookNotifier {
    /// Create a notifier for the given push URL
    pub fn new(url: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self { client, url }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn push(&self, text: &str) {
        let result = self
            .client
            .post(&self.url)
            .json(&PushBody { text })
            .send()
            .await;
        match result {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(status = %response.status(), "Notification push rejected");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Notification push failed");
            }
            Ok(_) => {}
        }
    }
}
