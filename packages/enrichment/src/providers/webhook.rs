//! Chat webhook notifier.

use async_trait::async_trait;
use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::context::InvocationContext;
use crate::error::{StageError, StageResult};
use crate::traits::stages::Notifier;
use crate::traits::storage::LinkSigner;
use crate::types::event::{DerivedImage, DocumentEvent};
use crate::types::outcome::Stage;

/// How long the link in a notification stays valid.
pub const LINK_TTL_DAYS: i64 = 7;

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    text: &'a str,
}

/// Posts `{ "text": ... }` to an incoming-webhook URL.
///
/// The text links to the derived image through a time-limited signed link.
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: String,
    signer: Arc<dyn LinkSigner>,
    link_ttl: Duration,
}

impl WebhookNotifier {
    pub fn new(webhook_url: impl Into<String>, signer: Arc<dyn LinkSigner>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: webhook_url.into(),
            signer,
            link_ttl: Duration::days(LINK_TTL_DAYS),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_link_ttl(mut self, ttl: Duration) -> Self {
        self.link_ttl = ttl;
        self
    }
}

/// Render the notification text.
pub fn format_notification(event: &DocumentEvent, link: &str, labels: &[String]) -> String {
    format!(
        "New document <{}|{}> uploaded, labels: {}",
        link,
        event.path,
        labels.join(", ")
    )
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(
        &self,
        _ctx: &InvocationContext,
        event: &DocumentEvent,
        image: &DerivedImage,
        labels: &[String],
    ) -> StageResult<()> {
        let link = self
            .signer
            .sign(&image.bucket, &image.key, self.link_ttl)
            .await
            .map_err(|e| StageError::failed(Stage::Notify, e))?;

        let text = format_notification(event, &link, labels);
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&WebhookMessage { text: &text })
            .send()
            .await
            .map_err(|e| StageError::failed(Stage::Notify, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::Rejected {
                stage: Stage::Notify,
                status: status.as_u16(),
                body,
            });
        }

        info!(document_id = %event.document_id, "notification sent");
        Ok(())
    }
}
