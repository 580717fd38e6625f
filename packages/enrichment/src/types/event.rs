//! Document events and the envelope they arrive in.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// The only event type the pipeline acts on.
pub const CREATE_EVENT: &str = "create";

/// The outer pub/sub wrapper around a document event.
///
/// `message` is itself serialized JSON. Keys are accepted in PascalCase (as
/// the topic emits them) or camelCase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    #[serde(rename = "Type", alias = "type", default)]
    pub notification_type: String,

    #[serde(rename = "MessageId", alias = "messageId", default)]
    pub message_id: String,

    #[serde(rename = "Message", alias = "message")]
    pub message: String,
}

impl NotificationEnvelope {
    /// Wrap a document event the way the topic does.
    pub fn wrap(event: &DocumentEvent, message_id: impl Into<String>) -> serde_json::Result<Self> {
        Ok(Self {
            notification_type: "Notification".to_string(),
            message_id: message_id.into(),
            message: serde_json::to_string(event)?,
        })
    }
}

/// A document that triggered an event and where its source bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEvent {
    #[serde(alias = "SiteId")]
    pub site_id: String,

    #[serde(alias = "DocumentId")]
    pub document_id: String,

    #[serde(alias = "S3Key")]
    pub s3_key: String,

    #[serde(alias = "S3Bucket")]
    pub s3_bucket: String,

    /// Event kind; only [`CREATE_EVENT`] is enriched
    #[serde(rename = "type", alias = "Type")]
    pub event_type: String,

    #[serde(alias = "UserId")]
    pub user_id: String,

    #[serde(alias = "Path")]
    pub path: String,

    #[serde(alias = "Url")]
    pub url: String,
}

impl DocumentEvent {
    pub fn is_create(&self) -> bool {
        self.event_type == CREATE_EVENT
    }

    /// File name of the source object without directory or extension.
    pub fn source_stem(&self) -> &str {
        Path::new(&self.s3_key)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.s3_key)
    }
}

/// Location of the image artifact produced by the thumbnail stage.
///
/// Every stage after the thumbnail reads this image, not the raw source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivedImage {
    pub bucket: String,
    pub key: String,
}

impl DerivedImage {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}
