//! Configuration consumed by the record handler.
//!
//! A stage whose required values are absent is skipped with a warning; a
//! missing value never fails a message.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An API key that won't be logged or displayed.
pub struct ApiKey(SecretString);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// Only call this when actually sending the key.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for ApiKey {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Document-management API endpoint and credentials.
#[derive(Debug, Clone)]
pub struct DocumentStoreConfig {
    pub base_url: String,
    pub api_key: ApiKey,
}

impl DocumentStoreConfig {
    /// Returns `None` unless both values are present and non-empty.
    pub fn from_parts(base_url: Option<String>, api_key: Option<String>) -> Option<Self> {
        let base_url = base_url.filter(|v| !v.trim().is_empty())?;
        let api_key = api_key.filter(|v| !v.trim().is_empty())?;
        Some(Self {
            base_url,
            api_key: ApiKey::new(api_key),
        })
    }
}

/// Thresholds handed to the label detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelThresholds {
    /// Maximum number of labels to return
    pub max_labels: usize,
    /// Minimum confidence, in percent
    pub min_confidence: f32,
}

impl Default for LabelThresholds {
    fn default() -> Self {
        Self {
            max_labels: 10,
            min_confidence: 75.0,
        }
    }
}

/// Shape of the attribute write-back payload.
///
/// The payload is always a list of `{ key, stringValues }` attributes; only
/// the key under which labels are stored varies between deployments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSchema {
    pub labels_key: String,
}

impl Default for AttributeSchema {
    fn default() -> Self {
        Self {
            labels_key: "labels".to_string(),
        }
    }
}

/// Options the record handler reads.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Gates both the attribute and the OCR write-back
    pub document_store: Option<DocumentStoreConfig>,

    /// Gates the notifier
    pub notification_webhook_url: Option<String>,

    /// Bucket for derived images; `None` writes next to the source object
    pub derived_bucket: Option<String>,

    pub labels: LabelThresholds,

    pub attributes: AttributeSchema,
}

impl PipelineConfig {
    pub fn with_document_store(
        mut self,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        self.document_store =
            DocumentStoreConfig::from_parts(Some(base_url.into()), Some(api_key.into()));
        self
    }

    pub fn with_notification_webhook(mut self, url: impl Into<String>) -> Self {
        self.notification_webhook_url = Some(url.into()).filter(|v: &String| !v.trim().is_empty());
        self
    }

    pub fn with_derived_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.derived_bucket = Some(bucket.into()).filter(|v: &String| !v.trim().is_empty());
        self
    }

    pub fn with_label_thresholds(mut self, thresholds: LabelThresholds) -> Self {
        self.labels = thresholds;
        self
    }

    pub fn with_attribute_schema(mut self, schema: AttributeSchema) -> Self {
        self.attributes = schema;
        self
    }
}
