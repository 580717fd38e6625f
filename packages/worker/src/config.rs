use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use enrichment::{
    ApiKey, AttributeSchema, DocumentStoreConfig, LabelThresholds, PipelineConfig,
    ProcessorConfig, RedrivePolicy, DEFAULT_MAX_RECEIVE_COUNT,
};

use crate::queue::JetStreamSettings;
use crate::worker::BatchWorkerConfig;

/// Worker configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub nats_url: String,
    pub stream_name: String,
    pub subject: String,
    pub consumer_name: String,
    pub dead_letter_subject: String,
    pub max_receive_count: u32,
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub max_concurrency: usize,
    pub object_store_root: PathBuf,
    pub formkiq_base_url: Option<String>,
    pub formkiq_api_key: Option<ApiKey>,
    pub slack_webhook_url: Option<String>,
    pub resize_bucket_name: Option<String>,
    pub label_max_count: usize,
    pub label_min_confidence: f32,
    pub attribute_labels_key: String,
    pub link_base_url: Option<String>,
    pub link_signing_secret: Option<ApiKey>,
}

/// Where notification links point and how they are signed.
#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub webhook_url: String,
    pub link_base_url: String,
    pub link_signing_secret: ApiKey,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            nats_url: var("NATS_URL").context("NATS_URL must be set")?,
            stream_name: var("STREAM_NAME").unwrap_or_else(|| "DOCUMENTS".to_string()),
            subject: var("SUBJECT").unwrap_or_else(|| "documents.created".to_string()),
            consumer_name: var("CONSUMER_NAME")
                .unwrap_or_else(|| "document-enrichment".to_string()),
            dead_letter_subject: var("DEAD_LETTER_SUBJECT")
                .unwrap_or_else(|| "documents.created.dlq".to_string()),
            max_receive_count: parse_or(&var, "MAX_RECEIVE_COUNT", DEFAULT_MAX_RECEIVE_COUNT)?,
            batch_size: parse_or(&var, "BATCH_SIZE", 10)?,
            batch_timeout: Duration::from_secs(parse_or(&var, "BATCH_TIMEOUT_SECS", 60)?),
            max_concurrency: parse_or(&var, "MAX_CONCURRENCY", 10)?,
            object_store_root: var("OBJECT_STORE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            formkiq_base_url: var("FORMKIQ_BASE_URL"),
            formkiq_api_key: var("FORMKIQ_API_KEY").map(ApiKey::new),
            slack_webhook_url: var("SLACK_WEBHOOK_URL"),
            resize_bucket_name: var("RESIZE_BUCKET_NAME"),
            label_max_count: parse_or(&var, "LABEL_MAX_COUNT", 10)?,
            label_min_confidence: parse_or(&var, "LABEL_MIN_CONFIDENCE", 75.0)?,
            attribute_labels_key: var("ATTRIBUTE_LABELS_KEY")
                .unwrap_or_else(|| "labels".to_string()),
            link_base_url: var("LINK_BASE_URL"),
            link_signing_secret: var("LINK_SIGNING_SECRET").map(ApiKey::new),
        })
    }

    pub fn document_store(&self) -> Option<DocumentStoreConfig> {
        match (&self.formkiq_base_url, &self.formkiq_api_key) {
            (Some(base_url), Some(api_key)) => Some(DocumentStoreConfig {
                base_url: base_url.clone(),
                api_key: api_key.clone(),
            }),
            _ => None,
        }
    }

    /// `None` unless the webhook and link signing are all configured.
    pub fn notification(&self) -> Option<NotificationSettings> {
        Some(NotificationSettings {
            webhook_url: self.slack_webhook_url.clone()?,
            link_base_url: self.link_base_url.clone()?,
            link_signing_secret: self.link_signing_secret.clone()?,
        })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            document_store: self.document_store(),
            notification_webhook_url: self.notification().map(|n| n.webhook_url),
            derived_bucket: self.resize_bucket_name.clone(),
            labels: LabelThresholds {
                max_labels: self.label_max_count,
                min_confidence: self.label_min_confidence,
            },
            attributes: AttributeSchema {
                labels_key: self.attribute_labels_key.clone(),
            },
        }
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig::default().with_max_concurrency(self.max_concurrency)
    }

    pub fn worker_config(&self) -> BatchWorkerConfig {
        BatchWorkerConfig {
            batch_size: self.batch_size.max(1),
            batch_timeout: self.batch_timeout,
            redrive: RedrivePolicy::new(self.max_receive_count),
            ..Default::default()
        }
    }

    pub fn jetstream_settings(&self) -> JetStreamSettings {
        JetStreamSettings {
            stream_name: self.stream_name.clone(),
            subject: self.subject.clone(),
            consumer_name: self.consumer_name.clone(),
            dead_letter_subject: self.dead_letter_subject.clone(),
            // Settling happens after the batch timeout fires
            ack_wait: self.batch_timeout + Duration::from_secs(30),
            max_receive_count: self.max_receive_count.max(1),
        }
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", key)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("NATS_URL", "nats://localhost:4222")]).unwrap();
        assert_eq!(config.stream_name, "DOCUMENTS");
        assert_eq!(config.max_receive_count, 3);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.batch_timeout, Duration::from_secs(60));

        let pipeline = config.pipeline_config();
        assert!(pipeline.document_store.is_none());
        assert!(pipeline.notification_webhook_url.is_none());
        assert!(pipeline.derived_bucket.is_none());
        assert_eq!(pipeline.labels, LabelThresholds::default());
        assert_eq!(pipeline.attributes.labels_key, "labels");
    }

    #[test]
    fn test_nats_url_is_required() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("NATS_URL must be set"));
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = load(&[("NATS_URL", "nats://x"), ("BATCH_SIZE", "ten")]).unwrap_err();
        assert!(err.to_string().contains("BATCH_SIZE must be a valid number"));
    }

    #[test]
    fn test_full_configuration() {
        let config = load(&[
            ("NATS_URL", "nats://x"),
            ("FORMKIQ_BASE_URL", "https://docs.example"),
            ("FORMKIQ_API_KEY", "secret-key"),
            ("SLACK_WEBHOOK_URL", "https://hooks.example/x"),
            ("LINK_BASE_URL", "https://files.example"),
            ("LINK_SIGNING_SECRET", "link-secret"),
            ("RESIZE_BUCKET_NAME", "thumbs"),
            ("LABEL_MAX_COUNT", "5"),
            ("LABEL_MIN_CONFIDENCE", "90.5"),
            ("MAX_RECEIVE_COUNT", "5"),
        ])
        .unwrap();

        let pipeline = config.pipeline_config();
        assert_eq!(
            pipeline.document_store.as_ref().map(|s| s.base_url.as_str()),
            Some("https://docs.example")
        );
        assert_eq!(
            pipeline.notification_webhook_url.as_deref(),
            Some("https://hooks.example/x")
        );
        assert_eq!(pipeline.derived_bucket.as_deref(), Some("thumbs"));
        assert_eq!(pipeline.labels.max_labels, 5);
        assert_eq!(pipeline.labels.min_confidence, 90.5);
        assert_eq!(config.worker_config().redrive.max_receive_count, 5);
        assert_eq!(config.jetstream_settings().max_receive_count, 5);
        assert!(!format!("{:?}", config).contains("secret-key"));
    }

    #[test]
    fn test_webhook_without_link_signing_disables_notifications() {
        let config = load(&[
            ("NATS_URL", "nats://x"),
            ("SLACK_WEBHOOK_URL", "https://hooks.example/x"),
        ])
        .unwrap();
        assert!(config.notification().is_none());
        assert!(config.pipeline_config().notification_webhook_url.is_none());
    }

    #[test]
    fn test_half_configured_document_store_is_absent() {
        let config = load(&[("NATS_URL", "nats://x"), ("FORMKIQ_BASE_URL", "https://docs")]).unwrap();
        assert!(config.document_store().is_none());
    }
}
