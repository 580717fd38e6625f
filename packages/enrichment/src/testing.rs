//! Testing utilities including mock stage implementations.
//!
//! Every mock records its calls for assertions and can be told to fail,
//! panic, hang or slow down, so pipeline behavior can be exercised without
//! storage, vision or HTTP services.
//!
//! # Example
//!
//! ```rust,ignore
//! use enrichment::testing::{MockLabelDetector, MockStages};
//!
//! let mocks = MockStages::new().with_labels(MockLabelDetector::new().failing("vision down"));
//! let handler = RecordHandler::new(mocks.stages(), configured());
//! // ...
//! assert_eq!(mocks.attributes.call_count(), 1);
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::context::InvocationContext;
use crate::error::{StageError, StageResult};
use crate::providers::thumbnail_key;
use crate::traits::stages::{
    AttributeWriter, LabelDetector, Notifier, PipelineStages, TextExtractor, ThumbnailGenerator,
};
use crate::types::config::{LabelThresholds, PipelineConfig};
use crate::types::event::{DerivedImage, DocumentEvent, NotificationEnvelope};
use crate::types::message::QueueMessage;
use crate::types::outcome::Stage;

/// Bucket the mock thumbnail generator reports derived images in.
pub const MOCK_DERIVED_BUCKET: &str = "derived";

// =============================================================================
// Behavior
// =============================================================================

/// How a mock responds once it has recorded a call.
#[derive(Debug, Clone, Default)]
struct Behavior {
    delay: Option<Duration>,
    fail: Option<String>,
    fail_for: Option<String>,
    panic: bool,
    hang: bool,
}

impl Behavior {
    async fn apply(&self, stage: Stage, document_id: &str) -> StageResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.panic {
            panic!("mock {} stage panicked", stage);
        }
        if let Some(message) = &self.fail {
            return Err(StageError::failed(stage, message.clone()));
        }
        if self.fail_for.as_deref() == Some(document_id) {
            return Err(StageError::failed(
                stage,
                format!("mock {} stage failed for {}", stage, document_id),
            ));
        }
        Ok(())
    }
}

fn push<T>(calls: &RwLock<Vec<T>>, call: T) {
    calls.write().unwrap_or_else(|e| e.into_inner()).push(call);
}

fn snapshot<T: Clone>(calls: &RwLock<Vec<T>>) -> Vec<T> {
    calls.read().unwrap_or_else(|e| e.into_inner()).clone()
}

macro_rules! behavior_builders {
    ($mock:ty) => {
        impl $mock {
            /// Fail every call with `message`.
            pub fn failing(mut self, message: impl Into<String>) -> Self {
                self.behavior.fail = Some(message.into());
                self
            }

            /// Fail only calls for `document_id`.
            pub fn failing_for(mut self, document_id: impl Into<String>) -> Self {
                self.behavior.fail_for = Some(document_id.into());
                self
            }

            /// Panic on every call.
            pub fn panicking(mut self) -> Self {
                self.behavior.panic = true;
                self
            }

            /// Never return.
            pub fn hanging(mut self) -> Self {
                self.behavior.hang = true;
                self
            }

            /// Sleep before responding.
            pub fn with_delay(mut self, delay: Duration) -> Self {
                self.behavior.delay = Some(delay);
                self
            }

            pub fn call_count(&self) -> usize {
                self.calls.read().unwrap_or_else(|e| e.into_inner()).len()
            }
        }
    };
}

// =============================================================================
// Thumbnail
// =============================================================================

/// Reports a derived image without touching storage.
#[derive(Default)]
pub struct MockThumbnailGenerator {
    behavior: Behavior,
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockThumbnailGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Document ids generate was called for.
    pub fn calls(&self) -> Vec<String> {
        snapshot(&self.calls)
    }

    /// The image the mock reports for `event`.
    pub fn derived_image(event: &DocumentEvent) -> DerivedImage {
        DerivedImage::new(MOCK_DERIVED_BUCKET, thumbnail_key(&event.s3_key))
    }
}

behavior_builders!(MockThumbnailGenerator);

#[async_trait]
impl ThumbnailGenerator for MockThumbnailGenerator {
    async fn generate(
        &self,
        _ctx: &InvocationContext,
        event: &DocumentEvent,
    ) -> StageResult<DerivedImage> {
        push(&self.calls, event.document_id.clone());
        self.behavior.apply(Stage::Thumbnail, &event.document_id).await?;
        Ok(Self::derived_image(event))
    }
}

// =============================================================================
// Labels
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DetectCall {
    pub document_id: String,
    pub image: DerivedImage,
    pub thresholds: LabelThresholds,
}

/// Returns a fixed list of labels.
#[derive(Default)]
pub struct MockLabelDetector {
    labels: Vec<String>,
    behavior: Behavior,
    calls: Arc<RwLock<Vec<DetectCall>>>,
}

impl MockLabelDetector {
    /// Detects nothing until given labels.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn calls(&self) -> Vec<DetectCall> {
        snapshot(&self.calls)
    }
}

behavior_builders!(MockLabelDetector);

#[async_trait]
impl LabelDetector for MockLabelDetector {
    async fn detect(
        &self,
        _ctx: &InvocationContext,
        event: &DocumentEvent,
        image: &DerivedImage,
        thresholds: &LabelThresholds,
    ) -> StageResult<Vec<String>> {
        push(
            &self.calls,
            DetectCall {
                document_id: event.document_id.clone(),
                image: image.clone(),
                thresholds: *thresholds,
            },
        );
        self.behavior.apply(Stage::Labels, &event.document_id).await?;
        Ok(self.labels.iter().take(thresholds.max_labels).cloned().collect())
    }
}

// =============================================================================
// Text
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractCall {
    pub document_id: String,
    pub image: DerivedImage,
}

/// Returns fixed text.
#[derive(Default)]
pub struct MockTextExtractor {
    text: String,
    behavior: Behavior,
    calls: Arc<RwLock<Vec<ExtractCall>>>,
}

impl MockTextExtractor {
    /// Extracts empty text until given some.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn calls(&self) -> Vec<ExtractCall> {
        snapshot(&self.calls)
    }
}

behavior_builders!(MockTextExtractor);

#[async_trait]
impl TextExtractor for MockTextExtractor {
    async fn extract(
        &self,
        _ctx: &InvocationContext,
        event: &DocumentEvent,
        image: &DerivedImage,
    ) -> StageResult<String> {
        push(
            &self.calls,
            ExtractCall {
                document_id: event.document_id.clone(),
                image: image.clone(),
            },
        );
        self.behavior.apply(Stage::Text, &event.document_id).await?;
        Ok(self.text.clone())
    }
}

// =============================================================================
// Write-back
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeWriteCall {
    pub document_id: String,
    pub labels: Vec<String>,
    pub text: String,
}

#[derive(Default)]
pub struct MockAttributeWriter {
    behavior: Behavior,
    calls: Arc<RwLock<Vec<AttributeWriteCall>>>,
}

impl MockAttributeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<AttributeWriteCall> {
        snapshot(&self.calls)
    }
}

behavior_builders!(MockAttributeWriter);

#[async_trait]
impl AttributeWriter for MockAttributeWriter {
    async fn write(
        &self,
        _ctx: &InvocationContext,
        event: &DocumentEvent,
        labels: &[String],
        text: &str,
    ) -> StageResult<()> {
        push(
            &self.calls,
            AttributeWriteCall {
                document_id: event.document_id.clone(),
                labels: labels.to_vec(),
                text: text.to_string(),
            },
        );
        self.behavior.apply(Stage::Attributes, &event.document_id).await
    }
}

// =============================================================================
// Notify
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyCall {
    pub document_id: String,
    pub image: DerivedImage,
    pub labels: Vec<String>,
}

#[derive(Default)]
pub struct MockNotifier {
    behavior: Behavior,
    calls: Arc<RwLock<Vec<NotifyCall>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<NotifyCall> {
        snapshot(&self.calls)
    }
}

behavior_builders!(MockNotifier);

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(
        &self,
        _ctx: &InvocationContext,
        event: &DocumentEvent,
        image: &DerivedImage,
        labels: &[String],
    ) -> StageResult<()> {
        push(
            &self.calls,
            NotifyCall {
                document_id: event.document_id.clone(),
                image: image.clone(),
                labels: labels.to_vec(),
            },
        );
        self.behavior.apply(Stage::Notify, &event.document_id).await
    }
}

// =============================================================================
// Bundle and fixtures
// =============================================================================

/// One mock per stage, kept around for call assertions.
///
/// Defaults: the thumbnail succeeds, labels are `["cat"]`, text is `"hello"`,
/// and the writer and notifier succeed.
pub struct MockStages {
    pub thumbnails: Arc<MockThumbnailGenerator>,
    pub labels: Arc<MockLabelDetector>,
    pub text: Arc<MockTextExtractor>,
    pub attributes: Arc<MockAttributeWriter>,
    pub notifier: Arc<MockNotifier>,
}

impl Default for MockStages {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStages {
    pub fn new() -> Self {
        Self {
            thumbnails: Arc::new(MockThumbnailGenerator::new()),
            labels: Arc::new(MockLabelDetector::new().with_labels(["cat"])),
            text: Arc::new(MockTextExtractor::new().with_text("hello")),
            attributes: Arc::new(MockAttributeWriter::new()),
            notifier: Arc::new(MockNotifier::new()),
        }
    }

    pub fn with_thumbnails(mut self, mock: MockThumbnailGenerator) -> Self {
        self.thumbnails = Arc::new(mock);
        self
    }

    pub fn with_labels(mut self, mock: MockLabelDetector) -> Self {
        self.labels = Arc::new(mock);
        self
    }

    pub fn with_text(mut self, mock: MockTextExtractor) -> Self {
        self.text = Arc::new(mock);
        self
    }

    pub fn with_attributes(mut self, mock: MockAttributeWriter) -> Self {
        self.attributes = Arc::new(mock);
        self
    }

    pub fn with_notifier(mut self, mock: MockNotifier) -> Self {
        self.notifier = Arc::new(mock);
        self
    }

    /// Stage set sharing these mocks.
    pub fn stages(&self) -> PipelineStages {
        PipelineStages::new(
            self.thumbnails.clone(),
            self.labels.clone(),
            self.text.clone(),
            self.attributes.clone(),
            self.notifier.clone(),
        )
    }

    /// Total calls across every stage.
    pub fn total_calls(&self) -> usize {
        self.thumbnails.call_count()
            + self.labels.call_count()
            + self.text.call_count()
            + self.attributes.call_count()
            + self.notifier.call_count()
    }
}

/// Config with the document store and notification webhook set.
pub fn configured() -> PipelineConfig {
    PipelineConfig::default()
        .with_document_store("https://docs.example", "test-api-key")
        .with_notification_webhook("https://hooks.example/services/T0")
}

/// A create event for `document_id`, shaped like the topic emits them.
pub fn sample_event(document_id: &str) -> DocumentEvent {
    DocumentEvent {
        site_id: "s1".to_string(),
        document_id: document_id.to_string(),
        s3_key: format!("{}.tif", document_id),
        s3_bucket: "b1".to_string(),
        event_type: "create".to_string(),
        user_id: "u1".to_string(),
        path: format!("/{}.tif", document_id),
        url: format!("https://x/{}", document_id),
    }
}

/// Serialized notification envelope wrapping `event`.
pub fn envelope_body(event: &DocumentEvent) -> Bytes {
    let envelope = NotificationEnvelope::wrap(event, format!("n-{}", event.document_id))
        .unwrap_or_else(|e| panic!("event serializes: {}", e));
    Bytes::from(serde_json::to_vec(&envelope).unwrap_or_else(|e| panic!("envelope serializes: {}", e)))
}

/// A first-delivery queue message carrying `event`.
pub fn queue_message(id: &str, event: &DocumentEvent) -> QueueMessage {
    QueueMessage::new(id, envelope_body(event))
}
