//! Pipeline stage capabilities.
//!
//! Each stage is a narrow, independently failable interface with one method.
//! Implementations must tolerate being invoked more than once for the same
//! document: the queue delivers at least once and nothing deduplicates.
//!
//! # Pipeline Order
//!
//! ```text
//! ThumbnailGenerator ──► LabelDetector ──► TextExtractor ──► AttributeWriter ──► Notifier
//!   (fatal on error)       (non-fatal)       (non-fatal)        (non-fatal)       (non-fatal)
//! ```

use async_trait::async_trait;
use std::sync::Arc;

use crate::context::InvocationContext;
use crate::error::StageResult;
use crate::types::config::LabelThresholds;
use crate::types::event::{DerivedImage, DocumentEvent};

/// Reads the source document and writes a derived image.
#[async_trait]
pub trait ThumbnailGenerator: Send + Sync {
    async fn generate(
        &self,
        ctx: &InvocationContext,
        event: &DocumentEvent,
    ) -> StageResult<DerivedImage>;
}

/// Detects visual labels on the derived image.
#[async_trait]
pub trait LabelDetector: Send + Sync {
    async fn detect(
        &self,
        ctx: &InvocationContext,
        event: &DocumentEvent,
        image: &DerivedImage,
        thresholds: &LabelThresholds,
    ) -> StageResult<Vec<String>>;
}

/// Extracts text from the derived image.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(
        &self,
        ctx: &InvocationContext,
        event: &DocumentEvent,
        image: &DerivedImage,
    ) -> StageResult<String>;
}

/// Writes labels and text back to the document store, keyed by document id.
#[async_trait]
pub trait AttributeWriter: Send + Sync {
    async fn write(
        &self,
        ctx: &InvocationContext,
        event: &DocumentEvent,
        labels: &[String],
        text: &str,
    ) -> StageResult<()>;
}

/// Tells a channel about the new document.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        ctx: &InvocationContext,
        event: &DocumentEvent,
        image: &DerivedImage,
        labels: &[String],
    ) -> StageResult<()>;
}

/// The stage implementations a record handler is wired with.
///
/// Implementations are long-lived and shared across messages and batches.
#[derive(Clone)]
pub struct PipelineStages {
    pub thumbnails: Arc<dyn ThumbnailGenerator>,
    pub labels: Arc<dyn LabelDetector>,
    pub text: Arc<dyn TextExtractor>,
    pub attributes: Arc<dyn AttributeWriter>,
    pub notifier: Arc<dyn Notifier>,
}

impl PipelineStages {
    pub fn new(
        thumbnails: Arc<dyn ThumbnailGenerator>,
        labels: Arc<dyn LabelDetector>,
        text: Arc<dyn TextExtractor>,
        attributes: Arc<dyn AttributeWriter>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            thumbnails,
            labels,
            text,
            attributes,
            notifier,
        }
    }
}
