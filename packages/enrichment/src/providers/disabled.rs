use async_trait::async_trait;
use tracing::debug;

use crate::context::InvocationContext;
use crate::error::StageResult;
use crate::traits::stages::{AttributeWriter, LabelDetector, Notifier, TextExtractor};
use crate::types::config::LabelThresholds;
use crate::types::event::{DerivedImage, DocumentEvent};

/// A capability with no backing service: detects nothing, writes nothing.
///
/// Wired in when a deployment has no provider for a non-fatal stage, so the
/// stage succeeds with an empty result instead of failing every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct Disabled;

#[async_trait]
impl LabelDetector for Disabled {
    async fn detect(
        &self,
        _ctx: &InvocationContext,
        event: &DocumentEvent,
        _image: &DerivedImage,
        _thresholds: &LabelThresholds,
    ) -> StageResult<Vec<String>> {
        debug!(document_id = %event.document_id, "label detection disabled");
        Ok(Vec::new())
    }
}

#[async_trait]
impl TextExtractor for Disabled {
    async fn extract(
        &self,
        _ctx: &InvocationContext,
        event: &DocumentEvent,
        _image: &DerivedImage,
    ) -> StageResult<String> {
        debug!(document_id = %event.document_id, "text extraction disabled");
        Ok(String::new())
    }
}

#[async_trait]
impl AttributeWriter for Disabled {
    async fn write(
        &self,
        _ctx: &InvocationContext,
        event: &DocumentEvent,
        _labels: &[String],
        _text: &str,
    ) -> StageResult<()> {
        debug!(document_id = %event.document_id, "attribute write-back disabled");
        Ok(())
    }
}

#[async_trait]
impl Notifier for Disabled {
    async fn notify(
        &self,
        _ctx: &InvocationContext,
        event: &DocumentEvent,
        _image: &DerivedImage,
        _labels: &[String],
    ) -> StageResult<()> {
        debug!(document_id = %event.document_id, "notifications disabled");
        Ok(())
    }
}
