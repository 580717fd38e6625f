//! Record handler: runs one document event through the ordered stages.
//!
//! The thumbnail is a hard dependency for everything downstream, so its
//! failure is the single short-circuit point. Every later stage is
//! best-effort enrichment: its failure is recorded and the pipeline moves on,
//! so a partially enriched document never causes a redelivery storm.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, info, warn, Instrument};

use super::panic_message;
use crate::context::InvocationContext;
use crate::decode::decode;
use crate::error::{RecordFailure, StageError, StageResult};
use crate::traits::stages::PipelineStages;
use crate::types::config::PipelineConfig;
use crate::types::event::DocumentEvent;
use crate::types::message::QueueMessage;
use crate::types::outcome::{PipelineResult, RecordOutcome, SkipReason, Stage, StageStatus};

/// Orchestrates the pipeline stages for one message at a time.
///
/// Holds no per-message state, so one handler serves every message of every
/// batch, concurrently.
///
/// # Example
///
/// ```ignore
/// use enrichment::{PipelineConfig, RecordHandler};
///
/// let handler = RecordHandler::new(stages, PipelineConfig::default());
/// let outcome = handler.handle(&ctx, &event).await;
/// assert!(outcome.is_success());
/// ```
pub struct RecordHandler {
    stages: PipelineStages,
    config: PipelineConfig,
}

impl RecordHandler {
    pub fn new(stages: PipelineStages, config: PipelineConfig) -> Self {
        Self { stages, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Decode a queue message and handle the event it carries.
    ///
    /// A body that does not decode is a terminal failure for this message
    /// only.
    pub async fn handle_message(
        &self,
        ctx: &InvocationContext,
        message: &QueueMessage,
    ) -> RecordOutcome {
        match decode(&message.body) {
            Ok(event) => self.handle(ctx, &event).await,
            Err(e) => {
                warn!(
                    message_id = %ctx.message_id(),
                    correlation_id = %ctx.correlation_id(),
                    error = %e,
                    "message body could not be decoded"
                );
                RecordOutcome::Failed(RecordFailure::Decode(e))
            }
        }
    }

    /// Run the pipeline for one event.
    ///
    /// Never panics: a panic raised by any stage is caught here and becomes a
    /// failure of this message.
    pub async fn handle(&self, ctx: &InvocationContext, event: &DocumentEvent) -> RecordOutcome {
        let run = self.run(ctx, event).instrument(ctx.span());

        match AssertUnwindSafe(run).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let panic_msg = panic_message(&panic);
                error!(
                    message_id = %ctx.message_id(),
                    document_id = %event.document_id,
                    panic = %panic_msg,
                    "stage panicked"
                );
                RecordOutcome::Failed(RecordFailure::Panicked(panic_msg))
            }
        }
    }

    async fn run(&self, ctx: &InvocationContext, event: &DocumentEvent) -> RecordOutcome {
        if !event.is_create() {
            debug!(
                document_id = %event.document_id,
                event_type = %event.event_type,
                "ignoring non-create event"
            );
            return RecordOutcome::Ignored {
                event_type: event.event_type.clone(),
            };
        }

        info!(document_id = %event.document_id, site_id = %event.site_id, "enriching document");
        let mut result = PipelineResult::new(&event.document_id);

        // Stage 1: thumbnail (fatal)
        let image = match guarded(ctx, Stage::Thumbnail, self.stages.thumbnails.generate(ctx, event))
            .await
        {
            Ok(image) => image,
            Err(e) if e.is_cancelled() => return cancelled(Stage::Thumbnail),
            Err(e) => {
                warn!(
                    document_id = %event.document_id,
                    error = %e,
                    "thumbnail generation failed, skipping remaining stages"
                );
                return RecordOutcome::Failed(RecordFailure::Thumbnail(e));
            }
        };
        debug!(bucket = %image.bucket, key = %image.key, "thumbnail ready");
        result.record(Stage::Thumbnail, StageStatus::Succeeded);
        result.derived_image = Some(image.clone());

        // Stage 2: labels
        let labels = guarded(
            ctx,
            Stage::Labels,
            self.stages
                .labels
                .detect(ctx, event, &image, &self.config.labels),
        )
        .await;
        match non_fatal(&mut result, Stage::Labels, labels) {
            Ok(labels) => {
                let labels = labels.unwrap_or_default();
                if labels.is_empty() {
                    info!(document_id = %event.document_id, "no labels detected");
                }
                result.labels = labels;
            }
            Err(failure) => return RecordOutcome::Failed(failure),
        }

        // Stage 3: text
        let text = guarded(
            ctx,
            Stage::Text,
            self.stages.text.extract(ctx, event, &image),
        )
        .await;
        match non_fatal(&mut result, Stage::Text, text) {
            Ok(text) => result.text = text.unwrap_or_default(),
            Err(failure) => return RecordOutcome::Failed(failure),
        }

        // Stage 4: write-back
        if !result.has_enrichment() {
            debug!(document_id = %event.document_id, "nothing to write back");
            result.record(
                Stage::Attributes,
                StageStatus::Skipped(SkipReason::NothingToWrite),
            );
        } else if self.config.document_store.is_none() {
            warn!(
                document_id = %event.document_id,
                "document store base URL or API key not set, skipping write-back"
            );
            result.record(
                Stage::Attributes,
                StageStatus::Skipped(SkipReason::ConfigurationMissing("document_store")),
            );
        } else {
            let written = guarded(
                ctx,
                Stage::Attributes,
                self.stages
                    .attributes
                    .write(ctx, event, &result.labels, &result.text),
            )
            .await;
            if let Err(failure) = non_fatal(&mut result, Stage::Attributes, written) {
                return RecordOutcome::Failed(failure);
            }
        }

        // Stage 5: notify
        if self.config.notification_webhook_url.is_none() {
            warn!(
                document_id = %event.document_id,
                "notification webhook URL not set, skipping notification"
            );
            result.record(
                Stage::Notify,
                StageStatus::Skipped(SkipReason::ConfigurationMissing("notification_webhook_url")),
            );
        } else {
            let notified = guarded(
                ctx,
                Stage::Notify,
                self.stages
                    .notifier
                    .notify(ctx, event, &image, &result.labels),
            )
            .await;
            if let Err(failure) = non_fatal(&mut result, Stage::Notify, notified) {
                return RecordOutcome::Failed(failure);
            }
        }

        // A cancelled invocation is never reported as a success.
        if ctx.is_cancelled() {
            return cancelled(Stage::Notify);
        }

        info!(
            document_id = %event.document_id,
            labels = result.labels.len(),
            text_len = result.text.len(),
            failed_stages = result.failed_stages().len(),
            "document enriched"
        );
        RecordOutcome::Completed(result)
    }
}

/// Race a stage call against the invocation's cancellation.
async fn guarded<T>(
    ctx: &InvocationContext,
    stage: Stage,
    call: impl Future<Output = StageResult<T>>,
) -> StageResult<T> {
    if ctx.is_cancelled() {
        return Err(StageError::Cancelled { stage });
    }

    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(StageError::Cancelled { stage }),
        result = call => result,
    }
}

/// Record a best-effort stage's result.
///
/// Returns `Err` only for cancellation, which fails the message.
fn non_fatal<T>(
    result: &mut PipelineResult,
    stage: Stage,
    outcome: StageResult<T>,
) -> Result<Option<T>, RecordFailure> {
    match outcome {
        Ok(value) => {
            result.record(stage, StageStatus::Succeeded);
            Ok(Some(value))
        }
        Err(e) if e.is_cancelled() => {
            warn!(stage = %stage, "stage cancelled");
            Err(RecordFailure::Cancelled)
        }
        Err(e) => {
            warn!(
                document_id = %result.document_id,
                stage = %stage,
                error = %e,
                "stage failed, continuing"
            );
            result.record(stage, StageStatus::Failed(e.to_string()));
            Ok(None)
        }
    }
}

fn cancelled(stage: Stage) -> RecordOutcome {
    warn!(stage = %stage, "invocation cancelled, record will be redelivered");
    RecordOutcome::Failed(RecordFailure::Cancelled)
}
