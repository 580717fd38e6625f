//! Per-stage, per-message, and per-batch outcomes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::event::DerivedImage;
use crate::error::RecordFailure;

// =============================================================================
// Stages
// =============================================================================

/// One enrichment step, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Thumbnail,
    Labels,
    Text,
    Attributes,
    Notify,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 5] = [
        Stage::Thumbnail,
        Stage::Labels,
        Stage::Text,
        Stage::Attributes,
        Stage::Notify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Thumbnail => "thumbnail",
            Stage::Labels => "labels",
            Stage::Text => "text",
            Stage::Attributes => "attributes",
            Stage::Notify => "notify",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a stage did not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A required configuration value is absent
    ConfigurationMissing(&'static str),
    /// No labels and no text: nothing worth writing back
    NothingToWrite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Succeeded,
    /// Non-fatal failure, with the rendered error
    Failed(String),
    Skipped(SkipReason),
}

// =============================================================================
// Pipeline result
// =============================================================================

/// Everything one run of the pipeline produced for a document.
///
/// Built incrementally by the record handler and never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineResult {
    pub document_id: String,
    pub derived_image: Option<DerivedImage>,
    pub labels: Vec<String>,
    pub text: String,
    stages: Vec<(Stage, StageStatus)>,
}

impl PipelineResult {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            ..Default::default()
        }
    }

    pub(crate) fn record(&mut self, stage: Stage, status: StageStatus) {
        self.stages.push((stage, status));
    }

    /// Status of a stage, `None` if it never ran.
    pub fn status(&self, stage: Stage) -> Option<&StageStatus> {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, status)| status)
    }

    pub fn stages(&self) -> &[(Stage, StageStatus)] {
        &self.stages
    }

    /// Stages that failed without failing the message.
    pub fn failed_stages(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .filter(|(_, status)| matches!(status, StageStatus::Failed(_)))
            .map(|(stage, _)| *stage)
            .collect()
    }

    /// True when there are labels or text to write back. Whitespace-only
    /// text is written as extracted.
    pub fn has_enrichment(&self) -> bool {
        !self.labels.is_empty() || !self.text.is_empty()
    }
}

// =============================================================================
// Record outcome
// =============================================================================

/// Outcome of handling one queue message.
#[derive(Debug)]
pub enum RecordOutcome {
    /// The pipeline ran; individual stages may still have failed
    Completed(PipelineResult),
    /// The event kind is not enriched; nothing ran
    Ignored { event_type: String },
    /// The message must be made visible again
    Failed(RecordFailure),
}

impl RecordOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, RecordOutcome::Failed(_))
    }

    pub fn failure(&self) -> Option<&RecordFailure> {
        match self {
            RecordOutcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&PipelineResult> {
        match self {
            RecordOutcome::Completed(result) => Some(result),
            _ => None,
        }
    }

    /// Non-fatal stage failures inside a completed record.
    pub fn stage_failure_count(&self) -> usize {
        self.result()
            .map(|r| r.failed_stages().len())
            .unwrap_or(0)
    }
}

// =============================================================================
// Batch outcome
// =============================================================================

/// Message id → outcome for one batch, in delivery order.
///
/// Created fresh per batch. The queue substrate deletes succeeded messages
/// and leaves failed ones for redelivery.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    outcomes: IndexMap<String, RecordOutcome>,
}

impl BatchOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome for a message id.
    ///
    /// A repeated id keeps its first position and a failure always wins, so a
    /// duplicate delivery can never mask a failed one.
    pub fn record(&mut self, message_id: impl Into<String>, outcome: RecordOutcome) {
        let message_id = message_id.into();
        if let Some(existing) = self.outcomes.get(&message_id) {
            if !existing.is_success() && outcome.is_success() {
                return;
            }
        }
        self.outcomes.insert(message_id, outcome);
    }

    pub fn get(&self, message_id: &str) -> Option<&RecordOutcome> {
        self.outcomes.get(message_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RecordOutcome)> {
        self.outcomes.iter().map(|(id, outcome)| (id.as_str(), outcome))
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }

    /// Total non-fatal stage failures across completed records.
    pub fn stage_failure_count(&self) -> usize {
        self.outcomes
            .values()
            .map(RecordOutcome::stage_failure_count)
            .sum()
    }

    pub fn succeeded_ids(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, o)| o.is_success())
            .map(|(id, _)| id)
            .collect()
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, o)| !o.is_success())
            .map(|(id, _)| id)
            .collect()
    }

    /// The partial batch response the queue infrastructure consumes.
    pub fn to_response(&self) -> BatchResponse {
        BatchResponse {
            batch_item_failures: self
                .failed_ids()
                .into_iter()
                .map(|id| BatchItemFailure {
                    item_identifier: id.to_string(),
                })
                .collect(),
        }
    }
}

/// Partial batch failure report: only failed items are listed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(document_id: &str) -> RecordOutcome {
        RecordOutcome::Completed(PipelineResult::new(document_id))
    }

    #[test]
    fn test_has_enrichment() {
        let mut result = PipelineResult::new("d1");
        assert!(!result.has_enrichment());

        result.text = " \n".to_string();
        assert!(result.has_enrichment());

        result.text.clear();
        result.labels.push("cat".to_string());
        assert!(result.has_enrichment());
    }

    #[test]
    fn test_failure_wins_for_duplicate_ids() {
        let mut batch = BatchOutcome::new();
        batch.record("m1", RecordOutcome::Failed(RecordFailure::Cancelled));
        batch.record("m1", completed("d1"));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.failed_ids(), vec!["m1"]);

        batch.record("m2", completed("d2"));
        batch.record("m2", RecordOutcome::Failed(RecordFailure::Cancelled));
        assert_eq!(batch.failed_ids(), vec!["m1", "m2"]);
    }

    #[test]
    fn test_ignored_counts_as_success() {
        let mut batch = BatchOutcome::new();
        batch.record(
            "m1",
            RecordOutcome::Ignored {
                event_type: "delete".to_string(),
            },
        );
        assert_eq!(batch.success_count(), 1);
        assert_eq!(batch.failure_count(), 0);
    }

    #[test]
    fn test_response_lists_only_failures() {
        let mut batch = BatchOutcome::new();
        batch.record("m1", completed("d1"));
        batch.record("m2", RecordOutcome::Failed(RecordFailure::Panicked("boom".into())));
        batch.record("m3", completed("d3"));

        let json = serde_json::to_value(batch.to_response()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "batchItemFailures": [ { "itemIdentifier": "m2" } ] })
        );
    }

    #[test]
    fn test_stage_failures_are_counted() {
        let mut result = PipelineResult::new("d1");
        result.record(Stage::Thumbnail, StageStatus::Succeeded);
        result.record(Stage::Labels, StageStatus::Failed("timeout".into()));
        result.record(Stage::Attributes, StageStatus::Failed("HTTP 500".into()));
        result.record(
            Stage::Notify,
            StageStatus::Skipped(SkipReason::ConfigurationMissing("webhook")),
        );

        assert_eq!(result.failed_stages(), vec![Stage::Labels, Stage::Attributes]);
        assert_eq!(result.status(Stage::Text), None);

        let mut batch = BatchOutcome::new();
        batch.record("m1", RecordOutcome::Completed(result));
        assert_eq!(batch.stage_failure_count(), 2);
        assert_eq!(batch.failure_count(), 0);
    }
}
