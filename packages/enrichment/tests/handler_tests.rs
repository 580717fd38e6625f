//! Integration tests for the record handler.
//!
//! Each test wires the handler with mock stages and asserts on the outcome
//! and on which stages were (or were not) called.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use enrichment::testing::{
    configured, sample_event, AttributeWriteCall, MockAttributeWriter, MockLabelDetector,
    MockNotifier, MockStages, MockTextExtractor, MockThumbnailGenerator,
};
use enrichment::{
    InvocationContext, LabelThresholds, PipelineConfig, QueueMessage, RecordFailure,
    RecordHandler, RecordOutcome, SkipReason, Stage, StageStatus,
};

fn ctx() -> InvocationContext {
    InvocationContext::new("m1", CancellationToken::new())
}

async fn run(mocks: &MockStages, config: PipelineConfig) -> RecordOutcome {
    let handler = RecordHandler::new(mocks.stages(), config);
    handler.handle(&ctx(), &sample_event("d1")).await
}

#[tokio::test]
async fn test_example_event_is_fully_enriched() {
    let mocks = MockStages::new();
    let event = sample_event("d1");
    let handler = RecordHandler::new(mocks.stages(), configured());

    let outcome = handler.handle(&ctx(), &event).await;

    let result = outcome.result().expect("completed");
    assert_eq!(result.labels, vec!["cat"]);
    assert_eq!(result.text, "hello");
    assert!(result.failed_stages().is_empty());
    for stage in Stage::ALL {
        assert_eq!(result.status(stage), Some(&StageStatus::Succeeded), "{stage}");
    }

    assert_eq!(
        mocks.attributes.calls(),
        vec![AttributeWriteCall {
            document_id: "d1".to_string(),
            labels: vec!["cat".to_string()],
            text: "hello".to_string(),
        }]
    );

    let derived = MockThumbnailGenerator::derived_image(&event);
    let notified = mocks.notifier.calls();
    assert_eq!(notified.len(), 1);
    assert_eq!(notified[0].image, derived);
    assert_eq!(notified[0].labels, vec!["cat"]);
    assert_eq!(result.derived_image.as_ref(), Some(&derived));
}

#[tokio::test]
async fn test_later_stages_read_the_derived_image() {
    let mocks = MockStages::new();
    let event = sample_event("d1");
    let handler = RecordHandler::new(mocks.stages(), configured());

    handler.handle(&ctx(), &event).await;

    let derived = MockThumbnailGenerator::derived_image(&event);
    assert_eq!(mocks.labels.calls()[0].image, derived);
    assert_eq!(mocks.text.calls()[0].image, derived);
    assert_ne!(derived.key, event.s3_key);
}

#[tokio::test]
async fn test_non_create_event_runs_no_stage() {
    let mocks = MockStages::new();
    let handler = RecordHandler::new(mocks.stages(), configured());
    let mut event = sample_event("d1");
    event.event_type = "delete".to_string();

    let outcome = handler.handle(&ctx(), &event).await;

    assert!(outcome.is_success());
    assert!(matches!(outcome, RecordOutcome::Ignored { ref event_type } if event_type == "delete"));
    assert_eq!(mocks.total_calls(), 0);
}

#[tokio::test]
async fn test_thumbnail_failure_stops_the_pipeline() {
    let mocks =
        MockStages::new().with_thumbnails(MockThumbnailGenerator::new().failing("source missing"));

    let outcome = run(&mocks, configured()).await;

    assert!(!outcome.is_success());
    assert!(matches!(outcome.failure(), Some(RecordFailure::Thumbnail(_))));
    assert_eq!(mocks.thumbnails.call_count(), 1);
    assert_eq!(mocks.labels.call_count(), 0);
    assert_eq!(mocks.text.call_count(), 0);
    assert_eq!(mocks.attributes.call_count(), 0);
    assert_eq!(mocks.notifier.call_count(), 0);
}

#[tokio::test]
async fn test_label_failure_does_not_stop_the_pipeline() {
    let mocks = MockStages::new().with_labels(MockLabelDetector::new().failing("vision down"));

    let outcome = run(&mocks, configured()).await;

    assert!(outcome.is_success());
    let result = outcome.result().expect("completed");
    assert!(matches!(result.status(Stage::Labels), Some(StageStatus::Failed(_))));
    assert!(result.labels.is_empty());
    assert_eq!(outcome.stage_failure_count(), 1);

    assert_eq!(mocks.text.call_count(), 1);
    assert_eq!(
        mocks.attributes.calls(),
        vec![AttributeWriteCall {
            document_id: "d1".to_string(),
            labels: vec![],
            text: "hello".to_string(),
        }]
    );
    assert_eq!(mocks.notifier.call_count(), 1);
}

#[tokio::test]
async fn test_text_failure_does_not_stop_the_pipeline() {
    let mocks = MockStages::new().with_text(MockTextExtractor::new().failing("ocr down"));

    let outcome = run(&mocks, configured()).await;

    assert!(outcome.is_success());
    assert_eq!(mocks.attributes.calls()[0].labels, vec!["cat"]);
    assert_eq!(mocks.attributes.calls()[0].text, "");
    assert_eq!(mocks.notifier.call_count(), 1);
}

#[tokio::test]
async fn test_missing_document_store_skips_only_the_writer() {
    let mocks = MockStages::new();
    let config = PipelineConfig::default().with_notification_webhook("https://hooks.example/x");

    let outcome = run(&mocks, config).await;

    assert!(outcome.is_success());
    assert_eq!(mocks.attributes.call_count(), 0);
    assert_eq!(mocks.notifier.call_count(), 1);
    assert_eq!(
        outcome.result().unwrap().status(Stage::Attributes),
        Some(&StageStatus::Skipped(SkipReason::ConfigurationMissing("document_store")))
    );
}

#[tokio::test]
async fn test_missing_webhook_skips_only_the_notifier() {
    let mocks = MockStages::new();
    let config = PipelineConfig::default().with_document_store("https://docs.example", "key");

    let outcome = run(&mocks, config).await;

    assert!(outcome.is_success());
    assert_eq!(mocks.attributes.call_count(), 1);
    assert_eq!(mocks.notifier.call_count(), 0);
    assert!(matches!(
        outcome.result().unwrap().status(Stage::Notify),
        Some(StageStatus::Skipped(SkipReason::ConfigurationMissing(_)))
    ));
}

#[tokio::test]
async fn test_nothing_detected_skips_the_writer() {
    let mocks = MockStages::new()
        .with_labels(MockLabelDetector::new())
        .with_text(MockTextExtractor::new().with_text(""));

    let outcome = run(&mocks, configured()).await;

    assert!(outcome.is_success());
    assert_eq!(mocks.attributes.call_count(), 0);
    assert_eq!(
        outcome.result().unwrap().status(Stage::Attributes),
        Some(&StageStatus::Skipped(SkipReason::NothingToWrite))
    );
    // The notifier still runs, with no labels
    assert_eq!(mocks.notifier.calls()[0].labels, Vec::<String>::new());
}

#[tokio::test]
async fn test_whitespace_text_is_still_written() {
    let mocks = MockStages::new()
        .with_labels(MockLabelDetector::new())
        .with_text(MockTextExtractor::new().with_text("  \n"));

    let outcome = run(&mocks, configured()).await;

    assert!(outcome.is_success());
    assert_eq!(mocks.attributes.calls()[0].text, "  \n");
    assert_eq!(
        outcome.result().unwrap().status(Stage::Attributes),
        Some(&StageStatus::Succeeded)
    );
}

#[tokio::test]
async fn test_writer_and_notifier_failures_are_not_fatal() {
    let mocks = MockStages::new()
        .with_attributes(MockAttributeWriter::new().failing("HTTP 500"))
        .with_notifier(MockNotifier::new().failing("webhook gone"));

    let outcome = run(&mocks, configured()).await;

    assert!(outcome.is_success());
    let result = outcome.result().unwrap();
    assert_eq!(result.failed_stages(), vec![Stage::Attributes, Stage::Notify]);
    assert_eq!(mocks.notifier.call_count(), 1);
}

#[tokio::test]
async fn test_label_thresholds_reach_the_detector() {
    let mocks = MockStages::new().with_labels(MockLabelDetector::new().with_labels(["a", "b", "c"]));
    let thresholds = LabelThresholds {
        max_labels: 2,
        min_confidence: 90.0,
    };

    let outcome = run(&mocks, configured().with_label_thresholds(thresholds)).await;

    assert_eq!(mocks.labels.calls()[0].thresholds, thresholds);
    assert_eq!(outcome.result().unwrap().labels, vec!["a", "b"]);
}

#[tokio::test]
async fn test_same_event_twice_succeeds_twice() {
    let mocks = MockStages::new();
    let handler = RecordHandler::new(mocks.stages(), configured());
    let event = sample_event("d1");

    let first = handler.handle(&ctx(), &event).await;
    let second = handler.handle(&ctx(), &event).await;

    assert!(first.is_success());
    assert!(second.is_success());
    assert_eq!(first.result(), second.result());
    let writes = mocks.attributes.calls();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0], writes[1]);
}

#[tokio::test]
async fn test_panicking_stage_fails_the_message() {
    let mocks = MockStages::new().with_labels(MockLabelDetector::new().panicking());

    let outcome = run(&mocks, configured()).await;

    match outcome.failure() {
        Some(RecordFailure::Panicked(message)) => assert!(message.contains("labels")),
        other => panic!("expected panic failure, got {other:?}"),
    }
    assert_eq!(mocks.attributes.call_count(), 0);
}

#[tokio::test]
async fn test_cancelled_before_start_fails_without_calls() {
    let mocks = MockStages::new();
    let handler = RecordHandler::new(mocks.stages(), configured());
    let token = CancellationToken::new();
    token.cancel();

    let outcome = handler
        .handle(&InvocationContext::new("m1", token), &sample_event("d1"))
        .await;

    assert!(matches!(outcome.failure(), Some(RecordFailure::Cancelled)));
    assert_eq!(mocks.total_calls(), 0);
}

#[tokio::test]
async fn test_cancelled_during_non_fatal_stage_fails_the_message() {
    let mocks = MockStages::new().with_text(MockTextExtractor::new().hanging());
    let handler = RecordHandler::new(mocks.stages(), configured());
    let token = CancellationToken::new();
    let ctx = InvocationContext::new("m1", token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });
    let outcome = handler.handle(&ctx, &sample_event("d1")).await;
    canceller.await.unwrap();

    assert!(matches!(outcome.failure(), Some(RecordFailure::Cancelled)));
    assert_eq!(mocks.text.call_count(), 1);
    assert_eq!(mocks.attributes.call_count(), 0);
    assert_eq!(mocks.notifier.call_count(), 0);
}

#[tokio::test]
async fn test_malformed_message_is_a_decode_failure() {
    let mocks = MockStages::new();
    let handler = RecordHandler::new(mocks.stages(), configured());

    let outcome = handler
        .handle_message(&ctx(), &QueueMessage::new("m1", "not json"))
        .await;

    match outcome.failure() {
        Some(failure @ RecordFailure::Decode(_)) => assert!(!failure.is_retryable()),
        other => panic!("expected decode failure, got {other:?}"),
    }
    assert_eq!(mocks.total_calls(), 0);
}
