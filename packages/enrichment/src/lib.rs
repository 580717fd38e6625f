//! Document Enrichment Pipeline
//!
//! Consumes batches of "document created" events from a queue and enriches
//! each document: a thumbnail is rendered, labels and text are detected on it,
//! the results are written back to the document store, and a channel is
//! notified.
//!
//! # Design Philosophy
//!
//! - One bad message never sinks its batch
//! - The thumbnail is the only fatal stage; everything after it is best-effort
//! - Nothing is global: every stage call gets an explicit invocation context
//! - The queue owns retries; the library only says what a failure means
//!
//! # Usage
//!
//! ```rust,ignore
//! use enrichment::{BatchProcessor, RecordHandler, RedrivePolicy};
//! use enrichment::testing::{configured, MockStages};
//!
//! let mocks = MockStages::new();
//! let handler = Arc::new(RecordHandler::new(mocks.stages(), configured()));
//! let processor = BatchProcessor::new(handler);
//!
//! let outcome = processor.process_batch(&messages, &CancellationToken::new()).await;
//! for (message, disposition) in RedrivePolicy::default().dispositions(&outcome, &messages) {
//!     // acknowledge, release or dead-letter
//! }
//! ```
//!
//! # Modules
//!
//! - [`decode`] - Envelope and event decoding
//! - [`pipeline`] - Record handler and batch processor
//! - [`redrive`] - Retry and dead-letter decisions
//! - [`traits`] - Stage and storage capabilities
//! - [`providers`] - HTTP, webhook, image and storage implementations
//! - [`types`] - Events, messages, outcomes and configuration
//! - [`testing`] - Mock stages and fixtures

pub mod context;
pub mod decode;
pub mod error;
pub mod pipeline;
pub mod providers;
pub mod redrive;
pub mod testing;
pub mod traits;
pub mod types;

pub use context::InvocationContext;
pub use decode::decode;
pub use error::{DecodeError, RecordFailure, StageError, StageResult, StoreError, StoreResult};
pub use pipeline::{BatchProcessor, ProcessorConfig, RecordHandler};
pub use redrive::{Disposition, RedrivePolicy, DEFAULT_MAX_RECEIVE_COUNT};
pub use traits::stages::{
    AttributeWriter, LabelDetector, Notifier, PipelineStages, TextExtractor, ThumbnailGenerator,
};
pub use traits::storage::{LinkSigner, ObjectStore};
pub use types::{
    config::{ApiKey, AttributeSchema, DocumentStoreConfig, LabelThresholds, PipelineConfig},
    event::{DerivedImage, DocumentEvent, NotificationEnvelope, CREATE_EVENT},
    message::QueueMessage,
    outcome::{
        BatchItemFailure, BatchOutcome, BatchResponse, PipelineResult, RecordOutcome, SkipReason,
        Stage, StageStatus,
    },
};

// Re-export testing utilities
pub use testing::MockStages;
