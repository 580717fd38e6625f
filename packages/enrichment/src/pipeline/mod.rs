//! Record handling and batch processing.
//!
//! # Architecture
//!
//! ```text
//! BatchProcessor.process_batch(messages, cancel)
//!     │
//!     ├─► per message (bounded fan-out):
//!     │       InvocationContext::for_message (child token)
//!     │       └─► RecordHandler.handle_message
//!     │               ├─► decode(body)          ─ error ─► Failed(Decode)
//!     │               └─► RecordHandler.handle  ─ panic ─► Failed(Panicked)
//!     │                       thumbnail ─► labels ─► text ─► attributes ─► notify
//!     └─► BatchOutcome (message id → outcome)
//! ```

mod handler;
mod processor;

pub use handler::RecordHandler;
pub use processor::{BatchProcessor, ProcessorConfig};

/// Render a caught panic payload.
pub(crate) fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
