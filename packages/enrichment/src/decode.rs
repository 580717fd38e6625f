//! Decoding of queue message bodies into document events.
//!
//! A body is a notification envelope whose `Message` field holds the
//! serialized document event. Decoding is pure and never logs: the caller
//! owns the message id and reports failures against it.

use crate::error::DecodeError;
use crate::types::event::{DocumentEvent, NotificationEnvelope};

/// Decode a raw message body into a document event.
pub fn decode(raw: &[u8]) -> Result<DocumentEvent, DecodeError> {
    let envelope = decode_envelope(raw)?;
    serde_json::from_str(&envelope.message).map_err(DecodeError::PayloadInvalid)
}

/// Decode only the outer envelope.
pub fn decode_envelope(raw: &[u8]) -> Result<NotificationEnvelope, DecodeError> {
    serde_json::from_slice(raw).map_err(DecodeError::EnvelopeInvalid)
}
