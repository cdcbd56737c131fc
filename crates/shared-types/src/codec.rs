//! # Envelope Codec
//!
//! Serializes messages into the opaque byte payloads the transport moves
//! between contexts, and validates them on the way back in.

use crate::envelope::Message;
use crate::errors::CodecError;

/// Largest encoded envelope accepted in either direction (1 MiB).
pub const MAX_ENVELOPE_BYTES: usize = 1024 * 1024;

/// JSON codec for [`Message`] envelopes.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeCodec {
    max_bytes: usize,
}

impl EnvelopeCodec {
    /// Codec with the default size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(MAX_ENVELOPE_BYTES)
    }

    /// Codec with a custom size limit.
    #[must_use]
    pub fn with_limit(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Encode a message to bytes.
    ///
    /// # Errors
    ///
    /// - `CodecError::Malformed` - payload could not be serialized
    /// - `CodecError::TooLarge` - encoded envelope exceeds the limit
    pub fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
        let bytes =
            serde_json::to_vec(message).map_err(|e| CodecError::Malformed(e.to_string()))?;
        self.check_size(bytes.len())?;
        Ok(bytes)
    }

    /// Decode and validate bytes into a message.
    ///
    /// # Errors
    ///
    /// - `CodecError::TooLarge` - checked before parsing
    /// - `CodecError::Malformed` - not a JSON envelope
    /// - `CodecError::EmptyField` - `channel` or `type` is empty
    pub fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError> {
        self.check_size(bytes.len())?;

        let message: Message =
            serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed(e.to_string()))?;

        if message.channel.is_empty() {
            return Err(CodecError::EmptyField { field: "channel" });
        }
        if message.message_type.is_empty() {
            return Err(CodecError::EmptyField { field: "type" });
        }

        Ok(message)
    }

    fn check_size(&self, size: usize) -> Result<(), CodecError> {
        if size > self.max_bytes {
            return Err(CodecError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new()
    }
}
