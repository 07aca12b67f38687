//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value to CBOR.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode CBOR bytes.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// A framed packet is structurally invalid.
    #[error("invalid frame: {message}")]
    InvalidFrame {
        /// Description of the framing error.
        message: String,
    },

    /// A framed packet uses an option this build does not support.
    #[error("unsupported frame option: {option}")]
    UnsupportedFrameOption {
        /// Name of the unsupported option.
        option: &'static str,
    },

    /// Checksum mismatch detected in a framed packet.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the frame.
        expected: u32,
        /// Checksum computed over the payload.
        actual: u32,
    },

    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,
}

impl CodecError {
    /// Creates an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Creates a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid frame error.
    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::InvalidFrame {
            message: message.into(),
        }
    }
}
