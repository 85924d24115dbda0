//! Domain-specific error types for the Guardian streaming protocol.
//!
//! All fallible operations return `Result<T, GuardianError>`.
//! Every error is fatal only to the loop that produced it: a session or
//! the client receive loop logs it, releases its resources and exits.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for Guardian.
#[derive(Debug, Error)]
pub enum GuardianError {
    // ── Pipeline Errors ──────────────────────────────────────────
    /// The capture source could not produce a frame.
    #[error("capture failed: {0}")]
    Capture(String),

    /// The analysis step failed or broke the frame shape.
    #[error("analysis failed: {0}")]
    Analysis(String),

    /// The image codec could not encode a frame.
    #[error("image encode failed: {0}")]
    Encode(String),

    /// The image codec could not decode a received blob.
    #[error("image decode failed: {0}")]
    Decode(String),

    /// Lossless compression of an encoded frame failed.
    #[error("compression failed: {0}")]
    Compression(String),

    /// A received payload could not be decompressed.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// A pixel buffer does not match its declared geometry.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    // ── Framing Errors ───────────────────────────────────────────
    /// The peer closed the stream before the declared byte count arrived.
    #[error("short read: expected {expected} bytes, received {received}")]
    ShortRead { expected: usize, received: usize },

    /// The metadata block is not valid JSON or lacks the `size` field.
    #[error("invalid metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    /// The metadata's declared size disagrees with the payload length.
    #[error("metadata declares {declared} payload bytes, got {actual}")]
    MetadataMismatch { declared: usize, actual: usize },

    /// A length prefix or declared size exceeds the protocol limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error (refused, reset, broken pipe, ...).
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// A socket operation exceeded the configured deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl GuardianError {
    /// Whether this error means the peer went away rather than misbehaved.
    ///
    /// A [`ShortRead`](Self::ShortRead) that received nothing is a clean
    /// close on a message boundary; reset and broken-pipe errors are the
    /// write-side view of the same event.
    pub fn is_remote_closed(&self) -> bool {
        match self {
            GuardianError::ShortRead { received: 0, .. } => true,
            GuardianError::Connection(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for GuardianError {
    fn from(s: String) -> Self {
        GuardianError::Other(s)
    }
}

impl From<&str> for GuardianError {
    fn from(s: &str) -> Self {
        GuardianError::Other(s.to_string())
    }
}

impl From<tokio::task::JoinError> for GuardianError {
    fn from(e: tokio::task::JoinError) -> Self {
        GuardianError::Other(format!("pipeline task failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = GuardianError::ShortRead {
            expected: 4096,
            received: 12,
        };
        assert!(e.to_string().contains("4096"));
        assert!(e.to_string().contains("12"));

        let e = GuardianError::FrameTooLarge { size: 1000, max: 500 };
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("500"));
    }

    #[test]
    fn from_string() {
        let e: GuardianError = "something broke".into();
        assert!(matches!(e, GuardianError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: GuardianError = io_err.into();
        assert!(matches!(e, GuardianError::Connection(_)));
        assert!(e.is_remote_closed());
    }

    #[test]
    fn remote_closed_only_on_boundary() {
        let clean = GuardianError::ShortRead {
            expected: 4,
            received: 0,
        };
        assert!(clean.is_remote_closed());

        let truncated = GuardianError::ShortRead {
            expected: 100,
            received: 40,
        };
        assert!(!truncated.is_remote_closed());

        let refused: GuardianError =
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "nope").into();
        assert!(!refused.is_remote_closed());
    }
}
