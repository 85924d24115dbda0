//! Wire message metadata and protocol limits.
//!
//! A wire message is laid out as:
//!
//! ```text
//! length:    u32 big-endian      (4)   byte count of the metadata block
//! metadata:  JSON object         (length)
//! payload:   [u8]                (metadata.size)
//! ```
//!
//! The metadata is self-describing JSON. `size` is mandatory; the other
//! fields are optional and skipped when absent, so a minimal reader that
//! only looks at `{"size": N}` stays compatible.

use serde::{Deserialize, Serialize};

use crate::error::GuardianError;

// ── Constants ────────────────────────────────────────────────────

/// Width of the metadata length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest single read request issued while assembling a payload.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Upper bound on the metadata block (64 KiB).
pub const MAX_METADATA_SIZE: usize = 64 * 1024;

/// Upper bound on a single payload (64 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

// ── FrameMetadata ────────────────────────────────────────────────

/// Metadata block preceding every payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMetadata {
    /// Exact byte length of the payload that follows.
    pub size: usize,
    /// Per-session frame sequence number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    /// Width of the frame the payload encodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Height of the frame the payload encodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl FrameMetadata {
    /// Metadata carrying only the payload size.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            seq: None,
            width: None,
            height: None,
        }
    }

    /// Attach the frame sequence number.
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    /// Attach the encoded frame's dimensions.
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Serialize to the JSON bytes placed on the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, GuardianError> {
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > MAX_METADATA_SIZE {
            return Err(GuardianError::FrameTooLarge {
                size: bytes.len(),
                max: MAX_METADATA_SIZE,
            });
        }
        Ok(bytes)
    }

    /// Parse a metadata block and check its declared size against the limit.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GuardianError> {
        let meta: Self = serde_json::from_slice(bytes)?;
        meta.check_size()?;
        Ok(meta)
    }

    /// Reject payload sizes above [`MAX_PAYLOAD_SIZE`].
    pub fn check_size(&self) -> Result<(), GuardianError> {
        if self.size > MAX_PAYLOAD_SIZE {
            return Err(GuardianError::FrameTooLarge {
                size: self.size,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(())
    }
}

// ── WireMessage ──────────────────────────────────────────────────

/// One framed unit on the wire: metadata plus the payload it describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub metadata: FrameMetadata,
    pub payload: Vec<u8>,
}

impl WireMessage {
    /// Build a message whose metadata declares exactly `payload.len()`.
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            metadata: FrameMetadata::new(payload.len()),
            payload,
        }
    }

    /// Pair explicit metadata with a payload, enforcing that they agree.
    pub fn with_metadata(metadata: FrameMetadata, payload: Vec<u8>) -> Result<Self, GuardianError> {
        if metadata.size != payload.len() {
            return Err(GuardianError::MetadataMismatch {
                declared: metadata.size,
                actual: payload.len(),
            });
        }
        metadata.check_size()?;
        Ok(Self { metadata, payload })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_metadata_is_size_only() {
        let bytes = FrameMetadata::new(1234).to_bytes().unwrap();
        assert_eq!(bytes, br#"{"size":1234}"#);
    }

    #[test]
    fn optional_fields_are_written_when_set() {
        let meta = FrameMetadata::new(10).with_seq(3).with_dimensions(64, 48);
        let text = String::from_utf8(meta.to_bytes().unwrap()).unwrap();
        assert!(text.contains(r#""seq":3"#));
        assert!(text.contains(r#""width":64"#));
        assert!(text.contains(r#""height":48"#));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let meta = FrameMetadata::from_bytes(br#"{"size": 7, "codec": "jpeg"}"#).unwrap();
        assert_eq!(meta, FrameMetadata::new(7));
    }

    #[test]
    fn missing_size_is_rejected() {
        let err = FrameMetadata::from_bytes(br#"{"seq": 1}"#).unwrap_err();
        assert!(matches!(err, GuardianError::Metadata(_)));
    }

    #[test]
    fn wire_message_rejects_mismatched_size() {
        let err = WireMessage::with_metadata(FrameMetadata::new(5), vec![0; 4]).unwrap_err();
        assert!(matches!(
            err,
            GuardianError::MetadataMismatch {
                declared: 5,
                actual: 4
            }
        ));
        assert_eq!(WireMessage::new(vec![1, 2, 3]).metadata.size, 3);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let text = format!(r#"{{"size": {}}}"#, MAX_PAYLOAD_SIZE + 1);
        let err = FrameMetadata::from_bytes(text.as_bytes()).unwrap_err();
        assert!(matches!(err, GuardianError::FrameTooLarge { .. }));
    }
}
