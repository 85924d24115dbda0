//! `tokio_util` codec for Guardian wire messages.
//!
//! Produces and consumes exactly the bytes written by
//! [`write_message`](crate::rdp::transport::write_message), so a
//! `FramedWrite` on one end interoperates with the chunked
//! [`read_message`](crate::rdp::transport::read_message) on the other.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::GuardianError;
use crate::message::{FrameMetadata, LENGTH_PREFIX_SIZE, MAX_METADATA_SIZE, WireMessage};

/// Decoder progress between calls.
#[derive(Debug, Clone, Default)]
enum DecodeState {
    /// Waiting for the 4-byte length prefix.
    #[default]
    Prefix,
    /// Prefix consumed; waiting for this many metadata bytes.
    Metadata(usize),
    /// Metadata parsed; waiting for its declared payload.
    Payload(FrameMetadata),
}

/// Length-prefixed JSON-metadata codec.
#[derive(Debug, Default)]
pub struct MessageCodec {
    state: DecodeState,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for MessageCodec {
    type Item = WireMessage;
    type Error = GuardianError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match std::mem::take(&mut self.state) {
                DecodeState::Prefix => {
                    if src.len() < LENGTH_PREFIX_SIZE {
                        return Ok(None);
                    }
                    let len = src.get_u32() as usize;
                    if len > MAX_METADATA_SIZE {
                        return Err(GuardianError::FrameTooLarge {
                            size: len,
                            max: MAX_METADATA_SIZE,
                        });
                    }
                    src.reserve(len);
                    self.state = DecodeState::Metadata(len);
                }
                DecodeState::Metadata(len) => {
                    if src.len() < len {
                        self.state = DecodeState::Metadata(len);
                        return Ok(None);
                    }
                    let block = src.split_to(len);
                    let metadata = FrameMetadata::from_bytes(&block)?;
                    self.state = DecodeState::Payload(metadata);
                }
                DecodeState::Payload(metadata) => {
                    if src.len() < metadata.size {
                        src.reserve(metadata.size - src.len());
                        self.state = DecodeState::Payload(metadata);
                        return Ok(None);
                    }
                    let payload = src.split_to(metadata.size).to_vec();
                    return Ok(Some(WireMessage { metadata, payload }));
                }
            }
        }
    }
}

impl Encoder<WireMessage> for MessageCodec {
    type Error = GuardianError;

    fn encode(&mut self, item: WireMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.metadata.size != item.payload.len() {
            return Err(GuardianError::MetadataMismatch {
                declared: item.metadata.size,
                actual: item.payload.len(),
            });
        }
        item.metadata.check_size()?;

        let meta = item.metadata.to_bytes()?;
        dst.reserve(LENGTH_PREFIX_SIZE + meta.len() + item.payload.len());
        dst.put_u32(meta.len() as u32);
        dst.extend_from_slice(&meta);
        dst.extend_from_slice(&item.payload);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
