//! Binary encoding of ledger snapshots.
//!
//! An in-memory ledger can be persisted across restarts as a
//! [`LedgerSnapshot`]. Snapshots are serialized with postcard and written as
//! a single length-prefixed frame so a truncated file is detected on load.

use serde::{Deserialize, Serialize};

use crate::message::{ChatId, MessageHandle};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u16 = 1;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Frame is incomplete or has an invalid length prefix.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    /// The snapshot was written by an incompatible version.
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u16),
}

/// Pending cleanup handles of every chat, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Format version, always [`SNAPSHOT_VERSION`] when produced by this crate.
    pub version: u16,
    /// Per-chat handle queues.
    pub chats: Vec<(ChatId, Vec<MessageHandle>)>,
}

impl LedgerSnapshot {
    /// Creates a snapshot of the given chats.
    #[must_use]
    pub const fn new(chats: Vec<(ChatId, Vec<MessageHandle>)>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            chats,
        }
    }

    /// Total number of handles across chats.
    #[must_use]
    pub fn handle_count(&self) -> usize {
        self.chats.iter().map(|(_, handles)| handles.len()).sum()
    }
}

/// Encodes a [`LedgerSnapshot`] into a byte vector using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the snapshot cannot be serialized.
pub fn encode(snapshot: &LedgerSnapshot) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(snapshot).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`LedgerSnapshot`] from a byte slice using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the bytes cannot be deserialized, or
/// `CodecError::UnsupportedVersion` for a snapshot from another format version.
pub fn decode(bytes: &[u8]) -> Result<LedgerSnapshot, CodecError> {
    let snapshot: LedgerSnapshot =
        postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(CodecError::UnsupportedVersion(snapshot.version));
    }
    Ok(snapshot)
}

/// Encodes a snapshot with a 4-byte little-endian length prefix.
///
/// Format: `[u32 length (LE)][payload bytes]`
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the snapshot cannot be serialized,
/// or `CodecError::InvalidFrame` if the payload exceeds `u32::MAX` bytes.
pub fn encode_framed(snapshot: &LedgerSnapshot) -> Result<Vec<u8>, CodecError> {
    let payload = encode(snapshot)?;
    let len = u32::try_from(payload.len()).map_err(|_| {
        CodecError::InvalidFrame(format!(
            "payload too large for framing: {} bytes",
            payload.len()
        ))
    })?;
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decodes a length-prefixed frame back into a [`LedgerSnapshot`].
///
/// Trailing bytes after the frame are rejected; a snapshot file holds
/// exactly one frame.
///
/// # Errors
///
/// Returns `CodecError::InvalidFrame` if the input is too short, the length
/// prefix disagrees with the data, or `CodecError::Serialization` if the
/// payload cannot be deserialized.
pub fn decode_framed(bytes: &[u8]) -> Result<LedgerSnapshot, CodecError> {
    if bytes.len() < 4 {
        return Err(CodecError::InvalidFrame(format!(
            "need at least 4 bytes for length prefix, got {}",
            bytes.len()
        )));
    }
    let len_bytes: [u8; 4] = bytes[..4]
        .try_into()
        .map_err(|_| CodecError::InvalidFrame("failed to read length prefix".into()))?;
    let payload_len = u32::from_le_bytes(len_bytes) as usize;

    let total_len = 4 + payload_len;
    if bytes.len() != total_len {
        return Err(CodecError::InvalidFrame(format!(
            "frame indicates {} bytes but {} available",
            payload_len,
            bytes.len() - 4
        )));
    }

    decode(&bytes[4..total_len])
}
