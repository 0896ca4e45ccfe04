// Packet Codec — fixed-size layered packets
//
// Wire layout (MESSAGE_BYTES):
//   header stack: HOP_MAX × 256-byte slots, slot 0 decrypted next
//   body:         BODY_BYTES, encrypted
//
// Every relay sees a packet of the same size no matter where it sits in the
// chain or how long the chain is.

mod decoder;
mod deterministic;
mod encoder;
mod header;
mod schedule;

pub use decoder::{DecodeError, Decoded, Decoder, DecoderConfig};
pub use encoder::{encode, Encoded};
pub use header::{DeliveryMethod, ExitInfo, FinalInfo, IntermediateInfo, PacketInfo, SlotData};

use thiserror::Error;

use crate::crypto::{CryptoError, SLOT_SIZE};
use crate::directory::DirectoryError;

/// Maximum chain length, and number of header slots in every packet
pub const HOP_MAX: usize = 10;

/// One header slot (bytes)
pub const SLOT_BYTES: usize = SLOT_SIZE;

/// Whole header stack (bytes)
pub const HEADERS_BYTES: usize = HOP_MAX * SLOT_BYTES;

/// Payload region (bytes)
pub const BODY_BYTES: usize = 17920;

/// Total packet size on the wire (bytes)
pub const MESSAGE_BYTES: usize = HEADERS_BYTES + BODY_BYTES;

/// Layout version carried in every slot
pub const PACKET_VERSION: u8 = 2;

/// Cipher suite: X25519/XChaCha20-Poly1305 slots, AES-256-CTR bulk
pub const PROTOCOL_ID: u8 = 0;

/// Largest backdating the encoder applies to slot timestamps (days); relays
/// must accept packets at least this old
pub const TIMESTAMP_SKEW_DAYS: u16 = 3;

/// Longest next-hop address an intermediate slot can carry (bytes)
pub const ADDRESS_MAX_BYTES: usize = 52;

/// Packet id carried in every slot
pub type PacketId = [u8; 16];

/// Message id shared by all chunks and copies of one message
pub type MessageId = [u8; 16];

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("Invalid packet length: {0} (expected {expected})", expected = MESSAGE_BYTES)]
    InvalidLength(usize),
    #[error("Fragment too large: {0} bytes (max {max})", max = BODY_BYTES)]
    FragmentTooLarge(usize),
    #[error("Address too long for a header slot: {0}")]
    AddressTooLong(String),
    #[error("Invalid chunk numbering: {0} of {1}")]
    InvalidChunk(u8, u8),
    #[error("Malformed header: {0}")]
    MalformedHeader(&'static str),
    #[error("Unsupported packet version: {0}")]
    UnsupportedVersion(u8),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// A complete wire packet: always exactly `MESSAGE_BYTES` long
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    buf: Vec<u8>,
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Packet({} bytes)", self.buf.len())
    }
}

impl Packet {
    pub(crate) fn zeroed() -> Self {
        Self {
            buf: vec![0u8; MESSAGE_BYTES],
        }
    }

    /// Wrap received bytes; the length is checked before anything else
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, PacketError> {
        if bytes.len() != MESSAGE_BYTES {
            return Err(PacketError::InvalidLength(bytes.len()));
        }
        Ok(Self { buf: bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub(crate) fn slot(&self, index: usize) -> [u8; SLOT_BYTES] {
        let start = index * SLOT_BYTES;
        let mut slot = [0u8; SLOT_BYTES];
        slot.copy_from_slice(&self.buf[start..start + SLOT_BYTES]);
        slot
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut [u8] {
        let start = index * SLOT_BYTES;
        &mut self.buf[start..start + SLOT_BYTES]
    }

    pub(crate) fn body(&self) -> &[u8] {
        &self.buf[HEADERS_BYTES..]
    }

    pub(crate) fn body_mut(&mut self) -> &mut [u8] {
        &mut self.buf[HEADERS_BYTES..]
    }

    /// Header slots below the top one, followed by the body: the bytes a
    /// hop's anti-tag digest covers
    pub(crate) fn covered(&self) -> &[u8] {
        &self.buf[SLOT_BYTES..]
    }

    /// Move every slot down one position, dropping the bottom slot; slot 0
    /// is left for the caller to overwrite
    pub(crate) fn shift_down(&mut self) {
        self.buf.copy_within(0..HEADERS_BYTES - SLOT_BYTES, SLOT_BYTES);
    }

    /// Move every slot up one position, dropping the top slot and leaving a
    /// blank bottom slot
    pub(crate) fn shift_up(&mut self) {
        self.buf.copy_within(SLOT_BYTES..HEADERS_BYTES, 0);
        self.buf[HEADERS_BYTES - SLOT_BYTES..HEADERS_BYTES].fill(0);
    }
}

/// Anti-tag digest over the bytes a hop has not yet decrypted
pub(crate) fn anti_tag_digest(covered: &[u8]) -> [u8; 32] {
    *blake3::hash(covered).as_bytes()
}

/// Current day number since the Unix epoch
pub(crate) fn days_since_epoch() -> u16 {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    u16::try_from(secs / 86_400).unwrap_or(u16::MAX)
}
