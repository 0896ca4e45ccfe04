// Slot plaintext — the 160 bytes sealed into each header slot
//
//   version [1] ‖ packet type [1] ‖ protocol [1] ‖ packet id [16]
//   ‖ aes key [32] ‖ timestamp [2, LE days] ‖ packet info [64]
//   ‖ anti-tag digest [32] ‖ pad [11]

use zeroize::Zeroizing;

use super::{
    MessageId, PacketError, PacketId, ADDRESS_MAX_BYTES, BODY_BYTES, PACKET_VERSION, PROTOCOL_ID,
};
use crate::crypto::SLOT_PLAINTEXT_SIZE;

const PACKET_INFO_BYTES: usize = 64;
const PARTIAL_IV_BYTES: usize = 12;

const TYPE_INTERMEDIATE: u8 = 0;
const TYPE_EXIT: u8 = 1;

const OFF_TYPE: usize = 1;
const OFF_PROTOCOL: usize = 2;
const OFF_PACKET_ID: usize = 3;
const OFF_KEY: usize = OFF_PACKET_ID + 16;
const OFF_TIMESTAMP: usize = OFF_KEY + 32;
const OFF_INFO: usize = OFF_TIMESTAMP + 2;
const OFF_DIGEST: usize = OFF_INFO + PACKET_INFO_BYTES;
const OFF_PAD: usize = OFF_DIGEST + 32;

const _: () = assert!(OFF_PAD + 11 == SLOT_PLAINTEXT_SIZE);

/// What the exit remailer should do with the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMethod {
    /// Deliver normally
    Normal,
    /// Cover traffic: discard at the exit
    Dummy,
}

impl DeliveryMethod {
    fn to_byte(self) -> u8 {
        match self {
            DeliveryMethod::Normal => 0,
            DeliveryMethod::Dummy => 255,
        }
    }

    fn from_byte(b: u8) -> Result<Self, PacketError> {
        match b {
            0 => Ok(DeliveryMethod::Normal),
            255 => Ok(DeliveryMethod::Dummy),
            _ => Err(PacketError::MalformedHeader("unknown delivery method")),
        }
    }
}

/// Caller-supplied details for the exit hop.
///
/// Only constructible with consistent chunk numbering; the encoder adds the
/// body IV and length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalInfo {
    message_id: MessageId,
    chunk_num: u8,
    chunk_count: u8,
    delivery: DeliveryMethod,
}

impl FinalInfo {
    /// Chunk `chunk_num` (1-based) of `chunk_count`
    pub fn new(message_id: MessageId, chunk_num: u8, chunk_count: u8) -> Result<Self, PacketError> {
        if chunk_num == 0 || chunk_num > chunk_count {
            return Err(PacketError::InvalidChunk(chunk_num, chunk_count));
        }
        Ok(Self {
            message_id,
            chunk_num,
            chunk_count,
            delivery: DeliveryMethod::Normal,
        })
    }

    /// Single-chunk cover message
    pub fn dummy(message_id: MessageId) -> Self {
        Self {
            message_id,
            chunk_num: 1,
            chunk_count: 1,
            delivery: DeliveryMethod::Dummy,
        }
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn chunk_num(&self) -> u8 {
        self.chunk_num
    }

    pub fn chunk_count(&self) -> u8 {
        self.chunk_count
    }

    pub fn delivery(&self) -> DeliveryMethod {
        self.delivery
    }

    pub(crate) fn into_exit_info(self, iv: [u8; 16], body_length: u32) -> ExitInfo {
        ExitInfo {
            iv,
            chunk_num: self.chunk_num,
            chunk_count: self.chunk_count,
            message_id: self.message_id,
            body_length,
            delivery: self.delivery,
        }
    }
}

/// Exit hop sub-record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitInfo {
    pub iv: [u8; 16],
    pub chunk_num: u8,
    pub chunk_count: u8,
    pub message_id: MessageId,
    pub body_length: u32,
    pub delivery: DeliveryMethod,
}

/// Intermediate hop sub-record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntermediateInfo {
    pub partial_iv: [u8; PARTIAL_IV_BYTES],
    pub next_hop: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketInfo {
    Intermediate(IntermediateInfo),
    Exit(ExitInfo),
}

impl PacketInfo {
    fn type_byte(&self) -> u8 {
        match self {
            PacketInfo::Intermediate(_) => TYPE_INTERMEDIATE,
            PacketInfo::Exit(_) => TYPE_EXIT,
        }
    }

    fn write(&self, out: &mut [u8]) -> Result<(), PacketError> {
        match self {
            PacketInfo::Intermediate(info) => {
                let address = info.next_hop.as_bytes();
                if address.is_empty() || address.len() > ADDRESS_MAX_BYTES || address.contains(&0) {
                    return Err(PacketError::AddressTooLong(info.next_hop.clone()));
                }
                out[..PARTIAL_IV_BYTES].copy_from_slice(&info.partial_iv);
                out[PARTIAL_IV_BYTES..PARTIAL_IV_BYTES + address.len()].copy_from_slice(address);
            }
            PacketInfo::Exit(info) => {
                out[..16].copy_from_slice(&info.iv);
                out[16] = info.chunk_num;
                out[17] = info.chunk_count;
                out[18..34].copy_from_slice(&info.message_id);
                out[34..38].copy_from_slice(&info.body_length.to_le_bytes());
                out[38] = info.delivery.to_byte();
            }
        }
        Ok(())
    }

    fn read(packet_type: u8, bytes: &[u8]) -> Result<Self, PacketError> {
        match packet_type {
            TYPE_INTERMEDIATE => {
                let mut partial_iv = [0u8; PARTIAL_IV_BYTES];
                partial_iv.copy_from_slice(&bytes[..PARTIAL_IV_BYTES]);

                let field = &bytes[PARTIAL_IV_BYTES..PACKET_INFO_BYTES];
                let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
                if end == 0 || field[end..].iter().any(|&b| b != 0) {
                    return Err(PacketError::MalformedHeader("next hop address"));
                }
                let next_hop = std::str::from_utf8(&field[..end])
                    .map_err(|_| PacketError::MalformedHeader("next hop address"))?
                    .to_string();

                Ok(PacketInfo::Intermediate(IntermediateInfo {
                    partial_iv,
                    next_hop,
                }))
            }
            TYPE_EXIT => {
                let mut iv = [0u8; 16];
                iv.copy_from_slice(&bytes[..16]);
                let mut message_id = [0u8; 16];
                message_id.copy_from_slice(&bytes[18..34]);
                let mut length = [0u8; 4];
                length.copy_from_slice(&bytes[34..38]);
                let body_length = u32::from_le_bytes(length);

                let (chunk_num, chunk_count) = (bytes[16], bytes[17]);
                if chunk_num == 0 || chunk_num > chunk_count {
                    return Err(PacketError::MalformedHeader("chunk numbering"));
                }
                if body_length as usize > BODY_BYTES {
                    return Err(PacketError::MalformedHeader("body length"));
                }

                Ok(PacketInfo::Exit(ExitInfo {
                    iv,
                    chunk_num,
                    chunk_count,
                    message_id,
                    body_length,
                    delivery: DeliveryMethod::from_byte(bytes[38])?,
                }))
            }
            _ => Err(PacketError::MalformedHeader("unknown packet type")),
        }
    }
}

/// Decoded slot plaintext
#[derive(Clone)]
pub struct SlotData {
    pub packet_id: PacketId,
    pub aes_key: Zeroizing<[u8; 32]>,
    /// Days since the Unix epoch
    pub timestamp: u16,
    pub info: PacketInfo,
    pub anti_tag: [u8; 32],
}

impl SlotData {
    pub fn to_bytes(&self) -> Result<Zeroizing<[u8; SLOT_PLAINTEXT_SIZE]>, PacketError> {
        let mut out = Zeroizing::new([0u8; SLOT_PLAINTEXT_SIZE]);
        out[0] = PACKET_VERSION;
        out[OFF_TYPE] = self.info.type_byte();
        out[OFF_PROTOCOL] = PROTOCOL_ID;
        out[OFF_PACKET_ID..OFF_KEY].copy_from_slice(&self.packet_id);
        out[OFF_KEY..OFF_TIMESTAMP].copy_from_slice(self.aes_key.as_ref());
        out[OFF_TIMESTAMP..OFF_INFO].copy_from_slice(&self.timestamp.to_le_bytes());
        self.info.write(&mut out[OFF_INFO..OFF_DIGEST])?;
        out[OFF_DIGEST..OFF_PAD].copy_from_slice(&self.anti_tag);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8; SLOT_PLAINTEXT_SIZE]) -> Result<Self, PacketError> {
        if bytes[0] != PACKET_VERSION {
            return Err(PacketError::UnsupportedVersion(bytes[0]));
        }
        if bytes[OFF_PROTOCOL] != PROTOCOL_ID {
            return Err(PacketError::MalformedHeader("unknown protocol"));
        }

        let mut packet_id = [0u8; 16];
        packet_id.copy_from_slice(&bytes[OFF_PACKET_ID..OFF_KEY]);
        let mut aes_key = Zeroizing::new([0u8; 32]);
        aes_key.copy_from_slice(&bytes[OFF_KEY..OFF_TIMESTAMP]);
        let timestamp = u16::from_le_bytes([bytes[OFF_TIMESTAMP], bytes[OFF_TIMESTAMP + 1]]);
        let info = PacketInfo::read(bytes[OFF_TYPE], &bytes[OFF_INFO..OFF_DIGEST])?;
        let mut anti_tag = [0u8; 32];
        anti_tag.copy_from_slice(&bytes[OFF_DIGEST..OFF_PAD]);

        Ok(Self {
            packet_id,
            aes_key,
            timestamp,
            info,
            anti_tag,
        })
    }
}
