// Mixnode Core — layered fixed-size packets for a mix remailer network
//
// A client picks a chain of remailers from the directory and wraps each
// message fragment in one encrypted header slot per hop. Every relay strips
// exactly one layer and forwards a packet of the same size; only the exit
// sees the payload.

pub mod chain;
pub mod crypto;
pub mod directory;
pub mod packet;

pub use chain::{parse_hops, Chain, ChainConfig, ChainError, ChainSelector, HopRef};
pub use crypto::{CryptoError, KeyId, Keyring, NodeKeys, SecretStore};
pub use directory::{
    Capability, Directory, DirectoryError, DirectoryHandle, Remailer, RemailerDirectory,
    RemailerStats,
};
pub use packet::{
    encode, DecodeError, Decoded, Decoder, DecoderConfig, DeliveryMethod, Encoded, FinalInfo,
    MessageId, Packet, PacketError, PacketId, BODY_BYTES, HOP_MAX, MESSAGE_BYTES,
    TIMESTAMP_SKEW_DAYS,
};
