// Packet decoder — strips one layer at a relay
//
// A failed decode never yields a partial packet: the input is consumed and
// the caller drops it.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::header::{DeliveryMethod, ExitInfo, IntermediateInfo, PacketInfo, SlotData};
use super::schedule::{HopKeys, BODY_SEQUENCE};
use super::{
    anti_tag_digest, days_since_epoch, MessageId, Packet, PacketError, PacketId, HOP_MAX,
    TIMESTAMP_SKEW_DAYS,
};
use crate::crypto::{apply_keystream, open, slot_key_id, KeyId, SecretStore};

/// Packets stamped more than this many days ahead are rejected
const MAX_FUTURE_DAYS: u16 = 1;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("No secret key for key id {0}")]
    UnknownKey(KeyId),
    #[error("Header slot failed authentication")]
    Unseal,
    #[error("Unsupported packet version: {0}")]
    VersionMismatch(u8),
    #[error("Malformed packet: {0}")]
    Malformed(String),
    #[error("Anti-tag digest mismatch")]
    AntiTag,
    #[error("Packet timestamp outside accepted window: day {0}")]
    Expired(u16),
    #[error("Invalid decoder configuration: {0}")]
    InvalidConfig(String),
}

impl From<PacketError> for DecodeError {
    fn from(err: PacketError) -> Self {
        match err {
            PacketError::UnsupportedVersion(v) => DecodeError::VersionMismatch(v),
            other => DecodeError::Malformed(other.to_string()),
        }
    }
}

/// Decoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Oldest accepted slot timestamp (days)
    pub max_packet_age_days: u16,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_packet_age_days: 14,
        }
    }
}

impl DecoderConfig {
    /// Validate decoder configuration
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.max_packet_age_days < TIMESTAMP_SKEW_DAYS {
            return Err(DecodeError::InvalidConfig(format!(
                "max_packet_age_days must be at least {}",
                TIMESTAMP_SKEW_DAYS
            )));
        }
        Ok(())
    }
}

/// Result of stripping one layer
#[derive(Debug)]
pub enum Decoded {
    /// Send `packet` on to `next_hop`
    Forward {
        packet: Packet,
        next_hop: String,
        packet_id: PacketId,
    },
    /// This node is the exit
    Exit {
        fragment: Vec<u8>,
        message_id: MessageId,
        chunk_num: u8,
        chunk_count: u8,
        delivery: DeliveryMethod,
        packet_id: PacketId,
    },
}

impl Decoded {
    pub fn packet_id(&self) -> &PacketId {
        match self {
            Decoded::Forward { packet_id, .. } | Decoded::Exit { packet_id, .. } => packet_id,
        }
    }
}

/// One node's decoder; holds only read-only state, so one instance can serve
/// many threads
pub struct Decoder<S: SecretStore> {
    secrets: S,
    config: DecoderConfig,
}

impl<S: SecretStore> Decoder<S> {
    pub fn new(secrets: S, config: DecoderConfig) -> Self {
        Self { secrets, config }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn decode(&self, packet: Packet) -> Result<Decoded, DecodeError> {
        self.decode_on(packet, days_since_epoch())
    }

    fn decode_on(&self, mut packet: Packet, today: u16) -> Result<Decoded, DecodeError> {
        let top = packet.slot(0);
        let key_id = slot_key_id(&top);
        let secret = self.secrets.get_by_key_id(&key_id).ok_or_else(|| {
            warn!("Dropping packet for unknown key id {}", key_id);
            DecodeError::UnknownKey(key_id)
        })?;

        let plaintext = zeroize::Zeroizing::new(open(&top, secret).map_err(|_| {
            warn!("Dropping packet: header slot failed authentication");
            DecodeError::Unseal
        })?);
        let slot = SlotData::from_bytes(&plaintext).map_err(|e| {
            warn!("Dropping packet: {}", e);
            DecodeError::from(e)
        })?;

        self.check_age(slot.timestamp, today)?;

        if anti_tag_digest(packet.covered()) != slot.anti_tag {
            warn!("Dropping packet: anti-tag digest mismatch");
            return Err(DecodeError::AntiTag);
        }

        match &slot.info {
            PacketInfo::Intermediate(info) => {
                let next_hop = self.strip_intermediate(&mut packet, &slot, info);
                debug!("Forwarding packet to {}", next_hop);
                Ok(Decoded::Forward {
                    packet,
                    next_hop,
                    packet_id: slot.packet_id,
                })
            }
            PacketInfo::Exit(info) => {
                let fragment = self.strip_exit(&packet, &slot, info);
                debug!(
                    "Exit packet: chunk {} of {}, {} bytes",
                    info.chunk_num,
                    info.chunk_count,
                    fragment.len()
                );
                Ok(Decoded::Exit {
                    fragment,
                    message_id: info.message_id,
                    chunk_num: info.chunk_num,
                    chunk_count: info.chunk_count,
                    delivery: info.delivery,
                    packet_id: slot.packet_id,
                })
            }
        }
    }

    fn check_age(&self, timestamp: u16, today: u16) -> Result<(), DecodeError> {
        let too_old = today.saturating_sub(timestamp) > self.config.max_packet_age_days;
        let too_new = timestamp > today.saturating_add(MAX_FUTURE_DAYS);
        if too_old || too_new {
            warn!("Dropping packet with timestamp day {} (today {})", timestamp, today);
            return Err(DecodeError::Expired(timestamp));
        }
        Ok(())
    }

    fn strip_intermediate(
        &self,
        packet: &mut Packet,
        slot: &SlotData,
        info: &IntermediateInfo,
    ) -> String {
        let keys = HopKeys::new(*slot.aes_key, info.partial_iv);
        packet.shift_up();
        for index in 0..HOP_MAX {
            keys.apply(index as u32, packet.slot_mut(index));
        }
        keys.apply(BODY_SEQUENCE, packet.body_mut());
        info.next_hop.clone()
    }

    fn strip_exit(&self, packet: &Packet, slot: &SlotData, info: &ExitInfo) -> Vec<u8> {
        let mut body = packet.body().to_vec();
        apply_keystream(&slot.aes_key, &info.iv, &mut body);
        body.truncate(info.body_length as usize);
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::crypto::{Keyring, NodeKeys};
    use crate::directory::tests::remailer;
    use crate::directory::{Directory, RemailerDirectory};
    use crate::packet::{encode, FinalInfo};
    use rand::Rng;

    fn single_hop() -> (Directory, Packet) {
        let directory = Directory::new(vec![remailer("alpha", 10, 1000, true)]).unwrap();
        let chain = Chain::new(vec!["alpha@mix.example".to_string()]).unwrap();
        let info = FinalInfo::new([4u8; 16], 1, 1).unwrap();
        let encoded = encode(
            b"single hop",
            [5u8; 16],
            &chain,
            info,
            &directory,
            &mut rand::thread_rng(),
        )
        .unwrap();
        (directory, encoded.packet)
    }

    #[test]
    fn test_unknown_key_dropped() {
        let (_, packet) = single_hop();
        let stranger = NodeKeys::generate(&mut rand::thread_rng());
        let decoder = Decoder::new(Keyring::from(&stranger), DecoderConfig::default());

        assert!(matches!(
            decoder.decode(packet),
            Err(DecodeError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_wrong_secret_under_same_id_fails_unseal() {
        let (directory, packet) = single_hop();
        let alpha = directory.get("alpha").unwrap();

        // A keyring entry keyed by the right id but holding the wrong secret
        struct Impostor(KeyId, x25519_dalek::StaticSecret);
        impl SecretStore for Impostor {
            fn get_by_key_id(&self, key_id: &KeyId) -> Option<&x25519_dalek::StaticSecret> {
                (*key_id == self.0).then_some(&self.1)
            }
        }
        let impostor = Impostor(
            alpha.key_id,
            x25519_dalek::StaticSecret::random_from_rng(rand::thread_rng()),
        );
        let decoder = Decoder::new(impostor, DecoderConfig::default());

        assert!(matches!(decoder.decode(packet), Err(DecodeError::Unseal)));
    }

    #[test]
    fn test_age_window() {
        let decoder = Decoder::new(Keyring::new(), DecoderConfig::default());
        let today = 20_000;

        assert!(decoder.check_age(today, today).is_ok());
        assert!(decoder.check_age(today - 14, today).is_ok());
        assert!(decoder.check_age(today + 1, today).is_ok());
        assert!(matches!(
            decoder.check_age(today - 15, today),
            Err(DecodeError::Expired(_))
        ));
        assert!(matches!(
            decoder.check_age(today + 2, today),
            Err(DecodeError::Expired(_))
        ));
    }

    #[test]
    fn test_stale_packet_dropped() {
        // alpha's key is the one in the packet, but judged 30 days later
        let keys = NodeKeys::generate(&mut rand::thread_rng());
        let mut record = remailer("alpha", 10, 1000, true);
        record.key_id = keys.key_id();
        record.public_key = *keys.public_key();
        let directory = Directory::new(vec![record]).unwrap();
        let chain = Chain::new(vec!["alpha@mix.example".to_string()]).unwrap();
        let info = FinalInfo::new([0u8; 16], 1, 1).unwrap();
        let packet = encode(b"old", [0u8; 16], &chain, info, &directory, &mut rand::thread_rng())
            .unwrap()
            .packet;

        let decoder = Decoder::new(Keyring::from(&keys), DecoderConfig::default());
        assert!(matches!(
            decoder.decode_on(packet, days_since_epoch() + 30),
            Err(DecodeError::Expired(_))
        ));
    }

    #[test]
    fn test_config_validation() {
        assert!(DecoderConfig::default().validate().is_ok());
        assert!(DecoderConfig {
            max_packet_age_days: 0
        }
        .validate()
        .is_err());
        assert!(DecoderConfig {
            max_packet_age_days: TIMESTAMP_SKEW_DAYS - 1
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_smallest_window_accepts_backdated_stamps() {
        let config = DecoderConfig {
            max_packet_age_days: TIMESTAMP_SKEW_DAYS,
        };
        assert!(config.validate().is_ok());

        let decoder = Decoder::new(Keyring::new(), config);
        let today = 20_000;
        for skew in 0..=TIMESTAMP_SKEW_DAYS {
            assert!(decoder.check_age(today - skew, today).is_ok());
        }
    }

    #[test]
    fn test_smallest_window_decodes_fresh_packets() {
        let keys = NodeKeys::generate(&mut rand::thread_rng());
        let mut record = remailer("alpha", 10, 1000, true);
        record.key_id = keys.key_id();
        record.public_key = *keys.public_key();
        let directory = Directory::new(vec![record]).unwrap();
        let chain = Chain::new(vec!["alpha@mix.example".to_string()]).unwrap();
        let decoder = Decoder::new(
            Keyring::from(&keys),
            DecoderConfig {
                max_packet_age_days: TIMESTAMP_SKEW_DAYS,
            },
        );

        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let info = FinalInfo::new([0u8; 16], 1, 1).unwrap();
            let packet = encode(b"fresh", rng.gen(), &chain, info, &directory, &mut rng)
                .unwrap()
                .packet;
            assert!(decoder.decode(packet).is_ok());
        }
    }

    #[test]
    fn test_version_error_mapping() {
        assert!(matches!(
            DecodeError::from(PacketError::UnsupportedVersion(1)),
            DecodeError::VersionMismatch(1)
        ));
        assert!(matches!(
            DecodeError::from(PacketError::MalformedHeader("x")),
            DecodeError::Malformed(_)
        ));
    }
}
