// Packet encoder — wraps one fragment in a layer per hop, exit first

use rand::{CryptoRng, Rng, RngCore};
use tracing::debug;
use zeroize::Zeroizing;

use super::header::{FinalInfo, IntermediateInfo, PacketInfo, SlotData};
use super::schedule::{ExitKeys, HopKeys, BODY_SEQUENCE};
use super::{
    anti_tag_digest, days_since_epoch, deterministic, Packet, PacketError, PacketId,
    ADDRESS_MAX_BYTES, BODY_BYTES, HOP_MAX, SLOT_BYTES, TIMESTAMP_SKEW_DAYS,
};
use crate::chain::Chain;
use crate::crypto::seal;
use crate::directory::{Remailer, RemailerDirectory};

/// Encoder output: the packet and where to send it
#[derive(Debug, Clone)]
pub struct Encoded {
    pub packet: Packet,
    pub first_hop: String,
}

/// Encode `fragment` for delivery along `chain`.
///
/// Every address in the chain is resolved through `directory` before any
/// cryptographic work starts.
pub fn encode<D, R>(
    fragment: &[u8],
    packet_id: PacketId,
    chain: &Chain,
    final_info: FinalInfo,
    directory: &D,
    rng: &mut R,
) -> Result<Encoded, PacketError>
where
    D: RemailerDirectory + ?Sized,
    R: RngCore + CryptoRng,
{
    if fragment.len() > BODY_BYTES {
        return Err(PacketError::FragmentTooLarge(fragment.len()));
    }
    for address in &chain.addresses()[1..] {
        if address.len() > ADDRESS_MAX_BYTES {
            return Err(PacketError::AddressTooLong(address.clone()));
        }
    }
    let remailers = chain
        .addresses()
        .iter()
        .map(|address| directory.get(address))
        .collect::<Result<Vec<Remailer>, _>>()?;

    let hops = chain.hop_count();
    let intermediates: Vec<HopKeys> = (1..hops).map(|_| HopKeys::generate(rng)).collect();
    let exit_keys = ExitKeys::generate(rng);

    // Exit view of the stack below its own slot: random padding, then the
    // slots the intermediates will have appended
    let mut packet = Packet::zeroed();
    for slot in 0..HOP_MAX {
        rng.fill_bytes(packet.slot_mut(slot));
    }
    let first_fake = HOP_MAX - hops;
    for (k, fake) in deterministic::generate(&intermediates).iter().enumerate() {
        packet.slot_mut(first_fake + k).copy_from_slice(fake);
    }

    let body = packet.body_mut();
    body[..fragment.len()].copy_from_slice(fragment);
    rng.fill_bytes(&mut body[fragment.len()..]);

    // Exit layer
    exit_keys.apply(packet.body_mut());
    let exit_info = final_info.into_exit_info(*exit_keys.iv(), fragment.len() as u32);
    let exit_slot = SlotData {
        packet_id,
        aes_key: Zeroizing::new(*exit_keys.key()),
        timestamp: timestamp(rng),
        info: PacketInfo::Exit(exit_info),
        anti_tag: [0u8; 32],
    };
    push_layer(&mut packet, exit_slot, &remailers[hops - 1], rng)?;
    debug!("Sealed exit layer for {}", remailers[hops - 1].address);

    // Intermediate layers, outward from the hop before the exit
    for hop in (0..hops - 1).rev() {
        let keys = &intermediates[hop];
        for slot in 0..HOP_MAX {
            keys.apply(slot as u32, packet.slot_mut(slot));
        }
        keys.apply(BODY_SEQUENCE, packet.body_mut());
        debug_assert!(
            packet.slot(HOP_MAX - 1).iter().all(|&b| b == 0),
            "bottom slot must cancel to blank"
        );

        let slot = SlotData {
            packet_id,
            aes_key: Zeroizing::new(*keys.key()),
            timestamp: timestamp(rng),
            info: PacketInfo::Intermediate(IntermediateInfo {
                partial_iv: *keys.partial_iv(),
                next_hop: remailers[hop + 1].address.clone(),
            }),
            anti_tag: [0u8; 32],
        };
        push_layer(&mut packet, slot, &remailers[hop], rng)?;
        debug!("Sealed intermediate layer for {}", remailers[hop].address);
    }

    Ok(Encoded {
        packet,
        first_hop: remailers[0].address.clone(),
    })
}

/// Digest what the recipient will see below its slot, then shift the stack
/// down and seal `slot` on top
fn push_layer<R: RngCore + CryptoRng>(
    packet: &mut Packet,
    mut slot: SlotData,
    recipient: &Remailer,
    rng: &mut R,
) -> Result<(), PacketError> {
    slot.anti_tag = {
        let bytes = packet.as_bytes();
        let mut covered = Vec::with_capacity(bytes.len() - SLOT_BYTES);
        covered.extend_from_slice(&bytes[..(HOP_MAX - 1) * SLOT_BYTES]);
        covered.extend_from_slice(packet.body());
        anti_tag_digest(&covered)
    };

    packet.shift_down();
    let sealed = seal(&recipient.key_id, &recipient.public_key, &*slot.to_bytes()?, rng)?;
    packet.slot_mut(0).copy_from_slice(&sealed);
    Ok(())
}

fn timestamp<R: Rng + ?Sized>(rng: &mut R) -> u16 {
    days_since_epoch().saturating_sub(rng.gen_range(0..=TIMESTAMP_SKEW_DAYS))
}
