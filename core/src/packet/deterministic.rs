// Deterministic header generation
//
// Each intermediate relay shifts the stack up and decrypts a blank bottom
// slot, which turns it into that relay's keystream. Later relays decrypt it
// again. The slots below the random padding in the exit's view are therefore
// fully determined by the intermediate hop keys, and the encoder computes
// them here instead of leaving them random.

use super::schedule::HopKeys;
use super::{HOP_MAX, SLOT_BYTES};

/// Slots the exit hop will see below the random padding.
///
/// `intermediates` are ordered entry first. Entry `k` of the result is the
/// slot appended by intermediate `k` as it arrives at the exit, after every
/// later intermediate has decrypted it once more at a sequence one lower.
pub(crate) fn generate(intermediates: &[HopKeys]) -> Vec<[u8; SLOT_BYTES]> {
    let last = HOP_MAX as u32 - 1;
    (0..intermediates.len())
        .map(|k| {
            let mut slot = [0u8; SLOT_BYTES];
            for (depth, hop) in intermediates[k..].iter().enumerate() {
                hop.apply(last - depth as u32, &mut slot);
            }
            slot
        })
        .collect()
}
