// Sealed header slots: X25519 ECDH + XChaCha20-Poly1305
//
// Slot layout (256 bytes):
//   recipient key id [16] ‖ ephemeral public key [32] ‖ nonce [24]
//   ‖ sealed box [176] ‖ random pad [8]
//
// Flow:
// 1. Generate ephemeral X25519 keypair
// 2. ECDH: ephemeral_secret × recipient_public → shared_secret
// 3. KDF: Blake3::derive_key(shared_secret) → symmetric_key
// 4. Encrypt: XChaCha20-Poly1305(symmetric_key, random_nonce, plaintext)
//    with key id ‖ ephemeral public key bound as AAD

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::{CryptoRng, RngCore};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroize;

use super::keys::{KeyId, KEY_ID_SIZE, X25519_KEY_SIZE};
use super::CryptoError;

/// KDF context string for slot keys.
/// Changing this breaks compatibility with every packet in flight.
const KDF_CONTEXT: &str = "mixnode v2 header slot 2026-10-19";

/// Size of a sealed header slot (bytes)
pub const SLOT_SIZE: usize = 256;

/// Size of the plaintext carried by one slot (bytes)
pub const SLOT_PLAINTEXT_SIZE: usize = 160;

/// Size of XChaCha20-Poly1305 nonce (bytes)
const XCHACHA_NONCE_SIZE: usize = 24;

/// Size of Poly1305 authentication tag (bytes)
const POLY1305_TAG_SIZE: usize = 16;

/// Size of the sealed box (plaintext + tag)
pub const SEALED_BOX_SIZE: usize = SLOT_PLAINTEXT_SIZE + POLY1305_TAG_SIZE;

const EPK_OFFSET: usize = KEY_ID_SIZE;
const NONCE_OFFSET: usize = EPK_OFFSET + X25519_KEY_SIZE;
const BOX_OFFSET: usize = NONCE_OFFSET + XCHACHA_NONCE_SIZE;
const PAD_OFFSET: usize = BOX_OFFSET + SEALED_BOX_SIZE;

const _: () = assert!(PAD_OFFSET + 8 == SLOT_SIZE);

fn derive_key(shared_secret: &[u8]) -> [u8; 32] {
    blake3::derive_key(KDF_CONTEXT, shared_secret)
}

fn associated_data(slot: &[u8; SLOT_SIZE]) -> &[u8] {
    &slot[..NONCE_OFFSET]
}

/// Seal a slot plaintext for one recipient.
///
/// A fresh ephemeral key and nonce are drawn from `rng` for every call.
pub fn seal<R: RngCore + CryptoRng>(
    recipient_key_id: &KeyId,
    recipient_public_key: &PublicKey,
    plaintext: &[u8; SLOT_PLAINTEXT_SIZE],
    rng: &mut R,
) -> Result<[u8; SLOT_SIZE], CryptoError> {
    let ephemeral_secret = EphemeralSecret::random_from_rng(&mut *rng);
    let ephemeral_public = PublicKey::from(&ephemeral_secret);
    let shared_secret = ephemeral_secret.diffie_hellman(recipient_public_key);

    let mut slot = [0u8; SLOT_SIZE];
    slot[..EPK_OFFSET].copy_from_slice(&recipient_key_id.0);
    slot[EPK_OFFSET..NONCE_OFFSET].copy_from_slice(ephemeral_public.as_bytes());
    rng.fill_bytes(&mut slot[NONCE_OFFSET..BOX_OFFSET]);
    rng.fill_bytes(&mut slot[PAD_OFFSET..]);

    let mut symmetric_key = derive_key(shared_secret.as_bytes());
    let cipher = XChaCha20Poly1305::new_from_slice(&symmetric_key)
        .map_err(|_| CryptoError::EncryptionFailed)?;
    symmetric_key.zeroize();

    let nonce = XNonce::from_slice(&slot[NONCE_OFFSET..BOX_OFFSET]);
    let sealed = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: associated_data(&slot),
            },
        )
        .map_err(|_| CryptoError::EncryptionFailed)?;

    if sealed.len() != SEALED_BOX_SIZE {
        return Err(CryptoError::EncryptionFailed);
    }
    slot[BOX_OFFSET..PAD_OFFSET].copy_from_slice(&sealed);

    Ok(slot)
}

/// Recipient key id written in clear at the top of a slot
pub fn slot_key_id(slot: &[u8; SLOT_SIZE]) -> KeyId {
    let mut id = [0u8; KEY_ID_SIZE];
    id.copy_from_slice(&slot[..KEY_ID_SIZE]);
    KeyId(id)
}

/// Open a sealed slot with the recipient's secret key.
///
/// Any tampering with the key id, ephemeral key, nonce or sealed box fails
/// authentication. The trailing random pad is not covered.
pub fn open(
    slot: &[u8; SLOT_SIZE],
    recipient_secret: &StaticSecret,
) -> Result<[u8; SLOT_PLAINTEXT_SIZE], CryptoError> {
    let mut epk = [0u8; X25519_KEY_SIZE];
    epk.copy_from_slice(&slot[EPK_OFFSET..NONCE_OFFSET]);
    let shared_secret = recipient_secret.diffie_hellman(&PublicKey::from(epk));

    let mut symmetric_key = derive_key(shared_secret.as_bytes());
    let cipher = XChaCha20Poly1305::new_from_slice(&symmetric_key)
        .map_err(|_| CryptoError::DecryptionFailed)?;
    symmetric_key.zeroize();

    let nonce = XNonce::from_slice(&slot[NONCE_OFFSET..BOX_OFFSET]);
    let mut opened = cipher
        .decrypt(
            nonce,
            Payload {
                msg: &slot[BOX_OFFSET..PAD_OFFSET],
                aad: associated_data(slot),
            },
        )
        .map_err(|_| CryptoError::DecryptionFailed)?;

    let plaintext = <[u8; SLOT_PLAINTEXT_SIZE]>::try_from(opened.as_slice())
        .map_err(|_| CryptoError::DecryptionFailed);
    opened.zeroize();
    plaintext
}
