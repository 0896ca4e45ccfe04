// Cryptography module — slot sealing, bulk stream cipher, node keys

pub mod keys;
pub mod sealed;
pub mod stream;

use thiserror::Error;

pub use keys::{public_key_from_hex, KeyId, Keyring, NodeKeys, SecretStore, KEY_ID_SIZE};
pub use sealed::{open, seal, slot_key_id, SLOT_PLAINTEXT_SIZE, SLOT_SIZE};
pub use stream::{apply_keystream, STREAM_IV_SIZE, STREAM_KEY_SIZE};

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key material")]
    InvalidKey,
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
}
