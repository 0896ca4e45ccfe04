// Node key management
//
// Every remailer owns an X25519 key pair. The key id (first 16 bytes of the
// Blake3 hash of the public key) is written in clear at the top of each header
// slot so a relay can pick the right secret without trial decryption.

use std::collections::HashMap;
use std::fmt;

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use super::CryptoError;

/// Size of a key id (bytes)
pub const KEY_ID_SIZE: usize = 16;

/// Size of an X25519 key (bytes)
pub const X25519_KEY_SIZE: usize = 32;

/// Identifier of a node's public key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyId(pub [u8; KEY_ID_SIZE]);

impl KeyId {
    /// Derive the key id for a public key
    pub fn for_public_key(public_key: &PublicKey) -> Self {
        let hash = blake3::hash(public_key.as_bytes());
        let mut id = [0u8; KEY_ID_SIZE];
        id.copy_from_slice(&hash.as_bytes()[..KEY_ID_SIZE]);
        KeyId(id)
    }

    /// Parse a hex-encoded key id
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidKey)?;
        let id = <[u8; KEY_ID_SIZE]>::try_from(bytes.as_slice())
            .map_err(|_| CryptoError::InvalidKey)?;
        Ok(KeyId(id))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self.to_hex())
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for KeyId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for KeyId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        KeyId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A node's X25519 key pair
#[derive(Clone)]
pub struct NodeKeys {
    secret: StaticSecret,
    public: PublicKey,
    key_id: KeyId,
}

impl NodeKeys {
    /// Generate a new random key pair
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_secret(StaticSecret::random_from_rng(rng))
    }

    pub fn from_secret(secret: StaticSecret) -> Self {
        let public = PublicKey::from(&secret);
        let key_id = KeyId::for_public_key(&public);
        Self {
            secret,
            public,
            key_id,
        }
    }

    /// Restore a key pair from its hex-encoded secret
    pub fn from_secret_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(hex::decode(s).map_err(|_| CryptoError::InvalidKey)?);
        let secret = <[u8; X25519_KEY_SIZE]>::try_from(bytes.as_slice())
            .map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self::from_secret(StaticSecret::from(secret)))
    }

    /// Hex-encoded secret; wiped on drop
    pub fn secret_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.secret.as_bytes()))
    }

    pub fn secret(&self) -> &StaticSecret {
        &self.secret
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn key_id(&self) -> KeyId {
        self.key_id
    }
}

/// Parse a hex-encoded X25519 public key
pub fn public_key_from_hex(s: &str) -> Result<PublicKey, CryptoError> {
    let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidKey)?;
    let key = <[u8; X25519_KEY_SIZE]>::try_from(bytes.as_slice())
        .map_err(|_| CryptoError::InvalidKey)?;
    Ok(PublicKey::from(key))
}

/// Serde helper storing an X25519 public key as hex
pub mod public_key_hex {
    use serde::{Deserialize, Deserializer, Serializer};
    use x25519_dalek::PublicKey;

    pub fn serialize<S: Serializer>(key: &PublicKey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(key.as_bytes()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PublicKey, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::public_key_from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Lookup of a node's secret keys by key id
pub trait SecretStore: Send + Sync {
    fn get_by_key_id(&self, key_id: &KeyId) -> Option<&StaticSecret>;
}

/// In-memory secret keyring
///
/// A node usually holds its current key plus the previous one during a key
/// rollover, so lookups are by id rather than "the" key.
#[derive(Default, Clone)]
pub struct Keyring {
    secrets: HashMap<KeyId, StaticSecret>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, keys: &NodeKeys) {
        self.secrets.insert(keys.key_id(), keys.secret().clone());
    }

    pub fn remove(&mut self, key_id: &KeyId) -> bool {
        self.secrets.remove(key_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

impl From<&NodeKeys> for Keyring {
    fn from(keys: &NodeKeys) -> Self {
        let mut ring = Keyring::new();
        ring.insert(keys);
        ring
    }
}

impl SecretStore for Keyring {
    fn get_by_key_id(&self, key_id: &KeyId) -> Option<&StaticSecret> {
        self.secrets.get(key_id)
    }
}
