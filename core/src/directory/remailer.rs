// Remailer records as published in the directory

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use x25519_dalek::PublicKey;

use crate::crypto::keys::public_key_hex;
use crate::crypto::KeyId;

/// What a remailer is willing to do with a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Forwards packets to another remailer
    Middle,
    /// Delivers the final payload
    Exit,
}

/// A remailer as known to the directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Remailer {
    /// Unique delivery address
    pub address: String,
    /// Human-friendly short name
    pub shortname: String,
    pub key_id: KeyId,
    #[serde(with = "public_key_hex")]
    pub public_key: PublicKey,
    pub capabilities: BTreeSet<Capability>,
    /// Average latency (minutes)
    pub latency: u32,
    /// Uptime (per-mille)
    pub uptime: u16,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,
}

impl Remailer {
    pub fn is_exit(&self) -> bool {
        self.capabilities.contains(&Capability::Exit)
    }

    /// Reliability as a percentage (0.0 to 100.0)
    pub fn reliability(&self) -> f32 {
        f32::from(self.uptime) / 10.0
    }

    /// Whether the key is valid on `date` (both ends inclusive)
    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        self.valid_from <= date && date <= self.valid_until
    }
}

/// Latency and uptime published by a stats source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemailerStats {
    /// Minutes
    pub latency: u32,
    /// Per-mille
    pub uptime: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::NodeKeys;

    fn sample(capabilities: &[Capability]) -> Remailer {
        let keys = NodeKeys::generate(&mut rand::thread_rng());
        Remailer {
            address: "mix@example.net".to_string(),
            shortname: "mix".to_string(),
            key_id: keys.key_id(),
            public_key: *keys.public_key(),
            capabilities: capabilities.iter().copied().collect(),
            latency: 12,
            uptime: 995,
            valid_from: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            valid_until: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
        }
    }

    #[test]
    fn test_reliability_from_uptime() {
        let remailer = sample(&[Capability::Middle]);
        assert!((remailer.reliability() - 99.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_exit_capability() {
        assert!(!sample(&[Capability::Middle]).is_exit());
        assert!(sample(&[Capability::Middle, Capability::Exit]).is_exit());
    }

    #[test]
    fn test_validity_bounds_inclusive() {
        let remailer = sample(&[Capability::Exit]);
        assert!(remailer.is_valid_on(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()));
        assert!(remailer.is_valid_on(NaiveDate::from_ymd_opt(2026, 12, 31).unwrap()));
        assert!(!remailer.is_valid_on(NaiveDate::from_ymd_opt(2027, 1, 1).unwrap()));
    }

    #[test]
    fn test_remailer_json_roundtrip() {
        let remailer = sample(&[Capability::Exit]);
        let json = serde_json::to_string(&remailer).unwrap();
        assert!(json.contains("\"exit\""));
        assert!(json.contains(&remailer.key_id.to_hex()));

        let parsed: Remailer = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.key_id, remailer.key_id);
        assert_eq!(parsed.public_key.as_bytes(), remailer.public_key.as_bytes());
    }
}
