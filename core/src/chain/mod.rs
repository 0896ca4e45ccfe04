// Chain Selection — ordered remailer paths for one message copy

mod selector;

pub use selector::ChainSelector;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::directory::DirectoryError;
use crate::packet::HOP_MAX;

/// Token requesting a randomly selected hop
pub const WILDCARD: &str = "*";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChainError {
    #[error("Chain must contain at least one hop")]
    EmptyChain,
    #[error("Too many hops: {0} (max {max})", max = HOP_MAX)]
    ChainTooLong(usize),
    #[error("Final hop is not an exit remailer: {0}")]
    NotAnExit(String),
    #[error("No candidate remailers for hop {position}")]
    NoCandidates { position: usize },
    #[error("Invalid chain configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// One element of a requested chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HopRef {
    /// Any remailer satisfying the selection criteria
    Wildcard,
    /// A specific remailer by address or shortname
    Named(String),
}

impl FromStr for HopRef {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "" => Err(ChainError::EmptyChain),
            WILDCARD => Ok(HopRef::Wildcard),
            name => Ok(HopRef::Named(name.to_string())),
        }
    }
}

impl fmt::Display for HopRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HopRef::Wildcard => f.write_str(WILDCARD),
            HopRef::Named(name) => f.write_str(name),
        }
    }
}

/// Parse a comma-separated hop list such as `*,alpha,*`
pub fn parse_hops(hops: &str) -> Result<Vec<HopRef>, ChainError> {
    hops.split(',').map(HopRef::from_str).collect()
}

/// Ordered remailer addresses, entry first and exit last.
///
/// Always holds between 1 and `HOP_MAX` addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    addresses: Vec<String>,
}

impl Chain {
    pub fn new(addresses: Vec<String>) -> Result<Self, ChainError> {
        if addresses.is_empty() {
            return Err(ChainError::EmptyChain);
        }
        if addresses.len() > HOP_MAX {
            return Err(ChainError::ChainTooLong(addresses.len()));
        }
        Ok(Self { addresses })
    }

    pub fn hop_count(&self) -> usize {
        self.addresses.len()
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// First hop: where the encoded packet is sent
    pub fn entry(&self) -> &str {
        &self.addresses[0]
    }

    /// Last hop: the exit remailer
    pub fn exit(&self) -> &str {
        &self.addresses[self.addresses.len() - 1]
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.addresses.join(","))
    }
}

/// Selection criteria for wildcard hops
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Minimum separation between repeated remailers
    pub distance: usize,
    /// Latency band (minutes)
    pub min_latency: u32,
    pub max_latency: u32,
    /// Reliability floor for middle hops (percent)
    pub min_reliability: f32,
    /// Reliability floor for the exit hop (percent)
    pub min_exit_reliability: f32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            distance: 2,
            min_latency: 2,
            max_latency: 60,
            min_reliability: 98.0,
            min_exit_reliability: 98.0,
        }
    }
}

impl ChainConfig {
    /// Validate chain configuration
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.min_latency > self.max_latency {
            return Err(ChainError::InvalidConfig(format!(
                "min_latency {} exceeds max_latency {}",
                self.min_latency, self.max_latency
            )));
        }
        for (name, value) in [
            ("min_reliability", self.min_reliability),
            ("min_exit_reliability", self.min_exit_reliability),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ChainError::InvalidConfig(format!(
                    "{} must be within 0..=100, got {}",
                    name, value
                )));
            }
        }
        if self.distance > HOP_MAX {
            return Err(ChainError::InvalidConfig(format!(
                "distance {} exceeds {}",
                self.distance, HOP_MAX
            )));
        }
        Ok(())
    }
}
