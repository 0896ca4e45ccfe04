// Remailer Directory — lookups and candidate filtering
//
// A `Directory` is an immutable snapshot. Refreshes build a new snapshot and
// swap it in through `DirectoryHandle`, so a chain build never sees a
// half-updated directory.

mod handle;
mod remailer;

pub use handle::DirectoryHandle;
pub use remailer::{Capability, Remailer, RemailerStats};

use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, Utc};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Remailer not found: {0}")]
    NotFound(String),
    #[error("Remailer key expired or not yet valid: {0}")]
    Expired(String),
    #[error("Duplicate remailer address: {0}")]
    DuplicateAddress(String),
    #[error("Duplicate remailer shortname: {0}")]
    DuplicateShortname(String),
    #[error("Remailer shortname is another remailer's address: {0}")]
    ShortnameIsAddress(String),
}

/// Directory operations consumed by chain selection and encoding
#[cfg_attr(test, mockall::automock)]
pub trait RemailerDirectory: Send + Sync {
    /// Resolve an address or shortname to a usable remailer
    fn get(&self, reference: &str) -> Result<Remailer, DirectoryError>;

    /// Addresses within the latency band and above the reliability floor,
    /// optionally restricted to exit-capable remailers
    fn candidates(
        &self,
        min_latency: u32,
        max_latency: u32,
        min_reliability: f32,
        require_exit: bool,
    ) -> Vec<String>;
}

/// Immutable snapshot of known remailers
#[derive(Debug, Clone)]
pub struct Directory {
    remailers: BTreeMap<String, Remailer>,
    shortnames: HashMap<String, String>,
    as_of: NaiveDate,
}

impl Directory {
    /// Build a snapshot valid as of today (UTC)
    pub fn new(remailers: impl IntoIterator<Item = Remailer>) -> Result<Self, DirectoryError> {
        Self::as_of(remailers, Utc::now().date_naive())
    }

    /// Build a snapshot that judges key validity against `date`
    pub fn as_of(
        remailers: impl IntoIterator<Item = Remailer>,
        date: NaiveDate,
    ) -> Result<Self, DirectoryError> {
        let mut by_address = BTreeMap::new();
        let mut shortnames = HashMap::new();

        for remailer in remailers {
            if shortnames
                .insert(remailer.shortname.clone(), remailer.address.clone())
                .is_some()
            {
                return Err(DirectoryError::DuplicateShortname(remailer.shortname));
            }
            if by_address.contains_key(&remailer.address) {
                return Err(DirectoryError::DuplicateAddress(remailer.address));
            }
            by_address.insert(remailer.address.clone(), remailer);
        }

        // A reference must resolve to one record whichever map it hits
        for (shortname, address) in &shortnames {
            if shortname != address && by_address.contains_key(shortname) {
                return Err(DirectoryError::ShortnameIsAddress(shortname.clone()));
            }
        }

        Ok(Self {
            remailers: by_address,
            shortnames,
            as_of: date,
        })
    }

    pub fn len(&self) -> usize {
        self.remailers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remailers.is_empty()
    }

    /// All records, ordered by address
    pub fn iter(&self) -> impl Iterator<Item = &Remailer> {
        self.remailers.values()
    }

    /// New snapshot with latency/uptime replaced for every address in `stats`.
    /// Addresses without stats keep their previous values.
    pub fn with_stats(&self, stats: &HashMap<String, RemailerStats>) -> Directory {
        let mut next = self.clone();
        for (address, remailer) in next.remailers.iter_mut() {
            if let Some(s) = stats.get(address) {
                remailer.latency = s.latency;
                remailer.uptime = s.uptime;
            }
        }
        next
    }

    fn lookup(&self, reference: &str) -> Option<&Remailer> {
        self.remailers.get(reference).or_else(|| {
            self.shortnames
                .get(reference)
                .and_then(|address| self.remailers.get(address))
        })
    }
}

impl RemailerDirectory for Directory {
    fn get(&self, reference: &str) -> Result<Remailer, DirectoryError> {
        let remailer = self
            .lookup(reference)
            .ok_or_else(|| DirectoryError::NotFound(reference.to_string()))?;
        if !remailer.is_valid_on(self.as_of) {
            return Err(DirectoryError::Expired(remailer.address.clone()));
        }
        Ok(remailer.clone())
    }

    fn candidates(
        &self,
        min_latency: u32,
        max_latency: u32,
        min_reliability: f32,
        require_exit: bool,
    ) -> Vec<String> {
        self.remailers
            .values()
            .filter(|r| r.is_valid_on(self.as_of))
            .filter(|r| r.latency >= min_latency && r.latency <= max_latency)
            .filter(|r| r.reliability() >= min_reliability)
            .filter(|r| !require_exit || r.is_exit())
            .map(|r| r.address.clone())
            .collect()
    }
}
