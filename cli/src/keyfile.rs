// Key and directory files
//
// The secret key file holds one hex line. The directory file is a JSON list
// of remailer records, the same shape `keygen` prints. A stats file is a JSON
// object mapping addresses to `{ "latency": minutes, "uptime": per-mille }`.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use mixnode_core::{Capability, Directory, NodeKeys, Remailer, RemailerStats};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

/// Days a freshly generated key is advertised as valid
pub const KEY_VALIDITY_DAYS: i64 = 365;

/// Write a secret key, readable by the owner only
pub fn write_secret_key(path: &Path, keys: &NodeKeys) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to create key file {}", path.display()))?;
    file.write_all(keys.secret_hex().as_bytes())
        .context("Failed to write key file")?;
    file.write_all(b"\n").context("Failed to write key file")?;
    Ok(())
}

pub fn read_secret_key(path: &Path) -> Result<NodeKeys> {
    let contents = zeroize::Zeroizing::new(
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read key file {}", path.display()))?,
    );
    NodeKeys::from_secret_hex(contents.trim()).context("Key file does not hold a valid secret key")
}

/// Directory record advertising `keys`
pub fn record_for(
    keys: &NodeKeys,
    address: &str,
    shortname: &str,
    exit: bool,
    stats: RemailerStats,
    valid_from: NaiveDate,
) -> Remailer {
    let mut capabilities = vec![Capability::Middle];
    if exit {
        capabilities.push(Capability::Exit);
    }
    Remailer {
        address: address.to_string(),
        shortname: shortname.to_string(),
        key_id: keys.key_id(),
        public_key: *keys.public_key(),
        capabilities: capabilities.into_iter().collect(),
        latency: stats.latency,
        uptime: stats.uptime,
        valid_from,
        valid_until: valid_from + Duration::days(KEY_VALIDITY_DAYS),
    }
}

pub fn read_records(path: &Path) -> Result<Vec<Remailer>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read directory file {}", path.display()))?;
    serde_json::from_str(&contents).context("Failed to parse directory file")
}

pub fn load_directory(path: &Path) -> Result<Directory> {
    let records = read_records(path)?;
    let directory = Directory::new(records).context("Invalid directory file")?;
    tracing::info!("Loaded {} remailers from {}", directory.len(), path.display());
    Ok(directory)
}

fn write_records(path: &Path, records: &[Remailer]) -> Result<()> {
    let contents =
        serde_json::to_string_pretty(records).context("Failed to serialize directory")?;
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write directory file {}", path.display()))?;
    Ok(())
}

/// Add `record` to the directory file, replacing any record with the same
/// address or shortname
pub fn publish_record(path: &Path, record: Remailer) -> Result<()> {
    let mut records = if path.exists() {
        read_records(path)?
    } else {
        Vec::new()
    };
    records.retain(|r| r.address != record.address && r.shortname != record.shortname);
    records.push(record);
    write_records(path, &records)
}

pub fn read_stats(path: &Path) -> Result<HashMap<String, RemailerStats>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read stats file {}", path.display()))?;
    serde_json::from_str(&contents).context("Failed to parse stats file")
}

/// Apply measured latency/uptime to the directory file. Returns how many
/// records were updated.
pub fn import_stats(directory_path: &Path, stats: &HashMap<String, RemailerStats>) -> Result<usize> {
    let directory = load_directory(directory_path)?;
    let updated = directory.iter().filter(|r| stats.contains_key(&r.address)).count();
    for address in stats.keys() {
        if !directory.iter().any(|r| &r.address == address) {
            tracing::warn!("Ignoring stats for unknown remailer {}", address);
        }
    }

    let refreshed = directory.with_stats(stats);
    let records: Vec<Remailer> = refreshed.iter().cloned().collect();
    write_records(directory_path, &records)?;
    tracing::info!("Updated stats for {} remailers", updated);
    Ok(updated)
}
