// Shared, atomically swappable directory snapshot

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::{Directory, RemailerStats};

/// Holds the current directory snapshot.
///
/// Readers take an `Arc` and keep using it for the whole operation; refreshes
/// replace the `Arc` and never touch a snapshot already handed out.
#[derive(Debug)]
pub struct DirectoryHandle {
    current: RwLock<Arc<Directory>>,
}

impl DirectoryHandle {
    pub fn new(directory: Directory) -> Self {
        Self {
            current: RwLock::new(Arc::new(directory)),
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<Directory> {
        Arc::clone(&self.current.read())
    }

    /// Swap in a wholly new directory (source file changed)
    pub fn replace(&self, directory: Directory) {
        let count = directory.len();
        *self.current.write() = Arc::new(directory);
        info!("Directory replaced: {} remailers", count);
    }

    /// Swap in a snapshot with refreshed latency/uptime figures
    pub fn refresh_stats(&self, stats: &HashMap<String, RemailerStats>) {
        let mut guard = self.current.write();
        let next = guard.with_stats(stats);
        *guard = Arc::new(next);
        info!("Directory stats refreshed for {} remailers", stats.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::tests::remailer;
    use crate::directory::RemailerDirectory;

    #[test]
    fn test_snapshot_unaffected_by_refresh() {
        let handle = DirectoryHandle::new(
            Directory::new(vec![remailer("alpha", 10, 900, true)]).unwrap(),
        );
        let before = handle.snapshot();

        let mut stats = HashMap::new();
        stats.insert(
            "alpha@mix.example".to_string(),
            RemailerStats {
                latency: 10,
                uptime: 1000,
            },
        );
        handle.refresh_stats(&stats);

        assert_eq!(before.get("alpha").unwrap().uptime, 900);
        assert_eq!(handle.snapshot().get("alpha").unwrap().uptime, 1000);
    }

    #[test]
    fn test_replace_swaps_whole_directory() {
        let handle = DirectoryHandle::new(
            Directory::new(vec![remailer("alpha", 10, 1000, true)]).unwrap(),
        );
        let old = handle.snapshot();

        handle.replace(Directory::new(vec![remailer("bravo", 10, 1000, true)]).unwrap());

        assert!(old.get("alpha").is_ok());
        assert!(handle.snapshot().get("alpha").is_err());
        assert!(handle.snapshot().get("bravo").is_ok());
    }
}
