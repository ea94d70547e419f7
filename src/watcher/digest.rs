//! Content digests used to drop redundant change notifications.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

/// Remembers the last observed content of a file by its SHA-256.
pub struct ContentTracker {
    /// File being tracked.
    path: PathBuf,
    /// Digest of the last observed content, if the file was readable.
    last_digest: Option<String>,
}

impl ContentTracker {
    /// Creates a tracker seeded with the file's current content.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            last_digest: read_digest(path),
        }
    }

    /// Returns true if the content differs from the last observation, and
    /// records the new content. An unreadable file is never reported as changed.
    pub fn changed(&mut self) -> bool {
        let Some(current) = read_digest(&self.path) else {
            debug!(path = ?self.path, "Config file unreadable, ignoring event");
            return false;
        };

        if self.last_digest.as_deref() == Some(current.as_str()) {
            return false;
        }

        self.last_digest = Some(current);
        true
    }
}

fn read_digest(path: &Path) -> Option<String> {
    std::fs::read(path).ok().map(|bytes| compute_hash(&bytes))
}

/// Computes the SHA256 hash of the given content.
fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_only_real_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{}").unwrap();

        let mut tracker = ContentTracker::new(&path);
        assert!(!tracker.changed());

        std::fs::write(&path, "{\"a\": 1}").unwrap();
        assert!(tracker.changed());
        assert!(!tracker.changed());

        std::fs::write(&path, "{}").unwrap();
        assert!(tracker.changed());
    }

    #[test]
    fn missing_file_is_not_a_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut tracker = ContentTracker::new(&path);
        assert!(!tracker.changed());

        std::fs::write(&path, "{}").unwrap();
        assert!(tracker.changed());
    }
}
