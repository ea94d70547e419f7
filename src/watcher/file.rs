//! Watcher for a single configuration file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, info};

use super::digest::ContentTracker;
use crate::error::{Result, StoreError};

/// Watches one file and calls back when its content changes.
///
/// The parent directory is watched rather than the file itself so that
/// editors which save by writing a new file and renaming it over the old
/// one are still observed. Events are debounced and then compared against
/// the last seen content digest, so bursts and touch-only events collapse
/// into at most one callback.
pub struct ConfigFileWatcher {
    /// File being watched.
    path: PathBuf,
    /// Underlying OS watcher; `None` once closed.
    watcher: Option<RecommendedWatcher>,
    /// Tells the event thread to stop before invoking the callback.
    cancelled: Arc<AtomicBool>,
}

impl ConfigFileWatcher {
    /// Starts watching `path`, calling `on_change` from a background thread.
    pub fn start<F>(path: &Path, debounce: Duration, on_change: F) -> Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let unavailable = |source: notify::Error| StoreError::WatchUnavailable {
            path: path.to_path_buf(),
            source,
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| unavailable(notify::Error::generic("path has no file name")))?;
        let watch_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let tracker = ContentTracker::new(path);
        let (tx, rx) = mpsc::channel::<()>();

        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    if is_relevant(&event, &file_name) {
                        debug!(kind = ?event.kind, "Config file event");
                        let _ = tx.send(());
                    }
                }
                Err(e) => error!(error = %e, "Config watch error"),
            },
            Config::default(),
        )
        .map_err(unavailable)?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(unavailable)?;

        let cancelled = Arc::new(AtomicBool::new(false));
        let thread_cancelled = Arc::clone(&cancelled);
        let thread_path = path.to_path_buf();

        thread::Builder::new()
            .name("config-watcher".to_string())
            .spawn(move || {
                run_events(rx, tracker, debounce, &thread_cancelled, on_change);
                debug!(path = ?thread_path, "Config watcher thread exited");
            })
            .map_err(|e| unavailable(notify::Error::io(e)))?;

        info!(path = ?path, "Config watcher started");

        Ok(Self {
            path: path.to_path_buf(),
            watcher: Some(watcher),
            cancelled,
        })
    }

    /// Returns the watched file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns false once the watcher has been closed.
    pub fn is_active(&self) -> bool {
        self.watcher.is_some()
    }

    /// Stops watching. Safe to call more than once, and from within the callback.
    pub fn close(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            self.cancelled.store(true, Ordering::SeqCst);
            // Dropping the OS watcher drops the event sender, which ends the thread.
            drop(watcher);
            debug!(path = ?self.path, "Config watcher stopped");
        }
    }
}

impl Drop for ConfigFileWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Checks whether an event is a content change of the watched file.
fn is_relevant(event: &Event, file_name: &OsString) -> bool {
    let kind_matches = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_));
    kind_matches
        && event
            .paths
            .iter()
            .any(|p| p.file_name().map(|n| n == file_name.as_os_str()).unwrap_or(false))
}

/// Event loop: wait for a change, let the burst settle, then fire once.
fn run_events<F: Fn()>(
    rx: Receiver<()>,
    mut tracker: ContentTracker,
    debounce: Duration,
    cancelled: &AtomicBool,
    on_change: F,
) {
    while rx.recv().is_ok() {
        loop {
            match rx.recv_timeout(debounce) {
                Ok(()) => continue,
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }

        if cancelled.load(Ordering::SeqCst) {
            return;
        }

        if !tracker.changed() {
            debug!("Config file content unchanged, skipping reload");
            continue;
        }

        info!("Config file changed, reloading");
        on_change();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    const DEBOUNCE: Duration = Duration::from_millis(50);

    fn wait_for(count: &AtomicUsize, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if count.load(Ordering::SeqCst) >= expected {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    fn counting_watcher(path: &Path) -> (ConfigFileWatcher, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let callback_count = Arc::clone(&count);
        let watcher = ConfigFileWatcher::start(path, DEBOUNCE, move || {
            callback_count.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        (watcher, count)
    }

    #[test]
    fn fires_on_external_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{}").unwrap();

        let (_watcher, count) = counting_watcher(&path);
        thread::sleep(DEBOUNCE);
        std::fs::write(&path, "{\"changed\": true}").unwrap();

        assert!(wait_for(&count, 1));
    }

    #[test]
    fn burst_of_writes_coalesces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{}").unwrap();

        let (_watcher, count) = counting_watcher(&path);
        thread::sleep(DEBOUNCE);
        for i in 0..5 {
            std::fs::write(&path, format!("{{\"n\": {i}}}")).unwrap();
        }

        assert!(wait_for(&count, 1));
        thread::sleep(DEBOUNCE * 6);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ignores_sibling_files_and_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{}").unwrap();

        let (_watcher, count) = counting_watcher(&path);
        thread::sleep(DEBOUNCE);
        std::fs::write(dir.path().join("other.json"), "{\"x\": 1}").unwrap();
        std::fs::write(&path, "{}").unwrap();

        thread::sleep(DEBOUNCE * 6);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn close_is_idempotent_and_silences_callbacks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{}").unwrap();

        let (mut watcher, count) = counting_watcher(&path);
        watcher.close();
        watcher.close();
        assert!(!watcher.is_active());

        std::fs::write(&path, "{\"changed\": true}").unwrap();
        thread::sleep(DEBOUNCE * 6);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope/config.json");

        let result = ConfigFileWatcher::start(&path, DEBOUNCE, || {});
        assert!(matches!(result, Err(StoreError::WatchUnavailable { .. })));
    }
}
