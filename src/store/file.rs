//! Configuration store backed by a single file.

use std::fmt;
use std::fs::File;
use std::io::{Cursor, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::common::{CommonStore, ListenerId, Snapshot};
use crate::config::{codec_for_path, resolve_config_path, AppConfig, Codec, Configuration, EnvOverrides};
use crate::error::{Result, StoreError};
use crate::watcher::{ConfigFileWatcher, DEFAULT_DEBOUNCE};

/// Tunables for a [`FileStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Quiet period before an external change triggers a reload.
    pub debounce: Duration,
    /// Overrides applied on every load and never persisted.
    pub env: EnvOverrides,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            env: EnvOverrides::default(),
        }
    }
}

impl StoreOptions {
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Reads overrides from `{prefix}__SECTION__FIELD` environment variables.
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env = EnvOverrides::from_env(prefix);
        self
    }

    pub fn with_env(mut self, env: EnvOverrides) -> Self {
        self.env = env;
        self
    }
}

/// A configuration store backed by a file such as `config/config.json`.
///
/// If watching is enabled, external changes to the file force a reload.
/// The store's own writes stop the watcher first and restart it afterwards,
/// so they never trigger a reload.
pub struct FileStore<C: Configuration = AppConfig> {
    inner: Arc<Inner<C>>,
}

struct Inner<C: Configuration> {
    common: CommonStore<C>,
    path: PathBuf,
    watch: bool,
    debounce: Duration,
    watcher: Mutex<Option<ConfigFileWatcher>>,
    closed: AtomicBool,
    /// Handed to watcher callbacks so they never keep the store alive.
    this: Weak<Inner<C>>,
}

impl<C: Configuration> FileStore<C> {
    /// Creates a store backed by `path`, loading it immediately.
    ///
    /// A missing file is created with defaults. If `watch` is true, external
    /// changes reload the configuration; failing to start the watcher is
    /// logged and the store simply does not watch.
    pub fn new(path: impl AsRef<Path>, watch: bool) -> Result<Self> {
        Self::with_options(path, watch, StoreOptions::default())
    }

    pub fn with_options(path: impl AsRef<Path>, watch: bool, options: StoreOptions) -> Result<Self> {
        let resolved = resolve_config_path(path.as_ref())?;
        let codec = codec_for_path(&resolved);
        Self::open(resolved, watch, options, codec)
    }

    /// Like [`FileStore::with_options`], with an explicit codec.
    pub fn with_codec(
        path: impl AsRef<Path>,
        watch: bool,
        options: StoreOptions,
        codec: Box<dyn Codec>,
    ) -> Result<Self> {
        Self::open(resolve_config_path(path.as_ref())?, watch, options, codec)
    }

    /// Builds the store around an already resolved path.
    fn open(path: PathBuf, watch: bool, options: StoreOptions, codec: Box<dyn Codec>) -> Result<Self> {
        let inner = Arc::new_cyclic(|this| Inner {
            common: CommonStore::new(path.clone(), codec, options.env),
            path,
            watch,
            debounce: options.debounce,
            watcher: Mutex::new(None),
            closed: AtomicBool::new(false),
            this: this.clone(),
        });

        inner.load()?;

        if watch {
            if let Err(e) = inner.start_watcher() {
                error!(path = ?inner.path, error = %e, "Failed to start config watcher");
            }
        }

        info!(path = ?inner.path, watch, "Config store opened");
        Ok(Self { inner })
    }

    /// Returns the current configuration.
    pub fn get(&self) -> Arc<C> {
        self.inner.common.get()
    }

    /// Replaces the configuration in memory without touching the file.
    ///
    /// Rejected with [`StoreError::ReadOnly`] while the configuration in
    /// effect has clustering and read-only config both enabled.
    pub fn set(&self, config: C) -> Result<(Arc<C>, Arc<C>)> {
        self.inner.common.set(config, |current, _| {
            if current.is_read_only() {
                warn!("Rejected config change: configuration is read-only");
                return Err(StoreError::ReadOnly);
            }
            Ok(())
        })
    }

    /// Reloads the configuration from the file.
    pub fn load(&self) -> Result<()> {
        self.inner.load()
    }

    /// Writes the current configuration to the file.
    pub fn save(&self) -> Result<()> {
        let state = self.inner.common.write_state();
        self.inner.persist(&state)
    }

    /// Stops watching and releases resources. Later calls are no-ops.
    pub fn close(&self) -> Result<()> {
        let _state = self.inner.common.write_state();
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.inner.stop_watcher();
        info!(path = ?self.inner.path, "Config store closed");
        Ok(())
    }

    /// Returns a URI naming the backing file.
    pub fn identity(&self) -> String {
        format!("file://{}", self.inner.path.display())
    }

    /// Returns the resolved, absolute path of the backing file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Returns true while a watcher is running.
    pub fn is_watching(&self) -> bool {
        self.inner.lock_watcher().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Registers a callback invoked with `(old, new)` after every change.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&C, &C) + Send + Sync + 'static,
    {
        self.inner.common.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.common.remove_listener(id)
    }

    /// Returns a receiver that always holds the latest configuration.
    pub fn subscribe(&self) -> watch::Receiver<Arc<C>> {
        self.inner.common.subscribe()
    }

    /// Returns the fields currently overridden from the environment.
    pub fn environment_overrides(&self) -> Value {
        self.inner.common.environment_overrides()
    }
}

impl<C: Configuration> fmt::Display for FileStore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity())
    }
}

impl<C: Configuration> fmt::Debug for FileStore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.inner.path)
            .field("watch", &self.inner.watch)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<C: Configuration> Inner<C> {
    fn load(&self) -> Result<()> {
        let (source, needs_save): (Box<dyn Read>, bool) = match File::open(&self.path) {
            Ok(file) => (Box::new(file), false),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = ?self.path, "Config file missing, using defaults");
                (Box::new(Cursor::new(self.common.marshal_defaults()?)), true)
            }
            Err(source) => {
                return Err(StoreError::ReadFailed {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        self.common
            .load(source, needs_save, |snapshot| self.persist(snapshot))
    }

    /// Writes `snapshot` to the file, pausing the watcher around the write.
    fn persist(&self, snapshot: &Snapshot<C>) -> Result<()> {
        self.stop_watcher();

        let result = self
            .common
            .marshal(snapshot)
            .and_then(|bytes| write_atomic(&self.path, &bytes));

        if self.watch {
            if let Err(e) = self.start_watcher() {
                error!(path = ?self.path, error = %e, "Failed to restart config watcher");
            }
        }

        if result.is_ok() {
            debug!(path = ?self.path, "Config persisted");
        }
        result
    }

    fn lock_watcher(&self) -> MutexGuard<'_, Option<ConfigFileWatcher>> {
        self.watcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts watching unless a watcher is already running or the store is
    /// closed. `closed` is checked under the slot lock; `close()` sets it
    /// before taking that lock, so no watcher outlives a finished close.
    fn start_watcher(&self) -> Result<()> {
        let mut slot = self.lock_watcher();
        if slot.is_some() || self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }

        let this = self.this.clone();
        let watcher = ConfigFileWatcher::start(&self.path, self.debounce, move || {
            let Some(inner) = this.upgrade() else {
                return;
            };
            if inner.closed.load(Ordering::SeqCst) {
                return;
            }
            if let Err(e) = inner.load() {
                error!(path = ?inner.path, error = %e, "Failed to reload config file on change");
            }
        })?;

        *slot = Some(watcher);
        Ok(())
    }

    fn stop_watcher(&self) {
        // Taken out of the slot first so the mutex is not held while closing.
        let watcher = self.lock_watcher().take();
        if let Some(mut watcher) = watcher {
            watcher.close();
        }
    }
}

/// Writes `bytes` to a temporary file next to `path`, then renames it into
/// place, so readers see either the old or the new content.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let write_failed = |source: std::io::Error| StoreError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = tempfile::Builder::new()
        .prefix(".confstore-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(write_failed)?;

    file.write_all(bytes).map_err(write_failed)?;
    file.as_file().sync_all().map_err(write_failed)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))
            .map_err(write_failed)?;
    }

    file.persist(path).map_err(|e| write_failed(e.error))?;
    Ok(())
}
