//! Shared in-memory state behind every backing store.

use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::merge::{from_value, to_value};
use crate::config::{defaults, AppliedOverrides, Codec, Configuration, EnvOverrides};
use crate::error::{Result, StoreError};

/// Identifies a registered change listener.
pub type ListenerId = Uuid;

type Listener<C> = Arc<dyn Fn(&C, &C) + Send + Sync>;

/// The configuration currently in effect plus the overrides baked into it.
#[derive(Debug, Clone)]
pub struct Snapshot<C> {
    pub config: Arc<C>,
    pub overrides: AppliedOverrides,
}

/// Holds the current configuration and serializes every change to it.
///
/// Readers get an `Arc` to an immutable value; writers replace the `Arc`
/// while holding the write lock.
pub struct CommonStore<C: Configuration> {
    /// Backing location, for error context.
    location: PathBuf,
    state: RwLock<Snapshot<C>>,
    codec: Box<dyn Codec>,
    env: EnvOverrides,
    listeners: RwLock<Vec<(ListenerId, Listener<C>)>>,
    updates: watch::Sender<Arc<C>>,
}

impl<C: Configuration> CommonStore<C> {
    /// Creates a store holding a defaulted configuration until the first load.
    pub fn new(location: impl Into<PathBuf>, codec: Box<dyn Codec>, env: EnvOverrides) -> Self {
        let initial = Arc::new(defaults::<C>());
        let (updates, _) = watch::channel(Arc::clone(&initial));

        Self {
            location: location.into(),
            state: RwLock::new(Snapshot {
                config: initial,
                overrides: AppliedOverrides::default(),
            }),
            codec,
            env,
            listeners: RwLock::new(Vec::new()),
            updates,
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, Snapshot<C>> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn write_state(&self) -> RwLockWriteGuard<'_, Snapshot<C>> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the current configuration.
    pub fn get(&self) -> Arc<C> {
        Arc::clone(&self.read_state().config)
    }

    /// Returns the fields currently overridden from the environment.
    pub fn environment_overrides(&self) -> Value {
        self.read_state().overrides.to_tree()
    }

    /// Loads a new configuration from `source`.
    ///
    /// The value is defaulted, merged over a defaulted base, overridden from
    /// the environment and validated before it replaces the current one. On
    /// any of those failures the current configuration is left as it was.
    /// When `needs_save` is set, or defaults had to generate values, `persist`
    /// is called with the new snapshot after the swap. A persist error is
    /// returned, but the new value stays in effect and is published.
    pub fn load<R, P>(&self, mut source: R, needs_save: bool, persist: P) -> Result<()>
    where
        R: Read,
        P: FnOnce(&Snapshot<C>) -> Result<()>,
    {
        let mut bytes = Vec::new();
        source
            .read_to_end(&mut bytes)
            .map_err(|source| StoreError::ReadFailed {
                path: self.location.clone(),
                source,
            })?;

        let mut candidate: C = from_value(self.codec.unmarshal(&bytes)?)?;
        let needs_save = needs_save || candidate.needs_generated_defaults();

        candidate.set_defaults();
        let merged = defaults::<C>().merge(&candidate)?;
        let (config, overrides) = self.apply_overrides(merged)?;
        config.validate().into_store_result()?;

        let snapshot = Snapshot {
            config: Arc::new(config),
            overrides,
        };

        let old = {
            let mut state = self.write_state();
            std::mem::replace(&mut *state, snapshot.clone()).config
        };

        // Observers are told about the swap even if writing it back fails.
        let persisted = if needs_save {
            debug!(path = ?self.location, "Persisting config after load");
            persist(&snapshot)
        } else {
            Ok(())
        };

        if *old != *snapshot.config {
            info!(path = ?self.location, "Config loaded");
            self.notify(&old, &snapshot.config);
        } else {
            debug!(path = ?self.location, "Config reloaded without changes");
        }

        persisted
    }

    /// Replaces the current configuration.
    ///
    /// `authorize` sees the configuration in effect and the candidate; an
    /// error from it aborts the change. Returns the old and new values.
    pub fn set<A>(&self, new_config: C, authorize: A) -> Result<(Arc<C>, Arc<C>)>
    where
        A: FnOnce(&C, &C) -> Result<()>,
    {
        let (old, new) = {
            let mut state = self.write_state();
            authorize(&*state.config, &new_config)?;

            let mut candidate = new_config;
            candidate.set_defaults();
            candidate.desanitize(&*state.config);
            candidate.validate().into_store_result()?;

            let candidate = Arc::new(candidate);
            let old = std::mem::replace(&mut state.config, Arc::clone(&candidate));
            (old, candidate)
        };

        self.notify(&old, &new);
        Ok((old, new))
    }

    /// Serializes a snapshot for the backing file, without environment overrides.
    pub fn marshal(&self, snapshot: &Snapshot<C>) -> Result<Vec<u8>> {
        let mut value = to_value(&*snapshot.config)?;
        snapshot.overrides.revert(&mut value);
        self.codec.marshal(&value)
    }

    /// Serializes a freshly defaulted configuration.
    pub fn marshal_defaults(&self) -> Result<Vec<u8>> {
        self.codec.marshal(&to_value(&defaults::<C>())?)
    }

    /// Registers a callback invoked with `(old, new)` after every change.
    ///
    /// A panicking listener is logged and skipped; the others still run.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&C, &C) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        let listener: Listener<C> = Arc::new(listener);
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, listener));
        id
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Returns a receiver that always holds the latest configuration.
    pub fn subscribe(&self) -> watch::Receiver<Arc<C>> {
        self.updates.subscribe()
    }

    fn apply_overrides(&self, config: C) -> Result<(C, AppliedOverrides)> {
        if self.env.is_empty() {
            return Ok((config, AppliedOverrides::default()));
        }

        let mut value = to_value(&config)?;
        let overrides = self.env.apply(&mut value);
        Ok((from_value(value)?, overrides))
    }

    /// Runs listeners and publishes to subscribers, outside of the state lock.
    fn notify(&self, old: &Arc<C>, new: &Arc<C>) {
        let listeners: Vec<Listener<C>> = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(&**old, &**new)));
            if outcome.is_err() {
                error!(path = ?self.location, "Config listener panicked");
            }
        }

        self.updates.send_replace(Arc::clone(new));
    }
}
