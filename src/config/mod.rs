//! Configuration values, codecs and path resolution.
//!
//! # Load pipeline
//! ```text
//! bytes → codec (unmarshal) → set_defaults
//!     → merge over a freshly defaulted base
//!     → environment overrides
//!     → validate
//!     → swap into the store
//! ```
//! The order is fixed: validation assumes every field is populated.

pub mod codec;
pub mod env;
pub mod merge;
pub mod model;
pub mod resolve;

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::validation::Findings;

pub use codec::{codec_for_path, Codec, JsonCodec, YamlCodec};
pub use env::{AppliedOverrides, EnvOverrides};
pub use model::AppConfig;
pub use resolve::resolve_config_path;

/// Capabilities a value needs to be managed by a store.
pub trait Configuration:
    Clone + PartialEq + Default + Serialize + DeserializeOwned + Debug + Send + Sync + 'static
{
    /// Populates every unset field with its default.
    fn set_defaults(&mut self);

    /// Combines two values; fields set in `other` win.
    fn merge(&self, other: &Self) -> Result<Self> {
        merge::merge_serialized(self, other)
    }

    /// Checks the value. Only meaningful after [`Configuration::set_defaults`].
    fn validate(&self) -> Findings;

    /// True when in-process changes must be rejected.
    fn is_read_only(&self) -> bool {
        false
    }

    /// True when `set_defaults` would generate values (e.g. random keys)
    /// that must be written back so they stay stable across restarts.
    fn needs_generated_defaults(&self) -> bool {
        false
    }

    /// Masks secrets for display.
    fn sanitize(&mut self) {}

    /// Replaces masked secrets with the values from `actual`.
    fn desanitize(&mut self, _actual: &Self) {}
}

/// Returns a fully defaulted value.
pub fn defaults<C: Configuration>() -> C {
    let mut config = C::default();
    config.set_defaults();
    config
}
