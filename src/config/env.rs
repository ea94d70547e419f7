//! Environment variable overrides.
//!
//! `CONFSTORE__SQL__DATA_SOURCE=...` overrides `sql.data_source` when the
//! prefix is `CONFSTORE`. Overrides win over the file but are never written
//! back to it.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::merge::{coerce_scalar, get_path, remove_path, set_path};

/// Separator between the prefix and each path segment.
const SEPARATOR: &str = "__";

/// A set of overrides read from the environment.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    vars: Vec<(Vec<String>, String)>,
}

/// One override that was applied to a configuration tree.
#[derive(Debug, Clone, PartialEq)]
struct AppliedOverride {
    path: Vec<String>,
    original: Option<Value>,
    value: Value,
}

/// The overrides applied during the last load, with the values they replaced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppliedOverrides {
    entries: Vec<AppliedOverride>,
}

impl EnvOverrides {
    /// Reads every variable starting with `{prefix}__` from the process environment.
    pub fn from_env(prefix: &str) -> Self {
        Self::from_vars(prefix, std::env::vars())
    }

    /// Builds overrides from an explicit list of variables.
    pub fn from_vars<I, K, V>(prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let lead = format!("{}{}", prefix.to_uppercase(), SEPARATOR);
        let mut parsed: Vec<(Vec<String>, String)> = vars
            .into_iter()
            .filter_map(|(key, value)| {
                let rest = key.as_ref().strip_prefix(&lead)?;
                let path: Vec<String> = rest
                    .split(SEPARATOR)
                    .map(str::to_lowercase)
                    .collect();
                if path.iter().any(String::is_empty) {
                    warn!(key = key.as_ref(), "Ignoring malformed config override");
                    return None;
                }
                Some((path, value.into()))
            })
            .collect();

        parsed.sort_by(|a, b| a.0.cmp(&b.0));
        Self { vars: parsed }
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Applies the overrides to a serialized configuration.
    pub fn apply(&self, value: &mut Value) -> AppliedOverrides {
        let mut entries = Vec::with_capacity(self.vars.len());

        for (path, raw) in &self.vars {
            let original = get_path(value, path).cloned();
            let new_value = coerce_scalar(raw, original.as_ref());

            if !set_path(value, path, new_value.clone()) {
                warn!(path = %path.join("."), "Config override does not address a field");
                continue;
            }

            debug!(path = %path.join("."), "Applied config override");
            entries.push(AppliedOverride {
                path: path.clone(),
                original,
                value: new_value,
            });
        }

        AppliedOverrides { entries }
    }
}

impl AppliedOverrides {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Restores the values the overrides replaced, so they can be persisted.
    pub fn revert(&self, value: &mut Value) {
        for entry in self.entries.iter().rev() {
            match &entry.original {
                Some(original) => {
                    set_path(value, &entry.path, original.clone());
                }
                None => {
                    remove_path(value, &entry.path);
                }
            }
        }
    }

    /// The overridden fields as a nested tree.
    pub fn to_tree(&self) -> Value {
        let mut tree = Value::Object(Map::new());
        for entry in &self.entries {
            set_path(&mut tree, &entry.path, entry.value.clone());
        }
        tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_prefixed_variables_are_used() {
        let overrides = EnvOverrides::from_vars(
            "confstore",
            [
                ("CONFSTORE__LOG__CONSOLE_LEVEL", "debug"),
                ("OTHER__LOG__CONSOLE_LEVEL", "error"),
                ("CONFSTORE_LOG", "ignored"),
            ],
        );

        let mut value = json!({"log": {"console_level": "info"}});
        let applied = overrides.apply(&mut value);

        assert_eq!(value, json!({"log": {"console_level": "debug"}}));
        assert_eq!(applied.to_tree(), json!({"log": {"console_level": "debug"}}));
    }

    #[test]
    fn malformed_keys_are_skipped() {
        let overrides = EnvOverrides::from_vars("APP", [("APP__LOG____LEVEL", "debug")]);
        assert!(overrides.is_empty());
    }

    #[test]
    fn revert_restores_and_removes() {
        let overrides = EnvOverrides::from_vars(
            "APP",
            [
                ("APP__SQL__MAX_OPEN_CONNS", "10"),
                ("APP__SERVICE__SITE_URL", "https://override.example"),
            ],
        );

        let original = json!({"sql": {"max_open_conns": 300}, "service": {}});
        let mut value = original.clone();
        let applied = overrides.apply(&mut value);

        assert_eq!(value["sql"]["max_open_conns"], json!(10));
        assert_eq!(value["service"]["site_url"], json!("https://override.example"));

        applied.revert(&mut value);
        assert_eq!(value, original);
    }

    #[test]
    fn override_into_scalar_is_not_applied() {
        let overrides = EnvOverrides::from_vars("APP", [("APP__SQL__DRIVER_NAME", "mysql")]);
        let mut value = json!({"sql": "not-an-object"});
        let applied = overrides.apply(&mut value);

        assert!(applied.is_empty());
        assert_eq!(value, json!({"sql": "not-an-object"}));
    }
}
