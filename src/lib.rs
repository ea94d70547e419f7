//! Confstore - a file-backed, hot-reloadable configuration store.
//!
//! A [`FileStore`] loads a JSON or YAML file, fills in defaults, applies
//! environment overrides and validates the result before exposing it. It can
//! watch the file and reload on external edits, notifying listeners and
//! subscribers whenever the value changes.

pub mod cli;
pub mod config;
pub mod error;
pub mod store;
pub mod validation;
pub mod watcher;

pub use config::{AppConfig, Configuration};
pub use error::StoreError;
pub use store::{FileStore, StoreOptions};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::info;

use crate::cli::{Cli, Commands, OutputFormat};
use crate::config::merge::{coerce_scalar, get_path, set_path, split_path};

/// Runs the command-line tool with the provided arguments.
pub async fn run(cli: Cli) -> Result<()> {
    setup_logging(cli.log_level())?;

    let options = StoreOptions::default().with_env_prefix(&cli.env_prefix);

    match cli.command {
        Commands::Show { format } => {
            let store: FileStore = FileStore::with_options(&cli.config, false, options)?;
            show_config(&store, format)
        }
        Commands::Validate => {
            let store: FileStore = FileStore::with_options(&cli.config, false, options)?;
            report_validation(&store)
        }
        Commands::Get { key } => {
            let store: FileStore = FileStore::with_options(&cli.config, false, options)?;
            get_field(&store, &key)
        }
        Commands::Set { key, value } => {
            let store: FileStore = FileStore::with_options(&cli.config, false, options)?;
            set_field(&store, &key, &value)
        }
        Commands::Watch => {
            let store: FileStore = FileStore::with_options(&cli.config, true, options)?;
            watch_config(&store).await
        }
    }
}

/// Initializes the tracing subscriber for structured logging.
fn setup_logging(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .json()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn sanitized_value(config: &AppConfig) -> Result<Value> {
    let mut config = config.clone();
    config.sanitize();
    Ok(serde_json::to_value(&config)?)
}

fn render(config: &AppConfig, format: OutputFormat) -> Result<String> {
    let value = sanitized_value(config)?;
    let text = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&value)?,
        OutputFormat::Yaml => serde_yaml::to_string(&value)?,
    };
    Ok(text)
}

/// Prints the effective configuration with secrets masked.
fn show_config(store: &FileStore, format: OutputFormat) -> Result<()> {
    println!("{}", render(&store.get(), format)?);
    Ok(())
}

/// Reports whether the file loads and validates, plus any warnings.
fn report_validation(store: &FileStore) -> Result<()> {
    let findings = store.get().validate();
    if findings.is_empty() {
        println!("Configuration is valid.");
    } else {
        println!("{findings}");
    }

    let overrides = store.environment_overrides();
    if overrides.as_object().is_some_and(|o| !o.is_empty()) {
        println!("Environment overrides in effect:");
        println!("{}", serde_json::to_string_pretty(&overrides)?);
    }

    Ok(())
}

/// Prints a single field.
fn get_field(store: &FileStore, key: &str) -> Result<()> {
    let value = sanitized_value(&store.get())?;
    let path = split_path(key);

    let Some(field) = get_path(&value, &path) else {
        bail!("unknown config key '{}'", key);
    };

    match field {
        Value::String(s) => println!("{}", s),
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }
    Ok(())
}

/// Changes one field in memory, then writes the file.
fn set_field(store: &FileStore, key: &str, raw: &str) -> Result<()> {
    let mut value = serde_json::to_value(&*store.get())?;
    let path = split_path(key);

    let Some(existing) = get_path(&value, &path) else {
        bail!("unknown config key '{}'", key);
    };
    if existing.is_object() {
        bail!("config key '{}' is a section, not a field", key);
    }

    let new_value = coerce_scalar(raw, Some(existing));
    if !set_path(&mut value, &path, new_value) {
        bail!("unknown config key '{}'", key);
    }

    let candidate: AppConfig = serde_json::from_value(value)
        .with_context(|| format!("invalid value for '{}'", key))?;

    store.set(candidate)?;
    store.save()?;

    info!(key, "Config field updated");
    println!("Updated {} in {}", key, store.identity());
    Ok(())
}

/// Prints the configuration each time it changes, until interrupted.
async fn watch_config(store: &FileStore) -> Result<()> {
    let mut updates = store.subscribe();
    println!("Watching {}. Press Ctrl+C to stop.", store.identity());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let config = updates.borrow_and_update().clone();
                println!("{}", render(&config, OutputFormat::Json)?);
            }
        }
    }

    store.close()?;
    Ok(())
}
