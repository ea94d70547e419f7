//! Command-line interface definitions.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Inspect and edit a file-backed configuration.
#[derive(Parser, Debug)]
#[command(name = "confstore", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file. Relative names are searched for.
    #[arg(short, long, default_value = "config.json", env = "CONFSTORE_CONFIG", global = true)]
    pub config: PathBuf,

    /// Prefix of environment variables that override config fields.
    #[arg(long, default_value = "CONFSTORE", global = true)]
    pub env_prefix: String,

    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Returns the log level based on verbosity flags.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the effective configuration with secrets masked.
    Show {
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// Load and validate the configuration file.
    Validate,

    /// Print one field, addressed as `section.field`.
    Get {
        key: String,
    },

    /// Change one field and write the file.
    Set {
        key: String,
        /// New value; numbers and booleans are coerced to the field's type.
        value: String,
    },

    /// Print the configuration every time the file changes.
    Watch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}
