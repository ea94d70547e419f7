//! Checks run on a configuration once defaults are filled in.
//!
//! Each check appends a [`Finding`] keyed by the dotted path of the field it
//! concerns. A single rejection keeps the configuration out of the store;
//! warnings are only logged.

pub mod schema;
pub mod semantic;

use std::fmt;

use crate::config::model::AppConfig;
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Reject,
    Warn,
}

/// One problem with one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub level: Level,
    /// Dotted field path, e.g. `sql.max_idle_conns`.
    pub field: &'static str,
    pub message: String,
    pub hint: Option<String>,
}

impl Finding {
    pub fn hint(&mut self, hint: impl Into<String>) -> &mut Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.level {
            Level::Reject => "error",
            Level::Warn => "warning",
        };
        write!(f, "{tag}: {}: {}", self.field, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " ({hint})")?;
        }
        Ok(())
    }
}

/// Everything the checks found in a configuration.
#[derive(Debug, Default)]
pub struct Findings {
    items: Vec<Finding>,
}

impl Findings {
    pub fn reject(&mut self, field: &'static str, message: impl Into<String>) -> &mut Finding {
        self.push(Level::Reject, field, message.into())
    }

    pub fn warn(&mut self, field: &'static str, message: impl Into<String>) -> &mut Finding {
        self.push(Level::Warn, field, message.into())
    }

    fn push(&mut self, level: Level, field: &'static str, message: String) -> &mut Finding {
        let at = self.items.len();
        self.items.push(Finding {
            level,
            field,
            message,
            hint: None,
        });
        &mut self.items[at]
    }

    pub fn rejections(&self) -> impl Iterator<Item = &Finding> {
        self.items.iter().filter(|f| f.level == Level::Reject)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.items.iter().filter(|f| f.level == Level::Warn)
    }

    pub fn has_rejections(&self) -> bool {
        self.rejections().next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Logs warnings and turns rejections into [`StoreError::ValidationFailed`].
    pub fn into_store_result(self) -> Result<(), StoreError> {
        for finding in self.warnings() {
            tracing::warn!(field = finding.field, hint = ?finding.hint, "{}", finding.message);
        }

        let error_count = self.rejections().count();
        if error_count == 0 {
            return Ok(());
        }

        let report = self.to_string();
        tracing::error!(error_count, "Config rejected:\n{}", report);
        Err(StoreError::ValidationFailed {
            error_count,
            report,
        })
    }
}

/// Rejections first, then warnings, then a tally.
impl fmt::Display for Findings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for finding in self.rejections().chain(self.warnings()) {
            writeln!(f, "{finding}")?;
        }
        write!(
            f,
            "{} error(s), {} warning(s)",
            self.rejections().count(),
            self.warnings().count()
        )
    }
}

/// Runs every check on a defaulted [`AppConfig`].
pub fn check(config: &AppConfig) -> Findings {
    let mut findings = Findings::default();
    schema::check(config, &mut findings);
    semantic::check(config, &mut findings);
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;

    #[test]
    fn warnings_alone_are_accepted() {
        let mut findings = Findings::default();
        findings.warn("service.enable_developer", "Developer mode is enabled");

        assert!(!findings.has_rejections());
        assert!(findings.into_store_result().is_ok());
    }

    #[test]
    fn rejections_carry_a_report() {
        let mut findings = Findings::default();
        findings.warn("service.enable_developer", "Developer mode is enabled");
        findings
            .reject("log.console_level", "Invalid log level: 'loud'")
            .hint("Did you mean 'info'?");
        findings.reject("sql.driver_name", "Unsupported database driver: 'oracle'");

        let Err(StoreError::ValidationFailed {
            error_count,
            report,
        }) = findings.into_store_result()
        else {
            panic!("expected a validation failure");
        };

        assert_eq!(error_count, 2);
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(
            lines[0],
            "error: log.console_level: Invalid log level: 'loud' (Did you mean 'info'?)"
        );
        assert!(lines[2].starts_with("warning: service.enable_developer"));
        assert_eq!(lines[3], "2 error(s), 1 warning(s)");
    }

    #[test]
    fn defaulted_config_has_no_findings() {
        let mut config = AppConfig::default();
        config.set_defaults();
        assert!(check(&config).is_empty());
    }
}
