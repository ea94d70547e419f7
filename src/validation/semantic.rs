//! Semantic validation for configuration values.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::model::{AppConfig, LogSettings, ServiceSettings, SqlSettings};

use super::Findings;

/// Valid log level names.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Supported database drivers.
const VALID_DRIVERS: &[&str] = &["postgres", "mysql", "sqlite"];

fn listen_address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\[[0-9A-Fa-f:]+\]|[A-Za-z0-9.\-]*):([0-9]{1,5})$").expect("valid regex")
    })
}

fn site_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^https?://[^\s/]+(/\S*)?$").expect("valid regex"))
}

/// Checks that values are well-formed and mutually consistent.
pub fn check(config: &AppConfig, findings: &mut Findings) {
    check_service(&config.service, findings);
    check_sql(&config.sql, findings);
    check_log(&config.log, findings);
}

fn check_service(service: &ServiceSettings, findings: &mut Findings) {
    if let Some(url) = service.site_url.as_deref().filter(|u| !u.is_empty()) {
        if !site_url_pattern().is_match(url) {
            findings
                .reject("service.site_url", format!("Invalid site URL: '{}'", url))
                .hint("Site URL must start with http:// or https://");
        }
    }

    if let Some(address) = service.listen_address.as_deref() {
        let port = listen_address_pattern()
            .captures(address)
            .and_then(|c| c.get(2))
            .and_then(|p| p.as_str().parse::<u16>().ok());
        if port.is_none() {
            findings
                .reject(
                    "service.listen_address",
                    format!("Invalid listen address: '{}'", address),
                )
                .hint("Use host:port, e.g. ':8065' or '127.0.0.1:8065'");
        }
    }

    for (field, value) in [
        ("service.read_timeout_secs", service.read_timeout_secs),
        ("service.write_timeout_secs", service.write_timeout_secs),
    ] {
        if value == Some(0) {
            findings.reject(field, "Timeout must be at least 1 second");
        }
    }

    if service.enable_developer == Some(true) {
        findings.warn("service.enable_developer", "Developer mode is enabled");
    }
}

fn check_sql(sql: &SqlSettings, findings: &mut Findings) {
    if let Some(driver) = sql.driver_name.as_deref() {
        if !VALID_DRIVERS.contains(&driver) {
            findings
                .reject(
                    "sql.driver_name",
                    format!("Unsupported database driver: '{}'", driver),
                )
                .hint(format!("Did you mean '{}'?", find_similar(driver, VALID_DRIVERS)));
        }
    }

    match (sql.max_idle_conns, sql.max_open_conns) {
        (_, Some(0)) => {
            findings.reject("sql.max_open_conns", "Max open connections must be at least 1");
        }
        (Some(idle), Some(open)) if idle > open => {
            findings
                .reject(
                    "sql.max_idle_conns",
                    format!("Max idle connections ({idle}) exceeds max open connections ({open})"),
                )
                .hint("Lower max_idle_conns or raise max_open_conns");
        }
        _ => {}
    }

    if sql.at_rest_encrypt_key.as_deref().is_some_and(|k| k.len() < 32) {
        findings.reject(
            "sql.at_rest_encrypt_key",
            "At-rest encryption key must be at least 32 characters",
        );
    }
}

fn check_log(log: &LogSettings, findings: &mut Findings) {
    for (field, level) in [
        ("log.console_level", log.console_level.as_deref()),
        ("log.file_level", log.file_level.as_deref()),
    ] {
        let Some(level) = level else { continue };
        if !VALID_LOG_LEVELS.contains(&level) {
            findings
                .reject(field, format!("Invalid log level: '{}'", level))
                .hint(format!("Did you mean '{}'?", find_similar(level, VALID_LOG_LEVELS)));
        }
    }
}

/// Finds the closest candidate using Levenshtein distance.
fn find_similar<'a>(input: &str, candidates: &[&'a str]) -> &'a str {
    let input = input.to_lowercase();
    candidates
        .iter()
        .min_by_key(|c| strsim::levenshtein(&input, c))
        .copied()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;

    fn defaulted() -> AppConfig {
        let mut config = AppConfig::default();
        config.set_defaults();
        config
    }

    fn findings_for(config: &AppConfig) -> Findings {
        let mut findings = Findings::default();
        check(config, &mut findings);
        findings
    }

    #[test]
    fn misspelled_level_gets_suggestion() {
        let mut config = defaulted();
        config.log.console_level = Some("debgu".to_string());

        let findings = findings_for(&config);
        let finding = findings.rejections().next().unwrap();
        assert_eq!(finding.field, "log.console_level");
        assert_eq!(finding.hint.as_deref(), Some("Did you mean 'debug'?"));
    }

    #[test]
    fn listen_address_forms() {
        let mut config = defaulted();
        for ok in [":8065", "127.0.0.1:80", "localhost:443", "[::1]:8065"] {
            config.service.listen_address = Some(ok.to_string());
            assert!(!findings_for(&config).has_rejections(), "{ok} should be valid");
        }
        for bad in ["8065", "host:", "host:99999", "a b:1"] {
            config.service.listen_address = Some(bad.to_string());
            assert!(findings_for(&config).has_rejections(), "{bad} should be invalid");
        }
    }

    #[test]
    fn idle_conns_cannot_exceed_open() {
        let mut config = defaulted();
        config.sql.max_idle_conns = Some(50);
        config.sql.max_open_conns = Some(10);

        let fields: Vec<_> = findings_for(&config).rejections().map(|f| f.field).collect();
        assert_eq!(fields, ["sql.max_idle_conns"]);
    }

    #[test]
    fn developer_mode_is_only_a_warning() {
        let mut config = defaulted();
        config.service.enable_developer = Some(true);

        let findings = findings_for(&config);
        assert!(!findings.has_rejections());
        assert_eq!(findings.warnings().count(), 1);
    }

    #[test]
    fn site_url_requires_scheme() {
        let mut config = defaulted();
        config.service.site_url = Some("example.com".to_string());
        assert!(findings_for(&config).has_rejections());

        config.service.site_url = Some("https://example.com/chat".to_string());
        assert!(!findings_for(&config).has_rejections());
    }
}
