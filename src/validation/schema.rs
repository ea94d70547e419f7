//! Schema validation for configuration structure.

use super::Findings;
use crate::config::model::AppConfig;

/// Checks required fields and cross-field structure.
pub fn check(config: &AppConfig, findings: &mut Findings) {
    require(
        findings,
        "service.listen_address",
        config.service.listen_address.as_deref(),
    );
    require(findings, "sql.driver_name", config.sql.driver_name.as_deref());
    require(findings, "sql.data_source", config.sql.data_source.as_deref());

    if config.cluster.enable == Some(true) {
        let name = config.cluster.cluster_name.as_deref().unwrap_or_default();
        if name.trim().is_empty() {
            findings
                .reject(
                    "cluster.cluster_name",
                    "Cluster name is required when clustering is enabled",
                )
                .hint("Use the same name on every node");
        }
    }
}

fn require(findings: &mut Findings, field: &'static str, value: Option<&str>) {
    if value.map_or(true, |v| v.trim().is_empty()) {
        findings.reject(field, "Value is required");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;

    #[test]
    fn missing_data_source_is_an_error() {
        let mut config = AppConfig::default();
        config.set_defaults();
        config.sql.data_source = Some("  ".to_string());

        let mut findings = Findings::default();
        check(&config, &mut findings);
        let fields: Vec<_> = findings.rejections().map(|f| f.field).collect();
        assert_eq!(fields, ["sql.data_source"]);
    }

    #[test]
    fn cluster_requires_name() {
        let mut config = AppConfig::default();
        config.set_defaults();
        config.cluster.enable = Some(true);
        let mut findings = Findings::default();
        check(&config, &mut findings);
        assert!(findings.has_rejections());

        config.cluster.cluster_name = Some("prod".to_string());
        let mut findings = Findings::default();
        check(&config, &mut findings);
        assert!(findings.is_empty());
    }
}
