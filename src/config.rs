//! Environment-driven configuration shared by every Lambda in the crate.

use std::env;

use crate::{error::AppError, runtime_env::DeploymentEnv};

/// Resource names and feature switches resolved once per cold start.
#[derive(Debug, Clone, Default)]
pub struct ControlPlaneConfig {
    pub environment: String,
    pub region: String,
    pub parameter_prefix: String,
    pub tenants_table: String,
    pub onboarding_table: String,
    pub cidr_table: String,
    pub options_table: String,
    pub event_bus: Option<String>,
    pub resources_bucket: Option<String>,
    pub athena_bucket: Option<String>,
    pub athena_database: Option<String>,
    pub athena_output_path: Option<String>,
    pub access_logs_table: Option<String>,
    pub access_logs_path: Option<String>,
    pub metrics_queue: Option<String>,
    pub metrics_dlq: Option<String>,
    pub bootstrap_tables: bool,
}

impl ControlPlaneConfig {
    /// Read the configuration for the detected deployment environment.
    ///
    /// Table names fall back to `<Kind>_<env>`; optional collaborators stay
    /// unset and fail at the point of use.
    pub fn from_env(environment: &DeploymentEnv) -> Self {
        Self {
            environment: environment.saas_boost_env(),
            region: env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            parameter_prefix: environment.parameter_prefix(),
            tenants_table: var_or("TENANTS_TABLE", environment.tenants_table()),
            onboarding_table: var_or("ONBOARDING_TABLE", environment.onboarding_table()),
            cidr_table: var_or("CIDR_TABLE", environment.cidr_table()),
            options_table: var_or("OPTIONS_TABLE", environment.options_table()),
            event_bus: optional_var("SAAS_BOOST_EVENT_BUS"),
            resources_bucket: optional_var("RESOURCES_BUCKET"),
            athena_bucket: optional_var("S3_ATHENA_BUCKET"),
            athena_database: optional_var("ATHENA_DATABASE"),
            athena_output_path: optional_var("S3_ATHENA_OUTPUT_PATH"),
            access_logs_table: optional_var("ACCESS_LOGS_TABLE"),
            access_logs_path: optional_var("ACCESS_LOGS_PATH"),
            metrics_queue: optional_var("METRICS_QUEUE"),
            metrics_dlq: optional_var("METRICS_DLQ"),
            bootstrap_tables: env::var("BOOTSTRAP_DYNAMODB_TABLES")
                .map(|value| parse_flag(&value))
                .unwrap_or_else(|_| environment.is_local()),
        }
    }

    /// Return a configured value or a configuration error naming the variable.
    pub fn require<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, AppError> {
        value
            .as_deref()
            .ok_or_else(|| AppError::Config(format!("missing {name} env var")))
    }
}

fn var_or(key: &str, default: String) -> String {
    optional_var(key).unwrap_or(default)
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn flags_accept_common_truthy_values() {
        for value in ["1", "true", "YES", " on "] {
            assert!(parse_flag(value), "{value} should be truthy");
        }
        assert!(!parse_flag("0"));
        assert!(!parse_flag("nope"));
    }

    #[test]
    #[serial]
    fn tables_default_to_environment_names() {
        std::env::set_var("ENVIRONMENT_NAME", "Test");
        std::env::remove_var("TENANTS_TABLE");
        std::env::set_var("ONBOARDING_TABLE", "custom-onboarding");
        std::env::set_var("SAAS_BOOST_EVENT_BUS", "  ");
        let config = ControlPlaneConfig::from_env(&DeploymentEnv::detect());
        assert_eq!(config.tenants_table, "Tenants_Test");
        assert_eq!(config.onboarding_table, "custom-onboarding");
        assert!(config.event_bus.is_none());
        std::env::remove_var("ENVIRONMENT_NAME");
        std::env::remove_var("ONBOARDING_TABLE");
        std::env::remove_var("SAAS_BOOST_EVENT_BUS");
    }

    #[test]
    fn require_names_the_missing_variable() {
        let err = ControlPlaneConfig::require(&None, "RESOURCES_BUCKET").unwrap_err();
        assert!(err.to_string().contains("RESOURCES_BUCKET"));
        let bucket = Some("bucket".to_string());
        assert_eq!(
            ControlPlaneConfig::require(&bucket, "RESOURCES_BUCKET").unwrap(),
            "bucket"
        );
    }
}
