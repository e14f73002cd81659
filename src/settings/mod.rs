//! Named configuration values persisted in Parameter Store.
//!
//! Every setting lives under the environment prefix (`/saas-boost/{env}/`).
//! Application settings managed by the app config service sit one level
//! deeper, under `app/`, and are always writable.

mod store;

pub use store::ParameterStore;

use aws_sdk_ssm::types::{Parameter, ParameterType};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Parameter Store rejects empty values, so blanks are stored as this sentinel.
pub const EMPTY_VALUE: &str = "N/A";

/// Sub-path holding the application configuration.
pub const APP_BASE_PATH: &str = "app/";

/// Settings the API may overwrite; everything else is read-only.
pub const READ_WRITE_PARAMS: &[&str] = &[
    "DOMAIN_NAME",
    "HOSTED_ZONE",
    "SSL_CERT_ARN",
    "APP_NAME",
    "METRICS_STREAM",
    "BILLING_API_KEY",
    "SERVICE_NAME",
    "IS_PUBLIC",
    "PATH",
    "COMPUTE_SIZE",
    "TASK_CPU",
    "TASK_MEMORY",
    "CONTAINER_PORT",
    "HEALTH_CHECK",
    "FILE_SYSTEM_MOUNT_POINT",
    "FILE_SYSTEM_ENCRYPT",
    "FILE_SYSTEM_LIFECYCLE",
    "MIN_COUNT",
    "MAX_COUNT",
    "DB_ENGINE",
    "DB_VERSION",
    "DB_PARAM_FAMILY",
    "DB_INSTANCE_TYPE",
    "DB_NAME",
    "DB_HOST",
    "DB_PORT",
    "DB_MASTER_USERNAME",
    "DB_PASSWORD",
    "DB_BOOTSTRAP_FILE",
    "CLUSTER_OS",
    "CLUSTER_INSTANCE_TYPE",
    "FILE_SYSTEM_TYPE",
    "FSX_STORAGE_GB",
    "FSX_THROUGHPUT_MBS",
    "FSX_BACKUP_RETENTION_DAYS",
    "FSX_DAILY_BACKUP_TIME",
    "FSX_WEEKLY_MAINTENANCE_TIME",
    "FSX_WINDOWS_MOUNT_DRIVE",
];

/// A named configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default = "default_read_only")]
    pub read_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_read_only() -> bool {
    true
}

impl Setting {
    /// A writable, plain-text setting.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            read_only: false,
            secure: false,
            version: None,
            description: None,
        }
    }

    /// A writable setting stored as a `SecureString`.
    pub fn secure(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            secure: true,
            ..Self::new(name, value)
        }
    }
}

pub fn is_valid_setting_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '/' | '.' | '-'))
}

pub fn is_read_write(name: &str) -> bool {
    READ_WRITE_PARAMS.contains(&name)
}

/// Convert a setting into the parameter written under `prefix`.
pub fn to_parameter(prefix: &str, setting: &Setting) -> Result<Parameter, AppError> {
    if !is_valid_setting_name(&setting.name) {
        return Err(AppError::Validation(format!(
            "Parameter Store setting name `{}` is invalid",
            setting.name
        )));
    }
    let value = if setting.value.is_empty() {
        EMPTY_VALUE.to_string()
    } else {
        setting.value.clone()
    };
    let parameter_type = if setting.secure {
        ParameterType::SecureString
    } else {
        ParameterType::String
    };
    Ok(Parameter::builder()
        .name(format!("{prefix}{}", setting.name))
        .value(value)
        .r#type(parameter_type)
        .build())
}

/// Convert a parameter read from under `prefix` back into a setting.
pub fn from_parameter(prefix: &str, parameter: &Parameter) -> Result<Setting, AppError> {
    let full_name = parameter.name().unwrap_or_default();
    let name = full_name
        .strip_prefix(prefix)
        .filter(|name| is_valid_setting_name(name))
        .ok_or_else(|| {
            AppError::Ssm(format!(
                "parameter `{full_name}` is not a setting under `{prefix}`"
            ))
        })?;
    Ok(Setting {
        name: name.to_string(),
        value: stored_value(parameter),
        read_only: !is_read_write(name),
        secure: matches!(parameter.r#type(), Some(ParameterType::SecureString)),
        version: Some(parameter.version()),
        description: None,
    })
}

/// Convert a parameter from the application hierarchy; the `app/` prefix is kept.
pub fn from_app_parameter(prefix: &str, parameter: &Parameter) -> Result<Setting, AppError> {
    let app_prefix = format!("{prefix}{APP_BASE_PATH}");
    let full_name = parameter.name().unwrap_or_default();
    let name = full_name
        .strip_prefix(&app_prefix)
        .filter(|name| is_valid_setting_name(name))
        .ok_or_else(|| {
            AppError::Ssm(format!(
                "parameter `{full_name}` is not an app setting under `{app_prefix}`"
            ))
        })?;
    Ok(Setting {
        name: format!("{APP_BASE_PATH}{name}"),
        value: stored_value(parameter),
        read_only: false,
        secure: matches!(parameter.r#type(), Some(ParameterType::SecureString)),
        version: Some(parameter.version()),
        description: None,
    })
}

fn stored_value(parameter: &Parameter) -> String {
    match parameter.value() {
        Some(EMPTY_VALUE) | None => String::new(),
        Some(value) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "/saas-boost/test/";

    fn parameter(name: &str, value: &str, secure: bool) -> Parameter {
        Parameter::builder()
            .name(format!("{PREFIX}{name}"))
            .value(value)
            .r#type(if secure {
                ParameterType::SecureString
            } else {
                ParameterType::String
            })
            .version(3)
            .build()
    }

    #[test]
    fn names_are_restricted() {
        assert!(is_valid_setting_name("app/svc/SERVICE_JSON"));
        assert!(is_valid_setting_name("DB_HOST.v-1"));
        assert!(!is_valid_setting_name(""));
        assert!(!is_valid_setting_name("bad name"));
        assert!(!is_valid_setting_name("semi;colon"));
    }

    #[test]
    fn empty_values_use_the_sentinel() {
        let setting = Setting::secure("DB_PASSWORD", "");
        let parameter = to_parameter(PREFIX, &setting).expect("parameter");
        assert_eq!(parameter.name(), Some("/saas-boost/test/DB_PASSWORD"));
        assert_eq!(parameter.value(), Some(EMPTY_VALUE));
        assert_eq!(parameter.r#type(), Some(&ParameterType::SecureString));

        let restored = from_parameter(PREFIX, &parameter).expect("setting");
        assert_eq!(restored.value, "");
        assert!(restored.secure);
        assert!(!restored.read_only);
    }

    #[test]
    fn unknown_settings_are_read_only() {
        let setting = from_parameter(PREFIX, &parameter("VPC", "vpc-123", false)).expect("setting");
        assert_eq!(setting.name, "VPC");
        assert!(setting.read_only);
        assert_eq!(setting.version, Some(3));
    }

    #[test]
    fn foreign_parameters_are_rejected() {
        let foreign = Parameter::builder().name("/other/VPC").value("x").build();
        assert!(from_parameter(PREFIX, &foreign).is_err());
        let invalid = to_parameter(PREFIX, &Setting::new("bad name", "x"));
        assert!(matches!(invalid, Err(AppError::Validation(_))));
    }

    #[test]
    fn app_parameters_keep_their_path() {
        let setting =
            from_app_parameter(PREFIX, &parameter("app/web/SERVICE_JSON", "{}", false)).expect("app");
        assert_eq!(setting.name, "app/web/SERVICE_JSON");
        assert!(!setting.read_only);
        assert!(from_app_parameter(PREFIX, &parameter("VPC", "x", false)).is_err());
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let setting: Setting =
            serde_json::from_str(r#"{"name":"DOMAIN_NAME","value":"example.com"}"#).expect("json");
        assert!(setting.read_only);
        assert!(!setting.secure);
        let json = serde_json::to_value(&Setting::new("APP_NAME", "demo")).expect("json");
        assert_eq!(json["readOnly"], false);
        assert!(json.get("version").is_none());
    }
}
