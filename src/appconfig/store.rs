//! Persistence of the app config as a tree of settings under `app/`.

use std::collections::HashMap;

use tracing::info;

use super::model::{AppConfig, BillingProvider, ServiceConfig};
use crate::{
    error::AppError,
    settings::{ParameterStore, Setting, APP_BASE_PATH},
};

/// Stand-in for the database password inside the stored service JSON.
pub const ENCRYPTED_PLACEHOLDER: &str = "**encrypted**";

const APP_NAME: &str = "APP_NAME";
const DOMAIN_NAME: &str = "DOMAIN_NAME";
const HOSTED_ZONE: &str = "HOSTED_ZONE";
const SSL_CERT_ARN: &str = "SSL_CERT_ARN";
const BILLING_API_KEY: &str = "BILLING_API_KEY";
const SERVICE_JSON: &str = "SERVICE_JSON";
const DB_PASSWORD: &str = "DB_PASSWORD";

fn app_setting(name: &str) -> String {
    format!("{APP_BASE_PATH}{name}")
}

fn service_setting(service: &str, name: &str) -> String {
    format!("{APP_BASE_PATH}{service}/{name}")
}

fn value_of(config: &Option<String>) -> String {
    config.clone().unwrap_or_default()
}

pub fn app_config_to_settings(prefix: &str, config: &AppConfig) -> Result<Vec<Setting>, AppError> {
    let mut settings = vec![
        Setting::new(app_setting(APP_NAME), value_of(&config.name)),
        Setting::new(app_setting(DOMAIN_NAME), value_of(&config.domain_name)),
        Setting::new(app_setting(HOSTED_ZONE), value_of(&config.hosted_zone)),
        Setting::new(app_setting(SSL_CERT_ARN), value_of(&config.ssl_certificate)),
    ];
    for service in config.services.values() {
        settings.extend(service_config_to_settings(prefix, service)?);
    }
    settings.push(Setting::secure(
        app_setting(BILLING_API_KEY),
        config
            .billing
            .as_ref()
            .map(|billing| billing.api_key.clone())
            .unwrap_or_default(),
    ));
    Ok(settings)
}

/// Settings for one service: the service JSON plus, for database services,
/// the password as its own secure setting.
pub fn service_config_to_settings(
    prefix: &str,
    service: &ServiceConfig,
) -> Result<Vec<Setting>, AppError> {
    let mut settings = Vec::with_capacity(2);
    let mut stored = service.clone();
    if let Some(database) = stored.database.as_mut() {
        let password_name = service_setting(&service.name, DB_PASSWORD);
        settings.push(Setting::secure(
            password_name.clone(),
            database.password.clone().unwrap_or_default(),
        ));
        database.password = Some(ENCRYPTED_PLACEHOLDER.to_string());
        database.password_param = Some(format!("{prefix}{password_name}"));
        database.bootstrap_url = None;
    }
    settings.push(Setting::new(
        service_setting(&service.name, SERVICE_JSON),
        serde_json::to_string(&stored)?,
    ));
    Ok(settings)
}

/// Rebuild an app config from the undecrypted `app/` settings.
///
/// Database passwords carry the stored ciphertext; billing is included only
/// when `billing_configured` reports a non-blank decrypted key.
pub fn app_config_from_settings(
    settings: &[Setting],
    billing_configured: bool,
) -> Result<AppConfig, AppError> {
    let by_name: HashMap<&str, &Setting> =
        settings.iter().map(|s| (s.name.as_str(), s)).collect();
    let read = |name: &str| -> Option<String> {
        by_name
            .get(app_setting(name).as_str())
            .map(|s| s.value.clone())
            .filter(|v| !v.is_empty())
    };

    let mut config = AppConfig {
        name: read(APP_NAME),
        domain_name: read(DOMAIN_NAME),
        hosted_zone: read(HOSTED_ZONE),
        ssl_certificate: read(SSL_CERT_ARN),
        ..Default::default()
    };
    if billing_configured {
        config.billing = read(BILLING_API_KEY).map(|api_key| BillingProvider { api_key });
    }

    let service_suffix = format!("/{SERVICE_JSON}");
    for setting in settings {
        let Some(relative) = setting.name.strip_prefix(APP_BASE_PATH) else {
            continue;
        };
        if !relative.contains('/') || !relative.ends_with(&service_suffix) {
            continue;
        }
        let mut service: ServiceConfig = serde_json::from_str(&setting.value)?;
        if let Some(database) = service.database.as_mut() {
            let password_name = service_setting(&service.name, DB_PASSWORD);
            database.password = by_name.get(password_name.as_str()).map(|s| s.value.clone());
        }
        config.services.insert(service.name.clone(), service);
    }
    Ok(config)
}

/// App-config view over the parameter store.
pub struct AppConfigStore {
    store: ParameterStore,
}

impl AppConfigStore {
    pub fn new(store: ParameterStore) -> Self {
        Self { store }
    }

    pub async fn get_app_config(&self) -> Result<AppConfig, AppError> {
        let settings = self.store.get_app_settings().await?;
        let billing_configured = self
            .store
            .get_secret(&app_setting(BILLING_API_KEY))
            .await?
            .map_or(false, |secret| !secret.value.trim().is_empty());
        app_config_from_settings(&settings, billing_configured)
    }

    /// Persist the whole config and return it as stored.
    pub async fn set_app_config(&self, config: &AppConfig) -> Result<AppConfig, AppError> {
        let settings = app_config_to_settings(self.store.prefix(), config)?;
        self.store.update_settings_and_secrets(&settings).await?;
        info!(services = config.services.len(), "saved app config");
        self.get_app_config().await
    }

    pub async fn set_service_config(&self, service: &ServiceConfig) -> Result<(), AppError> {
        let settings = service_config_to_settings(self.store.prefix(), service)?;
        self.store.update_settings_and_secrets(&settings).await?;
        Ok(())
    }

    pub async fn delete_service_config(&self, service: &ServiceConfig) -> Result<(), AppError> {
        let mut names = vec![service_setting(&service.name, SERVICE_JSON)];
        if service.database.is_some() {
            names.push(service_setting(&service.name, DB_PASSWORD));
        }
        info!(service = %service.name, "deleting service settings");
        self.store.delete_settings(&names).await
    }

    /// Drop the stored billing key once billing is switched off.
    pub async fn delete_billing_key(&self) -> Result<(), AppError> {
        info!("deleting billing api key");
        self.store.delete_setting(&app_setting(BILLING_API_KEY)).await
    }

    pub async fn delete_app_config(&self, config: &AppConfig) -> Result<(), AppError> {
        for service in config.services.values() {
            self.delete_service_config(service).await?;
        }
        let names: Vec<String> = [APP_NAME, DOMAIN_NAME, HOSTED_ZONE, SSL_CERT_ARN, BILLING_API_KEY]
            .iter()
            .map(|name| app_setting(name))
            .collect();
        self.store.delete_settings(&names).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appconfig::model::{Database, RdsEngine};

    const PREFIX: &str = "/saas-boost/test/";

    fn sample() -> AppConfig {
        let mut config = AppConfig {
            name: Some("demo".into()),
            domain_name: Some("example.com".into()),
            billing: Some(BillingProvider {
                api_key: "sk_live".into(),
            }),
            ..Default::default()
        };
        config.services.insert(
            "api".into(),
            ServiceConfig {
                name: "api".into(),
                database: Some(Database {
                    engine: Some(RdsEngine::Postgres),
                    password: Some("hunter2".into()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        config.services.insert(
            "web".into(),
            ServiceConfig {
                name: "web".into(),
                public: true,
                ..Default::default()
            },
        );
        config
    }

    #[test]
    fn database_passwords_are_split_into_secure_settings() {
        let settings = app_config_to_settings(PREFIX, &sample()).expect("settings");
        let names: Vec<&str> = settings.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "app/APP_NAME",
                "app/DOMAIN_NAME",
                "app/HOSTED_ZONE",
                "app/SSL_CERT_ARN",
                "app/api/DB_PASSWORD",
                "app/api/SERVICE_JSON",
                "app/web/SERVICE_JSON",
                "app/BILLING_API_KEY",
            ]
        );
        let password = &settings[4];
        assert!(password.secure);
        assert_eq!(password.value, "hunter2");

        let service: ServiceConfig = serde_json::from_str(&settings[5].value).expect("json");
        let database = service.database.expect("database");
        assert_eq!(database.password.as_deref(), Some(ENCRYPTED_PLACEHOLDER));
        assert_eq!(
            database.password_param.as_deref(),
            Some("/saas-boost/test/app/api/DB_PASSWORD")
        );
    }

    #[test]
    fn settings_rebuild_the_config() {
        let mut settings = app_config_to_settings(PREFIX, &sample()).expect("settings");
        // Secure values come back as ciphertext when read without decryption.
        for setting in settings.iter_mut().filter(|s| s.secure) {
            setting.value = format!("cipher:{}", setting.value);
        }
        let config = app_config_from_settings(&settings, true).expect("config");
        assert_eq!(config.name.as_deref(), Some("demo"));
        assert_eq!(config.hosted_zone, None);
        assert_eq!(config.services.len(), 2);
        let database = config.services["api"].database.as_ref().expect("database");
        assert_eq!(database.password.as_deref(), Some("cipher:hunter2"));
        assert_eq!(
            config.billing.as_ref().map(|b| b.api_key.as_str()),
            Some("cipher:sk_live")
        );
        assert!(config.services["web"].public);

        let without_billing = app_config_from_settings(&settings, false).expect("config");
        assert!(without_billing.billing.is_none());
    }
}
