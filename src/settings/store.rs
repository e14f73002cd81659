use aws_sdk_ssm::{types::Parameter, Client};
use tracing::{info, warn};

use super::{from_app_parameter, from_parameter, to_parameter, Setting, APP_BASE_PATH};
use crate::error::AppError;

/// Parameter Store requests accept at most ten names.
const BATCH_SIZE: usize = 10;

/// Settings access rooted at one environment's parameter prefix.
#[derive(Clone)]
pub struct ParameterStore {
    client: Client,
    prefix: String,
}

impl ParameterStore {
    pub fn new(client: Client, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn full_name(&self, name: &str) -> String {
        format!("{}{name}", self.prefix)
    }

    /// Fetch a single parameter by full name; a missing parameter is `None`.
    pub async fn get_parameter(
        &self,
        full_name: &str,
        decrypt: bool,
    ) -> Result<Option<Parameter>, AppError> {
        match self
            .client
            .get_parameter()
            .name(full_name)
            .with_decryption(decrypt)
            .send()
            .await
        {
            Ok(resp) => Ok(resp.parameter),
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_parameter_not_found())
                    .unwrap_or(false) =>
            {
                Ok(None)
            }
            Err(err) => Err(AppError::Ssm(err.to_string())),
        }
    }

    pub async fn get_parameters(&self, full_names: &[String]) -> Result<Vec<Parameter>, AppError> {
        let mut parameters = Vec::with_capacity(full_names.len());
        for batch in full_names.chunks(BATCH_SIZE) {
            let resp = self
                .client
                .get_parameters()
                .set_names(Some(batch.to_vec()))
                .send()
                .await
                .map_err(|e| AppError::Ssm(e.to_string()))?;
            if !resp.invalid_parameters().is_empty() {
                warn!(invalid = ?resp.invalid_parameters(), "requested parameters do not exist");
            }
            parameters.extend(resp.parameters.unwrap_or_default());
        }
        Ok(parameters)
    }

    pub async fn get_parameters_by_path(
        &self,
        path: &str,
        recursive: bool,
        decrypt: bool,
    ) -> Result<Vec<Parameter>, AppError> {
        let mut parameters = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let resp = self
                .client
                .get_parameters_by_path()
                .path(path)
                .recursive(recursive)
                .with_decryption(decrypt)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| AppError::Ssm(e.to_string()))?;
            parameters.extend(resp.parameters.unwrap_or_default());
            match resp.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }
        Ok(parameters)
    }

    /// Overwrite a parameter and return its new version.
    pub async fn put_parameter(&self, parameter: &Parameter) -> Result<i64, AppError> {
        let resp = self
            .client
            .put_parameter()
            .set_name(parameter.name().map(str::to_string))
            .set_value(parameter.value().map(str::to_string))
            .set_type(parameter.r#type().cloned())
            .overwrite(true)
            .send()
            .await
            .map_err(|e| AppError::Ssm(e.to_string()))?;
        Ok(resp.version())
    }

    /// Delete one parameter; an already absent parameter is not an error.
    pub async fn delete_parameter(&self, full_name: &str) -> Result<(), AppError> {
        match self.client.delete_parameter().name(full_name).send().await {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_parameter_not_found())
                    .unwrap_or(false) =>
            {
                warn!(%full_name, "parameter already absent on delete");
                Ok(())
            }
            Err(err) => Err(AppError::Ssm(err.to_string())),
        }
    }

    pub async fn delete_parameters(&self, full_names: &[String]) -> Result<(), AppError> {
        for batch in full_names.chunks(BATCH_SIZE) {
            let resp = self
                .client
                .delete_parameters()
                .set_names(Some(batch.to_vec()))
                .send()
                .await
                .map_err(|e| AppError::Ssm(e.to_string()))?;
            if !resp.invalid_parameters().is_empty() {
                warn!(invalid = ?resp.invalid_parameters(), "parameters already absent on delete");
            }
        }
        Ok(())
    }

    /// Settings directly under the prefix; secure values stay encrypted.
    pub async fn get_all_settings(&self) -> Result<Vec<Setting>, AppError> {
        self.get_parameters_by_path(&self.prefix, false, false)
            .await?
            .iter()
            .map(|p| from_parameter(&self.prefix, p))
            .collect()
    }

    pub async fn get_named_settings(&self, names: &[String]) -> Result<Vec<Setting>, AppError> {
        let full_names: Vec<String> = names.iter().map(|n| self.full_name(n)).collect();
        self.get_parameters(&full_names)
            .await?
            .iter()
            .map(|p| from_parameter(&self.prefix, p))
            .collect()
    }

    pub async fn get_setting(&self, name: &str, decrypt: bool) -> Result<Option<Setting>, AppError> {
        self.get_parameter(&self.full_name(name), decrypt)
            .await?
            .map(|p| from_parameter(&self.prefix, &p))
            .transpose()
    }

    /// Decrypted value of a secure setting.
    pub async fn get_secret(&self, name: &str) -> Result<Option<Setting>, AppError> {
        let name = if name.contains("BILLING_API_KEY") && !name.starts_with(APP_BASE_PATH) {
            format!("{APP_BASE_PATH}{name}")
        } else {
            name.to_string()
        };
        self.get_setting(&name, true).await
    }

    /// Versioned reference (`/saas-boost/env/NAME:3`) usable by CloudFormation.
    pub async fn get_parameter_store_reference(
        &self,
        name: &str,
    ) -> Result<Option<String>, AppError> {
        Ok(self
            .get_setting(name, false)
            .await?
            .map(|setting| format!("{}{}:{}", self.prefix, setting.name, setting.version.unwrap_or(1))))
    }

    /// Overwrite a setting. Secure settings come back in their encrypted form.
    pub async fn update_setting(&self, setting: &Setting) -> Result<Setting, AppError> {
        let parameter = to_parameter(&self.prefix, setting)?;
        let version = self.put_parameter(&parameter).await?;
        info!(name = %setting.name, version, "updated setting");
        if setting.secure {
            let stored = self
                .get_parameter(&self.full_name(&setting.name), false)
                .await?
                .ok_or_else(|| {
                    AppError::Ssm(format!("setting `{}` vanished after write", setting.name))
                })?;
            let mut encrypted = from_parameter(&self.prefix, &stored)?;
            encrypted.read_only = setting.read_only;
            return Ok(encrypted);
        }
        Ok(Setting {
            version: Some(version),
            ..setting.clone()
        })
    }

    /// Write a batch of settings, leaving secure values untouched when the
    /// caller echoed back the stored ciphertext.
    pub async fn update_settings_and_secrets(
        &self,
        settings: &[Setting],
    ) -> Result<Vec<Setting>, AppError> {
        let mut updated = Vec::with_capacity(settings.len());
        for setting in settings {
            if setting.secure {
                if let Some(existing) = self
                    .get_parameter(&self.full_name(&setting.name), false)
                    .await?
                {
                    let existing = from_parameter(&self.prefix, &existing)?;
                    if existing.value == setting.value {
                        updated.push(existing);
                        continue;
                    }
                }
            }
            updated.push(self.update_setting(setting).await?);
        }
        Ok(updated)
    }

    /// Every setting of the application hierarchy (`app/...`), undecrypted.
    pub async fn get_app_settings(&self) -> Result<Vec<Setting>, AppError> {
        let path = format!("{}{APP_BASE_PATH}", self.prefix);
        self.get_parameters_by_path(&path, true, false)
            .await?
            .iter()
            .map(|p| from_app_parameter(&self.prefix, p))
            .collect()
    }

    pub async fn delete_setting(&self, name: &str) -> Result<(), AppError> {
        self.delete_parameter(&self.full_name(name)).await
    }

    /// Delete settings by their names relative to the prefix.
    pub async fn delete_settings(&self, names: &[String]) -> Result<(), AppError> {
        let full_names: Vec<String> = names.iter().map(|n| self.full_name(n)).collect();
        self.delete_parameters(&full_names).await
    }
}
