use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use aws_sdk_s3::presigning::PresigningConfig;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::{
    helper,
    model::AppConfig,
    options::{db_options, os_options, RdsEngineOptions},
};
use crate::{
    config::ControlPlaneConfig,
    context::AppContext,
    error::AppError,
    events::{AppConfigEvent, BILLING_SYSTEM_SETUP},
};

const BOOTSTRAP_URL_EXPIRY: Duration = Duration::from_secs(15 * 60);

pub fn bootstrap_key(service: &str) -> String {
    format!("services/{service}/bootstrap.sql")
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfigOptions {
    pub os_options: BTreeMap<&'static str, &'static str>,
    pub db_options: Vec<RdsEngineOptions>,
}

pub async fn get_options(ctx: &AppContext) -> Result<AppConfigOptions, AppError> {
    Ok(AppConfigOptions {
        os_options: os_options(),
        db_options: db_options(ctx.dynamo(), ctx.options_table(), &ctx.config().region).await?,
    })
}

/// What saving `updated` over `existing` involves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    /// Services whose settings must be deleted before saving.
    pub removed_services: BTreeSet<String>,
    pub presign: bool,
    pub publish_changed: bool,
    pub billing_first_time: bool,
    pub billing_removed: bool,
}

/// Decide how to apply an update. Domain changes and removed services are
/// rejected while tenants are provisioned.
pub fn plan_update(
    existing: &AppConfig,
    updated: &AppConfig,
    tenants_provisioned: bool,
) -> Result<UpdatePlan, AppError> {
    let billing_first_time = helper::is_billing_first_time(existing, updated);
    if existing.is_empty() {
        return Ok(UpdatePlan {
            removed_services: BTreeSet::new(),
            presign: true,
            publish_changed: true,
            billing_first_time,
            billing_removed: false,
        });
    }

    let domain_changed = helper::is_domain_changed(existing, updated);
    let removed_services = helper::removed_services(existing, updated);
    if tenants_provisioned && (domain_changed || !removed_services.is_empty()) {
        warn!(
            domain_changed,
            removed = removed_services.len(),
            "rejecting app config update"
        );
        return Err(AppError::Validation(
            "Application config update validation failed.".into(),
        ));
    }
    info!(
        domain_changed,
        hosted_zone_changed = helper::is_hosted_zone_changed(existing, updated),
        ssl_arn_changed = helper::is_ssl_arn_changed(existing, updated),
        billing_changed = helper::is_billing_changed(existing, updated),
        "updating app config"
    );
    Ok(UpdatePlan {
        publish_changed: domain_changed || helper::is_services_changed(existing, updated),
        removed_services,
        presign: !tenants_provisioned,
        billing_first_time,
        billing_removed: helper::is_billing_removed(existing, updated),
    })
}

/// Validate and persist an updated app config, emitting the follow-up events.
///
/// Returns the stored config with presigned bootstrap upload URLs filled in.
pub async fn update_app_config(ctx: &AppContext, updated: AppConfig) -> Result<AppConfig, AppError> {
    if helper::is_name_blank(&updated) {
        return Err(AppError::Validation("Application name is required.".into()));
    }
    let store = ctx.app_config_store();
    let existing = store.get_app_config().await?;
    let tenants_provisioned = if existing.is_empty() {
        info!("saving app config for the first time");
        false
    } else {
        !ctx.tenants().get_provisioned_tenants().await?.is_empty()
    };
    let plan = plan_update(&existing, &updated, tenants_provisioned)?;

    for name in &plan.removed_services {
        if let Some(service) = existing.services.get(name) {
            store.delete_service_config(service).await?;
        }
    }
    let mut saved = store.set_app_config(&updated).await?;
    if plan.billing_removed {
        store.delete_billing_key().await?;
    }

    if plan.presign {
        presign_bootstrap_urls(ctx, &mut saved).await?;
    }
    if plan.publish_changed {
        ctx.events()
            .publish_control_plane(AppConfigEvent::Changed.detail_type(), &json!({}))
            .await?;
    }
    if plan.billing_first_time {
        ctx.events()
            .publish_control_plane(BILLING_SYSTEM_SETUP, &json!({ "message": "System Setup" }))
            .await?;
    }
    Ok(saved)
}

/// Hand out upload URLs for database services that have no bootstrap file yet.
async fn presign_bootstrap_urls(ctx: &AppContext, config: &mut AppConfig) -> Result<(), AppError> {
    let needs_url = config.services.values().any(|service| {
        service
            .database
            .as_ref()
            .map_or(false, |db| db.bootstrap_filename.as_deref().map_or(true, str::is_empty))
    });
    if !needs_url {
        return Ok(());
    }
    let bucket = ControlPlaneConfig::require(&ctx.config().resources_bucket, "RESOURCES_BUCKET")?;
    let presigning = PresigningConfig::expires_in(BOOTSTRAP_URL_EXPIRY)
        .map_err(|e| AppError::S3(e.to_string()))?;
    for (name, service) in config.services.iter_mut() {
        let Some(database) = service.database.as_mut() else {
            continue;
        };
        if database.bootstrap_filename.as_deref().map_or(false, |f| !f.is_empty()) {
            continue;
        }
        let request = ctx
            .s3()
            .put_object()
            .bucket(bucket)
            .key(bootstrap_key(name))
            .presigned(presigning.clone())
            .await
            .map_err(|e| {
                error!(service = %name, "s3 presign failed: {e}");
                AppError::S3(e.to_string())
            })?;
        database.bootstrap_url = Some(request.uri().to_string());
    }
    Ok(())
}

pub async fn delete_app_config(ctx: &AppContext) -> Result<(), AppError> {
    let store = ctx.app_config_store();
    let existing = store.get_app_config().await?;
    store.delete_app_config(&existing).await
}
