use serde_json::{json, Value};
use tracing::{error, info};

use super::model::{AppConfig, Compute};
use crate::{
    context::AppContext,
    error::AppError,
    events::{validate_event, AppConfigEvent, BusEvent, EVENT_SOURCE},
};

const S3_SOURCE: &str = "aws.s3";

/// Apply infrastructure changes reported back by the provisioning stacks.
pub async fn handle_app_config_event(ctx: &AppContext, event: &BusEvent) -> Result<(), AppError> {
    match (event.source.as_str(), AppConfigEvent::from_detail_type(&event.detail_type)) {
        (EVENT_SOURCE, Some(AppConfigEvent::ResourceChanged)) => {
            on_resource_changed(ctx, &event.detail).await
        }
        (EVENT_SOURCE, Some(_)) => {
            info!(detail_type = %event.detail_type, "ignoring app config event");
            Ok(())
        }
        (S3_SOURCE, _) => on_bootstrap_uploaded(ctx, event).await,
        _ => Err(AppError::Validation(format!(
            "Can't find app config event for detail-type {}",
            event.detail_type
        ))),
    }
}

/// Merge container repos, bucket names and the hosted zone reported in `detail`.
///
/// Returns true when anything changed.
pub fn merge_resource_changes(existing: &mut AppConfig, detail: &Value) -> Result<bool, AppError> {
    let changed: AppConfig = serde_json::from_value(detail.clone())?;
    let mut update = false;

    if let Some(zone) = changed.hosted_zone.filter(|zone| !zone.is_empty()) {
        if existing.hosted_zone.as_deref() != Some(zone.as_str()) {
            info!(%zone, "updating hosted zone");
            existing.hosted_zone = Some(zone);
            update = true;
        }
    }

    for (name, changed_service) in changed.services {
        let Some(service) = existing.services.get_mut(&name) else {
            error!(service = %name, "can't find app config service");
            continue;
        };
        if let (Some(Compute::Ecs(compute)), Some(Compute::Ecs(changed_compute))) =
            (service.compute.as_mut(), changed_service.compute.as_ref())
        {
            if compute.container_repo != changed_compute.container_repo {
                info!(service = %name, repo = ?changed_compute.container_repo, "updating container repo");
                compute.container_repo = changed_compute.container_repo.clone();
                update = true;
            }
        }
        if let (Some(storage), Some(changed_storage)) = (service.s3.as_mut(), changed_service.s3) {
            if *storage != changed_storage {
                *storage = changed_storage;
                update = true;
            }
        }
    }
    Ok(update)
}

async fn on_resource_changed(ctx: &AppContext, detail: &Value) -> Result<(), AppError> {
    let store = ctx.app_config_store();
    let mut config = store.get_app_config().await?;
    if !merge_resource_changes(&mut config, detail)? {
        info!("no app config changes to process");
        return Ok(());
    }
    store.set_app_config(&config).await?;
    if !ctx.tenants().get_provisioned_tenants().await?.is_empty() {
        info!("updated app config with provisioned tenants");
        ctx.events()
            .publish_control_plane(AppConfigEvent::UpdateCompleted.detail_type(), &json!({}))
            .await?;
    }
    Ok(())
}

/// Service name from a `services/{name}/bootstrap.sql` key.
pub fn service_from_bootstrap_key(key: &str) -> Option<&str> {
    key.strip_prefix("services/")?
        .strip_suffix("/bootstrap.sql")
        .filter(|name| !name.is_empty() && !name.contains('/'))
}

async fn on_bootstrap_uploaded(ctx: &AppContext, event: &BusEvent) -> Result<(), AppError> {
    validate_event(event, &["bucket", "object"])?;
    let bucket = event.detail.pointer("/bucket/name").and_then(Value::as_str);
    let key = event
        .detail
        .pointer("/object/key")
        .and_then(Value::as_str)
        .unwrap_or_default();
    info!(?bucket, %key, "processing resources bucket upload");
    let service_name = service_from_bootstrap_key(key)
        .ok_or_else(|| AppError::Validation(format!("Unexpected resources object key {key}")))?;

    let store = ctx.app_config_store();
    let config = store.get_app_config().await?;
    let mut service = config
        .services
        .get(service_name)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("No app config service {service_name}")))?;
    let database = service.database.as_mut().ok_or_else(|| {
        AppError::Validation(format!("Service {service_name} has no database"))
    })?;
    database.bootstrap_filename = Some(key.to_string());
    info!(service = %service_name, "saving bootstrap file");
    store.set_service_config(&service).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appconfig::model::{EcsCompute, S3Storage, ServiceConfig};

    fn existing() -> AppConfig {
        let mut config = AppConfig {
            name: Some("demo".into()),
            hosted_zone: Some("Z1".into()),
            ..Default::default()
        };
        config.services.insert(
            "api".into(),
            ServiceConfig {
                name: "api".into(),
                compute: Some(Compute::Ecs(EcsCompute::default())),
                s3: Some(S3Storage::default()),
                ..Default::default()
            },
        );
        config
    }

    #[test]
    fn merges_repo_bucket_and_zone() {
        let mut config = existing();
        let detail = json!({
            "hostedZone": "Z2",
            "services": {
                "api": {
                    "name": "api",
                    "compute": {"type": "ECS", "containerRepo": "repo/api"},
                    "s3": {"bucketName": "tenant-bucket"}
                },
                "missing": {"name": "missing"}
            }
        });
        assert!(merge_resource_changes(&mut config, &detail).unwrap());
        assert_eq!(config.hosted_zone.as_deref(), Some("Z2"));
        let api = &config.services["api"];
        let Some(Compute::Ecs(compute)) = &api.compute else {
            panic!("expected ECS compute");
        };
        assert_eq!(compute.container_repo.as_deref(), Some("repo/api"));
        assert_eq!(
            api.s3.as_ref().and_then(|s3| s3.bucket_name.as_deref()),
            Some("tenant-bucket")
        );
        assert!(!config.services.contains_key("missing"));
    }

    #[test]
    fn unchanged_detail_is_a_no_op() {
        let mut config = existing();
        let detail = json!({"hostedZone": "Z1", "services": {}});
        assert!(!merge_resource_changes(&mut config, &detail).unwrap());
        assert_eq!(config, existing());
    }

    #[test]
    fn bootstrap_keys_name_the_service() {
        assert_eq!(service_from_bootstrap_key("services/api/bootstrap.sql"), Some("api"));
        assert_eq!(service_from_bootstrap_key("services//bootstrap.sql"), None);
        assert_eq!(service_from_bootstrap_key("datasets/x.js"), None);
    }
}
