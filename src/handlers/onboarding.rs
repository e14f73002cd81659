use std::time::Duration;

use aws_sdk_s3::presigning::PresigningConfig;
use lambda_http::Request;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{ok, parse_body, parse_id, HandlerResult};
use crate::{
    context::AppContext,
    error::AppError,
    events::OnboardingEvent,
    onboarding::{Onboarding, OnboardingRequest, OnboardingStatus},
};

const ZIP_UPLOAD_EXPIRY: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Deserialize)]
struct StatusUpdate {
    #[serde(default)]
    id: Option<Uuid>,
    #[serde(default)]
    status: Option<String>,
}

pub(super) async fn list(ctx: &AppContext) -> HandlerResult {
    ok(ctx.onboarding().get_onboardings().await?)
}

pub(super) async fn get(ctx: &AppContext, id: &str) -> HandlerResult {
    let id = parse_id(id)?;
    let onboarding = ctx
        .onboarding()
        .get_onboarding(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No onboarding record for id {id}")))?;
    ok(onboarding)
}

/// Whether another tenant already owns `subdomain` (case-insensitive).
async fn subdomain_in_use(ctx: &AppContext, subdomain: &str) -> Result<bool, AppError> {
    Ok(ctx
        .tenants()
        .get_all_tenants()
        .await?
        .iter()
        .filter_map(|tenant| tenant.subdomain.as_deref())
        .any(|existing| existing.eq_ignore_ascii_case(subdomain)))
}

/// Presigned PUT for the tenant's optional config archive.
async fn zip_upload_url(ctx: &AppContext, id: Uuid) -> Result<Option<String>, AppError> {
    let Some(bucket) = ctx.config().resources_bucket.as_deref() else {
        return Ok(None);
    };
    let presigning =
        PresigningConfig::expires_in(ZIP_UPLOAD_EXPIRY).map_err(|e| AppError::S3(e.to_string()))?;
    let request = ctx
        .s3()
        .put_object()
        .bucket(bucket)
        .key(format!("temp/{id}.zip"))
        .presigned(presigning)
        .await
        .map_err(|e| AppError::S3(e.to_string()))?;
    Ok(Some(request.uri().to_string()))
}

pub(super) async fn start(ctx: &AppContext, event: &Request) -> HandlerResult {
    let request: OnboardingRequest = parse_body(event, "Invalid Json in Request.")?;
    if request
        .name
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .is_empty()
    {
        return Err(AppError::Validation("Tenant name is required.".into()));
    }
    if let Some(subdomain) = request.subdomain.as_deref().filter(|s| !s.trim().is_empty()) {
        if subdomain_in_use(ctx, subdomain).await? {
            return Err(AppError::Validation(format!(
                "Tenant subdomain {subdomain} is already in use."
            )));
        }
    }

    let dal = ctx.onboarding();
    let mut onboarding = dal.insert_onboarding(Onboarding::new(request)).await?;
    if let Some(id) = onboarding.id {
        if let Some(url) = zip_upload_url(ctx, id).await? {
            onboarding.zip_file = Some(url);
            onboarding = dal.update_onboarding(onboarding).await?;
        }
        info!(onboarding_id = %id, "created onboarding request");
        ctx.events()
            .publish_control_plane(
                OnboardingEvent::Created.detail_type(),
                &json!({ "onboardingId": id }),
            )
            .await?;
    }
    ok(onboarding)
}

pub(super) async fn update_status(ctx: &AppContext, id: &str, event: &Request) -> HandlerResult {
    let id = parse_id(id)?;
    let update: StatusUpdate = parse_body(event, "Invalid request body")?;
    if update.id != Some(id) {
        return Err(AppError::Validation(
            "Resource id does not match request body id.".into(),
        ));
    }
    let status: OnboardingStatus = update
        .status
        .as_deref()
        .ok_or_else(|| AppError::Validation("Missing onboarding status.".into()))?
        .parse()?;
    ok(ctx.onboarding().update_status(id, status).await?)
}
