use lambda_http::{Request, RequestExt};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{ok, parse_body, parse_id, HandlerResult};
use crate::{
    context::AppContext,
    error::AppError,
    events::{TenantEvent, TENANT_UPDATED},
    tenant::Tenant,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OnboardingStatusUpdate {
    #[serde(default)]
    id: Option<Uuid>,
    #[serde(default)]
    onboarding_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TenantRef {
    #[serde(default)]
    id: Option<Uuid>,
}

fn tenant_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("No tenant with id {id}"))
}

fn ensure_same_id(path_id: Uuid, body_id: Option<Uuid>) -> Result<(), AppError> {
    if body_id != Some(path_id) {
        return Err(AppError::Validation(
            "Resource id does not match request body id.".into(),
        ));
    }
    Ok(())
}

/// `?status=provisioned` narrows the listing to provisioned tenants.
pub(super) async fn list(ctx: &AppContext, event: &Request) -> HandlerResult {
    let provisioned_only = event
        .query_string_parameters_ref()
        .and_then(|qs| qs.first("status"))
        .map(|status| status.eq_ignore_ascii_case("provisioned"))
        .unwrap_or(false);
    if provisioned_only {
        return provisioned(ctx).await;
    }
    ok(ctx.tenants().get_all_tenants().await?)
}

pub(super) async fn provisioned(ctx: &AppContext) -> HandlerResult {
    ok(ctx.tenants().get_provisioned_tenants().await?)
}

pub(super) async fn get(ctx: &AppContext, id: &str) -> HandlerResult {
    let id = parse_id(id)?;
    let tenant = ctx
        .tenants()
        .get_tenant(id)
        .await?
        .ok_or_else(|| tenant_not_found(id))?;
    ok(tenant)
}

pub(super) async fn insert(ctx: &AppContext, event: &Request) -> HandlerResult {
    let tenant: Tenant = parse_body(event, "Invalid request body")?;
    let tenant = ctx.tenants().insert_tenant(tenant).await?;
    info!(tenant_id = ?tenant.id, "inserted tenant");
    ok(tenant)
}

pub(super) async fn update(ctx: &AppContext, id: &str, event: &Request) -> HandlerResult {
    let id = parse_id(id)?;
    let tenant: Tenant = parse_body(event, "Invalid request body")?;
    ensure_same_id(id, tenant.id)?;
    let dal = ctx.tenants();
    let existing = dal.get_tenant(id).await?.ok_or_else(|| tenant_not_found(id))?;
    let updated = dal.update_tenant(tenant).await?;
    if existing.is_provisioned() {
        ctx.events()
            .publish_control_plane(TENANT_UPDATED, &json!({ "tenantId": id }))
            .await?;
    }
    ok(updated)
}

pub(super) async fn update_onboarding_status(
    ctx: &AppContext,
    id: &str,
    event: &Request,
) -> HandlerResult {
    let id = parse_id(id)?;
    let update: OnboardingStatusUpdate = parse_body(event, "Invalid request body")?;
    ensure_same_id(id, update.id)?;
    let status = update
        .onboarding_status
        .filter(|status| !status.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Missing onboarding status.".into()))?;
    let tenant = ctx
        .tenants()
        .update_tenant_onboarding_status(id, &status)
        .await?;
    ctx.events()
        .publish_control_plane(
            TenantEvent::OnboardingStatusChanged.detail_type(),
            &json!({ "tenantId": id, "onboardingStatus": status }),
        )
        .await?;
    ok(tenant)
}

pub(super) async fn set_active(ctx: &AppContext, id: &str, active: bool) -> HandlerResult {
    let id = parse_id(id)?;
    let dal = ctx.tenants();
    if dal.get_tenant(id).await?.is_none() {
        return Err(tenant_not_found(id));
    }
    let (tenant, event) = if active {
        (dal.enable_tenant(id).await?, TenantEvent::Enabled)
    } else {
        (dal.disable_tenant(id).await?, TenantEvent::Disabled)
    };
    ctx.events()
        .publish_control_plane(event.detail_type(), &json!({ "tenantId": id }))
        .await?;
    ok(tenant)
}

/// Announce the deletion so provisioned resources are torn down, then
/// disable the tenant record.
pub(super) async fn delete(ctx: &AppContext, id: &str, event: &Request) -> HandlerResult {
    let id = parse_id(id)?;
    let body: TenantRef = parse_body(event, "Invalid request body")?;
    ensure_same_id(id, body.id)?;
    let dal = ctx.tenants();
    if dal.get_tenant(id).await?.is_none() {
        return Err(tenant_not_found(id));
    }
    ctx.events()
        .publish_control_plane(TenantEvent::Deleted.detail_type(), &json!({ "tenantId": id }))
        .await?;
    ok(dal.disable_tenant(id).await?)
}
