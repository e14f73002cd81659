use serde_json::{json, Value};
use tracing::{info, warn};

use super::{
    dal::OnboardingDal,
    model::{Onboarding, OnboardingStatus},
};
use crate::{
    error::AppError,
    events::{validate_event, BusEvent, EventPublisher, OnboardingEvent, EVENT_SOURCE, SYSTEM_API_CALL},
};

const CODEPIPELINE_SOURCE: &str = "aws.codepipeline";
const CLOUDFORMATION_SOURCE: &str = "aws.cloudformation";
const PIPELINE_PREFIX: &str = "tenant-";

fn pipeline_status(state: &str) -> Option<OnboardingStatus> {
    match state {
        "STARTED" => Some(OnboardingStatus::Deploying),
        "FAILED" | "CANCELED" => Some(OnboardingStatus::Failed),
        "SUCCEEDED" => Some(OnboardingStatus::Deployed),
        _ => None,
    }
}

fn detail_str<'a>(detail: &'a Value, pointer: &str) -> Option<&'a str> {
    detail.pointer(pointer).and_then(Value::as_str)
}

/// Track stack and pipeline progress for onboarding records.
///
/// Returns the onboarding record that was touched, if any.
pub async fn handle_onboarding_event(
    dal: &OnboardingDal,
    events: &EventPublisher,
    event: &BusEvent,
) -> Result<Option<Onboarding>, AppError> {
    match event.source.as_str() {
        CODEPIPELINE_SOURCE => on_pipeline_state_change(dal, events, event).await,
        CLOUDFORMATION_SOURCE => on_stack_status_change(dal, events, event).await,
        EVENT_SOURCE
            if OnboardingEvent::from_detail_type(&event.detail_type)
                == Some(OnboardingEvent::StateChanged) =>
        {
            on_onboarding_state_change(dal, events, event).await
        }
        _ => Err(AppError::Validation(format!(
            "Unknown onboarding event `{}` from `{}`",
            event.detail_type, event.source
        ))),
    }
}

async fn on_pipeline_state_change(
    dal: &OnboardingDal,
    events: &EventPublisher,
    event: &BusEvent,
) -> Result<Option<Onboarding>, AppError> {
    validate_event(event, &["pipeline", "state"])?;
    let pipeline = detail_str(&event.detail, "/pipeline").unwrap_or_default();
    let state = detail_str(&event.detail, "/state").unwrap_or_default();
    let Some(short_id) = pipeline.strip_prefix(PIPELINE_PREFIX) else {
        info!(%pipeline, "ignoring pipeline outside the tenant namespace");
        return Ok(None);
    };
    let Some(mut onboarding) = dal.get_onboarding_by_tenant_id(short_id).await? else {
        warn!(%pipeline, "no onboarding record for pipeline");
        return Ok(None);
    };
    for stack in onboarding
        .stacks
        .iter_mut()
        .filter(|stack| stack.pipeline.as_deref() == Some(pipeline))
    {
        stack.pipeline_status = Some(state.to_string());
    }
    let status = pipeline_status(state);
    apply_status(dal, events, onboarding.clone(), status).await.map(Some)
}

async fn on_stack_status_change(
    dal: &OnboardingDal,
    events: &EventPublisher,
    event: &BusEvent,
) -> Result<Option<Onboarding>, AppError> {
    validate_event(event, &["stack-id", "status-details"])?;
    let stack_id = detail_str(&event.detail, "/stack-id").unwrap_or_default();
    let stack_status = detail_str(&event.detail, "/status-details/status").unwrap_or_default();
    let onboardings = dal.get_onboardings().await?;
    let Some(mut onboarding) = onboardings.into_iter().find(|onboarding| {
        onboarding
            .stacks
            .iter()
            .any(|stack| stack.arn.as_deref() == Some(stack_id))
    }) else {
        info!(%stack_id, "stack does not belong to an onboarding");
        return Ok(None);
    };
    for stack in onboarding
        .stacks
        .iter_mut()
        .filter(|stack| stack.arn.as_deref() == Some(stack_id))
    {
        stack.status = Some(stack_status.to_string());
    }
    let status = OnboardingStatus::from_stack_status(stack_status);
    apply_status(dal, events, onboarding, status).await.map(Some)
}

async fn on_onboarding_state_change(
    dal: &OnboardingDal,
    events: &EventPublisher,
    event: &BusEvent,
) -> Result<Option<Onboarding>, AppError> {
    validate_event(event, &["tenantId", "stackStatus"])?;
    let tenant_id = detail_str(&event.detail, "/tenantId").unwrap_or_default();
    let stack_status = detail_str(&event.detail, "/stackStatus").unwrap_or_default();
    let Some(onboarding) = dal.get_onboarding_by_tenant_id(tenant_id).await? else {
        warn!(%tenant_id, "no onboarding record for tenant");
        return Ok(None);
    };
    let status = OnboardingStatus::from_stack_status(stack_status);
    apply_status(dal, events, onboarding, status).await.map(Some)
}

/// Persist the record and, when the status moved, tell the tenant service.
async fn apply_status(
    dal: &OnboardingDal,
    events: &EventPublisher,
    mut onboarding: Onboarding,
    status: Option<OnboardingStatus>,
) -> Result<Onboarding, AppError> {
    let changed = status.is_some() && status != onboarding.status;
    if let Some(status) = status {
        onboarding.status = Some(status);
    }
    let onboarding = dal.update_onboarding(onboarding).await?;
    if !changed {
        return Ok(onboarding);
    }
    let (Some(tenant_id), Some(status)) = (onboarding.tenant_id, onboarding.status) else {
        return Ok(onboarding);
    };
    info!(%tenant_id, %status, "onboarding status changed");
    events
        .publish_control_plane(SYSTEM_API_CALL, &system_api_call(&tenant_id.to_string(), status))
        .await?;
    Ok(onboarding)
}

fn system_api_call(tenant_id: &str, status: OnboardingStatus) -> Value {
    let body = json!({ "id": tenant_id, "onboardingStatus": status });
    json!({
        "resource": format!("tenants/{tenant_id}/onboarding"),
        "method": "PUT",
        "body": body.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_states_map_to_statuses() {
        assert_eq!(pipeline_status("STARTED"), Some(OnboardingStatus::Deploying));
        assert_eq!(pipeline_status("CANCELED"), Some(OnboardingStatus::Failed));
        assert_eq!(pipeline_status("SUCCEEDED"), Some(OnboardingStatus::Deployed));
        assert_eq!(pipeline_status("RESUMED"), None);
    }

    #[test]
    fn system_api_call_targets_tenant_onboarding() {
        let detail = system_api_call("abc", OnboardingStatus::Provisioned);
        assert_eq!(detail["resource"], "tenants/abc/onboarding");
        assert_eq!(detail["method"], "PUT");
        let body: Value = serde_json::from_str(detail["body"].as_str().unwrap()).unwrap();
        assert_eq!(body["onboardingStatus"], "provisioned");
    }
}
