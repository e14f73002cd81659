//! Routes bus events to the service that owns them.

use serde_json::Value;
use tracing::{info, warn};

use crate::{
    appconfig::handle_app_config_event,
    context::AppContext,
    error::AppError,
    events::{AppConfigEvent, BusEvent, OnboardingEvent, EVENT_SOURCE, TENANT_RESOURCES_UPDATED},
    onboarding::handle_onboarding_event,
    tenant::handle_tenant_event,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listener {
    AppConfig,
    Tenant,
    Onboarding,
}

/// Which listener handles `event`, if any.
pub fn listener_for(event: &BusEvent) -> Option<Listener> {
    match event.source.as_str() {
        "aws.s3" => Some(Listener::AppConfig),
        "aws.codepipeline" | "aws.cloudformation" => Some(Listener::Onboarding),
        EVENT_SOURCE if AppConfigEvent::from_detail_type(&event.detail_type).is_some() => {
            Some(Listener::AppConfig)
        }
        EVENT_SOURCE if event.detail_type == TENANT_RESOURCES_UPDATED => Some(Listener::Tenant),
        EVENT_SOURCE
            if OnboardingEvent::from_detail_type(&event.detail_type)
                == Some(OnboardingEvent::StateChanged) =>
        {
            Some(Listener::Onboarding)
        }
        _ => None,
    }
}

/// Handle one raw EventBridge event. Unknown events are errors so the
/// delivery ends up on the rule's dead-letter queue.
pub async fn handle_bus_event(ctx: &AppContext, raw: Value) -> Result<(), AppError> {
    let event = BusEvent::from_value(raw)?;
    let Some(listener) = listener_for(&event) else {
        warn!(source = %event.source, detail_type = %event.detail_type, "unroutable event");
        return Err(AppError::Validation(format!(
            "No listener for event `{}` from `{}`",
            event.detail_type, event.source
        )));
    };
    info!(?listener, detail_type = %event.detail_type, "dispatching event");
    match listener {
        Listener::AppConfig => handle_app_config_event(ctx, &event).await,
        Listener::Tenant => handle_tenant_event(&ctx.tenants(), &event).await,
        Listener::Onboarding => {
            handle_onboarding_event(&ctx.onboarding(), ctx.events(), &event).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(source: &str, detail_type: &str) -> BusEvent {
        BusEvent::from_value(json!({ "source": source, "detail-type": detail_type, "detail": {} }))
            .unwrap()
    }

    #[test]
    fn events_route_to_their_owner() {
        assert_eq!(
            listener_for(&event("aws.s3", "Object Created")),
            Some(Listener::AppConfig)
        );
        assert_eq!(
            listener_for(&event(EVENT_SOURCE, "Application Configuration Resource Changed")),
            Some(Listener::AppConfig)
        );
        assert_eq!(
            listener_for(&event(EVENT_SOURCE, TENANT_RESOURCES_UPDATED)),
            Some(Listener::Tenant)
        );
        assert_eq!(
            listener_for(&event("aws.cloudformation", "CloudFormation Stack Status Change")),
            Some(Listener::Onboarding)
        );
        assert_eq!(
            listener_for(&event(EVENT_SOURCE, "Onboarding request state changed")),
            Some(Listener::Onboarding)
        );
        assert_eq!(listener_for(&event(EVENT_SOURCE, "Tenant Enabled")), None);
    }
}
