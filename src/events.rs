//! Event bus plumbing: publishing control-plane events and validating the
//! ones delivered to the event listeners.

use std::sync::{Arc, Mutex, PoisonError};

use aws_sdk_eventbridge::types::PutEventsRequestEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;

/// Source attached to every event this crate publishes.
pub const EVENT_SOURCE: &str = "saas-boost";

pub const TENANT_UPDATED: &str = "Tenant Updated";
pub const TENANT_RESOURCES_UPDATED: &str = "Tenant Resources Updated";
pub const BILLING_SYSTEM_SETUP: &str = "Billing System Setup";
pub const SYSTEM_API_CALL: &str = "System API Call";

/// Detail types of the application configuration events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppConfigEvent {
    Changed,
    ResourceChanged,
    UpdateCompleted,
}

impl AppConfigEvent {
    pub fn detail_type(&self) -> &'static str {
        match self {
            AppConfigEvent::Changed => "Application Configuration Changed",
            AppConfigEvent::ResourceChanged => "Application Configuration Resource Changed",
            AppConfigEvent::UpdateCompleted => "App Config Update Completed",
        }
    }

    pub fn from_detail_type(detail_type: &str) -> Option<Self> {
        [
            AppConfigEvent::Changed,
            AppConfigEvent::ResourceChanged,
            AppConfigEvent::UpdateCompleted,
        ]
        .into_iter()
        .find(|event| event.detail_type() == detail_type)
    }
}

/// Detail types of the tenant lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantEvent {
    OnboardingStatusChanged,
    ResourcesChanged,
    HostnameChanged,
    TierChanged,
    Enabled,
    Disabled,
    Deleted,
}

impl TenantEvent {
    pub fn detail_type(&self) -> &'static str {
        match self {
            TenantEvent::OnboardingStatusChanged => "Tenant Onboarding Status Changed",
            TenantEvent::ResourcesChanged => "Tenant Resources Changed",
            TenantEvent::HostnameChanged => "Tenant Hostname Changed",
            TenantEvent::TierChanged => "Tenant Tier Changed",
            TenantEvent::Enabled => "Tenant Enabled",
            TenantEvent::Disabled => "Tenant Disabled",
            TenantEvent::Deleted => "Tenant Deleted",
        }
    }

    pub fn from_detail_type(detail_type: &str) -> Option<Self> {
        [
            TenantEvent::OnboardingStatusChanged,
            TenantEvent::ResourcesChanged,
            TenantEvent::HostnameChanged,
            TenantEvent::TierChanged,
            TenantEvent::Enabled,
            TenantEvent::Disabled,
            TenantEvent::Deleted,
        ]
        .into_iter()
        .find(|event| event.detail_type() == detail_type)
    }
}

/// Detail types of the onboarding workflow events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingEvent {
    Created,
    Validated,
    Started,
    InProgress,
    Failed,
    Completed,
    StateChanged,
    ValidationFailed,
    CidrAssigned,
    BaseProvisioningStarted,
    BaseProvisioningInProgress,
    BaseProvisioningFailed,
    BaseProvisioningCompleted,
    AppProvisioningStarted,
    AppProvisioningInProgress,
    AppProvisioningFailed,
    AppProvisioningCompleted,
}

impl OnboardingEvent {
    const ALL: [OnboardingEvent; 17] = [
        OnboardingEvent::Created,
        OnboardingEvent::Validated,
        OnboardingEvent::Started,
        OnboardingEvent::InProgress,
        OnboardingEvent::Failed,
        OnboardingEvent::Completed,
        OnboardingEvent::StateChanged,
        OnboardingEvent::ValidationFailed,
        OnboardingEvent::CidrAssigned,
        OnboardingEvent::BaseProvisioningStarted,
        OnboardingEvent::BaseProvisioningInProgress,
        OnboardingEvent::BaseProvisioningFailed,
        OnboardingEvent::BaseProvisioningCompleted,
        OnboardingEvent::AppProvisioningStarted,
        OnboardingEvent::AppProvisioningInProgress,
        OnboardingEvent::AppProvisioningFailed,
        OnboardingEvent::AppProvisioningCompleted,
    ];

    pub fn detail_type(&self) -> &'static str {
        match self {
            OnboardingEvent::Created => "Onboarding request created",
            OnboardingEvent::Validated => "Onboarding request validated",
            OnboardingEvent::Started => "Onboarding request started",
            OnboardingEvent::InProgress => "Onboarding request in progress",
            OnboardingEvent::Failed => "Onboarding request failed",
            OnboardingEvent::Completed => "Onboarding request completed",
            OnboardingEvent::StateChanged => "Onboarding request state changed",
            OnboardingEvent::ValidationFailed => "Onboarding request failed validation",
            OnboardingEvent::CidrAssigned => "Tenant CIDR block assigned",
            OnboardingEvent::BaseProvisioningStarted => "Tenant base provisioning started",
            OnboardingEvent::BaseProvisioningInProgress => "Tenant base provisioning in progress",
            OnboardingEvent::BaseProvisioningFailed => "Tenant base provisioning failed",
            OnboardingEvent::BaseProvisioningCompleted => "Tenant base provisioning completed",
            OnboardingEvent::AppProvisioningStarted => "Tenant app service provisioning started",
            OnboardingEvent::AppProvisioningInProgress => {
                "Tenant app service provisioning in progress"
            }
            OnboardingEvent::AppProvisioningFailed => "Tenant app service provisioning failed",
            OnboardingEvent::AppProvisioningCompleted => {
                "Tenant app service provisioning completed"
            }
        }
    }

    pub fn from_detail_type(detail_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|event| event.detail_type() == detail_type)
    }
}

/// An event as delivered by EventBridge to a rule target.
#[derive(Debug, Clone, Deserialize)]
pub struct BusEvent {
    #[serde(default)]
    pub source: String,
    #[serde(rename = "detail-type", default)]
    pub detail_type: String,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub detail: Value,
}

impl BusEvent {
    pub fn from_value(value: Value) -> Result<Self, AppError> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Event captured by [`EventPublisher::Recording`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishedEvent {
    pub source: String,
    pub detail_type: String,
    pub detail: Value,
}

/// Destination for events emitted by the control plane.
#[derive(Clone)]
pub enum EventPublisher {
    EventBridge {
        client: aws_sdk_eventbridge::Client,
        bus: String,
    },
    /// Keeps events in memory; used by tests and local runs.
    Recording(Arc<Mutex<Vec<PublishedEvent>>>),
    Disabled,
}

impl EventPublisher {
    /// Publish to `bus`, or drop events when no bus is configured.
    pub fn new(client: aws_sdk_eventbridge::Client, bus: Option<String>) -> Self {
        match bus {
            Some(bus) => EventPublisher::EventBridge { client, bus },
            None => {
                warn!("SAAS_BOOST_EVENT_BUS not set; control plane events will be dropped");
                EventPublisher::Disabled
            }
        }
    }

    pub fn recording() -> Self {
        EventPublisher::Recording(Arc::new(Mutex::new(Vec::new())))
    }

    /// Events captured so far by a recording publisher.
    pub fn recorded(&self) -> Vec<PublishedEvent> {
        match self {
            EventPublisher::Recording(events) => events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            _ => Vec::new(),
        }
    }

    pub async fn publish(
        &self,
        source: &str,
        detail_type: &str,
        detail: &Value,
    ) -> Result<(), AppError> {
        match self {
            EventPublisher::EventBridge { client, bus } => {
                let entry = PutEventsRequestEntry::builder()
                    .source(source)
                    .detail_type(detail_type)
                    .detail(detail.to_string())
                    .event_bus_name(bus)
                    .build();
                let output = client
                    .put_events()
                    .entries(entry)
                    .send()
                    .await
                    .map_err(|e| AppError::EventBridge(e.to_string()))?;
                if output.failed_entry_count() > 0 {
                    let reason = output
                        .entries()
                        .iter()
                        .filter_map(|entry| entry.error_message())
                        .collect::<Vec<_>>()
                        .join("; ");
                    return Err(AppError::EventBridge(format!(
                        "failed to publish `{detail_type}`: {reason}"
                    )));
                }
                info!(%source, %detail_type, "published event");
                Ok(())
            }
            EventPublisher::Recording(events) => {
                events
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(PublishedEvent {
                        source: source.to_string(),
                        detail_type: detail_type.to_string(),
                        detail: detail.clone(),
                    });
                Ok(())
            }
            EventPublisher::Disabled => {
                info!(%source, %detail_type, "event bus disabled; dropping event");
                Ok(())
            }
        }
    }

    /// Publish with the control plane's own source.
    pub async fn publish_control_plane(
        &self,
        detail_type: &str,
        detail: &Value,
    ) -> Result<(), AppError> {
        self.publish(EVENT_SOURCE, detail_type, detail).await
    }
}

/// Check that an event carries a `detail` object with the given keys.
pub fn validate_event(event: &BusEvent, required_keys: &[&str]) -> Result<(), AppError> {
    let detail = event
        .detail
        .as_object()
        .ok_or_else(|| AppError::Validation("event is missing a detail object".into()))?;
    for key in required_keys {
        if !detail.contains_key(*key) {
            return Err(AppError::Validation(format!(
                "event detail is missing `{key}`"
            )));
        }
    }
    Ok(())
}

/// Validate a tenant event and extract its tenant id.
pub fn tenant_id_from_event(event: &BusEvent, required_keys: &[&str]) -> Result<Uuid, AppError> {
    validate_event(event, required_keys)?;
    let raw = event
        .detail
        .get("tenantId")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Validation("event detail is missing `tenantId`".into()))?;
    Uuid::parse_str(raw)
        .map_err(|_| AppError::Validation(format!("tenantId `{raw}` is not a UUID")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(detail: Value) -> BusEvent {
        BusEvent::from_value(json!({
            "source": EVENT_SOURCE,
            "detail-type": TENANT_RESOURCES_UPDATED,
            "detail": detail,
        }))
        .expect("event")
    }

    #[test]
    fn detail_types_round_trip() {
        assert_eq!(
            TenantEvent::from_detail_type("Tenant Disabled"),
            Some(TenantEvent::Disabled)
        );
        assert_eq!(
            AppConfigEvent::from_detail_type("Application Configuration Resource Changed"),
            Some(AppConfigEvent::ResourceChanged)
        );
        assert_eq!(
            OnboardingEvent::from_detail_type("Tenant CIDR block assigned"),
            Some(OnboardingEvent::CidrAssigned)
        );
        assert_eq!(OnboardingEvent::from_detail_type("nope"), None);
    }

    #[test]
    fn tenant_events_require_a_uuid() {
        let id = Uuid::new_v4();
        let ok = event(json!({ "tenantId": id.to_string(), "resources": "{}" }));
        assert_eq!(tenant_id_from_event(&ok, &["resources"]).unwrap(), id);

        let missing = event(json!({ "tenantId": id.to_string() }));
        assert!(tenant_id_from_event(&missing, &["resources"]).is_err());

        let bad = event(json!({ "tenantId": "abc", "resources": "{}" }));
        assert!(tenant_id_from_event(&bad, &["resources"]).is_err());

        let no_detail = event(Value::Null);
        assert!(validate_event(&no_detail, &[]).is_err());
    }

    #[tokio::test]
    async fn recording_publisher_keeps_events() {
        let publisher = EventPublisher::recording();
        publisher
            .publish_control_plane(TENANT_UPDATED, &json!({ "tenantId": "t" }))
            .await
            .expect("publish");
        let events = publisher.recorded();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, EVENT_SOURCE);
        assert_eq!(events[0].detail["tenantId"], "t");
    }

    #[tokio::test]
    async fn recording_survives_a_poisoned_lock() {
        let publisher = EventPublisher::recording();
        if let EventPublisher::Recording(events) = &publisher {
            let events = Arc::clone(events);
            let _ = std::thread::spawn(move || {
                let _guard = events.lock().expect("lock");
                panic!("poison the recording lock");
            })
            .join();
        }
        publisher
            .publish_control_plane(TENANT_UPDATED, &json!({ "tenantId": "t" }))
            .await
            .expect("publish");
        assert_eq!(publisher.recorded().len(), 1);
    }
}
