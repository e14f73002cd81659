use std::collections::HashMap;

use serde_json::Value;
use tracing::{info, warn};

use super::{model::Resource, TenantDal};
use crate::{
    error::AppError,
    events::{tenant_id_from_event, BusEvent, EVENT_SOURCE, TENANT_RESOURCES_UPDATED},
};

/// Apply a tenant event delivered by the bus.
pub async fn handle_tenant_event(dal: &TenantDal, event: &BusEvent) -> Result<(), AppError> {
    if event.source != EVENT_SOURCE || event.detail_type != TENANT_RESOURCES_UPDATED {
        warn!(source = %event.source, detail_type = %event.detail_type, "unknown tenant event");
        return Err(AppError::Validation(format!(
            "unknown tenant event `{}`",
            event.detail_type
        )));
    }
    let tenant_id = tenant_id_from_event(event, &["tenantId", "resources"])?;
    let resources = parse_resources(&event.detail["resources"])?;

    info!(%tenant_id, count = resources.len(), "merging tenant resources");
    dal.update_tenant_resources(tenant_id, resources).await?;
    Ok(())
}

/// `resources` arrives as a JSON document serialized into a string.
fn parse_resources(raw: &Value) -> Result<HashMap<String, Resource>, AppError> {
    match raw {
        Value::String(text) => Ok(serde_json::from_str(text)?),
        Value::Object(_) => Ok(serde_json::from_value(raw.clone())?),
        _ => Err(AppError::Validation(
            "event detail `resources` must be a JSON string".into(),
        )),
    }
}
