use lambda_http::{Request, RequestExt};
use serde_json::json;
use tracing::info;

use super::{ok, parse_body, HandlerResult};
use crate::{
    context::AppContext,
    error::AppError,
    settings::{is_read_write, Setting},
};

fn not_found(name: &str) -> AppError {
    AppError::NotFound(format!("Setting {name} not found."))
}

/// All settings, or only those named by repeated `setting` query parameters.
pub(super) async fn list(ctx: &AppContext, event: &Request) -> HandlerResult {
    let names: Vec<String> = event
        .query_string_parameters_ref()
        .and_then(|qs| qs.all("setting"))
        .map(|names| names.into_iter().map(str::to_string).collect())
        .unwrap_or_default();
    let store = ctx.parameter_store();
    if names.is_empty() {
        ok(store.get_all_settings().await?)
    } else {
        ok(store.get_named_settings(&names).await?)
    }
}

pub(super) async fn get(ctx: &AppContext, name: &str) -> HandlerResult {
    let setting = ctx
        .parameter_store()
        .get_setting(name, false)
        .await?
        .ok_or_else(|| not_found(name))?;
    ok(setting)
}

pub(super) async fn secret(ctx: &AppContext, name: &str) -> HandlerResult {
    let setting = ctx
        .parameter_store()
        .get_secret(name)
        .await?
        .ok_or_else(|| not_found(name))?;
    ok(setting)
}

pub(super) async fn reference(ctx: &AppContext, name: &str) -> HandlerResult {
    let reference = ctx
        .parameter_store()
        .get_parameter_store_reference(name)
        .await?
        .ok_or_else(|| not_found(name))?;
    ok(json!({ "reference-key": reference }))
}

pub(super) async fn update(ctx: &AppContext, name: &str, event: &Request) -> HandlerResult {
    let setting: Setting = parse_body(event, "Empty request body.")?;
    if setting.name != name {
        return Err(AppError::Validation("Invalid resource for setting.".into()));
    }
    if !is_read_write(name) {
        return Err(AppError::Validation(format!(
            "Can't modify immutable setting {name}."
        )));
    }
    info!(%name, "updating setting");
    ok(ctx.parameter_store().update_setting(&setting).await?)
}
