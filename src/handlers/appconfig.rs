use lambda_http::{http::StatusCode, Request};
use tracing::error;

use super::{empty_response, ok, parse_body, HandlerResult};
use crate::{
    appconfig::{service, AppConfig},
    context::AppContext,
    error::AppError,
};

/// The stored config; an empty config when nothing has been saved yet.
pub(super) async fn get(ctx: &AppContext) -> HandlerResult {
    ok(ctx.app_config_store().get_app_config().await?)
}

pub(super) async fn update(ctx: &AppContext, event: &Request) -> HandlerResult {
    let updated: AppConfig = parse_body(event, "Invalid request body.")?;
    ok(service::update_app_config(ctx, updated).await?)
}

pub(super) async fn delete(ctx: &AppContext) -> HandlerResult {
    match service::delete_app_config(ctx).await {
        Ok(()) => Ok(empty_response(StatusCode::NO_CONTENT)),
        Err(e) => {
            error!("failed to delete app config: {e}");
            Err(AppError::Validation(
                "Error deleting application settings.".into(),
            ))
        }
    }
}

pub(super) async fn options(ctx: &AppContext) -> HandlerResult {
    ok(service::get_options(ctx).await?)
}
