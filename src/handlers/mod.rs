//! HTTP routing for the API Gateway facing Lambda.

mod appconfig;
mod metrics;
mod onboarding;
mod settings;
mod tenants;

use std::sync::Arc;

use lambda_http::{
    http::{Method, StatusCode},
    Body, Error as LambdaError, Request, RequestPayloadExt, Response,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tracing::{error, warn};
use uuid::Uuid;

use crate::{
    context::AppContext,
    error::{lambda_error, AppError},
};

type HandlerResult = Result<Response<Body>, AppError>;

/// Top-level request dispatcher used by the Lambda runtime.
pub async fn handle_request(
    ctx: Arc<AppContext>,
    event: Request,
) -> Result<Response<Body>, LambdaError> {
    let ctx = ctx.as_ref();
    let method = event.method().clone();
    let path = event.uri().path().trim_matches('/').to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let result = match (method, segments.as_slice()) {
        (Method::GET, ["settings"]) => settings::list(ctx, &event).await,
        (Method::GET, ["settings", "config"]) => appconfig::get(ctx).await,
        (Method::PUT, ["settings", "config"]) => appconfig::update(ctx, &event).await,
        (Method::DELETE, ["settings", "config"]) => appconfig::delete(ctx).await,
        (Method::GET, ["settings", "options"]) => appconfig::options(ctx).await,
        (Method::GET, ["settings", name]) => settings::get(ctx, name).await,
        (Method::GET, ["settings", name, "secret"]) => settings::secret(ctx, name).await,
        (Method::GET, ["settings", name, "ref"]) => settings::reference(ctx, name).await,
        (Method::PUT, ["settings", name]) => settings::update(ctx, name, &event).await,

        (Method::GET, ["tenants"]) => tenants::list(ctx, &event).await,
        (Method::GET, ["tenants", "provisioned"]) => tenants::provisioned(ctx).await,
        (Method::POST, ["tenants"]) => tenants::insert(ctx, &event).await,
        (Method::GET, ["tenants", id]) => tenants::get(ctx, id).await,
        (Method::PUT, ["tenants", id]) => tenants::update(ctx, id, &event).await,
        (Method::PUT, ["tenants", id, "onboarding"]) => {
            tenants::update_onboarding_status(ctx, id, &event).await
        }
        (Method::PATCH, ["tenants", id, "enable"]) => tenants::set_active(ctx, id, true).await,
        (Method::PATCH, ["tenants", id, "disable"]) => tenants::set_active(ctx, id, false).await,
        (Method::DELETE, ["tenants", id]) => tenants::delete(ctx, id, &event).await,

        (Method::GET, ["onboarding"]) => onboarding::list(ctx).await,
        (Method::POST, ["onboarding"]) => onboarding::start(ctx, &event).await,
        (Method::GET, ["onboarding", id]) => onboarding::get(ctx, id).await,
        (Method::PUT, ["onboarding", id, "status"]) => {
            onboarding::update_status(ctx, id, &event).await
        }

        (Method::POST, ["metrics"]) => metrics::put_metrics(ctx, &event).await,
        (Method::POST, ["metrics", "query"]) => metrics::query(ctx, &event).await,
        (Method::GET, ["metrics", "datasets"]) => metrics::datasets(ctx).await,
        (Method::GET, ["metrics", "alb", rest @ ..]) => metrics::access_logs(ctx, rest).await,

        _ => Ok(json_response(
            StatusCode::NOT_FOUND,
            json!({ "message": "Unsupported route" }),
        )),
    };
    respond(result)
}

/// Client errors become JSON messages; everything else goes to the runtime.
fn respond(result: HandlerResult) -> Result<Response<Body>, LambdaError> {
    match result {
        Ok(response) => Ok(response),
        Err(AppError::Validation(message)) => Ok(json_response(
            StatusCode::BAD_REQUEST,
            json!({ "message": message }),
        )),
        Err(AppError::NotFound(message)) => Ok(json_response(
            StatusCode::NOT_FOUND,
            json!({ "message": message }),
        )),
        Err(e) => Err(lambda_error(e)),
    }
}

/// Deserialize the JSON body or fail with `message`.
fn parse_body<T: DeserializeOwned>(event: &Request, message: &str) -> Result<T, AppError> {
    match event.payload::<T>() {
        Ok(Some(payload)) => Ok(payload),
        Ok(None) => Err(AppError::Validation(message.to_string())),
        Err(e) => {
            warn!("failed to parse payload: {e:?}");
            Err(AppError::Validation(message.to_string()))
        }
    }
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::Validation(format!("Invalid id {raw}")))
}

fn ok<T: Serialize>(value: T) -> HandlerResult {
    Ok(json_response(StatusCode::OK, value))
}

fn json_response<T: Serialize>(status: StatusCode, value: T) -> Response<Body> {
    let body = serde_json::to_string(&value).unwrap_or_else(|_| "{}".into());

    if status.is_server_error() {
        error!(
            http_status = status.as_u16(),
            body = %body,
            "returning server error response"
        );
    } else if status.is_client_error() {
        warn!(
            http_status = status.as_u16(),
            body = %body,
            "returning client error response"
        );
    }

    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::Text(body))
        .expect("failed to build response")
}

fn empty_response(status: StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::Empty)
        .expect("failed to build response")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn json_response_sets_content_type() {
        let response = json_response(StatusCode::OK, json!({ "ok": true }));
        assert_eq!(response.status(), StatusCode::OK);
        let header = response.headers().get("content-type").unwrap();
        assert_eq!(header, "application/json");
    }

    #[test]
    fn client_errors_become_messages() {
        let response = respond(Err(AppError::Validation("Tenant name is required.".into()))).unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        match response.body() {
            Body::Text(text) => assert!(text.contains("Tenant name is required.")),
            other => panic!("unexpected body {other:?}"),
        }
        let response = respond(Err(AppError::NotFound("gone".into()))).unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(respond(Err(AppError::Dynamo("boom".into()))).is_err());
    }

    #[test]
    fn ids_must_be_uuids() {
        assert!(parse_id("not-a-uuid").is_err());
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
    }
}
