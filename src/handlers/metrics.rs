use lambda_http::{http::StatusCode, Body, Request};
use serde_json::json;
use tracing::{error, info};

use super::{json_response, ok, parse_body, HandlerResult};
use crate::{
    context::AppContext,
    error::AppError,
    metrics::{
        access_logs::{access_metrics_signed_urls, query_access_logs},
        ingest,
        query::run_query,
        AccessLogMetric, MetricQuery, TimeRange,
    },
};

/// Dashboard query; any failure is reported back as a 404 with its message.
pub(super) async fn query(ctx: &AppContext, event: &Request) -> HandlerResult {
    let query: MetricQuery = parse_body(event, "Invalid request body")?;
    match run_query(ctx, &query).await {
        Ok(result) => ok(result),
        Err(e) => {
            error!(category = e.category(), "metrics query failed: {e}");
            Ok(json_response(
                StatusCode::NOT_FOUND,
                json!({ "message": e.to_string() }),
            ))
        }
    }
}

/// `alb/{metric}/{timeRange}[/{tenantId}]`
pub(super) async fn access_logs(ctx: &AppContext, params: &[&str]) -> HandlerResult {
    let (metric, range, tenant_id) = match params {
        [metric, range] => (*metric, *range, None),
        [metric, range, tenant_id] => (*metric, *range, Some(*tenant_id)),
        _ => {
            return Err(AppError::Validation(
                "Must specify timeRange and metric parameters!".into(),
            ))
        }
    };
    let range: TimeRange = range
        .parse()
        .map_err(|_| AppError::Validation("Invalid value for timeRange!".into()))?;
    let metric: AccessLogMetric = metric.parse()?;
    ok(query_access_logs(ctx, range, metric, tenant_id).await?)
}

pub(super) async fn datasets(ctx: &AppContext) -> HandlerResult {
    ok(access_metrics_signed_urls(ctx).await?)
}

pub(super) async fn put_metrics(ctx: &AppContext, event: &Request) -> HandlerResult {
    let body = match event.body() {
        Body::Text(text) => text.as_str(),
        Body::Binary(bytes) => std::str::from_utf8(bytes).unwrap_or_default(),
        Body::Empty => "",
    };
    let metrics = ingest::parse_metrics(body)?;
    ingest::put_metrics(ctx, &metrics).await?;
    info!(count = metrics.len(), "accepted metrics");
    Ok(json_response(StatusCode::CREATED, json!({})))
}
