//! ALB access-log analytics through Athena, and the precomputed datasets
//! served to the admin console.

use std::{str::FromStr, time::Duration};

use aws_sdk_athena::types::{QueryExecutionContext, QueryExecutionState, ResultConfiguration};
use aws_sdk_s3::{presigning::PresigningConfig, primitives::ByteStream};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{error, info};

use super::{
    model::{round_to, MetricValue},
    query::{tenant_directory, tenant_load_balancer},
    time_range::TimeRange,
};
use crate::{config::ControlPlaneConfig, context::AppContext, error::AppError};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const DATASET_URL_EXPIRY: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLogMetric {
    PathRequestCount,
    PathResponseTime,
}

impl AccessLogMetric {
    pub fn name(&self) -> &'static str {
        match self {
            AccessLogMetric::PathRequestCount => "PATH_REQUEST_COUNT",
            AccessLogMetric::PathResponseTime => "PATH_RESPONSE_TIME",
        }
    }

    fn select(&self) -> &'static str {
        match self {
            AccessLogMetric::PathRequestCount => "count(1) AS request_count",
            AccessLogMetric::PathResponseTime => "avg(target_processing_time) AS avg_target_time",
        }
    }
}

impl FromStr for AccessLogMetric {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PATH_REQUEST_COUNT" => Ok(AccessLogMetric::PathRequestCount),
            "PATH_RESPONSE_TIME" => Ok(AccessLogMetric::PathResponseTime),
            _ => Err(AppError::Validation(
                "Invalid value for metric. Expecting PATH_REQUEST_COUNT or PATH_RESPONSE_TIME!"
                    .into(),
            )),
        }
    }
}

/// Published dataset: console key, S3 object, window and metric.
pub struct Dataset {
    pub key: &'static str,
    pub object: &'static str,
    pub range: TimeRange,
    pub metric: AccessLogMetric,
}

pub const DATASETS: [Dataset; 6] = [
    Dataset {
        key: "PATH_REQUEST_COUNT_1_HOUR_FILE",
        object: "datasets/pathRequestCount01Hour.js",
        range: TimeRange::Hour1,
        metric: AccessLogMetric::PathRequestCount,
    },
    Dataset {
        key: "PATH_REQUEST_COUNT_24_HOUR_FILE",
        object: "datasets/pathRequestCount24Hour.js",
        range: TimeRange::Hour24,
        metric: AccessLogMetric::PathRequestCount,
    },
    Dataset {
        key: "PATH_REQUEST_COUNT_7_DAY_FILE",
        object: "datasets/pathRequestCount07Day.js",
        range: TimeRange::Day7,
        metric: AccessLogMetric::PathRequestCount,
    },
    Dataset {
        key: "PATH_RESPONSE_TIME_1_HOUR_FILE",
        object: "datasets/pathResponseTime01Hour.js",
        range: TimeRange::Hour1,
        metric: AccessLogMetric::PathResponseTime,
    },
    Dataset {
        key: "PATH_RESPONSE_TIME_24_HOUR_FILE",
        object: "datasets/pathResponseTime24Hour.js",
        range: TimeRange::Hour24,
        metric: AccessLogMetric::PathResponseTime,
    },
    Dataset {
        key: "PATH_RESPONSE_TIME_7_DAY_FILE",
        object: "datasets/pathResponseTime07Day.js",
        range: TimeRange::Day7,
        metric: AccessLogMetric::PathResponseTime,
    },
];

fn iso(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Top ten paths for `metric` among successful requests in the window.
pub fn access_log_sql(
    table: &str,
    metric: AccessLogMetric,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    load_balancer: Option<&str>,
) -> String {
    let mut filter = format!(
        "WHERE target_status_code = '200' AND time >= '{}' AND time <= '{}'\n",
        iso(start),
        iso(end)
    );
    if let Some(alb) = load_balancer {
        filter.push_str(&format!(" AND elb = '{alb}'\n"));
    }
    format!(
        "SELECT\nconcat(url_extract_path(request_url), '+', request_verb) AS url, {select}\n\
         FROM \"{table}\"\n{filter}\
         GROUP BY concat(url_extract_path(request_url), '+', request_verb)\n\
         ORDER BY 2 DESC\nLIMIT 10;",
        select = metric.select()
    )
}

/// Daily partition statement for the access-log table.
pub fn partition_sql(table: &str, logs_path: &str, day: DateTime<Utc>) -> String {
    format!(
        "ALTER TABLE \"{table}\" ADD IF NOT EXISTS PARTITION (time='{}') LOCATION '{logs_path}/{}/';",
        day.format("%Y-%m-%d"),
        day.format("%Y/%m/%d")
    )
}

/// Turn result rows (header first) into path values.
pub fn rows_to_values(rows: &[Vec<Option<String>>]) -> Vec<MetricValue> {
    rows.iter()
        .skip(1)
        .filter_map(|row| {
            let path = row.first()?.clone()?;
            let value: f64 = row.get(1)?.as_deref()?.parse().ok()?;
            Some(MetricValue::new(round_to(value, 5), path))
        })
        .collect()
}

struct AthenaSettings<'a> {
    database: &'a str,
    output: &'a str,
}

fn athena_settings(config: &ControlPlaneConfig) -> Result<AthenaSettings<'_>, AppError> {
    Ok(AthenaSettings {
        database: ControlPlaneConfig::require(&config.athena_database, "ATHENA_DATABASE")?,
        output: ControlPlaneConfig::require(&config.athena_output_path, "S3_ATHENA_OUTPUT_PATH")?,
    })
}

/// Submit a statement and wait for it to finish.
async fn run_athena(ctx: &AppContext, sql: &str) -> Result<String, AppError> {
    let settings = athena_settings(ctx.config())?;
    let athena = ctx.athena();
    let started = athena
        .start_query_execution()
        .query_string(sql)
        .query_execution_context(QueryExecutionContext::builder().database(settings.database).build())
        .result_configuration(ResultConfiguration::builder().output_location(settings.output).build())
        .send()
        .await
        .map_err(|e| AppError::Athena(e.to_string()))?;
    let execution_id = started
        .query_execution_id()
        .ok_or_else(|| AppError::Athena("query was not assigned an execution id".into()))?
        .to_string();

    loop {
        let execution = athena
            .get_query_execution()
            .query_execution_id(&execution_id)
            .send()
            .await
            .map_err(|e| AppError::Athena(e.to_string()))?;
        let status = execution.query_execution().and_then(|q| q.status());
        match status.and_then(|s| s.state()) {
            Some(QueryExecutionState::Succeeded) => return Ok(execution_id),
            Some(QueryExecutionState::Failed) => {
                let reason = status
                    .and_then(|s| s.state_change_reason())
                    .unwrap_or("unknown");
                return Err(AppError::Athena(format!(
                    "Query Failed to run with Error Message: {reason}"
                )));
            }
            Some(QueryExecutionState::Cancelled) => {
                return Err(AppError::Athena("Query was cancelled.".into()))
            }
            _ => tokio::time::sleep(POLL_INTERVAL).await,
        }
    }
}

async fn athena_rows(ctx: &AppContext, execution_id: &str) -> Result<Vec<Vec<Option<String>>>, AppError> {
    let mut rows = Vec::new();
    let mut next_token: Option<String> = None;
    loop {
        let output = ctx
            .athena()
            .get_query_results()
            .query_execution_id(execution_id)
            .set_next_token(next_token.take())
            .send()
            .await
            .map_err(|e| AppError::Athena(e.to_string()))?;
        if let Some(result_set) = output.result_set() {
            rows.extend(result_set.rows().iter().map(|row| {
                row.data()
                    .iter()
                    .map(|datum| datum.var_char_value().map(str::to_string))
                    .collect::<Vec<_>>()
            }));
        }
        match output.next_token() {
            Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
            _ => break,
        }
    }
    Ok(rows)
}

/// Busiest or slowest paths, optionally for a single tenant's load balancer.
pub async fn query_access_logs(
    ctx: &AppContext,
    range: TimeRange,
    metric: AccessLogMetric,
    tenant_id: Option<&str>,
) -> Result<Vec<MetricValue>, AppError> {
    let table = ControlPlaneConfig::require(&ctx.config().access_logs_table, "ACCESS_LOGS_TABLE")?;
    let load_balancer = match tenant_id {
        Some(tenant_id) => {
            let tenants = tenant_directory(ctx).await?;
            Some(tenant_load_balancer(&tenants, tenant_id).ok_or_else(|| {
                AppError::Validation(format!("No ALB found for tenantId: {tenant_id}"))
            })?)
        }
        None => None,
    };
    let now = Utc::now();
    let sql = access_log_sql(table, metric, range.start(now, 0), now, load_balancer.as_deref());
    info!(metric = metric.name(), range = %range, "querying access logs");
    let execution_id = run_athena(ctx, &sql).await?;
    Ok(rows_to_values(&athena_rows(ctx, &execution_id).await?))
}

/// Refresh every dataset object; failures are logged per dataset.
pub async fn publish_access_log_metrics(ctx: &AppContext) -> Result<(), AppError> {
    let bucket = ControlPlaneConfig::require(&ctx.config().athena_bucket, "S3_ATHENA_BUCKET")?;
    for dataset in &DATASETS {
        let published = async {
            let values = query_access_logs(ctx, dataset.range, dataset.metric, None).await?;
            ctx.s3()
                .put_object()
                .bucket(bucket)
                .key(dataset.object)
                .cache_control("no-store")
                .body(ByteStream::from(serde_json::to_vec(&values)?))
                .send()
                .await
                .map_err(|e| AppError::S3(e.to_string()))?;
            Ok::<_, AppError>(values.len())
        }
        .await;
        match published {
            Ok(count) => info!(object = dataset.object, count, "published access log dataset"),
            Err(e) => error!(object = dataset.object, "failed to publish dataset: {e}"),
        }
    }
    Ok(())
}

pub async fn add_athena_partition(ctx: &AppContext) -> Result<(), AppError> {
    let config = ctx.config();
    let table = ControlPlaneConfig::require(&config.access_logs_table, "ACCESS_LOGS_TABLE")?;
    let path = ControlPlaneConfig::require(&config.access_logs_path, "ACCESS_LOGS_PATH")?;
    let sql = partition_sql(table, path, Utc::now());
    info!(%sql, "adding Athena partition");
    run_athena(ctx, &sql).await?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct SignedUrl {
    pub key: &'static str,
    pub url: String,
}

/// Presigned GET URLs for the published datasets.
pub async fn access_metrics_signed_urls(ctx: &AppContext) -> Result<Vec<SignedUrl>, AppError> {
    let bucket = ControlPlaneConfig::require(&ctx.config().athena_bucket, "S3_ATHENA_BUCKET")?;
    let presigning =
        PresigningConfig::expires_in(DATASET_URL_EXPIRY).map_err(|e| AppError::S3(e.to_string()))?;
    let mut urls = Vec::with_capacity(DATASETS.len());
    for dataset in &DATASETS {
        let request = ctx
            .s3()
            .get_object()
            .bucket(bucket)
            .key(dataset.object)
            .presigned(presigning.clone())
            .await
            .map_err(|e| AppError::S3(e.to_string()))?;
        urls.push(SignedUrl {
            key: dataset.key,
            url: request.uri().to_string(),
        });
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn metric_names_parse() {
        assert_eq!(
            "PATH_RESPONSE_TIME".parse::<AccessLogMetric>().unwrap(),
            AccessLogMetric::PathResponseTime
        );
        assert!("path_request_count".parse::<AccessLogMetric>().is_err());
    }

    #[test]
    fn sql_filters_by_window_and_alb() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap();
        let sql = access_log_sql("alb_logs", AccessLogMetric::PathRequestCount, start, end, Some("app/x"));
        assert!(sql.contains("count(1) AS request_count"));
        assert!(sql.contains("FROM \"alb_logs\""));
        assert!(sql.contains("time >= '2024-05-01T10:00:00.000Z'"));
        assert!(sql.contains("AND elb = 'app/x'"));
        assert!(sql.ends_with("LIMIT 10;"));

        let sql = access_log_sql("alb_logs", AccessLogMetric::PathResponseTime, start, end, None);
        assert!(sql.contains("avg(target_processing_time)"));
        assert!(!sql.contains("elb ="));
    }

    #[test]
    fn partition_uses_day_paths() {
        let day = Utc.with_ymd_and_hms(2024, 2, 9, 3, 0, 0).unwrap();
        assert_eq!(
            partition_sql("logs", "s3://bucket/AWSLogs", day),
            "ALTER TABLE \"logs\" ADD IF NOT EXISTS PARTITION (time='2024-02-09') \
             LOCATION 's3://bucket/AWSLogs/2024/02/09/';"
        );
    }

    #[test]
    fn rows_skip_header_and_round() {
        let rows = vec![
            vec![Some("url".into()), Some("request_count".into())],
            vec![Some("/api+GET".into()), Some("0.1234567".into())],
            vec![Some("/broken+GET".into()), None],
        ];
        let values = rows_to_values(&rows);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].id, "/api+GET");
        assert_eq!(values[0].value, 0.12346);
    }

    #[test]
    fn six_datasets() {
        assert_eq!(DATASETS.len(), 6);
        assert!(DATASETS.iter().all(|d| d.object.starts_with("datasets/")));
    }
}
