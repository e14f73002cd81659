//! Custom metric ingestion: the API enqueues, the queue consumer hands
//! batches to the configured metrics provider.

use std::collections::BTreeMap;

use aws_sdk_sqs::types::SendMessageBatchRequestEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::emf::CloudWatchEmfProvider;
use crate::{config::ControlPlaneConfig, context::AppContext, error::AppError};

pub const METRICS_PROVIDER_SETTING: &str = "METRICS_PROVIDER";
const MAX_SQS_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasureType {
    Count,
    Total,
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    #[serde(rename = "type")]
    pub measure_type: MeasureType,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

const TENANT_ID: &str = "TenantId";
const USER_ID: &str = "UserId";
const ACTION: &str = "Action";
const APPLICATION: &str = "Application";
const REQUIRED_CONTEXT: [&str; 4] = [TENANT_ID, USER_ID, ACTION, APPLICATION];

/// Free-form metric context that always carries the four standard keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricContext(BTreeMap<String, String>);

impl Default for MetricContext {
    fn default() -> Self {
        Self(
            REQUIRED_CONTEXT
                .iter()
                .map(|key| (key.to_string(), String::new()))
                .collect(),
        )
    }
}

impl<'de> Deserialize<'de> for MetricContext {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values = BTreeMap::<String, String>::deserialize(deserializer)?;
        let mut context = MetricContext::default();
        context.0.extend(values);
        Ok(context)
    }
}

impl MetricContext {
    fn value(&self, key: &str) -> &str {
        self.0.get(key).map(String::as_str).unwrap_or_default()
    }

    pub fn tenant_id(&self) -> &str {
        self.value(TENANT_ID)
    }

    pub fn user_id(&self) -> &str {
        self.value(USER_ID)
    }

    pub fn action(&self) -> &str {
        self.value(ACTION)
    }

    pub fn application(&self) -> &str {
        self.value(APPLICATION)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Remove a custom key; the standard keys can't be removed.
    pub fn remove(&mut self, key: &str) -> Result<Option<String>, AppError> {
        if REQUIRED_CONTEXT.contains(&key) {
            return Err(AppError::Validation(format!("Can't remove key {key}")));
        }
        Ok(self.0.remove(key))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub measure: Measure,
    #[serde(default)]
    pub context: MetricContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderType {
    #[serde(rename = "CLOUDWATCH")]
    CloudWatch,
}

/// Which metrics provider to use, plus its properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsProviderConfig {
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    pub properties: BTreeMap<String, String>,
}

impl MetricsProviderConfig {
    /// Config for `provider_type` with the provider defaults merged under `properties`.
    pub fn new(
        provider_type: ProviderType,
        environment: &str,
        properties: BTreeMap<String, String>,
    ) -> Self {
        let mut merged = match provider_type {
            ProviderType::CloudWatch => CloudWatchEmfProvider::defaults(environment),
        };
        merged.extend(properties);
        Self {
            provider_type,
            properties: merged,
        }
    }

    /// Parse the stored setting; a blank setting selects CloudWatch.
    pub fn from_setting(raw: Option<&str>, environment: &str) -> Result<Self, AppError> {
        #[derive(Deserialize)]
        struct Stored {
            #[serde(rename = "type")]
            provider_type: ProviderType,
            #[serde(default)]
            properties: BTreeMap<String, String>,
        }
        match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => {
                let stored: Stored = serde_json::from_str(raw)?;
                Ok(Self::new(stored.provider_type, environment, stored.properties))
            }
            None => Ok(Self::new(ProviderType::CloudWatch, environment, BTreeMap::new())),
        }
    }
}

/// A destination for custom metrics.
pub enum MetricsProvider {
    CloudWatch(CloudWatchEmfProvider),
}

impl MetricsProvider {
    pub fn from_config(config: &MetricsProviderConfig) -> Self {
        match config.provider_type {
            ProviderType::CloudWatch => {
                MetricsProvider::CloudWatch(CloudWatchEmfProvider::from_properties(&config.properties))
            }
        }
    }

    pub fn put_metrics(&self, metrics: &[Metric]) -> Result<(), AppError> {
        match self {
            MetricsProvider::CloudWatch(provider) => provider.put_metrics(metrics),
        }
    }
}

/// Parse a `POST /metrics` body; anything but a non-empty array is rejected.
pub fn parse_metrics(body: &str) -> Result<Vec<Metric>, AppError> {
    let metrics: Vec<Metric> = serde_json::from_str(body)
        .map_err(|_| AppError::Validation("Invalid request body".into()))?;
    if metrics.is_empty() {
        return Err(AppError::Validation("Invalid request body".into()));
    }
    Ok(metrics)
}

async fn send_batches(
    ctx: &AppContext,
    queue_url: &str,
    entries: Vec<SendMessageBatchRequestEntry>,
) -> Result<(), AppError> {
    for chunk in entries.chunks(MAX_SQS_BATCH_SIZE) {
        let output = ctx
            .sqs()
            .send_message_batch()
            .queue_url(queue_url)
            .set_entries(Some(chunk.to_vec()))
            .send()
            .await
            .map_err(|e| {
                error!("sqs:SendMessageBatch error: {e}");
                AppError::Sqs(e.to_string())
            })?;
        for failed in output.failed() {
            error!(code = failed.code(), message = ?failed.message(), "failed to enqueue message");
        }
    }
    Ok(())
}

/// Enqueue metrics for asynchronous delivery.
pub async fn put_metrics(ctx: &AppContext, metrics: &[Metric]) -> Result<(), AppError> {
    let queue_url = ControlPlaneConfig::require(&ctx.config().metrics_queue, "METRICS_QUEUE")?;
    info!(count = metrics.len(), "enqueuing metrics for processing");
    let entries = metrics
        .iter()
        .enumerate()
        .map(|(index, metric)| {
            SendMessageBatchRequestEntry::builder()
                .id(index.to_string())
                .message_body(serde_json::to_string(metric)?)
                .build()
                .map_err(|e| AppError::Sqs(e.to_string()))
        })
        .collect::<Result<Vec<_>, AppError>>()?;
    send_batches(ctx, queue_url, entries).await
}

pub fn is_sqs_event(event: &Value) -> bool {
    event
        .get("Records")
        .and_then(Value::as_array)
        .map(|records| {
            !records.is_empty()
                && records.iter().all(|record| {
                    record
                        .get("eventSource")
                        .and_then(Value::as_str)
                        .map(|source| source == "aws:sqs")
                        .unwrap_or(false)
                })
        })
        .unwrap_or(false)
}

/// A queue record that could not be parsed as a metric.
#[derive(Debug, Clone, PartialEq)]
pub struct FatalRecord {
    pub message_id: String,
    pub body: String,
}

/// Split queue records into metrics and unparseable records.
pub fn decode_metric_records(event: &Value) -> (Vec<Metric>, Vec<FatalRecord>) {
    let mut metrics = Vec::new();
    let mut fatal = Vec::new();
    let records = event
        .get("Records")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for record in records {
        let message_id = record
            .get("messageId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let body = record
            .get("body")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match serde_json::from_str::<Metric>(&body) {
            Ok(metric) => metrics.push(metric),
            Err(e) => {
                warn!(%message_id, "can't parse metric from message: {e}");
                fatal.push(FatalRecord { message_id, body });
            }
        }
    }
    (metrics, fatal)
}

async fn provider_config(ctx: &AppContext) -> Result<MetricsProviderConfig, AppError> {
    let setting = ctx
        .parameter_store()
        .get_setting(METRICS_PROVIDER_SETTING, false)
        .await?;
    MetricsProviderConfig::from_setting(
        setting.as_ref().map(|s| s.value.as_str()),
        &ctx.config().environment,
    )
}

/// Drain one SQS batch into the metrics provider, parking bad records on the DLQ.
pub async fn process_metrics_queue(ctx: &AppContext, event: &Value) -> Result<Value, AppError> {
    let (metrics, fatal) = decode_metric_records(event);
    let config = provider_config(ctx).await?;
    MetricsProvider::from_config(&config).put_metrics(&metrics)?;

    if !fatal.is_empty() {
        info!(count = fatal.len(), "moving non-recoverable failures to DLQ");
        let dlq = ControlPlaneConfig::require(&ctx.config().metrics_dlq, "METRICS_DLQ")?;
        let entries = fatal
            .into_iter()
            .map(|record| {
                SendMessageBatchRequestEntry::builder()
                    .id(record.message_id)
                    .message_body(record.body)
                    .build()
                    .map_err(|e| AppError::Sqs(e.to_string()))
            })
            .collect::<Result<Vec<_>, AppError>>()?;
        send_batches(ctx, dlq, entries).await?;
    }
    Ok(json!({ "batchItemFailures": [] }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_defaults_fill_in() {
        let metric: Metric = serde_json::from_str(
            r#"{"name":"Logins","measure":{"type":"count","value":1},"context":{"TenantId":"t1","Plan":"gold"}}"#,
        )
        .unwrap();
        assert_eq!(metric.context.tenant_id(), "t1");
        assert_eq!(metric.context.user_id(), "");
        assert!(metric.timestamp <= Utc::now());
        assert_eq!(metric.measure.measure_type, MeasureType::Count);
    }

    #[test]
    fn timestamps_are_epoch_millis() {
        let metric: Metric = serde_json::from_str(
            r#"{"name":"Orders","timestamp":1700000000123,"measure":{"type":"total","value":9.5}}"#,
        )
        .unwrap();
        assert_eq!(metric.timestamp.timestamp_millis(), 1_700_000_000_123);
        let json = serde_json::to_value(&metric).unwrap();
        assert_eq!(json["timestamp"], 1_700_000_000_123i64);
        assert_eq!(json["context"]["Action"], "");
    }

    #[test]
    fn standard_context_keys_stay() {
        let mut context = MetricContext::default();
        context.insert("Plan", "gold");
        assert!(context.remove("TenantId").is_err());
        assert_eq!(context.remove("Plan").unwrap().as_deref(), Some("gold"));
    }

    #[test]
    fn bodies_must_be_non_empty_arrays() {
        assert!(parse_metrics("[]").is_err());
        assert!(parse_metrics("{}").is_err());
        assert!(parse_metrics("not json").is_err());
        let metrics =
            parse_metrics(r#"[{"name":"a","measure":{"type":"max","value":3}}]"#).unwrap();
        assert_eq!(metrics.len(), 1);
    }

    #[test]
    fn provider_config_defaults_to_cloudwatch() {
        let config = MetricsProviderConfig::from_setting(None, "prod").unwrap();
        assert_eq!(config.provider_type, ProviderType::CloudWatch);
        assert_eq!(config.properties["namespace"], "sb-prod");

        let config = MetricsProviderConfig::from_setting(
            Some(r#"{"type":"CLOUDWATCH","properties":{"namespace":"custom"}}"#),
            "prod",
        )
        .unwrap();
        assert_eq!(config.properties["namespace"], "custom");
        assert!(MetricsProviderConfig::from_setting(Some(r#"{"type":"DATADOG"}"#), "prod").is_err());
    }

    #[test]
    fn queue_records_split_into_metrics_and_failures() {
        let event = json!({
            "Records": [
                {"messageId": "1", "eventSource": "aws:sqs",
                 "body": "{\"name\":\"a\",\"measure\":{\"type\":\"count\",\"value\":1}}"},
                {"messageId": "2", "eventSource": "aws:sqs", "body": "garbage"}
            ]
        });
        assert!(is_sqs_event(&event));
        let (metrics, fatal) = decode_metric_records(&event);
        assert_eq!(metrics.len(), 1);
        assert_eq!(
            fatal,
            [FatalRecord {
                message_id: "2".into(),
                body: "garbage".into()
            }]
        );
        assert!(!is_sqs_event(&json!({"Records": []})));
    }
}
