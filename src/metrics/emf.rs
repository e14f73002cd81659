//! CloudWatch Embedded Metric Format provider.
//!
//! EMF documents are printed to stdout as single JSON lines; the Lambda log
//! agent turns them into CloudWatch metrics.

use std::{
    collections::BTreeMap,
    io::{self, Write},
};

use serde_json::{json, Map, Value};

use super::ingest::{MeasureType, Metric};
use crate::error::AppError;

const NAMESPACE_PROPERTY: &str = "namespace";

pub struct CloudWatchEmfProvider {
    namespace: String,
}

impl CloudWatchEmfProvider {
    pub fn defaults(environment: &str) -> BTreeMap<String, String> {
        BTreeMap::from([(NAMESPACE_PROPERTY.to_string(), format!("sb-{environment}"))])
    }

    pub fn from_properties(properties: &BTreeMap<String, String>) -> Self {
        Self {
            namespace: properties
                .get(NAMESPACE_PROPERTY)
                .cloned()
                .unwrap_or_default(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// One EMF document for `metric`, dimensioned by tenant.
    pub fn document(&self, metric: &Metric) -> Value {
        let dimension = format!("{} By Tenant", metric.name);
        let unit = match metric.measure.measure_type {
            MeasureType::Count => "Count",
            _ => "None",
        };

        let mut document = Map::new();
        document.insert(
            "_aws".into(),
            json!({
                "Timestamp": metric.timestamp.timestamp_millis(),
                "CloudWatchMetrics": [{
                    "Namespace": self.namespace,
                    "Dimensions": [[dimension]],
                    "Metrics": [{ "Name": metric.name, "Unit": unit }],
                }],
            }),
        );
        document.insert(dimension, json!(metric.context.tenant_id()));
        document.insert("UserId".into(), json!(metric.context.user_id()));
        document.insert("Application".into(), json!(metric.context.application()));
        document.insert("Action".into(), json!(metric.context.action()));
        document.insert(metric.name.clone(), json!(metric.measure.value));
        Value::Object(document)
    }

    pub fn write_metrics<W: Write>(&self, out: &mut W, metrics: &[Metric]) -> Result<(), AppError> {
        for metric in metrics {
            let line = serde_json::to_string(&self.document(metric))?;
            writeln!(out, "{line}").map_err(|e| AppError::CloudWatch(e.to_string()))?;
        }
        out.flush().map_err(|e| AppError::CloudWatch(e.to_string()))
    }

    pub fn put_metrics(&self, metrics: &[Metric]) -> Result<(), AppError> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.write_metrics(&mut out, metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(raw: &str) -> Metric {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn count_measures_use_count_unit() {
        let provider = CloudWatchEmfProvider::from_properties(&CloudWatchEmfProvider::defaults("dev"));
        let doc = provider.document(&metric(
            r#"{"name":"Logins","timestamp":1700000000000,"measure":{"type":"count","value":2},
                "context":{"TenantId":"t-1","UserId":"u-1","Action":"login","Application":"web"}}"#,
        ));
        let cw = &doc["_aws"]["CloudWatchMetrics"][0];
        assert_eq!(cw["Namespace"], "sb-dev");
        assert_eq!(cw["Dimensions"][0][0], "Logins By Tenant");
        assert_eq!(cw["Metrics"][0]["Unit"], "Count");
        assert_eq!(doc["_aws"]["Timestamp"], 1_700_000_000_000i64);
        assert_eq!(doc["Logins By Tenant"], "t-1");
        assert_eq!(doc["UserId"], "u-1");
        assert_eq!(doc["Action"], "login");
        assert_eq!(doc["Logins"], 2.0);
    }

    #[test]
    fn other_measures_have_no_unit() {
        let provider = CloudWatchEmfProvider::from_properties(&CloudWatchEmfProvider::defaults("dev"));
        let doc = provider.document(&metric(r#"{"name":"Latency","measure":{"type":"max","value":12.5}}"#));
        assert_eq!(doc["_aws"]["CloudWatchMetrics"][0]["Metrics"][0]["Unit"], "None");
        assert_eq!(doc["Latency By Tenant"], "");
    }

    #[test]
    fn one_line_per_metric() {
        let provider = CloudWatchEmfProvider::from_properties(&CloudWatchEmfProvider::defaults("dev"));
        let metrics = vec![
            metric(r#"{"name":"a","measure":{"type":"count","value":1}}"#),
            metric(r#"{"name":"b","measure":{"type":"total","value":4}}"#),
        ];
        let mut out = Vec::new();
        provider.write_metrics(&mut out, &metrics).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
        let first: Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(first["a"], 1.0);
    }
}
