//! Small helpers for reading and writing DynamoDB attribute maps.

use std::collections::HashMap;

use aws_sdk_dynamodb::{operation::scan::builders::ScanFluentBuilder, types::AttributeValue};
use chrono::{NaiveDateTime, Utc};

use crate::error::AppError;

pub type Item = HashMap<String, AttributeValue>;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Current UTC wall clock, truncated the way it is persisted.
pub fn now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    parse_timestamp(&format_timestamp(&now)).unwrap_or(now)
}

pub fn format_timestamp(value: &NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, AppError> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|_| AppError::Dynamo(format!("invalid timestamp `{value}`")))
}

pub fn get_string(item: &Item, key: &str) -> Option<String> {
    item.get(key)
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
}

pub fn require_string(item: &Item, key: &str) -> Result<String, AppError> {
    get_string(item, key).ok_or_else(|| AppError::Dynamo(format!("missing attribute `{key}`")))
}

pub fn get_bool(item: &Item, key: &str) -> Option<bool> {
    item.get(key).and_then(|v| v.as_bool().ok()).copied()
}

pub fn get_map<'a>(item: &'a Item, key: &str) -> Option<&'a HashMap<String, AttributeValue>> {
    item.get(key).and_then(|v| v.as_m().ok())
}

pub fn get_list<'a>(item: &'a Item, key: &str) -> &'a [AttributeValue] {
    item.get(key)
        .and_then(|v| v.as_l().ok())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub fn get_timestamp(item: &Item, key: &str) -> Result<Option<NaiveDateTime>, AppError> {
    get_string(item, key)
        .map(|raw| parse_timestamp(&raw))
        .transpose()
}

/// Insert a string attribute, skipping empty values (DynamoDB rejects empty keys in indexes).
pub fn put_string(item: &mut Item, key: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        item.insert(key.to_string(), AttributeValue::S(value.to_string()));
    }
}

pub fn string_map(values: &HashMap<String, String>) -> AttributeValue {
    AttributeValue::M(
        values
            .iter()
            .map(|(k, v)| (k.clone(), AttributeValue::S(v.clone())))
            .collect(),
    )
}

pub fn read_string_map(map: &HashMap<String, AttributeValue>) -> HashMap<String, String> {
    map.iter()
        .filter_map(|(k, v)| v.as_s().ok().map(|s| (k.clone(), s.clone())))
        .collect()
}

/// Run a scan to completion, following `LastEvaluatedKey`.
pub async fn scan_all(request: ScanFluentBuilder) -> Result<Vec<Item>, AppError> {
    let mut items = Vec::new();
    let mut start_key: Option<Item> = None;
    loop {
        let resp = request
            .clone()
            .set_exclusive_start_key(start_key.take())
            .send()
            .await
            .map_err(|e| AppError::Dynamo(e.to_string()))?;
        items.extend(resp.items.unwrap_or_default());
        match resp.last_evaluated_key {
            Some(key) if !key.is_empty() => start_key = Some(key),
            _ => break,
        }
    }
    Ok(items)
}
