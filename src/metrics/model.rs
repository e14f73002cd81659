use std::{
    cmp::Ordering,
    hash::{Hash, Hasher},
};

use chrono::{DateTime, Utc};
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};

/// Dashboard query against CloudWatch.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricQuery {
    pub id: Option<String>,
    pub stat: Option<String>,
    pub dimensions: Vec<QueryDimension>,
    pub period: Option<i32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub time_range_name: Option<String>,
    pub tz_offset: i64,
    pub tenants: Vec<String>,
    pub single_tenant: bool,
    pub top_tenants: bool,
    pub stats_map: bool,
    pub tenant_task_max_capacity: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDimension {
    pub metric_name: String,
    pub name_space: String,
}

/// A metric series; identity ignores which tenant the data came from.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDimension {
    pub name_space: String,
    pub metric_name: String,
    #[serde(skip)]
    pub tenant_id: Option<String>,
}

impl MetricDimension {
    pub fn new(name_space: impl Into<String>, metric_name: impl Into<String>) -> Self {
        Self {
            name_space: name_space.into(),
            metric_name: metric_name.into(),
            tenant_id: None,
        }
    }

    pub fn for_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Same series without the tenant.
    pub fn untagged(&self) -> Self {
        Self::new(self.name_space.clone(), self.metric_name.clone())
    }
}

impl PartialEq for MetricDimension {
    fn eq(&self, other: &Self) -> bool {
        self.name_space == other.name_space && self.metric_name == other.metric_name
    }
}

impl Eq for MetricDimension {}

impl Hash for MetricDimension {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name_space.hash(state);
        self.metric_name.hash(state);
    }
}

/// A value attributed to a tenant (or a request path), ordered by value.
#[derive(Debug, Clone, Serialize)]
pub struct MetricValue {
    pub value: f64,
    pub id: String,
}

impl MetricValue {
    pub fn new(value: f64, id: impl Into<String>) -> Self {
        Self {
            value,
            id: id.into(),
        }
    }
}

impl PartialEq for MetricValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MetricValue {}

impl PartialOrd for MetricValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MetricValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.total_cmp(&other.value)
    }
}

/// Named series in insertion order, serialized as a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats(pub Vec<(String, Vec<f64>)>);

impl Stats {
    pub fn put(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.0.push((name.into(), values));
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, values)| values.as_slice())
    }
}

impl Serialize for Stats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, values) in &self.0 {
            map.serialize_entry(key, values)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricResultItem {
    pub dimension: MetricDimension,
    pub stats: Stats,
    pub top_tenants: Vec<MetricValue>,
}

impl MetricResultItem {
    pub fn new(dimension: MetricDimension) -> Self {
        Self {
            dimension,
            stats: Stats::default(),
            top_tenants: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub id: Option<String>,
    pub metrics: Vec<MetricResultItem>,
    pub periods: Vec<String>,
    pub tenant_task_max_capacity: Vec<MetricValue>,
}

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
