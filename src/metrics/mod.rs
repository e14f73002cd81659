//! Operational metrics: dashboard queries, access-log analytics and custom
//! metric ingestion.

pub mod access_logs;
mod aggregate;
pub mod emf;
pub mod ingest;
mod model;
pub mod query;
mod time_range;

pub use access_logs::{AccessLogMetric, SignedUrl};
pub use aggregate::{percentiles, Percentiles};
pub use ingest::{Measure, MeasureType, Metric, MetricContext, MetricsProvider, MetricsProviderConfig};
pub use model::{
    round_to, MetricDimension, MetricQuery, MetricResultItem, MetricValue, QueryDimension,
    QueryResult, Stats,
};
pub use time_range::{period_for, time_range_for, TimeRange};
