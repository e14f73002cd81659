//! Cross-tenant and single-tenant dashboard queries over CloudWatch.

use std::collections::HashMap;

use aws_sdk_applicationautoscaling::types::{ScalableDimension, ServiceNamespace};
use aws_sdk_cloudwatch::{
    primitives::DateTime as AwsDateTime,
    types::{Dimension, Metric, MetricDataQuery, MetricStat},
};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::{
    aggregate::{aggregate, AggregateOptions, Timeline},
    model::{round_to, MetricDimension, MetricQuery, MetricResultItem, MetricValue, QueryResult},
    time_range::{period_for, period_label, time_range_for},
};
use crate::{context::AppContext, error::AppError, tenant::Tenant};

const MAX_TENANTS: usize = 500;
const MAX_DATA_QUERIES: usize = 500;
const MAX_DATAPOINTS: i32 = 10_000;
const ECS_NAMESPACE: &str = "AWS/ECS";
const ALB_NAMESPACE: &str = "AWS/ApplicationELB";
pub(crate) const LOAD_BALANCER_RESOURCE: &str = "LOAD_BALANCER";

/// `tenant-` plus the first segment of the tenant id.
pub fn tenant_short_name(tenant_id: &str) -> String {
    let short = tenant_id.strip_prefix("tenant-").unwrap_or(tenant_id);
    let segment = short.split('-').next().unwrap_or(short);
    format!("tenant-{segment}")
}

pub(crate) fn tenant_load_balancer(tenants: &HashMap<String, Tenant>, tenant_id: &str) -> Option<String> {
    tenants
        .get(tenant_id)
        .and_then(|tenant| tenant.resources.get(LOAD_BALANCER_RESOURCE))
        .map(|resource| resource.name.clone())
        .filter(|name| !name.is_empty())
}

/// Tenants keyed by id string, as read from the tenant table.
pub async fn tenant_directory(ctx: &AppContext) -> Result<HashMap<String, Tenant>, AppError> {
    let tenants = ctx.tenants().get_all_tenants().await?;
    Ok(tenants
        .into_iter()
        .filter_map(|tenant| tenant.id.map(|id| (id.to_string(), tenant)))
        .collect())
}

fn build_error(e: impl std::fmt::Display) -> AppError {
    AppError::CloudWatch(e.to_string())
}

fn dimension(name: &str, value: &str) -> Result<Dimension, AppError> {
    Ok(Dimension::builder()
        .name(name)
        .value(value)
        .build())
}

/// CloudWatch data queries plus the dimension each returned series belongs to.
pub struct DataQueries {
    pub queries: Vec<MetricDataQuery>,
    pub dimensions: HashMap<String, MetricDimension>,
}

/// Build a raw and a zero-filled query per tenant and dimension.
pub fn build_data_queries(
    query: &MetricQuery,
    tenant_ids: &[String],
    tenants: &HashMap<String, Tenant>,
    period: i32,
) -> Result<DataQueries, AppError> {
    let stat = query.stat.clone().unwrap_or_else(|| "Average".to_string());
    let mut queries = Vec::new();
    let mut dimensions = HashMap::new();
    let mut index = 0usize;
    for tenant_id in tenant_ids {
        for requested in &query.dimensions {
            let metric_dimensions = if requested.name_space.eq_ignore_ascii_case(ECS_NAMESPACE) {
                let short = tenant_short_name(tenant_id);
                vec![dimension("ClusterName", &short)?, dimension("ServiceName", &short)?]
            } else if requested.name_space.eq_ignore_ascii_case(ALB_NAMESPACE) {
                let alb = tenant_load_balancer(tenants, tenant_id).ok_or_else(|| {
                    AppError::Validation(format!("No ALB Id found for tenant: {tenant_id}"))
                })?;
                vec![dimension("LoadBalancer", &alb)?]
            } else {
                return Err(AppError::Validation(format!(
                    "Namespace: {} not currently implemented",
                    requested.name_space
                )));
            };

            let metric = Metric::builder()
                .namespace(&requested.name_space)
                .metric_name(&requested.metric_name)
                .set_dimensions(Some(metric_dimensions))
                .build();
            let metric_stat = MetricStat::builder()
                .metric(metric)
                .period(period)
                .stat(&stat)
                .build();
            queries.push(
                MetricDataQuery::builder()
                    .id(format!("query0_{index}"))
                    .metric_stat(metric_stat)
                    .return_data(false)
                    .build(),
            );
            queries.push(
                MetricDataQuery::builder()
                    .id(format!("query_{index}"))
                    .expression(format!("FILL(query0_{index}, 0)"))
                    .return_data(true)
                    .build(),
            );
            if queries.len() > MAX_DATA_QUERIES {
                return Err(AppError::Validation(
                    "Can only process up to 500 data query items in GetMetricData API".into(),
                ));
            }
            dimensions.insert(
                format!("query_{index}"),
                MetricDimension::new(&requested.name_space, &requested.metric_name)
                    .for_tenant(tenant_id.clone()),
            );
            index += 1;
        }
    }
    Ok(DataQueries {
        queries,
        dimensions,
    })
}

fn to_aws(value: DateTime<Utc>) -> AwsDateTime {
    AwsDateTime::from_millis(value.timestamp_millis())
}

fn from_aws(value: &AwsDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(value.secs(), value.subsec_nanos())
}

/// One returned data point.
struct DataPoint {
    dimension: MetricDimension,
    timestamp: DateTime<Utc>,
    value: f64,
}

async fn fetch_metric_data(
    ctx: &AppContext,
    query: &MetricQuery,
    data: &DataQueries,
) -> Result<Vec<DataPoint>, AppError> {
    let (start, end) = time_range_for(
        query.time_range_name.as_deref(),
        query.tz_offset,
        query.start_date,
        query.end_date,
        Utc::now(),
    )?;
    info!(%start, %end, queries = data.queries.len(), "fetching CloudWatch metric data");
    let mut points = Vec::new();
    let mut next_token: Option<String> = None;
    loop {
        let output = ctx
            .cloudwatch()
            .get_metric_data()
            .max_datapoints(MAX_DATAPOINTS)
            .start_time(to_aws(start))
            .end_time(to_aws(end))
            .set_metric_data_queries(Some(data.queries.clone()))
            .set_next_token(next_token.take())
            .send()
            .await
            .map_err(|e| AppError::CloudWatch(e.to_string()))?;
        for result in output.metric_data_results() {
            let Some(dimension) = result.id().and_then(|id| data.dimensions.get(id)) else {
                continue;
            };
            for (timestamp, value) in result.timestamps().iter().zip(result.values()) {
                let Some(timestamp) = from_aws(timestamp) else {
                    continue;
                };
                points.push(DataPoint {
                    dimension: dimension.clone(),
                    timestamp,
                    value: round_to(*value, 3),
                });
            }
        }
        match output.next_token() {
            Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
            _ => break,
        }
    }
    Ok(points)
}

/// Aggregate a metric across tenants: percentiles per period and the busiest tenants.
pub async fn query_metrics(ctx: &AppContext, query: &MetricQuery) -> Result<QueryResult, AppError> {
    let tenants = tenant_directory(ctx).await?;
    let tenant_ids: Vec<String> = if query.tenants.is_empty() {
        tenants.keys().cloned().collect()
    } else {
        query.tenants.clone()
    };
    if tenant_ids.len() > MAX_TENANTS {
        return Err(AppError::Validation("Cannot process more than 500 tenants".into()));
    }
    if tenant_ids.is_empty() {
        return Err(AppError::Validation("No tenants to process".into()));
    }
    let period = period_for(query)?;
    let data = build_data_queries(query, &tenant_ids, &tenants, period)?;
    let points = fetch_metric_data(ctx, query, &data).await?;

    let mut timelines: Vec<(MetricDimension, Timeline)> = Vec::new();
    for point in points {
        let tenant = point.dimension.tenant_id.clone().unwrap_or_default();
        let index = match timelines.iter().position(|(d, _)| *d == point.dimension) {
            Some(index) => index,
            None => {
                timelines.push((point.dimension.clone(), Timeline::default()));
                timelines.len() - 1
            }
        };
        timelines[index]
            .1
            .push(point.timestamp, MetricValue::new(point.value, tenant));
    }

    let options = AggregateOptions {
        stats_map: query.stats_map,
        top_tenants: query.top_tenants,
        average: query
            .stat
            .as_deref()
            .map_or(false, |stat| stat.eq_ignore_ascii_case("Average")),
    };
    let mut result = QueryResult {
        id: query.id.clone(),
        ..Default::default()
    };
    for (dimension, timeline) in timelines {
        info!(
            namespace = %dimension.name_space,
            metric = %dimension.metric_name,
            values = timeline.len(),
            "aggregating dimension"
        );
        result
            .metrics
            .push(aggregate(&dimension, timeline, options, &mut result.periods));
    }
    if query.tenant_task_max_capacity {
        result.tenant_task_max_capacity = task_max_capacity(ctx, &tenant_ids).await?;
    }
    Ok(result)
}

/// Chronological values of each dimension for exactly one tenant.
pub async fn query_tenant_metrics(
    ctx: &AppContext,
    query: &MetricQuery,
) -> Result<QueryResult, AppError> {
    if query.tenants.len() != 1 {
        return Err(AppError::Validation(
            "query JSON must have single item in tenants!".into(),
        ));
    }
    let tenants = tenant_directory(ctx).await?;
    let period = period_for(query)?;
    let data = build_data_queries(query, &query.tenants, &tenants, period)?;
    let mut points = fetch_metric_data(ctx, query, &data).await?;
    points.sort_by_key(|point| point.timestamp);

    let mut series: Vec<(MetricDimension, Vec<DateTime<Utc>>, Vec<f64>)> = Vec::new();
    for point in points {
        match series.iter_mut().find(|(d, _, _)| *d == point.dimension) {
            Some((_, times, values)) => {
                times.push(point.timestamp);
                values.push(point.value);
            }
            None => series.push((point.dimension, vec![point.timestamp], vec![point.value])),
        }
    }

    let mut result = QueryResult {
        id: query.id.clone(),
        ..Default::default()
    };
    for (index, (dimension, times, values)) in series.into_iter().enumerate() {
        if index == 0 {
            result.periods = times.into_iter().map(period_label).collect();
        }
        let mut item = MetricResultItem::new(dimension.untagged());
        item.stats.put("Values", values);
        result.metrics.push(item);
    }
    Ok(result)
}

/// Maximum ECS task count per tenant; tenants without a scaling target report 1.
pub async fn task_max_capacity(
    ctx: &AppContext,
    tenant_ids: &[String],
) -> Result<Vec<MetricValue>, AppError> {
    let mut capacity: Vec<(String, i32)> = tenant_ids.iter().map(|id| (id.clone(), 1)).collect();
    let by_short_name: HashMap<String, String> = tenant_ids
        .iter()
        .map(|id| (tenant_short_name(id), id.clone()))
        .collect();
    let resource_ids: Vec<String> = by_short_name
        .keys()
        .map(|short| format!("service/{short}/{short}"))
        .collect();

    let mut next_token: Option<String> = None;
    loop {
        let output = ctx
            .autoscaling()
            .describe_scalable_targets()
            .service_namespace(ServiceNamespace::Ecs)
            .scalable_dimension(ScalableDimension::EcsServiceDesiredCount)
            .set_resource_ids(Some(resource_ids.clone()))
            .set_next_token(next_token.take())
            .send()
            .await
            .map_err(|e| {
                warn!("unable to describe scalable targets: {e}");
                AppError::AutoScaling(e.to_string())
            })?;
        for target in output.scalable_targets() {
            let Some(short) = target.resource_id().split('/').nth(2) else {
                continue;
            };
            let Some(tenant_id) = by_short_name.get(short) else {
                continue;
            };
            if let Some(entry) = capacity.iter_mut().find(|(id, _)| id == tenant_id) {
                entry.1 = target.max_capacity();
            }
        }
        match output.next_token() {
            Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
            _ => break,
        }
    }
    Ok(capacity
        .into_iter()
        .map(|(id, max)| MetricValue::new(f64::from(max), id))
        .collect())
}

/// Dispatch on `singleTenant`.
pub async fn run_query(ctx: &AppContext, query: &MetricQuery) -> Result<QueryResult, AppError> {
    if query.single_tenant {
        info!("querying metrics for a single tenant");
        query_tenant_metrics(ctx, query).await
    } else {
        info!("querying metrics across tenants");
        query_metrics(ctx, query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{metrics::model::QueryDimension, tenant::Resource};

    fn tenants() -> HashMap<String, Tenant> {
        let mut tenant = Tenant::default();
        tenant.resources.insert(
            LOAD_BALANCER_RESOURCE.into(),
            Resource {
                name: "app/tenant-abc/123".into(),
                ..Default::default()
            },
        );
        [("abc-1".to_string(), tenant)].into_iter().collect()
    }

    fn query(name_space: &str) -> MetricQuery {
        MetricQuery {
            stat: Some("Sum".into()),
            dimensions: vec![QueryDimension {
                metric_name: "RequestCount".into(),
                name_space: name_space.into(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn short_names_use_first_id_segment() {
        assert_eq!(
            tenant_short_name("d1c4c7a2-4a8e-4b8e-9f0e-0c1f2e3d4b5a"),
            "tenant-d1c4c7a2"
        );
        assert_eq!(tenant_short_name("tenant-d1c4c7a2"), "tenant-d1c4c7a2");
    }

    #[test]
    fn builds_raw_and_filled_queries() {
        let data = build_data_queries(&query("AWS/ApplicationELB"), &["abc-1".into()], &tenants(), 300)
            .unwrap();
        assert_eq!(data.queries.len(), 2);
        assert_eq!(data.queries[0].id(), Some("query0_0"));
        assert_eq!(data.queries[0].return_data(), Some(false));
        assert_eq!(data.queries[1].expression(), Some("FILL(query0_0, 0)"));
        assert_eq!(
            data.dimensions["query_0"].tenant_id.as_deref(),
            Some("abc-1")
        );
    }

    #[test]
    fn missing_alb_and_unknown_namespace_fail() {
        assert!(build_data_queries(&query("AWS/ApplicationELB"), &["zzz".into()], &tenants(), 300).is_err());
        assert!(build_data_queries(&query("AWS/Lambda"), &["abc-1".into()], &tenants(), 300).is_err());
    }

    #[test]
    fn query_count_is_capped() {
        let ids: Vec<String> = (0..251).map(|i| format!("t{i}")).collect();
        let result = build_data_queries(&query("AWS/ECS"), &ids, &HashMap::new(), 300);
        assert!(result.is_err());
    }
}
