//! In-memory aggregation of per-tenant CloudWatch series.

use std::{
    cmp::Reverse,
    collections::{BTreeMap, BinaryHeap},
};

use chrono::{DateTime, Utc};

use super::{
    model::{round_to, MetricDimension, MetricResultItem, MetricValue},
    time_range::period_label,
};

const TOP_TENANTS: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Percentiles {
    pub p90: f64,
    pub p70: f64,
    pub p50: f64,
    pub average: f64,
    pub sum: f64,
}

fn percentile(sorted: &[MetricValue], fraction: f64) -> f64 {
    let index = (fraction * sorted.len() as f64).round() as usize;
    sorted[index.saturating_sub(1).min(sorted.len() - 1)].value
}

/// Percentiles of values sorted ascending. The "p90" slot reports the 95th percentile.
pub fn percentiles(sorted: &[MetricValue]) -> Percentiles {
    if sorted.is_empty() {
        return Percentiles::default();
    }
    let sum: f64 = sorted.iter().map(|v| v.value).sum();
    Percentiles {
        p90: percentile(sorted, 0.95),
        p70: percentile(sorted, 0.70),
        p50: percentile(sorted, 0.50),
        average: round_to(sum / sorted.len() as f64, 3),
        sum: round_to(sum, 3),
    }
}

/// Values of one dimension across tenants, bucketed by timestamp.
#[derive(Debug, Default)]
pub struct Timeline {
    buckets: BTreeMap<DateTime<Utc>, BinaryHeap<Reverse<MetricValue>>>,
}

impl Timeline {
    pub fn push(&mut self, timestamp: DateTime<Utc>, value: MetricValue) {
        self.buckets.entry(timestamp).or_default().push(Reverse(value));
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(BinaryHeap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateOptions {
    pub stats_map: bool,
    pub top_tenants: bool,
    pub average: bool,
}

/// Drain a timeline in timestamp order into stats and top tenants.
///
/// Period labels are appended to `periods` the first time they are seen.
pub fn aggregate(
    dimension: &MetricDimension,
    timeline: Timeline,
    options: AggregateOptions,
    periods: &mut Vec<String>,
) -> MetricResultItem {
    let mut item = MetricResultItem::new(dimension.untagged());
    let (mut p90, mut p70, mut p50, mut avg, mut sum) =
        (Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new());
    let mut tenant_sums: Vec<(String, f64)> = Vec::new();

    for (timestamp, mut heap) in timeline.buckets {
        let label = period_label(timestamp);
        if !periods.contains(&label) {
            periods.push(label);
        }
        let mut ordered = Vec::with_capacity(heap.len());
        while let Some(Reverse(value)) = heap.pop() {
            if options.top_tenants {
                match tenant_sums.iter_mut().find(|(id, _)| *id == value.id) {
                    Some((_, total)) => *total += value.value,
                    None => tenant_sums.push((value.id.clone(), value.value)),
                }
            }
            ordered.push(value);
        }
        if options.stats_map {
            let stats = percentiles(&ordered);
            p90.push(stats.p90);
            p70.push(stats.p70);
            p50.push(stats.p50);
            avg.push(stats.average);
            sum.push(stats.sum);
        }
    }

    if options.stats_map {
        item.stats.put("P90", p90);
        item.stats.put("P70", p70);
        item.stats.put("P50", p50);
        item.stats.put("Average", avg);
        item.stats.put("Sum", sum);
    }
    if options.top_tenants {
        tenant_sums.sort_by(|(_, a), (_, b)| b.total_cmp(a));
        let period_count = periods.len().max(1) as f64;
        item.top_tenants = tenant_sums
            .into_iter()
            .take(TOP_TENANTS)
            .map(|(id, total)| {
                let value = if options.average {
                    round_to(total / period_count, 3)
                } else {
                    total
                };
                MetricValue::new(value, id)
            })
            .collect();
    }
    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn values(raw: &[f64]) -> Vec<MetricValue> {
        raw.iter()
            .enumerate()
            .map(|(i, v)| MetricValue::new(*v, format!("t{i}")))
            .collect()
    }

    #[test]
    fn percentiles_of_empty_input_are_zero() {
        assert_eq!(percentiles(&[]), Percentiles::default());
    }

    #[test]
    fn percentiles_pick_by_rank() {
        let sorted = values(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
        let stats = percentiles(&sorted);
        assert_eq!(stats.p90, 10.0);
        assert_eq!(stats.p70, 7.0);
        assert_eq!(stats.p50, 5.0);
        assert_eq!(stats.average, 5.5);
        assert_eq!(stats.sum, 55.0);

        let single = percentiles(&values(&[4.2]));
        assert_eq!((single.p90, single.p50, single.sum), (4.2, 4.2, 4.2));
    }

    #[test]
    fn aggregates_stats_and_top_tenants() {
        let t1 = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
        let mut timeline = Timeline::default();
        timeline.push(t1, MetricValue::new(5.0, "a"));
        timeline.push(t1, MetricValue::new(1.0, "b"));
        timeline.push(t0, MetricValue::new(3.0, "b"));
        timeline.push(t0, MetricValue::new(2.0, "a"));
        assert_eq!(timeline.len(), 4);

        let dimension = MetricDimension::new("AWS/ECS", "CPUUtilization").for_tenant("a");
        let mut periods = Vec::new();
        let item = aggregate(
            &dimension,
            timeline,
            AggregateOptions {
                stats_map: true,
                top_tenants: true,
                average: true,
            },
            &mut periods,
        );
        assert_eq!(periods, ["01-02 09:00", "01-02 10:00"]);
        assert_eq!(item.stats.get("Sum"), Some(&[5.0, 6.0][..]));
        assert_eq!(item.stats.get("P50"), Some(&[2.0, 1.0][..]));
        assert!(item.dimension.tenant_id.is_none());
        let top: Vec<_> = item
            .top_tenants
            .iter()
            .map(|v| (v.id.as_str(), v.value))
            .collect();
        assert_eq!(top, [("a", 3.5), ("b", 2.0)]);
    }

    #[test]
    fn top_tenants_are_capped() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
        let mut timeline = Timeline::default();
        for i in 0..15 {
            timeline.push(ts, MetricValue::new(f64::from(i), format!("t{i}")));
        }
        let mut periods = Vec::new();
        let item = aggregate(
            &MetricDimension::new("AWS/ECS", "CPUUtilization"),
            timeline,
            AggregateOptions {
                top_tenants: true,
                ..Default::default()
            },
            &mut periods,
        );
        assert_eq!(item.top_tenants.len(), 10);
        assert_eq!(item.top_tenants[0].id, "t14");
        assert!(item.stats.0.is_empty());
    }
}
