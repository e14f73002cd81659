use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};

use super::model::MetricQuery;
use crate::error::AppError;

/// Named dashboard windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Hour1,
    Hour2,
    Hour4,
    Hour8,
    Hour10,
    Hour12,
    Hour24,
    Today,
    Day7,
    ThisWeek,
    ThisMonth,
    Day30,
}

impl TimeRange {
    const ALL: [TimeRange; 12] = [
        TimeRange::Hour1,
        TimeRange::Hour2,
        TimeRange::Hour4,
        TimeRange::Hour8,
        TimeRange::Hour10,
        TimeRange::Hour12,
        TimeRange::Hour24,
        TimeRange::Today,
        TimeRange::Day7,
        TimeRange::ThisWeek,
        TimeRange::ThisMonth,
        TimeRange::Day30,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TimeRange::Hour1 => "HOUR_1",
            TimeRange::Hour2 => "HOUR_2",
            TimeRange::Hour4 => "HOUR_4",
            TimeRange::Hour8 => "HOUR_8",
            TimeRange::Hour10 => "HOUR_10",
            TimeRange::Hour12 => "HOUR_12",
            TimeRange::Hour24 => "HOUR_24",
            TimeRange::Today => "TODAY",
            TimeRange::Day7 => "DAY_7",
            TimeRange::ThisWeek => "THIS_WEEK",
            TimeRange::ThisMonth => "THIS_MONTH",
            TimeRange::Day30 => "DAY_30",
        }
    }

    /// Sampling period in seconds used for this window.
    pub fn period(&self) -> i32 {
        match self {
            TimeRange::Today | TimeRange::ThisWeek => 60 * 60,
            TimeRange::Day7 | TimeRange::Day30 | TimeRange::ThisMonth => 60 * 60 * 3,
            TimeRange::Hour8 | TimeRange::Hour10 | TimeRange::Hour12 | TimeRange::Hour24 => 60 * 15,
            _ => 60 * 5,
        }
    }

    /// Start of the window ending at `now`, with midnight-aligned starts shifted by `tz_offset` minutes.
    pub fn start(&self, now: DateTime<Utc>, tz_offset: i64) -> DateTime<Utc> {
        let today = now.date_naive();
        let midnight = |date: chrono::NaiveDate| {
            date.and_time(NaiveTime::MIN).and_utc() - Duration::minutes(tz_offset)
        };
        match self {
            TimeRange::Hour1 => now - Duration::hours(1),
            TimeRange::Hour2 => now - Duration::hours(2),
            TimeRange::Hour4 => now - Duration::hours(4),
            TimeRange::Hour8 => now - Duration::hours(8),
            TimeRange::Hour10 => now - Duration::hours(10),
            TimeRange::Hour12 => now - Duration::hours(12),
            TimeRange::Hour24 => now - Duration::hours(24),
            TimeRange::Today => midnight(today),
            TimeRange::ThisWeek => {
                let back = match today.weekday().num_days_from_monday() {
                    0 => 7,
                    days => days,
                };
                midnight(today - Duration::days(i64::from(back)))
            }
            TimeRange::ThisMonth => midnight(today.with_day(1).unwrap_or(today)),
            TimeRange::Day7 => midnight(today - Duration::days(7)),
            TimeRange::Day30 => midnight(today - Duration::days(30)),
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TimeRange {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|range| range.name() == value)
            .ok_or_else(|| AppError::Validation(format!("Invalid TimeRangeName provided: {value}")))
    }
}

fn named_range(name: Option<&str>) -> Result<Option<TimeRange>, AppError> {
    name.map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::parse)
        .transpose()
}

/// Period for a query: an explicit period wins over the named range.
pub fn period_for(query: &MetricQuery) -> Result<i32, AppError> {
    if let Some(period) = query.period {
        return Ok(period);
    }
    named_range(query.time_range_name.as_deref())?
        .map(|range| range.period())
        .ok_or_else(|| AppError::Validation("Query requires a period or timeRangeName".into()))
}

/// Resolve the query window; a named range overrides explicit dates.
pub fn time_range_for(
    name: Option<&str>,
    tz_offset: i64,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    match named_range(name)? {
        Some(range) => Ok((range.start(now, tz_offset), now)),
        None => match (start, end) {
            (Some(start), Some(end)) => Ok((start, end)),
            _ => Err(AppError::Validation(
                "Query requires startDate and endDate when no timeRangeName is given".into(),
            )),
        },
    }
}

/// Dashboard label for a data point timestamp.
pub fn period_label(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%m-%d %H:%M").to_string()
}
