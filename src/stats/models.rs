use chrono::{Datelike, Days, Months, NaiveDate};
use serde::Serialize;
use sqlx::FromRow;
use strum_macros::{Display, EnumString};

use crate::shared::AppError;

/// Live workouts logged on one UTC day
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct DailyCount {
    pub day: NaiveDate,
    pub workouts: i64,
}

/// Heaviest live entry for one exercise on one UTC day, dated by its workout
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct DailyMaxWeight {
    pub day: NaiveDate,
    pub weight: f64,
}

/// Lifetime totals over a user's live workouts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingTotals {
    pub workouts: i64,
    pub entries: i64,
    /// Distinct exercises performed, ascending
    pub exercise_ids: Vec<i64>,
}

/// Reporting window. Anything unrecognised falls back to a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Week,
    #[default]
    Month,
    Year,
}

fn window_out_of_range() -> AppError {
    AppError::internal("Failed to compute statistics window", "date out of range")
}

impl TimeRange {
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        raw.and_then(|r| r.trim().parse().ok()).unwrap_or_default()
    }

    /// Start dates of the reporting buckets ending at `today`, oldest first.
    /// Week and month use one bucket per day, year one per calendar month.
    pub fn buckets(self, today: NaiveDate) -> Result<Vec<NaiveDate>, AppError> {
        let (count, monthly) = match self {
            TimeRange::Week => (7, false),
            TimeRange::Month => (30, false),
            TimeRange::Year => (12, true),
        };

        let anchor = if monthly {
            today.with_day(1).ok_or_else(window_out_of_range)?
        } else {
            today
        };

        (0..count)
            .rev()
            .map(|back| {
                if monthly {
                    anchor.checked_sub_months(Months::new(back))
                } else {
                    anchor.checked_sub_days(Days::new(u64::from(back)))
                }
                .ok_or_else(window_out_of_range)
            })
            .collect()
    }

    /// First day the window covers
    pub fn since(self, today: NaiveDate) -> Result<NaiveDate, AppError> {
        self.buckets(today)?
            .first()
            .copied()
            .ok_or_else(window_out_of_range)
    }

    /// Bucket a day falls into
    pub fn bucket_of(self, day: NaiveDate) -> NaiveDate {
        match self {
            TimeRange::Week | TimeRange::Month => day,
            TimeRange::Year => day.with_day(1).unwrap_or(day),
        }
    }

    pub fn label(self, bucket: NaiveDate) -> String {
        match self {
            TimeRange::Week | TimeRange::Month => bucket.format("%Y-%m-%d").to_string(),
            TimeRange::Year => bucket.format("%Y-%m").to_string(),
        }
    }
}
