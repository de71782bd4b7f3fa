//! Time-bucketed rollups of one owner's records.

use std::{str::FromStr, sync::Arc};

use energy_client::domain::{Bucket, OwnerId, Reducer};
use time::{Month, PrimitiveDateTime};

use crate::store::{EnergyStore, StoreError};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid period parameter. Use 'monthly', 'daily', or 'hourly'")]
pub struct InvalidPeriod {
    pub given: String,
}

#[derive(thiserror::Error, Debug)]
pub enum AggregationError {
    #[error(transparent)]
    InvalidPeriod(#[from] InvalidPeriod),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    #[default]
    Monthly,
    Daily,
    Hourly,
}

impl FromStr for Period {
    type Err = InvalidPeriod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(Period::Monthly),
            "daily" => Ok(Period::Daily),
            "hourly" => Ok(Period::Hourly),
            other => Err(InvalidPeriod {
                given: other.to_string(),
            }),
        }
    }
}

impl Period {
    pub fn bucket(self) -> Bucket {
        match self {
            Period::Monthly => Bucket::Month,
            Period::Daily => Bucket::Day,
            Period::Hourly => Bucket::Hour,
        }
    }

    /// Hourly buckets are averaged, the wider ones summed.
    pub fn reducer(self) -> Reducer {
        match self {
            Period::Monthly | Period::Daily => Reducer::Sum,
            Period::Hourly => Reducer::Average,
        }
    }

    pub fn label(self, start: PrimitiveDateTime) -> String {
        match self {
            Period::Monthly => month_abbrev(start.month()).to_string(),
            Period::Daily => format!("{:02} {}", start.day(), month_abbrev(start.month())),
            Period::Hourly => format!("{:02}:{:02}", start.hour(), start.minute()),
        }
    }
}

fn month_abbrev(month: Month) -> &'static str {
    match month {
        Month::January => "Jan",
        Month::February => "Feb",
        Month::March => "Mar",
        Month::April => "Apr",
        Month::May => "May",
        Month::June => "Jun",
        Month::July => "Jul",
        Month::August => "Aug",
        Month::September => "Sep",
        Month::October => "Oct",
        Month::November => "Nov",
        Month::December => "Dec",
    }
}

/// Round to two decimals, halves away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub label: String,
    pub value: f64,
}

pub struct AggregationEngine {
    store: Arc<dyn EnergyStore>,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn EnergyStore>) -> Self {
        Self { store }
    }

    /// Rollup for a textual mode (`monthly`, `daily` or `hourly`).
    pub async fn aggregate(&self, owner: &OwnerId, mode: &str) -> Result<Vec<SeriesPoint>, AggregationError> {
        let period: Period = mode.parse()?;
        Ok(self.aggregate_period(owner, period).await?)
    }

    pub async fn aggregate_period(&self, owner: &OwnerId, period: Period) -> Result<Vec<SeriesPoint>, StoreError> {
        let buckets = self
            .store
            .bucket_rollup(owner, period.bucket(), period.reducer())
            .await?;

        Ok(buckets
            .into_iter()
            .map(|b| SeriesPoint {
                label: period.label(b.bucket),
                value: round2(b.value),
            })
            .collect())
    }
}
