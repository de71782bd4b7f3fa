use std::sync::Arc;

use energy_client::domain::{Bucket, OwnerId, Reducer};
use time::OffsetDateTime;

use crate::{
    aggregation::round2,
    store::{EnergyStore, StoreError},
};

#[derive(Debug, Clone, PartialEq)]
pub struct Peak {
    pub value: f64,
    pub timestamp: Option<OffsetDateTime>,
}

/// Summary metrics over an owner's full record set, rounded to two decimals.
#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    pub total_consumption: f64,
    /// Mean of the per-day sums over days that have records.
    pub average_daily: f64,
    pub peak: Peak,
    pub estimated_cost: f64,
}

pub struct StatisticsEngine {
    store: Arc<dyn EnergyStore>,
    rate_per_kwh: f64,
}

impl StatisticsEngine {
    pub fn new(store: Arc<dyn EnergyStore>, rate_per_kwh: f64) -> Self {
        Self { store, rate_per_kwh }
    }

    pub async fn statistics(&self, owner: &OwnerId) -> Result<Statistics, StoreError> {
        let total = self.store.total_consumption(owner).await?;

        let daily = self.store.bucket_rollup(owner, Bucket::Day, Reducer::Sum).await?;
        let average_daily = if daily.is_empty() {
            0.0
        } else {
            daily.iter().map(|d| d.value).sum::<f64>() / daily.len() as f64
        };

        let peak = match self.store.peak(owner).await? {
            Some(record) => Peak {
                value: round2(record.consumption),
                timestamp: Some(record.timestamp),
            },
            None => Peak {
                value: 0.0,
                timestamp: None,
            },
        };

        Ok(Statistics {
            total_consumption: round2(total),
            average_daily: round2(average_daily),
            peak,
            estimated_cost: round2(total * self.rate_per_kwh),
        })
    }
}
