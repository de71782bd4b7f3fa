use time::OffsetDateTime;

use super::OwnerId;

/// One energy-consumption observation.
///
/// `timestamp` keeps the UTC offset it was recorded with; bucketing happens on
/// the wall clock of that offset.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyRecord {
    pub owner: OwnerId,
    pub timestamp: OffsetDateTime,
    pub consumption: f64,
}

impl EnergyRecord {
    pub fn new(owner: OwnerId, timestamp: OffsetDateTime, consumption: f64) -> Self {
        Self {
            owner,
            timestamp,
            consumption,
        }
    }
}
