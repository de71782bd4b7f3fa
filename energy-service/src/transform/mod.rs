use crate::pipeline::{Envelope, IngestError, Transform};
use crate::sources::csv_upload::CONSUMPTION_COLUMN;
use energy_client::domain::EnergyRecord;

/// Pure validation of an `EnergyRecord`.
///
/// Rules:
/// - consumption must be finite (`NaN` and `inf` still parse as `f64`).
/// - negative and zero values are accepted.
pub fn validate_consumption(env: Envelope<EnergyRecord>) -> Result<Envelope<EnergyRecord>, IngestError> {
    let value = env.payload.consumption;

    if !value.is_finite() {
        return Err(IngestError::Parse {
            row: env.row,
            column: CONSUMPTION_COLUMN,
            value: value.to_string(),
            reason: "consumption must be a finite number".to_string(),
        });
    }

    Ok(env)
}

#[derive(Clone, Default)]
pub struct FiniteConsumption;

#[async_trait::async_trait]
impl Transform<EnergyRecord> for FiniteConsumption {
    async fn apply(&self, input: Envelope<EnergyRecord>) -> Result<Envelope<EnergyRecord>, IngestError> {
        match validate_consumption(input) {
            Ok(env) => Ok(env),
            Err(e) => {
                metrics::counter!("ingest_rejected_rows_total").increment(1);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use energy_client::domain::OwnerId;
    use time::macros::datetime;

    fn envelope(consumption: f64) -> Envelope<EnergyRecord> {
        Envelope {
            payload: EnergyRecord::new(OwnerId::new("u-1"), datetime!(2024-01-01 00:00:00 UTC), consumption),
            row: 3,
        }
    }

    #[test]
    fn accepts_zero_and_negative_values() {
        assert!(validate_consumption(envelope(0.0)).is_ok());
        assert!(validate_consumption(envelope(-2.5)).is_ok());
    }

    #[test]
    fn rejects_nan() {
        let res = validate_consumption(envelope(f64::NAN));
        assert!(matches!(res, Err(IngestError::Parse { row: 3, column: "consumption", .. })));
    }

    #[tokio::test]
    async fn transform_rejects_infinity() {
        let res = FiniteConsumption.apply(envelope(f64::INFINITY)).await;
        assert!(matches!(res, Err(IngestError::Parse { .. })));
    }
}
