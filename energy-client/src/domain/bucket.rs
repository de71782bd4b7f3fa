use std::collections::BTreeMap;

use time::{Duration, OffsetDateTime, PrimitiveDateTime, Time};

use super::EnergyRecord;

/// Fixed-width interval used to group records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Hour,
    Day,
    Month,
}

impl Bucket {
    /// Floor of `ts` to the bucket boundary, on the wall clock of its own offset.
    pub fn truncate(self, ts: OffsetDateTime) -> PrimitiveDateTime {
        let date = ts.date();
        let midnight = PrimitiveDateTime::new(date, Time::MIDNIGHT);
        match self {
            Bucket::Hour => midnight + Duration::hours(i64::from(ts.hour())),
            Bucket::Day => midnight,
            Bucket::Month => midnight - Duration::days(i64::from(date.day()) - 1),
        }
    }

    /// Unit name understood by PostgreSQL's `date_trunc`.
    pub fn date_trunc_unit(self) -> &'static str {
        match self {
            Bucket::Hour => "hour",
            Bucket::Day => "day",
            Bucket::Month => "month",
        }
    }
}

/// How the values falling into one bucket are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Sum,
    Average,
}

impl Reducer {
    pub fn sql_function(self) -> &'static str {
        match self {
            Reducer::Sum => "SUM",
            Reducer::Average => "AVG",
        }
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct BucketValue {
    pub bucket: PrimitiveDateTime,
    pub value: f64,
}

/// Group records by `bucket` and reduce each group, ordered by bucket start.
///
/// Empty input yields an empty vector.
pub fn rollup<'a, I>(records: I, bucket: Bucket, reducer: Reducer) -> Vec<BucketValue>
where
    I: IntoIterator<Item = &'a EnergyRecord>,
{
    let mut groups: BTreeMap<PrimitiveDateTime, (f64, u64)> = BTreeMap::new();

    for record in records {
        let slot = groups.entry(bucket.truncate(record.timestamp)).or_insert((0.0, 0));
        slot.0 += record.consumption;
        slot.1 += 1;
    }

    groups
        .into_iter()
        .map(|(start, (sum, count))| BucketValue {
            bucket: start,
            value: match reducer {
                Reducer::Sum => sum,
                Reducer::Average => sum / count as f64,
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OwnerId;
    use time::macros::datetime;

    fn record(ts: OffsetDateTime, consumption: f64) -> EnergyRecord {
        EnergyRecord::new(OwnerId::new("u-1"), ts, consumption)
    }

    #[test]
    fn truncate_floors_in_native_offset() {
        let ts = datetime!(2024-03-15 23:45:10 +02:00);

        assert_eq!(Bucket::Hour.truncate(ts), datetime!(2024-03-15 23:00:00));
        assert_eq!(Bucket::Day.truncate(ts), datetime!(2024-03-15 00:00:00));
        assert_eq!(Bucket::Month.truncate(ts), datetime!(2024-03-01 00:00:00));
    }

    #[test]
    fn rollup_sums_and_orders_buckets() {
        let records = vec![
            record(datetime!(2024-02-01 00:00:00 UTC), 20.0),
            record(datetime!(2024-01-01 00:00:00 UTC), 10.0),
            record(datetime!(2024-01-15 12:00:00 UTC), 5.0),
        ];

        let out = rollup(&records, Bucket::Month, Reducer::Sum);

        assert_eq!(
            out,
            vec![
                BucketValue { bucket: datetime!(2024-01-01 00:00:00), value: 15.0 },
                BucketValue { bucket: datetime!(2024-02-01 00:00:00), value: 20.0 },
            ]
        );
    }

    #[test]
    fn rollup_average_divides_by_group_size() {
        let records = vec![
            record(datetime!(2024-01-01 10:05:00 UTC), 4.0),
            record(datetime!(2024-01-01 10:55:00 UTC), 6.0),
            record(datetime!(2024-01-01 11:00:00 UTC), 1.0),
        ];

        let out = rollup(&records, Bucket::Hour, Reducer::Average);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].value, 5.0);
        assert_eq!(out[1].value, 1.0);
    }

    #[test]
    fn rollup_of_nothing_is_empty() {
        let records: Vec<EnergyRecord> = Vec::new();
        assert!(rollup(&records, Bucket::Day, Reducer::Sum).is_empty());
    }
}
