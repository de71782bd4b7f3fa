use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use time::{OffsetDateTime, UtcOffset};

use crate::domain::{Bucket, BucketValue, EnergyRecord, OwnerId, Reducer};

/// PostgreSQL caps a statement at 65535 bind parameters; each row binds five.
const INSERT_CHUNK_ROWS: usize = 10_000;

#[derive(Debug, sqlx::FromRow)]
struct EnergyRecordRow {
    owner_id: OwnerId,
    ts: OffsetDateTime,
    utc_offset_s: i32,
    consumption: f64,
}

impl TryFrom<EnergyRecordRow> for EnergyRecord {
    type Error = sqlx::Error;

    fn try_from(row: EnergyRecordRow) -> Result<Self, Self::Error> {
        let offset = UtcOffset::from_whole_seconds(row.utc_offset_s)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(EnergyRecord::new(row.owner_id, row.ts.to_offset(offset), row.consumption))
    }
}

/// Insert all records of one batch.
///
/// Runs on the caller's connection so it can share a transaction with the
/// batch status update.
pub async fn insert_records(
    conn: &mut PgConnection,
    batch_id: i64,
    records: &[EnergyRecord],
) -> sqlx::Result<u64> {
    let mut inserted = 0;

    for chunk in records.chunks(INSERT_CHUNK_ROWS) {
        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO energy_records (owner_id, batch_id, ts, utc_offset_s, consumption) ",
        );
        builder.push_values(chunk, |mut b, r| {
            b.push_bind(&r.owner)
                .push_bind(batch_id)
                .push_bind(r.timestamp)
                .push_bind(r.timestamp.offset().whole_seconds())
                .push_bind(r.consumption);
        });

        inserted += builder.build().execute(&mut *conn).await?.rows_affected();
    }

    Ok(inserted)
}

/// All records of one owner, oldest first.
pub async fn records_for_owner(pool: &PgPool, owner: &OwnerId) -> sqlx::Result<Vec<EnergyRecord>> {
    let rows = sqlx::query_as::<_, EnergyRecordRow>(
        r#"
        SELECT owner_id, ts, utc_offset_s, consumption
        FROM energy_records
        WHERE owner_id = $1
        ORDER BY ts, id
        "#,
    )
    .bind(owner)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(EnergyRecord::try_from).collect()
}

/// Statement for `bucket_rollup`: `$1` is the owner, `$2` the `date_trunc` unit.
///
/// `ts` is stored as an instant; adding `utc_offset_s` to its UTC reading gives
/// the wall clock the record was taken in.
fn rollup_sql(reducer: Reducer) -> String {
    // The reducer is a closed enum, so formatting it into the statement is safe.
    format!(
        r#"
        SELECT
            date_trunc($2, (ts AT TIME ZONE 'UTC') + make_interval(secs => utc_offset_s)) AS bucket,
            {}(consumption) AS value
        FROM energy_records
        WHERE owner_id = $1
        GROUP BY 1
        ORDER BY 1
        "#,
        reducer.sql_function()
    )
}

/// Group one owner's records by `bucket` on their local wall clock and reduce.
pub async fn bucket_rollup(
    pool: &PgPool,
    owner: &OwnerId,
    bucket: Bucket,
    reducer: Reducer,
) -> sqlx::Result<Vec<BucketValue>> {
    sqlx::query_as::<_, BucketValue>(&rollup_sql(reducer))
        .bind(owner)
        .bind(bucket.date_trunc_unit())
        .fetch_all(pool)
        .await
}

pub async fn total_consumption(pool: &PgPool, owner: &OwnerId) -> sqlx::Result<f64> {
    sqlx::query_scalar::<_, f64>(
        "SELECT COALESCE(SUM(consumption), 0) FROM energy_records WHERE owner_id = $1",
    )
    .bind(owner)
    .fetch_one(pool)
    .await
}

/// Record with the highest consumption; the earliest one wins a tie.
pub async fn peak_record(pool: &PgPool, owner: &OwnerId) -> sqlx::Result<Option<EnergyRecord>> {
    let row = sqlx::query_as::<_, EnergyRecordRow>(
        r#"
        SELECT owner_id, ts, utc_offset_s, consumption
        FROM energy_records
        WHERE owner_id = $1
        ORDER BY consumption DESC, ts ASC, id ASC
        LIMIT 1
        "#,
    )
    .bind(owner)
    .fetch_optional(pool)
    .await?;

    row.map(EnergyRecord::try_from).transpose()
}

/// Delete an owner; records and batches go with it through `ON DELETE CASCADE`.
///
/// Returns the number of records removed.
pub async fn delete_owner(pool: &PgPool, owner: &OwnerId) -> sqlx::Result<u64> {
    let mut tx = pool.begin().await?;

    let records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM energy_records WHERE owner_id = $1")
        .bind(owner)
        .fetch_one(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM owners WHERE id = $1")
        .bind(owner)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(records as u64)
}
