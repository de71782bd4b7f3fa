use energy_client::{
    db::{energy_queries, upload_queries},
    domain::{Bucket, BucketValue, EnergyRecord, OwnerId, Reducer, UploadBatch},
};
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::{EnergyStore, StoreError};

pub struct PgEnergyStore {
    pool: PgPool,
}

impl PgEnergyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(uri: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(uri)
            .await?;
        Ok(Self::new(pool))
    }
}

fn observe<T>(res: Result<T, sqlx::Error>) -> Result<T, StoreError> {
    res.map_err(|e| {
        metrics::counter!("store_errors_total").increment(1);
        StoreError::Database(e)
    })
}

#[async_trait::async_trait]
impl EnergyStore for PgEnergyStore {
    async fn create_batch(&self, owner: &OwnerId, payload: &str) -> Result<UploadBatch, StoreError> {
        observe(upload_queries::create_batch(&self.pool, owner, payload).await)
    }

    async fn commit_batch(&self, batch_id: i64, records: &[EnergyRecord]) -> Result<u64, StoreError> {
        let mut tx = observe(self.pool.begin().await)?;

        // A batch is committed at most once.
        if !observe(upload_queries::mark_processed(&mut *tx, batch_id).await)? {
            return Err(StoreError::UnknownBatch(batch_id));
        }
        let inserted = observe(energy_queries::insert_records(&mut *tx, batch_id, records).await)?;

        observe(tx.commit().await)?;
        tracing::debug!(batch_id, inserted, "batch committed");
        Ok(inserted)
    }

    async fn batches_for_owner(&self, owner: &OwnerId) -> Result<Vec<UploadBatch>, StoreError> {
        observe(upload_queries::batches_for_owner(&self.pool, owner).await)
    }

    async fn records_for_owner(&self, owner: &OwnerId) -> Result<Vec<EnergyRecord>, StoreError> {
        observe(energy_queries::records_for_owner(&self.pool, owner).await)
    }

    async fn bucket_rollup(
        &self,
        owner: &OwnerId,
        bucket: Bucket,
        reducer: Reducer,
    ) -> Result<Vec<BucketValue>, StoreError> {
        observe(energy_queries::bucket_rollup(&self.pool, owner, bucket, reducer).await)
    }

    async fn total_consumption(&self, owner: &OwnerId) -> Result<f64, StoreError> {
        observe(energy_queries::total_consumption(&self.pool, owner).await)
    }

    async fn peak(&self, owner: &OwnerId) -> Result<Option<EnergyRecord>, StoreError> {
        observe(energy_queries::peak_record(&self.pool, owner).await)
    }

    async fn delete_owner(&self, owner: &OwnerId) -> Result<u64, StoreError> {
        observe(energy_queries::delete_owner(&self.pool, owner).await)
    }
}
