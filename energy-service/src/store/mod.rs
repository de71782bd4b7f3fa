//! Persistence seam for records and upload batches.

pub mod memory;
pub mod postgres;

pub use memory::MemoryEnergyStore;
pub use postgres::PgEnergyStore;

use std::sync::Arc;

use energy_client::domain::{Bucket, BucketValue, EnergyRecord, OwnerId, Reducer, UploadBatch};

use crate::config::{StoreConfig, StoreKind};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("upload batch {0} does not exist or was already processed")]
    UnknownBatch(i64),
}

#[async_trait::async_trait]
pub trait EnergyStore: Send + Sync {
    /// Register an accepted upload with `processed = false`.
    async fn create_batch(&self, owner: &OwnerId, payload: &str) -> Result<UploadBatch, StoreError>;

    /// Insert every record and mark the batch processed, all or nothing.
    async fn commit_batch(&self, batch_id: i64, records: &[EnergyRecord]) -> Result<u64, StoreError>;

    /// The owner's uploads, newest first.
    async fn batches_for_owner(&self, owner: &OwnerId) -> Result<Vec<UploadBatch>, StoreError>;

    /// The owner's records in ascending timestamp order.
    async fn records_for_owner(&self, owner: &OwnerId) -> Result<Vec<EnergyRecord>, StoreError>;

    async fn bucket_rollup(
        &self,
        owner: &OwnerId,
        bucket: Bucket,
        reducer: Reducer,
    ) -> Result<Vec<BucketValue>, StoreError>;

    async fn total_consumption(&self, owner: &OwnerId) -> Result<f64, StoreError>;

    /// Highest-consumption record; ties go to the earliest timestamp.
    async fn peak(&self, owner: &OwnerId) -> Result<Option<EnergyRecord>, StoreError>;

    /// Remove an owner together with its records and batches.
    async fn delete_owner(&self, owner: &OwnerId) -> Result<u64, StoreError>;
}

/// Build the store selected by `store.kind`.
pub async fn from_config(cfg: &StoreConfig) -> anyhow::Result<Arc<dyn EnergyStore>> {
    match cfg.kind {
        StoreKind::Memory => {
            tracing::warn!("using in-memory store; records are lost on restart");
            Ok(Arc::new(MemoryEnergyStore::new()))
        }
        StoreKind::Postgres => {
            let uri = cfg
                .uri
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("store.uri is required for the postgres store"))?;
            let store = PgEnergyStore::connect(uri, cfg.max_connections).await?;
            Ok(Arc::new(store))
        }
    }
}
