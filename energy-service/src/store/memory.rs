use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicBool, Ordering},
};

use energy_client::domain::{rollup, Bucket, BucketValue, EnergyRecord, OwnerId, Reducer, UploadBatch};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{EnergyStore, StoreError};

#[derive(Default)]
struct State {
    next_batch_id: i64,
    batches: Vec<UploadBatch>,
    records: HashMap<OwnerId, Vec<EnergyRecord>>,
}

/// Process-local store. Every mutation happens under one write lock, which
/// makes `commit_batch` atomic.
#[derive(Default)]
pub struct MemoryEnergyStore {
    state: RwLock<State>,
    fail_commits: AtomicBool,
}

impl MemoryEnergyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `commit_batch` fail without touching state.
    #[cfg(test)]
    pub(crate) fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub async fn record_count(&self, owner: &OwnerId) -> usize {
        self.state.read().await.records.get(owner).map_or(0, Vec::len)
    }
}

#[async_trait::async_trait]
impl EnergyStore for MemoryEnergyStore {
    async fn create_batch(&self, owner: &OwnerId, payload: &str) -> Result<UploadBatch, StoreError> {
        let mut state = self.state.write().await;
        state.next_batch_id += 1;

        let batch = UploadBatch {
            id: state.next_batch_id,
            owner: owner.clone(),
            payload: payload.to_string(),
            submitted_at: OffsetDateTime::now_utc(),
            processed: false,
        };
        state.batches.push(batch.clone());
        Ok(batch)
    }

    async fn commit_batch(&self, batch_id: i64, records: &[EnergyRecord]) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;

        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }

        let batch = state
            .batches
            .iter_mut()
            .find(|b| b.id == batch_id && !b.processed)
            .ok_or(StoreError::UnknownBatch(batch_id))?;
        batch.processed = true;

        let mut touched = HashSet::new();
        for record in records {
            state
                .records
                .entry(record.owner.clone())
                .or_default()
                .push(record.clone());
            touched.insert(&record.owner);
        }
        for owner in touched {
            if let Some(owned) = state.records.get_mut(owner) {
                owned.sort_by_key(|r| r.timestamp);
            }
        }

        Ok(records.len() as u64)
    }

    async fn batches_for_owner(&self, owner: &OwnerId) -> Result<Vec<UploadBatch>, StoreError> {
        let state = self.state.read().await;
        let mut out: Vec<UploadBatch> = state.batches.iter().filter(|b| &b.owner == owner).cloned().collect();
        out.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn records_for_owner(&self, owner: &OwnerId) -> Result<Vec<EnergyRecord>, StoreError> {
        Ok(self.state.read().await.records.get(owner).cloned().unwrap_or_default())
    }

    async fn bucket_rollup(
        &self,
        owner: &OwnerId,
        bucket: Bucket,
        reducer: Reducer,
    ) -> Result<Vec<BucketValue>, StoreError> {
        let state = self.state.read().await;
        let records = state.records.get(owner).map(Vec::as_slice).unwrap_or_default();
        Ok(rollup(records, bucket, reducer))
    }

    async fn total_consumption(&self, owner: &OwnerId) -> Result<f64, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .records
            .get(owner)
            .map(|rs| rs.iter().map(|r| r.consumption).sum())
            .unwrap_or(0.0))
    }

    async fn peak(&self, owner: &OwnerId) -> Result<Option<EnergyRecord>, StoreError> {
        let state = self.state.read().await;
        let Some(records) = state.records.get(owner) else {
            return Ok(None);
        };

        // Records are kept in timestamp order, so a strict comparison keeps the earliest tie.
        let mut peak: Option<&EnergyRecord> = None;
        for record in records {
            if peak.map_or(true, |p| record.consumption > p.consumption) {
                peak = Some(record);
            }
        }
        Ok(peak.cloned())
    }

    async fn delete_owner(&self, owner: &OwnerId) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        state.batches.retain(|b| &b.owner != owner);
        Ok(state.records.remove(owner).map_or(0, |rs| rs.len() as u64))
    }
}
