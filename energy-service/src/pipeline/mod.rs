use std::{pin::Pin, sync::Arc, time::Instant};

use energy_client::domain::{EnergyRecord, OwnerId, UploadBatch};
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::{
    sources::{csv_upload::delimiter_for, CsvUploadSource},
    store::{EnergyStore, StoreError},
    transform::FiniteConsumption,
};

/// Rows parsed between two cooperative yields to the runtime.
const YIELD_EVERY_ROWS: usize = 1024;

/// One parsed item together with the 1-based data row it came from.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub row: u64,
}

#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error("CSV must contain columns: timestamp, consumption (missing: {})", .missing.join(", "))]
    Schema { missing: Vec<String> },
    #[error("row {row}: invalid {column} '{value}': {reason}")]
    Parse {
        row: u64,
        column: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to read CSV: {0}")]
    Malformed(String),
    #[error("record owner '{found}' does not match upload owner '{expected}'")]
    OwnerMismatch { expected: OwnerId, found: OwnerId },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("ingestion cancelled")]
    Cancelled,
}

pub type EnvelopeStream<T> = Pin<Box<dyn Stream<Item = Result<Envelope<T>, IngestError>> + Send>>;

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(&self) -> EnvelopeStream<T>;
}

#[async_trait::async_trait]
pub trait Transform<T>: Send + Sync {
    async fn apply(&self, input: Envelope<T>) -> Result<Envelope<T>, IngestError>;
}

/// Result of a successful upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub batch_id: i64,
    pub records: u64,
}

/// Validates a whole upload before anything is written, then commits it in one
/// store operation.
pub struct IngestPipeline {
    store: Arc<dyn EnergyStore>,
    transforms: Vec<Arc<dyn Transform<EnergyRecord>>>,
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn EnergyStore>) -> Self {
        Self {
            store,
            transforms: vec![Arc::new(FiniteConsumption)],
        }
    }

    /// Register an upload batch for `owner` and ingest `bytes` into it.
    ///
    /// The delimiter follows the file name (see `delimiter_for`).
    pub async fn ingest_upload(
        &self,
        owner: &OwnerId,
        file_name: &str,
        bytes: impl Into<Arc<[u8]>>,
        cancel: &CancellationToken,
    ) -> Result<IngestOutcome, IngestError> {
        let source = CsvUploadSource::new(bytes, owner.clone()).with_delimiter(delimiter_for(file_name));
        let payload = format!("{file_name}#blake3:{}", source.digest());
        let batch = self.store.create_batch(owner, &payload).await?;
        tracing::info!(batch_id = batch.id, %owner, file_name, "upload batch registered");

        let records = self.ingest(&batch, &source, cancel).await?;
        Ok(IngestOutcome {
            batch_id: batch.id,
            records,
        })
    }

    /// Parse, validate and commit every row of `source` into `batch`.
    ///
    /// Either all rows are stored and the batch is marked processed, or
    /// nothing changes.
    pub async fn ingest<S>(
        &self,
        batch: &UploadBatch,
        source: &S,
        cancel: &CancellationToken,
    ) -> Result<u64, IngestError>
    where
        S: Source<EnergyRecord>,
    {
        let started = Instant::now();
        let result = self.collect(source, cancel).await;

        let records = match result {
            Ok(records) => records,
            Err(e) => {
                metrics::counter!("upload_failures_total").increment(1);
                tracing::warn!(batch_id = batch.id, error = %e, "upload rejected");
                return Err(e);
            }
        };

        if let Some(stray) = records.iter().find(|r| r.owner != batch.owner) {
            tracing::error!(batch_id = batch.id, owner = %stray.owner, "record owner does not match batch");
            return Err(IngestError::OwnerMismatch {
                expected: batch.owner.clone(),
                found: stray.owner.clone(),
            });
        }

        let inserted = match self.store.commit_batch(batch.id, &records).await {
            Ok(n) => n,
            Err(e) => {
                metrics::counter!("upload_failures_total").increment(1);
                tracing::error!(batch_id = batch.id, error = %e, "failed to commit upload batch");
                return Err(e.into());
            }
        };

        metrics::counter!("uploads_total").increment(1);
        metrics::counter!("energy_records_ingested_total").increment(inserted);
        metrics::histogram!("ingest_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(batch_id = batch.id, inserted, "upload batch processed");

        Ok(inserted)
    }

    async fn collect<S>(&self, source: &S, cancel: &CancellationToken) -> Result<Vec<EnergyRecord>, IngestError>
    where
        S: Source<EnergyRecord>,
    {
        let mut stream = source.stream().await;
        let mut records = Vec::new();

        while let Some(item) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }

            let mut env = item?;
            for t in &self.transforms {
                env = t.apply(env).await?;
            }
            records.push(env.payload);

            if records.len() % YIELD_EVERY_ROWS == 0 {
                tokio::task::yield_now().await;
            }
        }

        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        Ok(records)
    }
}
