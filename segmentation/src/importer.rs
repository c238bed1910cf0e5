use crate::metrics_defs::{IMPORT_DURATION, IMPORT_FAILED, IMPORT_ROWS};
use crate::sap_client::{SapError, SegmentationSource};
use crate::store::{SegmentationStore, StoreError};
use crate::types::RecordOrigin;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Semaphore, SemaphorePermit};

#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    #[error("another import is already in progress")]
    InProgress,
    #[error("failed to fetch segmentation data: {0}")]
    Source(#[from] SapError),
    #[error("failed to save segmentation data: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The source returned no records, storage was left untouched.
    NothingToImport,
    Imported { count: usize, origin: RecordOrigin },
}

/// Runs a full source to store synchronization on demand.
/// At most one import runs at a time.
pub struct Importer {
    source: Arc<dyn SegmentationSource>,
    store: Arc<dyn SegmentationStore>,
    import_lock: Semaphore,
}

impl Importer {
    pub fn new(source: Arc<dyn SegmentationSource>, store: Arc<dyn SegmentationStore>) -> Self {
        Importer {
            source,
            store,
            import_lock: Semaphore::new(1),
        }
    }

    pub fn is_running(&self) -> bool {
        self.import_lock.available_permits() == 0
    }

    /// Fetch everything from the source and upsert it. Errors are returned
    /// unchanged; retrying is up to the caller.
    pub async fn run_once(&self) -> Result<ImportOutcome, ImportError> {
        // Hold permit for the duration of this function
        let _permit = self.get_permit()?;

        let started = Instant::now();
        let result = self.import().await;
        histogram!(IMPORT_DURATION).record(started.elapsed().as_secs_f64());

        if result.is_err() {
            counter!(IMPORT_FAILED).increment(1);
        }
        result
    }

    async fn import(&self) -> Result<ImportOutcome, ImportError> {
        tracing::info!("starting segmentation import");

        let fetched = self.source.fetch().await?;

        if fetched.records.is_empty() {
            tracing::info!("no segmentation data to import");
            return Ok(ImportOutcome::NothingToImport);
        }

        let count = fetched.records.len();
        tracing::info!(count, origin = ?fetched.origin, "importing segmentation data to database");

        self.store.upsert(&fetched.records).await?;
        histogram!(IMPORT_ROWS).record(count as f64);

        tracing::info!(total_imported = count, "import completed successfully");
        Ok(ImportOutcome::Imported {
            count,
            origin: fetched.origin,
        })
    }

    /// Guard that ensures only one import is in progress at a time.
    fn get_permit(&self) -> Result<SemaphorePermit<'_>, ImportError> {
        self.import_lock
            .try_acquire()
            .map_err(|_| ImportError::InProgress)
    }
}
