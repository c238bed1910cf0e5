//! Persistent storage for segmentation records.
//!
//! Every backend implements the same contract: `upsert` is keyed on the
//! address key and applied atomically, reads never observe half a batch.
use crate::config::StorageConfig;
use crate::types::{Segmentation, StoredSegmentation};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

mod postgres;
mod sqlite;

pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

const INSERT_PREFIX: &str = "INSERT INTO segmentation (address_sap_id, adr_segment, segment_id) ";

const UPSERT_SUFFIX: &str = " ON CONFLICT (address_sap_id) DO UPDATE \
    SET adr_segment = excluded.adr_segment, segment_id = excluded.segment_id";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait SegmentationStore: Send + Sync {
    /// Insert new records and overwrite label and segment id of existing ones.
    /// An empty batch is a no-op. Either the whole batch is applied or nothing is.
    async fn upsert(&self, records: &[Segmentation]) -> Result<(), StoreError>;

    async fn get_by_address_key(
        &self,
        address_key: &str,
    ) -> Result<Option<StoredSegmentation>, StoreError>;

    async fn get_all(&self) -> Result<Vec<StoredSegmentation>, StoreError>;
}

pub async fn connect(config: &StorageConfig) -> Result<Arc<dyn SegmentationStore>, StoreError> {
    match config {
        StorageConfig::Postgres(pg) => Ok(Arc::new(PostgresStore::connect(pg).await?)),
        StorageConfig::Sqlite { path } => Ok(Arc::new(SqliteStore::open(path).await?)),
    }
}

/// A single INSERT cannot touch the same row twice, so repeated keys in one
/// batch keep only their last occurrence.
fn collapse_duplicates(records: &[Segmentation]) -> Vec<&Segmentation> {
    let mut last_index = HashMap::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        last_index.insert(record.address_key(), i);
    }

    records
        .iter()
        .enumerate()
        .filter(|(i, record)| last_index.get(record.address_key()) == Some(i))
        .map(|(_, record)| record)
        .collect()
}
