use super::{INSERT_PREFIX, SegmentationStore, StoreError, UPSERT_SUFFIX, collapse_duplicates};
use crate::types::{Segmentation, StoredSegmentation};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::path::Path;

// 3 binds per row, below the 999 variable limit of older SQLite builds.
const CHUNK_ROWS: usize = 300;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS segmentation (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    address_sap_id TEXT NOT NULL UNIQUE,
    adr_segment TEXT NOT NULL,
    segment_id INTEGER NOT NULL
)
"#;

/// Single-file store (WAL mode) for local runs and tests.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open the database at `path`, creating the file and its parent
    /// directories when missing.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        tracing::info!(path = %path.display(), "opening sqlite database");

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(SCHEMA).execute(&pool).await?;

        Ok(Self { pool })
    }
}

fn segment_from_row(row: &SqliteRow) -> Result<StoredSegmentation, sqlx::Error> {
    Ok(StoredSegmentation {
        id: row.try_get("id")?,
        record: Segmentation::new(
            row.try_get::<String, _>("address_sap_id")?,
            row.try_get::<String, _>("adr_segment")?,
            row.try_get("segment_id")?,
        ),
    })
}

#[async_trait]
impl SegmentationStore for SqliteStore {
    #[tracing::instrument(level = "debug", skip_all, fields(records = records.len()))]
    async fn upsert(&self, records: &[Segmentation]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let records = collapse_duplicates(records);
        let mut tx = self.pool.begin().await?;

        for chunk in records.chunks(CHUNK_ROWS) {
            let mut query = QueryBuilder::<Sqlite>::new(INSERT_PREFIX);
            query.push_values(chunk, |mut row, record| {
                row.push_bind(record.address_key().to_owned())
                    .push_bind(record.segment_label().to_owned())
                    .push_bind(record.segment_id());
            });
            query.push(UPSERT_SUFFIX);
            query.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_by_address_key(
        &self,
        address_key: &str,
    ) -> Result<Option<StoredSegmentation>, StoreError> {
        let row = sqlx::query(
            "SELECT id, address_sap_id, adr_segment, segment_id FROM segmentation \
             WHERE address_sap_id = ?",
        )
        .bind(address_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(segment_from_row).transpose()?)
    }

    async fn get_all(&self) -> Result<Vec<StoredSegmentation>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, address_sap_id, adr_segment, segment_id FROM segmentation ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(segment_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}
