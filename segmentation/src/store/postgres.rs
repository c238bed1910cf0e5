use super::{INSERT_PREFIX, SegmentationStore, StoreError, UPSERT_SUFFIX, collapse_duplicates};
use crate::config::PostgresConfig;
use crate::types::{Segmentation, StoredSegmentation};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

// 3 binds per row, well below the 65535 parameter limit.
const CHUNK_ROWS: usize = 1000;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS segmentation (
    id BIGSERIAL PRIMARY KEY,
    address_sap_id TEXT NOT NULL UNIQUE,
    adr_segment TEXT NOT NULL,
    segment_id BIGINT NOT NULL
)
"#;

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        tracing::info!(
            host = %config.host,
            port = config.port,
            dbname = %config.name,
            user = %config.user,
            "connecting to database"
        );

        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.name)
            .username(&config.user)
            .password(&config.password);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.ensure_schema().await?;

        tracing::info!("successfully connected to database");
        Ok(store)
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

fn segment_from_row(row: &PgRow) -> Result<StoredSegmentation, sqlx::Error> {
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
impl SegmentationStore for PostgresStore {
    #[tracing::instrument(level = "debug", skip_all, fields(records = records.len()))]
    async fn upsert(&self, records: &[Segmentation]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let records = collapse_duplicates(records);
        let mut tx = self.pool.begin().await?;

        for chunk in records.chunks(CHUNK_ROWS) {
            let mut query = QueryBuilder::<Postgres>::new(INSERT_PREFIX);
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
             WHERE address_sap_id = $1",
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
