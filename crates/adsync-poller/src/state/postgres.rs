//! Postgres-backed state store.
//!
//! One row per poller. Commits are single statements, so atomicity
//! comes from the database; the optimistic watermark guard rejects a
//! commit whose loaded watermark has been overtaken by a concurrent
//! run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use adsync_connector::entry::ChangeMarker;

use super::{StateStoreError, SyncState, SyncStateStore};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS adsync_poll_state (
    poller_name       TEXT PRIMARY KEY,
    last_watermark    BIGINT,
    last_full_sync_at TIMESTAMPTZ,
    updated_at        TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
";

/// A `SyncStateStore` persisting to Postgres.
#[derive(Debug, Clone)]
pub struct PgSyncStateStore {
    pool: PgPool,
}

impl PgSyncStateStore {
    /// Create a store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the state table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StateStoreError> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| StateStoreError::backend_with_source("schema creation failed", e))?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StateRow {
    poller_name: String,
    last_watermark: Option<i64>,
    last_full_sync_at: Option<DateTime<Utc>>,
}

impl StateRow {
    fn into_state(self) -> SyncState {
        SyncState {
            poller_name: self.poller_name,
            last_watermark: self.last_watermark.map(|v| ChangeMarker(v as u64)),
            last_full_sync_at: self.last_full_sync_at,
        }
    }
}

fn marker_to_db(marker: Option<ChangeMarker>) -> Option<i64> {
    marker.map(|m| m.value() as i64)
}

#[async_trait]
impl SyncStateStore for PgSyncStateStore {
    #[instrument(skip(self))]
    async fn load(&self, poller_name: &str) -> Result<Option<SyncState>, StateStoreError> {
        let row = sqlx::query_as::<_, StateRow>(
            r"
            SELECT poller_name, last_watermark, last_full_sync_at
            FROM adsync_poll_state
            WHERE poller_name = $1
            ",
        )
        .bind(poller_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StateStoreError::backend_with_source("state load failed", e))?;

        Ok(row.map(StateRow::into_state))
    }

    #[instrument(skip(self, state), fields(poller = %state.poller_name))]
    async fn commit(
        &self,
        state: &SyncState,
        expected: Option<ChangeMarker>,
    ) -> Result<(), StateStoreError> {
        let result = match expected {
            // The run loaded existing state; only overwrite the row it saw.
            Some(expected) => sqlx::query(
                r"
                UPDATE adsync_poll_state
                SET last_watermark = $2,
                    last_full_sync_at = $3,
                    updated_at = NOW()
                WHERE poller_name = $1
                  AND last_watermark = $4
                ",
            )
            .bind(&state.poller_name)
            .bind(marker_to_db(state.last_watermark))
            .bind(state.last_full_sync_at)
            .bind(expected.value() as i64)
            .execute(&self.pool)
            .await,

            // First-ever commit; also replaces a row whose watermark is
            // still NULL (a previous run that never advanced).
            None => sqlx::query(
                r"
                INSERT INTO adsync_poll_state (poller_name, last_watermark, last_full_sync_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (poller_name) DO UPDATE
                SET last_watermark = EXCLUDED.last_watermark,
                    last_full_sync_at = EXCLUDED.last_full_sync_at,
                    updated_at = NOW()
                WHERE adsync_poll_state.last_watermark IS NULL
                ",
            )
            .bind(&state.poller_name)
            .bind(marker_to_db(state.last_watermark))
            .bind(state.last_full_sync_at)
            .execute(&self.pool)
            .await,
        };

        let result =
            result.map_err(|e| StateStoreError::backend_with_source("state commit failed", e))?;

        if result.rows_affected() == 0 {
            return Err(StateStoreError::Conflict {
                poller: state.poller_name.clone(),
            });
        }

        Ok(())
    }
}
