use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rentline_core::{AvailabilityStore, ChangeFeed, StoreError};
use rentline_shared::{midnight_utc, AvailabilityBlock, BlockChange, BlockChangeEvent, BlockReason};
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::backend;

const BLOCK_COLUMNS: &str =
    "id, resource_id, start_at_utc, end_at_utc, reason, booking_id, note, created_at";

#[derive(sqlx::FromRow)]
struct BlockRow {
    id: Uuid,
    resource_id: Uuid,
    start_at_utc: DateTime<Utc>,
    end_at_utc: DateTime<Utc>,
    reason: String,
    booking_id: Option<Uuid>,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<BlockRow> for AvailabilityBlock {
    type Error = StoreError;

    fn try_from(row: BlockRow) -> Result<Self, Self::Error> {
        let reason: BlockReason = row.reason.parse().map_err(StoreError::Backend)?;
        Ok(AvailabilityBlock {
            id: row.id,
            resource_id: row.resource_id,
            start_utc: row.start_at_utc,
            end_utc: row.end_at_utc,
            reason,
            booking_id: row.booking_id,
            note: row.note,
            created_at: row.created_at,
        })
    }
}

fn into_blocks(rows: Vec<BlockRow>) -> Result<Vec<AvailabilityBlock>, StoreError> {
    rows.into_iter().map(AvailabilityBlock::try_from).collect()
}

/// Postgres-backed availability store. Writes for one resource are
/// serialized with a transaction-scoped advisory lock on the resource id.
pub struct PgAvailabilityStore {
    pool: PgPool,
    // TODO: fan changes out across API instances with LISTEN/NOTIFY; this feed is per process
    feed: ChangeFeed,
}

impl PgAvailabilityStore {
    pub fn new(pool: PgPool, feed: ChangeFeed) -> Self {
        Self { pool, feed }
    }

    async fn lock_resource(tx: &mut Transaction<'_, Postgres>, resource_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(resource_id.to_string())
            .execute(&mut **tx)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn overlapping(
        tx: &mut Transaction<'_, Postgres>,
        resource_id: Uuid,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<AvailabilityBlock>, StoreError> {
        let rows = sqlx::query_as::<_, BlockRow>(&format!(
            "SELECT {} FROM availability_blocks
             WHERE resource_id = $1
               AND (start_at_utc AT TIME ZONE 'UTC')::date <= $3
               AND (end_at_utc AT TIME ZONE 'UTC')::date >= $2
             ORDER BY start_at_utc",
            BLOCK_COLUMNS
        ))
        .bind(resource_id)
        .bind(first)
        .bind(last)
        .fetch_all(&mut **tx)
        .await
        .map_err(backend)?;
        into_blocks(rows)
    }

    async fn insert(tx: &mut Transaction<'_, Postgres>, block: &AvailabilityBlock) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO availability_blocks
                (id, resource_id, start_at_utc, end_at_utc, reason, booking_id, note, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(block.id)
        .bind(block.resource_id)
        .bind(block.start_utc)
        .bind(block.end_utc)
        .bind(block.reason.as_str())
        .bind(block.booking_id)
        .bind(&block.note)
        .bind(block.created_at)
        .execute(&mut **tx)
        .await
        .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl AvailabilityStore for PgAvailabilityStore {
    async fn blocks_in_range(
        &self,
        resource_id: Uuid,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<AvailabilityBlock>, StoreError> {
        let rows = sqlx::query_as::<_, BlockRow>(&format!(
            "SELECT {} FROM availability_blocks
             WHERE resource_id = $1
               AND (start_at_utc AT TIME ZONE 'UTC')::date <= $3
               AND (end_at_utc AT TIME ZONE 'UTC')::date >= $2
             ORDER BY start_at_utc",
            BLOCK_COLUMNS
        ))
        .bind(resource_id)
        .bind(first)
        .bind(last)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        into_blocks(rows)
    }

    async fn get_block(&self, block_id: Uuid) -> Result<Option<AvailabilityBlock>, StoreError> {
        let row = sqlx::query_as::<_, BlockRow>(&format!(
            "SELECT {} FROM availability_blocks WHERE id = $1",
            BLOCK_COLUMNS
        ))
        .bind(block_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(AvailabilityBlock::try_from).transpose()
    }

    async fn check_and_reserve(&self, block: AvailabilityBlock) -> Result<AvailabilityBlock, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        Self::lock_resource(&mut tx, block.resource_id).await?;

        let conflicts: Vec<AvailabilityBlock> =
            Self::overlapping(&mut tx, block.resource_id, block.first_day(), block.last_day())
                .await?
                .into_iter()
                .filter(|existing| existing.conflicts_with(&block))
                .collect();
        if !conflicts.is_empty() {
            tx.rollback().await.map_err(backend)?;
            warn!(
                "Reserve of {}..={} on resource {} lost to {} block(s)",
                block.first_day(),
                block.last_day(),
                block.resource_id,
                conflicts.len()
            );
            return Err(StoreError::Conflict(conflicts));
        }

        Self::insert(&mut tx, &block).await?;
        tx.commit().await.map_err(backend)?;

        info!("Block {} ({}) reserved on resource {}", block.id, block.reason, block.resource_id);
        self.feed.publish(BlockChange::Created, &block);
        Ok(block)
    }

    async fn move_block(
        &self,
        block_id: Uuid,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<AvailabilityBlock, StoreError> {
        let current = self
            .get_block(block_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("block {}", block_id)))?;

        let mut tx = self.pool.begin().await.map_err(backend)?;
        Self::lock_resource(&mut tx, current.resource_id).await?;

        let mut moved = current;
        moved.start_utc = midnight_utc(first);
        moved.end_utc = midnight_utc(last);

        let conflicts: Vec<AvailabilityBlock> = Self::overlapping(&mut tx, moved.resource_id, first, last)
            .await?
            .into_iter()
            .filter(|existing| existing.conflicts_with(&moved))
            .collect();
        if !conflicts.is_empty() {
            tx.rollback().await.map_err(backend)?;
            return Err(StoreError::Conflict(conflicts));
        }

        let updated = sqlx::query(
            "UPDATE availability_blocks SET start_at_utc = $2, end_at_utc = $3 WHERE id = $1",
        )
        .bind(block_id)
        .bind(moved.start_utc)
        .bind(moved.end_utc)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;
        if updated.rows_affected() == 0 {
            tx.rollback().await.map_err(backend)?;
            return Err(StoreError::NotFound(format!("block {}", block_id)));
        }
        tx.commit().await.map_err(backend)?;

        info!("Block {} moved to {}..={}", block_id, first, last);
        self.feed.publish(BlockChange::Updated, &moved);
        Ok(moved)
    }

    async fn remove_block(&self, block_id: Uuid) -> Result<Option<AvailabilityBlock>, StoreError> {
        let row = sqlx::query_as::<_, BlockRow>(&format!(
            "DELETE FROM availability_blocks WHERE id = $1 RETURNING {}",
            BLOCK_COLUMNS
        ))
        .bind(block_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        let removed = row.map(AvailabilityBlock::try_from).transpose()?;
        if let Some(block) = &removed {
            info!("Block {} removed from resource {}", block.id, block.resource_id);
            self.feed.publish(BlockChange::Deleted, block);
        }
        Ok(removed)
    }

    fn subscribe(&self) -> broadcast::Receiver<BlockChangeEvent> {
        self.feed.subscribe()
    }
}
