use async_trait::async_trait;
use chrono::NaiveDate;
use rentline_core::{AvailabilityStore, ChangeFeed, StoreError};
use rentline_shared::{midnight_utc, AvailabilityBlock, BlockChange, BlockChangeEvent};
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// In-memory availability store.
///
/// Every write takes the single write lock, so check-and-reserve and
/// move are atomic with respect to each other.
pub struct BlockInventory {
    blocks: RwLock<HashMap<Uuid, Vec<AvailabilityBlock>>>,
    feed: ChangeFeed,
}

impl BlockInventory {
    pub fn new(feed: ChangeFeed) -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
            feed,
        }
    }

    /// Number of stored blocks for a resource
    pub async fn block_count(&self, resource_id: Uuid) -> usize {
        self.blocks
            .read()
            .await
            .get(&resource_id)
            .map(|b| b.len())
            .unwrap_or(0)
    }
}

impl Default for BlockInventory {
    fn default() -> Self {
        Self::new(ChangeFeed::default())
    }
}

#[async_trait]
impl AvailabilityStore for BlockInventory {
    async fn blocks_in_range(
        &self,
        resource_id: Uuid,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<AvailabilityBlock>, StoreError> {
        let blocks = self.blocks.read().await;
        let mut found: Vec<AvailabilityBlock> = blocks
            .get(&resource_id)
            .map(|list| {
                list.iter()
                    .filter(|b| b.overlaps_days(first, last))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        found.sort_by_key(|b| b.start_utc);
        Ok(found)
    }

    async fn get_block(&self, block_id: Uuid) -> Result<Option<AvailabilityBlock>, StoreError> {
        let blocks = self.blocks.read().await;
        Ok(blocks
            .values()
            .flat_map(|list| list.iter())
            .find(|b| b.id == block_id)
            .cloned())
    }

    async fn check_and_reserve(
        &self,
        block: AvailabilityBlock,
    ) -> Result<AvailabilityBlock, StoreError> {
        let mut blocks = self.blocks.write().await;
        let list = blocks.entry(block.resource_id).or_default();

        let conflicting: Vec<AvailabilityBlock> = list
            .iter()
            .filter(|existing| existing.conflicts_with(&block))
            .cloned()
            .collect();
        if !conflicting.is_empty() {
            warn!(
                "Block {} on resource {} rejected: {} conflicting block(s)",
                block.id,
                block.resource_id,
                conflicting.len()
            );
            return Err(StoreError::Conflict(conflicting));
        }

        list.push(block.clone());
        drop(blocks);

        debug!("Reserved block {} ({}) for resource {}", block.id, block.reason, block.resource_id);
        self.feed.publish(BlockChange::Created, &block);
        Ok(block)
    }

    async fn move_block(
        &self,
        block_id: Uuid,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<AvailabilityBlock, StoreError> {
        let mut blocks = self.blocks.write().await;
        let list = blocks
            .values_mut()
            .find(|list| list.iter().any(|b| b.id == block_id))
            .ok_or_else(|| StoreError::NotFound(format!("availability block {}", block_id)))?;

        let position = list
            .iter()
            .position(|b| b.id == block_id)
            .ok_or_else(|| StoreError::NotFound(format!("availability block {}", block_id)))?;

        let mut moved = list[position].clone();
        moved.start_utc = midnight_utc(first);
        moved.end_utc = midnight_utc(last);

        let conflicting: Vec<AvailabilityBlock> = list
            .iter()
            .filter(|existing| existing.conflicts_with(&moved))
            .cloned()
            .collect();
        if !conflicting.is_empty() {
            return Err(StoreError::Conflict(conflicting));
        }

        list[position] = moved.clone();
        drop(blocks);

        self.feed.publish(BlockChange::Updated, &moved);
        Ok(moved)
    }

    async fn remove_block(&self, block_id: Uuid) -> Result<Option<AvailabilityBlock>, StoreError> {
        let mut blocks = self.blocks.write().await;
        let mut removed = None;
        for list in blocks.values_mut() {
            if let Some(position) = list.iter().position(|b| b.id == block_id) {
                removed = Some(list.remove(position));
                break;
            }
        }
        drop(blocks);

        if let Some(block) = &removed {
            self.feed.publish(BlockChange::Deleted, block);
        }
        Ok(removed)
    }

    fn subscribe(&self) -> broadcast::Receiver<BlockChangeEvent> {
        self.feed.subscribe()
    }
}
