use async_trait::async_trait;
use chrono::NaiveDate;
use rentline_shared::{AvailabilityBlock, BlockChangeEvent};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Block overlaps {} existing block(s)", .0.len())]
    Conflict(Vec<AvailabilityBlock>),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(blocks) => CoreError::ConflictError {
                message: "requested dates are no longer available".to_string(),
                blocks,
            },
            StoreError::NotFound(what) => CoreError::NotFound(what),
            StoreError::Backend(msg) => CoreError::StorageError(msg),
        }
    }
}

/// The single shared mutable resource. Reads may be served relaxed; the
/// reserve/move operations must be strongly consistent per resource.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// Blocks of `resource_id` whose normalized days intersect `first..=last`
    async fn blocks_in_range(
        &self,
        resource_id: Uuid,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<AvailabilityBlock>, StoreError>;

    async fn get_block(&self, block_id: Uuid) -> Result<Option<AvailabilityBlock>, StoreError>;

    /// Atomic check-and-reserve: inserts `block` only if no stored block
    /// conflicts with it, otherwise fails with every conflicting block.
    async fn check_and_reserve(
        &self,
        block: AvailabilityBlock,
    ) -> Result<AvailabilityBlock, StoreError>;

    /// Atomically moves an existing block to `first..=last`, conflict-checked
    /// against every other block of the resource.
    async fn move_block(
        &self,
        block_id: Uuid,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<AvailabilityBlock, StoreError>;

    async fn remove_block(&self, block_id: Uuid) -> Result<Option<AvailabilityBlock>, StoreError>;

    /// Change notifications for every resource; callers filter by resource id
    fn subscribe(&self) -> broadcast::Receiver<BlockChangeEvent>;
}
