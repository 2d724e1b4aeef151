use uuid::Uuid;
use crate::models::blocks::AvailabilityBlock;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockChange {
    Created,
    Updated,
    Deleted,
}

/// Pushed to calendar subscribers of a resource. Read-side refresh only.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BlockChangeEvent {
    pub resource_id: Uuid,
    pub change: BlockChange,
    pub block: AvailabilityBlock,
    pub timestamp: i64,
}

impl BlockChangeEvent {
    pub fn new(change: BlockChange, block: AvailabilityBlock) -> Self {
        Self {
            resource_id: block.resource_id,
            change,
            block,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}
