use rentline_shared::{AvailabilityBlock, BlockChange, BlockChangeEvent};
use tokio::sync::broadcast;
use tracing::debug;

/// Push channel for block create/update/delete events.
/// Subscribers filter by `resource_id`; lagging subscribers just miss events
/// and re-query, since the feed is only a calendar refresh hint.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<BlockChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, change: BlockChange, block: &AvailabilityBlock) {
        let event = BlockChangeEvent::new(change, block.clone());
        match self.tx.send(event) {
            Ok(receivers) => debug!("Block {} {:?} pushed to {} subscribers", block.id, change, receivers),
            Err(_) => debug!("Block {} {:?} with no subscribers", block.id, change),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BlockChangeEvent> {
        self.tx.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rentline_shared::BlockReason;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_subscribers_receive_changes() {
        let feed = ChangeFeed::new(8);
        let mut rx = feed.subscribe();
        let day = NaiveDate::from_ymd_opt(2026, 12, 1).unwrap();
        let block = AvailabilityBlock::for_days(Uuid::new_v4(), day, day, BlockReason::Blackout);

        feed.publish(BlockChange::Created, &block);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.change, BlockChange::Created);
        assert_eq!(event.resource_id, block.resource_id);
    }
}
