use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::CoreError;

/// Per-booking exclusive lease so no two hold placements for the same
/// booking are ever in flight together.
#[async_trait]
pub trait HoldLease: Send + Sync {
    /// Returns `false` when another worker already holds the lease
    async fn try_acquire(&self, booking_id: Uuid, ttl: Duration) -> Result<bool, CoreError>;

    async fn release(&self, booking_id: Uuid) -> Result<(), CoreError>;
}

/// Process-local lease. The TTL is irrelevant in a single process.
#[derive(Default)]
pub struct LocalLease {
    held: Mutex<HashSet<Uuid>>,
}

impl LocalLease {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HoldLease for LocalLease {
    async fn try_acquire(&self, booking_id: Uuid, _ttl: Duration) -> Result<bool, CoreError> {
        Ok(self.held.lock().await.insert(booking_id))
    }

    async fn release(&self, booking_id: Uuid) -> Result<(), CoreError> {
        self.held.lock().await.remove(&booking_id);
        Ok(())
    }
}
