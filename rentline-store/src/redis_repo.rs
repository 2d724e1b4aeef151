use async_trait::async_trait;
use rentline_core::lease::HoldLease;
use rentline_core::CoreError;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Redis-backed hold lease shared by every API/worker process
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
    /// Written as the lease value so a process only ever deletes its own lease
    owner: String,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        let owner = Uuid::new_v4().to_string();
        info!("Redis hold lease owner {}", owner);
        Ok(Self { client, owner })
    }

    fn lease_key(booking_id: Uuid) -> String {
        format!("hold_lease:{}", booking_id)
    }

    pub async fn acquire_hold_lease(&self, booking_id: Uuid, ttl_seconds: u64) -> Result<bool, redis::RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = Self::lease_key(booking_id);

        // SET NX: only if no one else holds it; EX so a crashed worker cannot wedge the booking
        let result: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&self.owner)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds.max(1))
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    pub async fn release_hold_lease(&self, booking_id: Uuid) -> Result<bool, redis::RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let script = redis::Script::new(
            r#"
            if redis.call("GET", KEYS[1]) == ARGV[1] then
                return redis.call("DEL", KEYS[1])
            else
                return 0
            end
        "#,
        );

        let deleted: i64 = script
            .key(Self::lease_key(booking_id))
            .arg(&self.owner)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }
}

#[async_trait]
impl HoldLease for RedisClient {
    async fn try_acquire(&self, booking_id: Uuid, ttl: Duration) -> Result<bool, CoreError> {
        self.acquire_hold_lease(booking_id, ttl.as_secs())
            .await
            .map_err(|e| CoreError::StorageError(format!("hold lease: {}", e)))
    }

    async fn release(&self, booking_id: Uuid) -> Result<(), CoreError> {
        let released = self
            .release_hold_lease(booking_id)
            .await
            .map_err(|e| CoreError::StorageError(format!("hold lease: {}", e)))?;
        if !released {
            debug!("Hold lease for booking {} had already expired", booking_id);
        }
        Ok(())
    }
}
