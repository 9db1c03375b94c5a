//! Redis-backed permission set cache.

use async_trait::async_trait;
use redis::AsyncCommands;

use caura_application::PermissionSetCache;
use caura_core::{AppError, AppResult, UserId};
use caura_domain::PermissionDescriptor;

/// Redis implementation of the permission set cache port.
///
/// Entries are stored as JSON under `<prefix>:<user_id>` with a ttl, so
/// revocations propagate to other nodes within the ttl window even
/// without an explicit invalidation.
#[derive(Clone)]
pub struct RedisPermissionCache {
    client: redis::Client,
    key_prefix: String,
}

impl RedisPermissionCache {
    /// Creates a cache adapter with a configured Redis client and key
    /// prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, user_id: UserId) -> String {
        format!("{}:{user_id}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Storage(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl PermissionSetCache for RedisPermissionCache {
    async fn get(&self, user_id: UserId) -> AppResult<Option<Vec<PermissionDescriptor>>> {
        let mut connection = self.connection().await?;
        let encoded: Option<String> = connection.get(self.key_for(user_id)).await.map_err(
            |error| AppError::Storage(format!("failed to read permission cache entry: {error}")),
        )?;

        encoded
            .as_deref()
            .map(|value| {
                serde_json::from_str(value).map_err(|error| {
                    AppError::Internal(format!(
                        "invalid permission cache entry for user '{user_id}': {error}"
                    ))
                })
            })
            .transpose()
    }

    async fn set(
        &self,
        user_id: UserId,
        descriptors: &[PermissionDescriptor],
        ttl_seconds: u32,
    ) -> AppResult<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }

        let value = serde_json::to_string(descriptors).map_err(|error| {
            AppError::Internal(format!("failed to encode permission cache entry: {error}"))
        })?;
        let mut connection = self.connection().await?;
        connection
            .set_ex(self.key_for(user_id), value, u64::from(ttl_seconds))
            .await
            .map_err(|error| {
                AppError::Storage(format!("failed to write permission cache entry: {error}"))
            })
    }

    async fn invalidate(&self, user_id: UserId) -> AppResult<()> {
        let mut connection = self.connection().await?;
        connection.del(self.key_for(user_id)).await.map_err(|error| {
            AppError::Storage(format!("failed to drop permission cache entry: {error}"))
        })
    }
}
