use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use caura_application::PermissionSetCache;
use caura_core::{AppResult, UserId};
use caura_domain::PermissionDescriptor;

struct CacheEntry {
    descriptors: Vec<PermissionDescriptor>,
    expires_at: Instant,
}

/// In-memory permission set cache for tests and single-node setups.
#[derive(Default)]
pub struct InMemoryPermissionCache {
    entries: RwLock<HashMap<UserId, CacheEntry>>,
}

impl InMemoryPermissionCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PermissionSetCache for InMemoryPermissionCache {
    async fn get(&self, user_id: UserId) -> AppResult<Option<Vec<PermissionDescriptor>>> {
        {
            let entries = self.entries.read().await;
            match entries.get(&user_id) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Ok(Some(entry.descriptors.clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        let mut entries = self.entries.write().await;
        if entries
            .get(&user_id)
            .is_some_and(|entry| entry.expires_at <= Instant::now())
        {
            entries.remove(&user_id);
        }

        Ok(None)
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

        let mut entries = self.entries.write().await;
        entries.insert(
            user_id,
            CacheEntry {
                descriptors: descriptors.to_vec(),
                expires_at: Instant::now() + Duration::from_secs(u64::from(ttl_seconds)),
            },
        );
        Ok(())
    }

    async fn invalidate(&self, user_id: UserId) -> AppResult<()> {
        self.entries.write().await.remove(&user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use caura_application::PermissionSetCache;
    use caura_core::{PermissionId, UserId};
    use caura_domain::{PermissionDescriptor, PermissionScope};

    use super::InMemoryPermissionCache;

    fn descriptor() -> PermissionDescriptor {
        PermissionDescriptor {
            permission_id: PermissionId::new(),
            resource_type: "application".to_owned(),
            action: "process".to_owned(),
            scope: PermissionScope::Branch,
            name: "application.process".to_owned(),
        }
    }

    #[tokio::test]
    async fn zero_ttl_writes_are_skipped() {
        let cache = InMemoryPermissionCache::new();
        let user_id = UserId::new();

        let write = cache.set(user_id, &[descriptor()], 0).await;
        assert_eq!(write.ok(), Some(()));
        assert_eq!(cache.get(user_id).await.ok(), Some(None));
    }

    #[tokio::test]
    async fn invalidation_drops_the_entry() {
        let cache = InMemoryPermissionCache::new();
        let user_id = UserId::new();

        let write = cache.set(user_id, &[descriptor()], 60).await;
        assert_eq!(write.ok(), Some(()));
        let cached = cache.get(user_id).await;
        assert_eq!(
            cached.ok().flatten().map(|descriptors| descriptors.len()),
            Some(1)
        );

        let dropped = cache.invalidate(user_id).await;
        assert_eq!(dropped.ok(), Some(()));
        assert_eq!(cache.get(user_id).await.ok(), Some(None));
    }
}
