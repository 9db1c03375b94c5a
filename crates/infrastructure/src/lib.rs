//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_permission_cache;
mod in_memory_store;
mod postgres_application_repository;
mod postgres_audit_trail_repository;
mod postgres_authorization_repository;
mod redis_permission_cache;

pub use in_memory_permission_cache::InMemoryPermissionCache;
pub use in_memory_store::InMemoryStore;
pub use postgres_application_repository::PostgresApplicationRepository;
pub use postgres_audit_trail_repository::PostgresAuditTrailRepository;
pub use postgres_authorization_repository::PostgresAuthorizationRepository;
pub use redis_permission_cache::RedisPermissionCache;
