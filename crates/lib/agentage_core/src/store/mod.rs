//! Persistence contracts for user and device-code records.
//!
//! Two backends implement them: [`postgres`] for deployments and [`memory`]
//! for tests and single-process development. Both enforce the same unique
//! keys and the same atomic conditional updates.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{DeviceCodeRecord, DeviceGrant, Provider, UserRecord, UserUpdate};

/// Store-level failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A unique key (email, provider identity, device or user code) is taken.
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    /// The update would break a record invariant and was not applied.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// User records keyed by id, by email and by `(provider, providerId)`.
///
/// Implementations normalize email on every write and lookup.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>>;

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<UserRecord>>;

    async fn find_by_provider_id(
        &self,
        provider: Provider,
        provider_id: &str,
    ) -> StoreResult<Option<UserRecord>>;

    /// Insert a new record. `Conflict` if the email or any provider identity
    /// is already taken.
    async fn create(&self, user: UserRecord) -> StoreResult<UserRecord>;

    /// Apply a partial update atomically and return the stored result.
    ///
    /// `NotFound` for an unknown id, `Conflict` when a provider identity
    /// belongs to another user, `Invariant` when no provider would remain.
    async fn update(&self, id: &str, update: UserUpdate) -> StoreResult<UserRecord>;

    /// Cheap reachability check.
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Device code records keyed by device code and by canonical user code.
#[async_trait]
pub trait DeviceCodeStore: Send + Sync {
    /// `Conflict` if the device code or user code already exists.
    async fn insert(&self, record: DeviceCodeRecord) -> StoreResult<()>;

    /// Exact, byte-for-byte lookup.
    async fn find_by_device_code(&self, device_code: &str)
    -> StoreResult<Option<DeviceCodeRecord>>;

    /// Lookup by canonical `XXXX-XXXX` user code.
    async fn find_by_user_code(&self, user_code: &str) -> StoreResult<Option<DeviceCodeRecord>>;

    /// Set the grant fields only if the record is unauthorized and unexpired
    /// at `grant.authorized_at`. Returns whether this call won.
    async fn authorize(&self, device_code: &str, grant: &DeviceGrant) -> StoreResult<bool>;

    /// Delete every record with `expires_at <= now`; returns the count.
    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}
