//! Contracts to the external collaborators the engine reads and writes.

pub mod memory;
pub mod redis_store;

use crate::models::*;
use anyhow::Result;
use chrono::{DateTime, Utc};

pub use memory::{InMemoryEventCatalog, InMemoryInteractionStore, InMemoryProfileStore};
pub use redis_store::{RedisInteractionStore, RedisProfileStore};

#[async_trait::async_trait]
pub trait EventCatalog: Send + Sync {
    /// Events starting at or after `after`, ascending by start.
    async fn fetch_upcoming(&self, limit: usize, after: DateTime<Utc>)
        -> Result<Vec<CandidateEvent>>;

    async fn upsert(&self, event: CandidateEvent) -> Result<()>;
}

#[async_trait::async_trait]
pub trait InteractionStore: Send + Sync {
    async fn append(&self, record: &InteractionRecord) -> Result<()>;

    /// Up to `limit` records for `user_id`, newest first.
    async fn query_recent(&self, user_id: &str, limit: usize) -> Result<Vec<InteractionRecord>>;
}

#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<PreferenceProfile>>;

    /// Full replace.
    async fn put(&self, profile: &PreferenceProfile) -> Result<()>;

    /// Atomic add to a single weight of an existing profile.
    async fn increment_field(
        &self,
        user_id: &str,
        dimension: Dimension,
        key: &str,
        amount: f64,
    ) -> Result<()>;

    async fn touch(&self, user_id: &str, at: DateTime<Utc>) -> Result<()>;
}
