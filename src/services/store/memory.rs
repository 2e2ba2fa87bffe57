use super::{EventCatalog, InteractionStore, ProfileStore};
use crate::models::*;
use anyhow::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

#[derive(Default)]
pub struct InMemoryEventCatalog {
    events: RwLock<HashMap<String, CandidateEvent>>,
}

impl InMemoryEventCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: impl IntoIterator<Item = CandidateEvent>) -> Self {
        let catalog = Self::new();
        {
            let mut map = catalog.events.write();
            for event in events {
                map.insert(event.id.clone(), event);
            }
        }
        catalog
    }
}

#[async_trait::async_trait]
impl EventCatalog for InMemoryEventCatalog {
    async fn fetch_upcoming(
        &self,
        limit: usize,
        after: DateTime<Utc>,
    ) -> Result<Vec<CandidateEvent>> {
        let mut upcoming: Vec<CandidateEvent> = self
            .events
            .read()
            .values()
            .filter(|event| event.starts_at.map_or(true, |start| start >= after))
            .cloned()
            .collect();

        // Undated events cannot be shown to be past, so they trail the dated ones.
        upcoming.sort_by(|a, b| match (a.starts_at, b.starts_at) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.id.cmp(&b.id)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.id.cmp(&b.id),
        });
        upcoming.truncate(limit);

        debug!("Catalog returned {} upcoming events", upcoming.len());
        Ok(upcoming)
    }

    async fn upsert(&self, event: CandidateEvent) -> Result<()> {
        self.events.write().insert(event.id.clone(), event);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryInteractionStore {
    records: DashMap<String, Vec<InteractionRecord>>,
}

impl InMemoryInteractionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, user_id: &str) -> usize {
        self.records.get(user_id).map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl InteractionStore for InMemoryInteractionStore {
    async fn append(&self, record: &InteractionRecord) -> Result<()> {
        self.records
            .entry(record.user_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn query_recent(&self, user_id: &str, limit: usize) -> Result<Vec<InteractionRecord>> {
        let Some(records) = self.records.get(user_id) else {
            return Ok(Vec::new());
        };

        // Later appends win ties on timestamp.
        let mut recent: Vec<InteractionRecord> = records.iter().rev().cloned().collect();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent.truncate(limit);
        Ok(recent)
    }
}

#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: DashMap<String, PreferenceProfile>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get(&self, user_id: &str) -> Result<Option<PreferenceProfile>> {
        Ok(self.profiles.get(user_id).map(|p| p.clone()))
    }

    async fn put(&self, profile: &PreferenceProfile) -> Result<()> {
        self.profiles.insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn increment_field(
        &self,
        user_id: &str,
        dimension: Dimension,
        key: &str,
        amount: f64,
    ) -> Result<()> {
        self.profiles
            .entry(user_id.to_string())
            .or_insert_with(|| PreferenceProfile::new(user_id))
            .add_weight(dimension, key, amount);
        Ok(())
    }

    async fn touch(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(mut profile) = self.profiles.get_mut(user_id) {
            profile.last_updated = at;
        }
        Ok(())
    }
}
