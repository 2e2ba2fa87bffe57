use crate::models::*;
use crate::services::aggregator::PreferenceAggregator;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Best-effort telemetry of user actions on events.
///
/// Nothing here is surfaced to the caller: a missing user or a failing store
/// is logged and the action that triggered the recording carries on.
pub struct BehaviorRecorder {
    aggregator: Arc<PreferenceAggregator>,
}

impl BehaviorRecorder {
    pub fn new(aggregator: Arc<PreferenceAggregator>) -> Self {
        Self { aggregator }
    }

    /// Records the interaction on a detached task that appends it and then
    /// updates the user's profile.
    ///
    /// Returns `None` when there is no user to record for. The handle may be
    /// dropped; the task runs to completion either way.
    pub fn record(
        &self,
        user_id: Option<&str>,
        event_id: &str,
        action: ActionKind,
        snapshot: Option<EventSnapshot>,
    ) -> Option<JoinHandle<()>> {
        self.record_at(user_id, event_id, action, snapshot, Utc::now())
    }

    pub fn record_at(
        &self,
        user_id: Option<&str>,
        event_id: &str,
        action: ActionKind,
        snapshot: Option<EventSnapshot>,
        timestamp: DateTime<Utc>,
    ) -> Option<JoinHandle<()>> {
        let Some(user_id) = user_id.filter(|id| !id.is_empty()) else {
            warn!("Dropping {:?} on event {}: no authenticated user", action, event_id);
            return None;
        };

        let record = InteractionRecord::new(user_id, event_id, action)
            .with_snapshot(snapshot.unwrap_or_default())
            .at(timestamp);

        let aggregator = self.aggregator.clone();
        Some(tokio::spawn(async move {
            match aggregator.ingest(&record).await {
                Ok(()) => info!(
                    "Recorded {:?} on event {} for user {}",
                    record.action, record.event_id, record.user_id
                ),
                Err(e) => error!(
                    "Failed to record {:?} for user {}: {}",
                    record.action, record.user_id, e
                ),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::store::{
        InMemoryInteractionStore, InMemoryProfileStore, InteractionStore, ProfileStore,
    };
    use anyhow::anyhow;

    struct BrokenInteractionStore;

    #[async_trait::async_trait]
    impl InteractionStore for BrokenInteractionStore {
        async fn append(&self, _record: &InteractionRecord) -> anyhow::Result<()> {
            Err(anyhow!("connection refused"))
        }

        async fn query_recent(
            &self,
            _user_id: &str,
            _limit: usize,
        ) -> anyhow::Result<Vec<InteractionRecord>> {
            Err(anyhow!("connection refused"))
        }
    }

    fn recorder_with(
        interactions: Arc<dyn InteractionStore>,
        profiles: Arc<dyn ProfileStore>,
    ) -> BehaviorRecorder {
        let aggregator = Arc::new(PreferenceAggregator::new(
            interactions,
            profiles,
            &Config::default(),
        ));
        BehaviorRecorder::new(aggregator)
    }

    #[tokio::test]
    async fn test_record_without_user_is_noop() {
        let interactions = Arc::new(InMemoryInteractionStore::new());
        let recorder = recorder_with(interactions.clone(), Arc::new(InMemoryProfileStore::new()));

        assert!(recorder.record(None, "e1", ActionKind::Saved, None).is_none());
        assert!(recorder.record(Some(""), "e1", ActionKind::Saved, None).is_none());
        assert_eq!(interactions.count(""), 0);
    }

    #[tokio::test]
    async fn test_record_appends_and_updates_profile() {
        let interactions = Arc::new(InMemoryInteractionStore::new());
        let recorder = recorder_with(interactions.clone(), Arc::new(InMemoryProfileStore::new()));
        let snapshot = EventSnapshot {
            category: Some("Jazz".to_string()),
            ..Default::default()
        };

        let handle = recorder
            .record(Some("u1"), "e1", ActionKind::Shared, Some(snapshot))
            .unwrap();
        handle.await.unwrap();

        assert_eq!(interactions.count("u1"), 1);
        let profile = recorder.aggregator.get_or_build("u1").await.unwrap();
        assert_eq!(profile.category_weight("Jazz"), 1.5);
    }

    #[tokio::test]
    async fn test_store_failure_is_swallowed() {
        let profiles = Arc::new(InMemoryProfileStore::new());
        let recorder = recorder_with(Arc::new(BrokenInteractionStore), profiles.clone());

        let handle = recorder.record(Some("u1"), "e1", ActionKind::Viewed, None).unwrap();
        handle.await.unwrap();

        assert!(profiles.get("u1").await.unwrap().is_none());
    }
}
