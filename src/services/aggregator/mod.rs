use crate::algorithms::{contributions, fold_history};
use crate::config::Config;
use crate::error::RecError;
use crate::models::*;
use crate::services::store::{InteractionStore, ProfileStore};
use anyhow::Result;
use chrono::Utc;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Maintains each user's preference profile from their interaction stream.
///
/// Every write for a user (lazy build, increment, rebuild, price range) runs
/// under that user's lock, so a build replaying history can never interleave
/// with an increment and count a record twice or drop it. Reads of an
/// existing profile are lock-free and may observe a slightly stale profile.
pub struct PreferenceAggregator {
    interactions: Arc<dyn InteractionStore>,
    profiles: Arc<dyn ProfileStore>,
    history_replay_limit: usize,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl PreferenceAggregator {
    pub fn new(
        interactions: Arc<dyn InteractionStore>,
        profiles: Arc<dyn ProfileStore>,
        config: &Config,
    ) -> Self {
        Self {
            interactions,
            profiles,
            history_replay_limit: config.recommendation.history_replay_limit,
            user_locks: DashMap::new(),
        }
    }

    /// Runs `section` while holding the user's lock. The lock entry is
    /// dropped afterwards unless another task holds or awaits it.
    async fn with_user_lock<T, F, Fut>(&self, user_id: &str, section: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let lock = self
            .user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            section().await
        };

        drop(lock);
        self.user_locks
            .remove_if(user_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Persisted profile, or one replayed from recent history and persisted.
    pub async fn get_or_build(&self, user_id: &str) -> Result<PreferenceProfile> {
        if let Some(profile) = self.profiles.get(user_id).await? {
            return Ok(profile);
        }
        let missing = RecError::NotFound(format!("profile for user {}", user_id));
        debug!("{}; building from history", missing);

        self.with_user_lock(user_id, || async move {
            // Another writer may have created it while we waited.
            if let Some(profile) = self.profiles.get(user_id).await? {
                return Ok(profile);
            }
            self.build_locked(user_id, None).await
        })
        .await
    }

    /// Appends a new interaction and folds it into the profile as one step
    /// for that user.
    ///
    /// A user without a profile gets one built from history, which by then
    /// contains the record, so it is counted exactly once either way.
    pub async fn ingest(&self, record: &InteractionRecord) -> Result<()> {
        let user_id = record.user_id.as_str();

        self.with_user_lock(user_id, || async move {
            self.interactions.append(record).await?;

            if self.profiles.get(user_id).await?.is_none() {
                self.build_locked(user_id, None).await?;
                return Ok(());
            }

            for contribution in contributions(record) {
                self.profiles
                    .increment_field(
                        user_id,
                        contribution.dimension,
                        &contribution.key,
                        contribution.amount,
                    )
                    .await?;
            }
            self.profiles.touch(user_id, Utc::now()).await?;

            debug!(
                "Applied {:?} (+{}) to profile of user {}",
                record.action,
                record.action.weight(),
                user_id
            );
            Ok(())
        })
        .await
    }

    /// Discards accumulated weights and replays history. The declared price
    /// range survives.
    pub async fn rebuild(&self, user_id: &str) -> Result<PreferenceProfile> {
        let profile = self
            .with_user_lock(user_id, || async move {
                let price_range = self
                    .profiles
                    .get(user_id)
                    .await?
                    .and_then(|p| p.preferred_price_range);

                self.build_locked(user_id, price_range).await
            })
            .await?;

        info!("Rebuilt profile for user {}", user_id);
        Ok(profile)
    }

    pub async fn set_price_range(
        &self,
        user_id: &str,
        range: Option<PriceRange>,
    ) -> Result<PreferenceProfile> {
        let profile = self
            .with_user_lock(user_id, || async move {
                let mut profile = match self.profiles.get(user_id).await? {
                    Some(profile) => profile,
                    None => self.build_locked(user_id, None).await?,
                };
                profile.preferred_price_range = range;
                profile.last_updated = Utc::now();
                self.profiles.put(&profile).await?;
                Ok(profile)
            })
            .await?;

        info!("Set preferred price range for user {}: {:?}", user_id, range);
        Ok(profile)
    }

    async fn build_locked(
        &self,
        user_id: &str,
        price_range: Option<PriceRange>,
    ) -> Result<PreferenceProfile> {
        let history = self
            .interactions
            .query_recent(user_id, self.history_replay_limit)
            .await?;

        let mut profile = fold_history(user_id, &history);
        profile.preferred_price_range = price_range;
        self.profiles.put(&profile).await?;

        info!(
            "Built profile for user {} from {} interactions",
            user_id,
            history.len()
        );
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::{InMemoryInteractionStore, InMemoryProfileStore};

    fn aggregator() -> (
        PreferenceAggregator,
        Arc<InMemoryInteractionStore>,
        Arc<InMemoryProfileStore>,
    ) {
        let interactions = Arc::new(InMemoryInteractionStore::new());
        let profiles = Arc::new(InMemoryProfileStore::new());
        let aggregator =
            PreferenceAggregator::new(interactions.clone(), profiles.clone(), &Config::default());
        (aggregator, interactions, profiles)
    }

    fn techno(action: ActionKind) -> InteractionRecord {
        InteractionRecord::new("u1", "e1", action).with_snapshot(EventSnapshot {
            category: Some("Techno".to_string()),
            price: Some(15.0),
            location: Some("Berlin".to_string()),
        })
    }

    #[tokio::test]
    async fn test_get_or_build_without_history_is_empty() {
        let (aggregator, _, profiles) = aggregator();
        let profile = aggregator.get_or_build("ghost").await.unwrap();

        assert!(profile.is_empty());
        assert!(profile.preferred_price_range.is_none());
        assert!(profiles.get("ghost").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_get_or_build_replays_history() {
        let (aggregator, interactions, _) = aggregator();
        interactions.append(&techno(ActionKind::Viewed)).await.unwrap();
        interactions.append(&techno(ActionKind::Purchased)).await.unwrap();

        let profile = aggregator.get_or_build("u1").await.unwrap();
        assert_eq!(profile.category_weight("Techno"), 5.0);
        assert_eq!(profile.location_weight("Berlin"), 5.0);
    }

    #[tokio::test]
    async fn test_replay_is_capped_at_most_recent() {
        let (aggregator, interactions, _) = aggregator();
        for _ in 0..60 {
            interactions.append(&techno(ActionKind::Viewed)).await.unwrap();
        }

        let profile = aggregator.get_or_build("u1").await.unwrap();
        assert_eq!(profile.category_weight("Techno"), 50.0);
    }

    #[tokio::test]
    async fn test_ingest_on_fresh_user_counts_record_once() {
        let (aggregator, interactions, _) = aggregator();
        aggregator.ingest(&techno(ActionKind::Saved)).await.unwrap();

        let profile = aggregator.get_or_build("u1").await.unwrap();
        assert_eq!(profile.category_weight("Techno"), 2.0);
        assert_eq!(interactions.count("u1"), 1);
    }

    #[tokio::test]
    async fn test_ingest_increments_existing_profile() {
        let (aggregator, _, _) = aggregator();
        aggregator.get_or_build("u1").await.unwrap();

        aggregator.ingest(&techno(ActionKind::Attended)).await.unwrap();

        let profile = aggregator.get_or_build("u1").await.unwrap();
        assert_eq!(profile.category_weight("Techno"), 5.0);
        assert_eq!(profile.location_weight("Berlin"), 5.0);
        assert_eq!(profile.time_weights.values().sum::<f64>(), 5.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ingest_loses_nothing() {
        let (aggregator, _, _) = aggregator();
        let aggregator = Arc::new(aggregator);

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let aggregator = aggregator.clone();
                let action = if i % 2 == 0 { ActionKind::Saved } else { ActionKind::Attended };
                tokio::spawn(async move { aggregator.ingest(&techno(action)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let profile = aggregator.get_or_build("u1").await.unwrap();
        assert_eq!(profile.category_weight("Techno"), 10.0 * 2.0 + 10.0 * 5.0);
        assert!(aggregator.user_locks.is_empty());
    }

    #[tokio::test]
    async fn test_lock_table_shrinks_after_writes() {
        let (aggregator, _, _) = aggregator();
        for user in ["u1", "u2", "u3"] {
            aggregator.get_or_build(user).await.unwrap();
            aggregator.ingest(&techno(ActionKind::Viewed)).await.unwrap();
            aggregator.set_price_range(user, None).await.unwrap();
            aggregator.rebuild(user).await.unwrap();
        }

        assert!(aggregator.user_locks.is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_keeps_price_range() {
        let (aggregator, interactions, profiles) = aggregator();
        aggregator
            .set_price_range("u1", Some(PriceRange::new(10.0, 30.0)))
            .await
            .unwrap();

        // Drift the stored weights away from history, then rebuild.
        profiles.increment_field("u1", Dimension::Category, "Opera", 9.0).await.unwrap();
        interactions.append(&techno(ActionKind::Rated)).await.unwrap();

        let profile = aggregator.rebuild("u1").await.unwrap();
        assert_eq!(profile.category_weight("Opera"), 0.0);
        assert_eq!(profile.category_weight("Techno"), 3.0);
        assert_eq!(profile.preferred_price_range, Some(PriceRange::new(10.0, 30.0)));
    }
}
