use crate::algorithms::AffinityScorer;
use crate::config::Config;
use crate::error::{RecError, RecResult};
use crate::models::*;
use crate::services::aggregator::PreferenceAggregator;
use crate::services::store::EventCatalog;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Ranks upcoming events for a user. Read-only with respect to profiles
/// apart from the lazy first build.
pub struct RecommendationService {
    catalog: Arc<dyn EventCatalog>,
    aggregator: Arc<PreferenceAggregator>,
    scorer: AffinityScorer,
    config: Arc<Config>,
}

impl RecommendationService {
    pub fn new(
        catalog: Arc<dyn EventCatalog>,
        aggregator: Arc<PreferenceAggregator>,
        config: Arc<Config>,
    ) -> Self {
        let scorer = AffinityScorer::new(
            config.scoring.clone(),
            config.recommendation.recency_window_days,
        );

        Self {
            catalog,
            aggregator,
            scorer,
            config,
        }
    }

    fn upstream_timeout(&self) -> Duration {
        self.config.store.upstream_timeout()
    }

    fn effective_limit(&self, limit: Option<usize>) -> usize {
        limit
            .unwrap_or(self.config.recommendation.default_limit)
            .min(self.config.recommendation.max_limit)
    }

    /// Scores a caller-supplied candidate pool.
    pub async fn recommend(
        &self,
        user_id: &str,
        candidates: Vec<CandidateEvent>,
        limit: Option<usize>,
    ) -> RecResult<Vec<ScoredRecommendation>> {
        let limit = self.effective_limit(limit);
        if candidates.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let profile = self.load_profile(user_id).await?;
        Ok(self.scorer.rank(&profile, candidates, Utc::now(), limit))
    }

    /// Fetches the upcoming pool and the profile concurrently, then ranks.
    /// Either fetch failing withholds the whole result.
    pub async fn get_recommendations(
        &self,
        user_id: Option<&str>,
        limit: Option<usize>,
    ) -> RecResult<RecommendationResponse> {
        let user_id = user_id
            .filter(|id| !id.is_empty())
            .ok_or(RecError::Unauthenticated)?;
        let limit = self.effective_limit(limit);
        let now = Utc::now();

        let pool_size = self.config.recommendation.candidate_pool_size;
        let candidates = with_timeout(
            "event catalog",
            self.upstream_timeout(),
            self.catalog.fetch_upcoming(pool_size, now),
        );
        let (candidates, profile) = tokio::try_join!(candidates, self.load_profile(user_id))?;

        let pool = candidates.len();
        let recommendations = self.scorer.rank(&profile, candidates, now, limit);

        info!(
            "Ranked {} of {} candidates for user {}",
            recommendations.len(),
            pool,
            user_id
        );

        Ok(RecommendationResponse {
            user_id: user_id.to_string(),
            recommendations,
            generated_at: now,
        })
    }

    pub async fn load_profile(&self, user_id: &str) -> RecResult<PreferenceProfile> {
        with_timeout(
            "profile store",
            self.upstream_timeout(),
            self.aggregator.get_or_build(user_id),
        )
        .await
    }
}

async fn with_timeout<T>(
    context: &str,
    timeout: Duration,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> RecResult<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            error!("{} failed: {}", context, e);
            Err(RecError::upstream(context, e))
        }
        Err(_) => {
            error!("{} timed out after {:?}", context, timeout);
            Err(RecError::timed_out(context))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::{
        InMemoryEventCatalog, InMemoryInteractionStore, InMemoryProfileStore,
    };
    use chrono::Duration as ChronoDuration;

    fn service(events: Vec<CandidateEvent>) -> RecommendationService {
        let config = Arc::new(Config::default());
        let aggregator = Arc::new(PreferenceAggregator::new(
            Arc::new(InMemoryInteractionStore::new()),
            Arc::new(InMemoryProfileStore::new()),
            &config,
        ));
        let catalog = Arc::new(InMemoryEventCatalog::with_events(events));
        RecommendationService::new(catalog, aggregator, config)
    }

    #[tokio::test]
    async fn test_missing_user_is_unauthenticated() {
        let svc = service(Vec::new());
        let result = svc.get_recommendations(None, None).await;
        assert!(matches!(result, Err(RecError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_default_limit_and_cap() {
        let start = Utc::now() + ChronoDuration::days(2);
        let events: Vec<CandidateEvent> = (0..30)
            .map(|i| {
                CandidateEvent::new(format!("e{}", i))
                    .starting_at(start + ChronoDuration::minutes(i))
            })
            .collect();
        let svc = service(events);

        let response = svc.get_recommendations(Some("u1"), None).await.unwrap();
        assert_eq!(response.recommendations.len(), 10);

        let response = svc.get_recommendations(Some("u1"), Some(1000)).await.unwrap();
        assert_eq!(response.recommendations.len(), 30);
    }

    #[tokio::test]
    async fn test_recommend_on_empty_pool() {
        let svc = service(Vec::new());
        assert!(svc.recommend("u1", Vec::new(), Some(5)).await.unwrap().is_empty());
        let response = svc.get_recommendations(Some("u1"), None).await.unwrap();
        assert!(response.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_maps_to_upstream_unavailable() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, anyhow::Error>(())
        };
        let result = with_timeout("slow store", Duration::from_millis(10), slow).await;
        assert!(matches!(result, Err(RecError::UpstreamUnavailable(_))));
    }
}
