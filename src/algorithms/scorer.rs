use super::ScoringAlgorithm;
use crate::config::ScoringConfig;
use crate::models::*;
use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;

/// Heuristic multi-factor scorer over a preference profile.
///
/// Every feature contributes additively, so sparse data lowers a score but
/// never disqualifies an event.
#[derive(Debug, Clone)]
pub struct AffinityScorer {
    weights: ScoringConfig,
    recency_window: Duration,
}

impl Default for AffinityScorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default(), 7)
    }
}

impl AffinityScorer {
    pub fn new(weights: ScoringConfig, recency_window_days: i64) -> Self {
        Self {
            weights,
            recency_window: Duration::days(recency_window_days),
        }
    }

    /// Scores each candidate once, stable-sorts by descending score and keeps
    /// the first `limit`. Ties keep their input order.
    pub fn rank(
        &self,
        profile: &PreferenceProfile,
        candidates: Vec<CandidateEvent>,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Vec<ScoredRecommendation> {
        if limit == 0 || candidates.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<ScoredRecommendation> = candidates
            .into_par_iter()
            .map(|event| {
                let breakdown = self.score(profile, &event, now);
                let reason = explain(&event, &breakdown);
                ScoredRecommendation {
                    score: breakdown.total(),
                    event,
                    breakdown,
                    reason,
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }

    fn price_fit(&self, profile: &PreferenceProfile, event: &CandidateEvent) -> f64 {
        match (profile.preferred_price_range, event.price) {
            (Some(range), Some(price)) if range.contains(price) => self.weights.price_fit_bonus,
            (Some(range), Some(price)) => {
                -self.weights.price_penalty_per_unit * range.distance(price)
            }
            _ => 0.0,
        }
    }
}

impl ScoringAlgorithm for AffinityScorer {
    fn name(&self) -> &str {
        "affinity"
    }

    fn score(
        &self,
        profile: &PreferenceProfile,
        event: &CandidateEvent,
        now: DateTime<Utc>,
    ) -> ScoreBreakdown {
        let w = &self.weights;

        let category = event
            .category
            .as_deref()
            .map(|c| profile.category_weight(c) * w.category_weight)
            .unwrap_or(0.0);

        let location = event
            .location
            .as_deref()
            .map(|l| profile.location_weight(l) * w.location_weight)
            .unwrap_or(0.0);

        let time_of_day = event
            .starts_at
            .map(|start| profile.time_weight(TimeBucket::of(start)) * w.time_of_day_weight)
            .unwrap_or(0.0);

        let recency = if event.starts_within(now, self.recency_window) {
            w.recency_bonus
        } else {
            0.0
        };

        ScoreBreakdown {
            category,
            location,
            price_fit: self.price_fit(profile, event),
            time_of_day,
            popularity: event.attendee_count as f64 * w.popularity_per_attendee,
            quality: event.average_rating.unwrap_or(0.0) * w.quality_weight,
            recency,
        }
    }
}

fn explain(event: &CandidateEvent, breakdown: &ScoreBreakdown) -> String {
    let terms = [
        ("category", breakdown.category),
        ("location", breakdown.location),
        ("price", breakdown.price_fit),
        ("time", breakdown.time_of_day),
        ("popularity", breakdown.popularity),
        ("quality", breakdown.quality),
        ("recency", breakdown.recency),
    ];

    let strongest = terms
        .iter()
        .filter(|(_, value)| *value > 0.0)
        .fold(None, |best: Option<(&str, f64)>, &(name, value)| match best {
            Some((_, top)) if top >= value => best,
            _ => Some((name, value)),
        });

    match strongest.map(|(name, _)| name) {
        Some("category") => format!(
            "Because you like {} events",
            event.category.as_deref().unwrap_or("similar")
        ),
        Some("location") => format!(
            "Happening in {}, where you often go",
            event.location.as_deref().unwrap_or("a place you like")
        ),
        Some("price") => "Within your preferred price range".to_string(),
        Some("time") => "At a time of day you usually go out".to_string(),
        Some("popularity") => format!("Popular: {} people attending", event.attendee_count),
        Some("quality") => format!("Highly rated ({:.1})", event.average_rating.unwrap_or(0.0)),
        Some("recency") => "Happening this week".to_string(),
        _ => "Upcoming event".to_string(),
    }
}
