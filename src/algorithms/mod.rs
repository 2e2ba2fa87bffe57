//! Pure engine logic: how interactions become preference weights, and how
//! preference weights become event scores. Nothing here touches a store.

pub mod scorer;

pub use scorer::AffinityScorer;

use crate::models::*;
use chrono::{DateTime, Utc};

/// Scores one candidate for one profile as independent additive terms.
pub trait ScoringAlgorithm: Send + Sync {
    fn name(&self) -> &str;

    fn score(
        &self,
        profile: &PreferenceProfile,
        event: &CandidateEvent,
        now: DateTime<Utc>,
    ) -> ScoreBreakdown;
}

/// One weight contribution produced by an interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub dimension: Dimension,
    pub key: String,
    pub amount: f64,
}

/// Weight contributions of a single record.
///
/// Category and location are skipped when the snapshot lacks them; the
/// time-of-day bucket always receives the action weight.
pub fn contributions(record: &InteractionRecord) -> Vec<Contribution> {
    let amount = record.action.weight();
    let mut out = Vec::with_capacity(3);

    if let Some(category) = record.snapshot.category.as_deref().filter(|c| !c.is_empty()) {
        out.push(Contribution {
            dimension: Dimension::Category,
            key: category.to_string(),
            amount,
        });
    }

    if let Some(location) = record.snapshot.location.as_deref().filter(|l| !l.is_empty()) {
        out.push(Contribution {
            dimension: Dimension::Location,
            key: location.to_string(),
            amount,
        });
    }

    out.push(Contribution {
        dimension: Dimension::TimeOfDay,
        key: TimeBucket::of(record.timestamp).as_str().to_string(),
        amount,
    });

    out
}

pub fn apply_increment(
    mut profile: PreferenceProfile,
    record: &InteractionRecord,
) -> PreferenceProfile {
    for contribution in contributions(record) {
        profile.add_weight(contribution.dimension, &contribution.key, contribution.amount);
    }
    profile.last_updated = Utc::now();
    profile
}

/// Builds a profile from history delivered newest first, replaying it oldest first.
pub fn fold_history(user_id: &str, newest_first: &[InteractionRecord]) -> PreferenceProfile {
    newest_first
        .iter()
        .rev()
        .fold(PreferenceProfile::new(user_id), apply_increment)
}
