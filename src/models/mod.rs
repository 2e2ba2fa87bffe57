use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::error::RecError;
use crate::utils::parse_event_date;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    #[serde(alias = "clicked")]
    Viewed,
    Saved,
    Shared,
    Rated,
    Attended,
    Purchased,
}

impl ActionKind {
    /// Contribution of one action of this kind to every profile dimension it touches.
    pub fn weight(self) -> f64 {
        match self {
            ActionKind::Attended => 5.0,
            ActionKind::Purchased => 4.0,
            ActionKind::Rated => 3.0,
            ActionKind::Saved => 2.0,
            ActionKind::Shared => 1.5,
            ActionKind::Viewed => 1.0,
        }
    }
}

/// Event attributes captured at the moment of the action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSnapshot {
    pub category: Option<String>,
    pub price: Option<f64>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub id: Uuid,
    pub user_id: String,
    pub event_id: String,
    pub action: ActionKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub snapshot: EventSnapshot,
}

impl InteractionRecord {
    pub fn new(
        user_id: impl Into<String>,
        event_id: impl Into<String>,
        action: ActionKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            event_id: event_id.into(),
            action,
            timestamp: Utc::now(),
            snapshot: EventSnapshot::default(),
        }
    }

    pub fn with_snapshot(mut self, snapshot: EventSnapshot) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Fixed partition of the 24-hour clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeBucket {
    pub const ALL: [TimeBucket; 4] = [
        TimeBucket::Morning,
        TimeBucket::Afternoon,
        TimeBucket::Evening,
        TimeBucket::Night,
    ];

    pub fn from_hour(hour: u32) -> Self {
        match hour % 24 {
            6..=11 => TimeBucket::Morning,
            12..=16 => TimeBucket::Afternoon,
            17..=21 => TimeBucket::Evening,
            _ => TimeBucket::Night,
        }
    }

    pub fn of(instant: DateTime<Utc>) -> Self {
        Self::from_hour(instant.hour())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeBucket::Morning => "morning",
            TimeBucket::Afternoon => "afternoon",
            TimeBucket::Evening => "evening",
            TimeBucket::Night => "night",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|bucket| bucket.as_str() == name)
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive price interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.min && price <= self.max
    }

    /// Distance from `price` to the closer bound; zero inside the range.
    pub fn distance(&self, price: f64) -> f64 {
        if price < self.min {
            self.min - price
        } else if price > self.max {
            price - self.max
        } else {
            0.0
        }
    }
}

/// Profile dimension addressed by an atomic increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Category,
    Location,
    TimeOfDay,
}

impl Dimension {
    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Category => "category",
            Dimension::Location => "location",
            Dimension::TimeOfDay => "time_of_day",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceProfile {
    pub user_id: String,
    #[serde(default)]
    pub category_weights: HashMap<String, f64>,
    #[serde(default)]
    pub location_weights: HashMap<String, f64>,
    #[serde(default)]
    pub time_weights: HashMap<TimeBucket, f64>,
    pub preferred_price_range: Option<PriceRange>,
    pub last_updated: DateTime<Utc>,
}

impl PreferenceProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            category_weights: HashMap::new(),
            location_weights: HashMap::new(),
            time_weights: HashMap::new(),
            preferred_price_range: None,
            last_updated: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.category_weights.is_empty()
            && self.location_weights.is_empty()
            && self.time_weights.is_empty()
    }

    pub fn category_weight(&self, category: &str) -> f64 {
        self.category_weights.get(category).copied().unwrap_or(0.0)
    }

    pub fn location_weight(&self, location: &str) -> f64 {
        self.location_weights.get(location).copied().unwrap_or(0.0)
    }

    pub fn time_weight(&self, bucket: TimeBucket) -> f64 {
        self.time_weights.get(&bucket).copied().unwrap_or(0.0)
    }

    /// Adds `amount` to one weight. Keys are only created by a contribution.
    pub fn add_weight(&mut self, dimension: Dimension, key: &str, amount: f64) {
        match dimension {
            Dimension::Category => {
                *self.category_weights.entry(key.to_string()).or_insert(0.0) += amount;
            }
            Dimension::Location => {
                *self.location_weights.entry(key.to_string()).or_insert(0.0) += amount;
            }
            Dimension::TimeOfDay => {
                if let Some(bucket) = TimeBucket::parse(key) {
                    *self.time_weights.entry(bucket).or_insert(0.0) += amount;
                }
            }
        }
    }
}

/// Event document as delivered by the catalog, before typed decoding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventDocument {
    pub id: String,
    pub category: Option<String>,
    pub location: Option<String>,
    pub price: Option<f64>,
    #[serde(default)]
    pub attendee_count: u64,
    pub average_rating: Option<f64>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEvent {
    pub id: String,
    pub category: Option<String>,
    pub location: Option<String>,
    pub price: Option<f64>,
    pub attendee_count: u64,
    pub average_rating: Option<f64>,
    /// `None` when the source date could not be decoded.
    pub starts_at: Option<DateTime<Utc>>,
}

impl CandidateEvent {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category: None,
            location: None,
            price: None,
            attendee_count: 0,
            average_rating: None,
            starts_at: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_attendees(mut self, attendee_count: u64) -> Self {
        self.attendee_count = attendee_count;
        self
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.average_rating = Some(rating);
        self
    }

    pub fn starting_at(mut self, starts_at: DateTime<Utc>) -> Self {
        self.starts_at = Some(starts_at);
        self
    }

    /// True when the event has not started yet and starts no later than
    /// `now + window`.
    pub fn starts_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.starts_at {
            Some(start) => start >= now && start - now <= window,
            None => false,
        }
    }
}

impl From<EventDocument> for CandidateEvent {
    fn from(doc: EventDocument) -> Self {
        let starts_at = match doc.date.as_deref() {
            Some(raw) => {
                let parsed = parse_event_date(raw);
                if parsed.is_none() {
                    let err = RecError::Malformed(format!("date {:?} on event {}", raw, doc.id));
                    tracing::debug!("{}; scoring without a start", err);
                }
                parsed
            }
            None => None,
        };

        Self {
            id: doc.id,
            category: doc.category.filter(|c| !c.is_empty()),
            location: doc.location.filter(|l| !l.is_empty()),
            price: doc.price.filter(|p| p.is_finite()),
            attendee_count: doc.attendee_count,
            average_rating: doc.average_rating.filter(|r| r.is_finite()),
            starts_at,
        }
    }
}

/// Per-feature contributions to a candidate's score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub category: f64,
    pub location: f64,
    pub price_fit: f64,
    pub time_of_day: f64,
    pub popularity: f64,
    pub quality: f64,
    pub recency: f64,
}

impl ScoreBreakdown {
    pub fn raw_sum(&self) -> f64 {
        self.category
            + self.location
            + self.price_fit
            + self.time_of_day
            + self.popularity
            + self.quality
            + self.recency
    }

    /// Reported score, floored at zero.
    pub fn total(&self) -> f64 {
        self.raw_sum().max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecommendation {
    pub event: CandidateEvent,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordActionRequest {
    pub user_id: Option<String>,
    pub event_id: String,
    pub action: ActionKind,
    pub snapshot: Option<EventSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub user_id: String,
    pub recommendations: Vec<ScoredRecommendation>,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_time_bucket_boundaries() {
        assert_eq!(TimeBucket::from_hour(5), TimeBucket::Night);
        assert_eq!(TimeBucket::from_hour(6), TimeBucket::Morning);
        assert_eq!(TimeBucket::from_hour(11), TimeBucket::Morning);
        assert_eq!(TimeBucket::from_hour(12), TimeBucket::Afternoon);
        assert_eq!(TimeBucket::from_hour(16), TimeBucket::Afternoon);
        assert_eq!(TimeBucket::from_hour(17), TimeBucket::Evening);
        assert_eq!(TimeBucket::from_hour(21), TimeBucket::Evening);
        assert_eq!(TimeBucket::from_hour(22), TimeBucket::Night);
        assert_eq!(TimeBucket::from_hour(0), TimeBucket::Night);
    }

    #[test]
    fn test_price_range_distance() {
        let range = PriceRange::new(20.0, 50.0);
        assert!(range.contains(20.0));
        assert!(range.contains(50.0));
        assert_eq!(range.distance(35.0), 0.0);
        assert_eq!(range.distance(5.0), 15.0);
        assert_eq!(range.distance(80.0), 30.0);
    }

    #[test]
    fn test_clicked_is_viewed() {
        let action: ActionKind = serde_json::from_str("\"clicked\"").unwrap();
        assert_eq!(action, ActionKind::Viewed);
        assert_eq!(action.weight(), 1.0);
    }

    #[test]
    fn test_document_with_bad_date_still_decodes() {
        let doc = EventDocument {
            id: "e1".to_string(),
            category: Some("Techno".to_string()),
            date: Some("next friday-ish".to_string()),
            ..Default::default()
        };
        let event = CandidateEvent::from(doc);
        assert_eq!(event.id, "e1");
        assert!(event.starts_at.is_none());
    }

    #[test]
    fn test_starts_within_window() {
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap();
        let window = Duration::days(7);
        let soon = CandidateEvent::new("a").starting_at(now + Duration::days(3));
        let edge = CandidateEvent::new("b").starting_at(now + Duration::days(7));
        let later = CandidateEvent::new("c").starting_at(now + Duration::days(8));
        assert!(soon.starts_within(now, window));
        assert!(edge.starts_within(now, window));
        assert!(!later.starts_within(now, window));
        assert!(!CandidateEvent::new("d").starts_within(now, window));
    }

    #[test]
    fn test_started_or_just_past_window_is_outside() {
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap();
        let window = Duration::days(7);
        let started = CandidateEvent::new("a").starting_at(now - Duration::hours(20));
        let just_past =
            CandidateEvent::new("b").starting_at(now + Duration::days(7) + Duration::minutes(1));
        let right_now = CandidateEvent::new("c").starting_at(now);
        assert!(!started.starts_within(now, window));
        assert!(!just_past.starts_within(now, window));
        assert!(right_now.starts_within(now, window));
    }

    #[test]
    fn test_profile_serializes_time_buckets_by_name() {
        let mut profile = PreferenceProfile::new("u1");
        profile.add_weight(Dimension::TimeOfDay, "evening", 2.0);
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["time_weights"]["evening"], 2.0);
    }
}
