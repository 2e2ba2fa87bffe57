use super::{InteractionStore, ProfileStore};
use crate::error::RecError;
use crate::models::*;
use anyhow::Result;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

const DIMENSIONS: [Dimension; 3] = [Dimension::Category, Dimension::Location, Dimension::TimeOfDay];

/// Interaction log kept as one JSON list per user, newest at the head.
pub struct RedisInteractionStore {
    client: Arc<redis::Client>,
    prefix: String,
}

impl RedisInteractionStore {
    pub fn new(client: Arc<redis::Client>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    fn key(&self, user_id: &str) -> String {
        format!("{}:interactions:{}", self.prefix, user_id)
    }
}

#[async_trait::async_trait]
impl InteractionStore for RedisInteractionStore {
    async fn append(&self, record: &InteractionRecord) -> Result<()> {
        let mut conn = self.client.get_async_connection().await?;
        let payload = serde_json::to_string(record)?;
        let _: () = conn.lpush(self.key(&record.user_id), payload).await?;
        Ok(())
    }

    async fn query_recent(&self, user_id: &str, limit: usize) -> Result<Vec<InteractionRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.client.get_async_connection().await?;
        let raw: Vec<String> = conn.lrange(self.key(user_id), 0, limit as isize - 1).await?;

        let records = raw
            .iter()
            .filter_map(|payload| match decode_record(payload) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping interaction record for user {}: {}", user_id, e);
                    None
                }
            })
            .collect();

        Ok(records)
    }
}

fn decode_record(payload: &str) -> Result<InteractionRecord, RecError> {
    serde_json::from_str(payload).map_err(|e| RecError::Malformed(e.to_string()))
}

/// Profiles stored as one hash per dimension plus a meta hash, so single
/// weights can be bumped with `HINCRBYFLOAT` instead of read-modify-write.
pub struct RedisProfileStore {
    client: Arc<redis::Client>,
    prefix: String,
}

impl RedisProfileStore {
    pub fn new(client: Arc<redis::Client>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    fn meta_key(&self, user_id: &str) -> String {
        format!("{}:profile:{}:meta", self.prefix, user_id)
    }

    fn dimension_key(&self, user_id: &str, dimension: Dimension) -> String {
        format!("{}:profile:{}:{}", self.prefix, user_id, dimension.as_str())
    }
}

#[async_trait::async_trait]
impl ProfileStore for RedisProfileStore {
    async fn get(&self, user_id: &str) -> Result<Option<PreferenceProfile>> {
        let mut conn = self.client.get_async_connection().await?;

        let meta: HashMap<String, String> = conn.hgetall(self.meta_key(user_id)).await?;
        if meta.is_empty() {
            return Ok(None);
        }

        let category_weights: HashMap<String, f64> =
            conn.hgetall(self.dimension_key(user_id, Dimension::Category)).await?;
        let location_weights: HashMap<String, f64> =
            conn.hgetall(self.dimension_key(user_id, Dimension::Location)).await?;
        let raw_time: HashMap<String, f64> =
            conn.hgetall(self.dimension_key(user_id, Dimension::TimeOfDay)).await?;

        let time_weights = raw_time
            .into_iter()
            .filter_map(|(name, weight)| TimeBucket::parse(&name).map(|bucket| (bucket, weight)))
            .collect();

        let last_updated = meta
            .get("last_updated")
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let bound = |name: &str| meta.get(name).and_then(|raw| raw.parse::<f64>().ok());
        let preferred_price_range = match (bound("price_min"), bound("price_max")) {
            (Some(min), Some(max)) => Some(PriceRange::new(min, max)),
            _ => None,
        };

        Ok(Some(PreferenceProfile {
            user_id: user_id.to_string(),
            category_weights,
            location_weights,
            time_weights,
            preferred_price_range,
            last_updated,
        }))
    }

    async fn put(&self, profile: &PreferenceProfile) -> Result<()> {
        let mut conn = self.client.get_async_connection().await?;
        let user_id = profile.user_id.as_str();

        let mut keys: Vec<String> = DIMENSIONS
            .iter()
            .map(|&dimension| self.dimension_key(user_id, dimension))
            .collect();
        keys.push(self.meta_key(user_id));

        let time_pairs: Vec<(String, f64)> = profile
            .time_weights
            .iter()
            .map(|(bucket, weight)| (bucket.as_str().to_string(), *weight))
            .collect();
        let category_pairs: Vec<(String, f64)> =
            profile.category_weights.iter().map(|(k, v)| (k.clone(), *v)).collect();
        let location_pairs: Vec<(String, f64)> =
            profile.location_weights.iter().map(|(k, v)| (k.clone(), *v)).collect();

        let mut meta_pairs = vec![
            ("user_id".to_string(), profile.user_id.clone()),
            ("last_updated".to_string(), profile.last_updated.to_rfc3339()),
        ];
        if let Some(range) = profile.preferred_price_range {
            meta_pairs.push(("price_min".to_string(), range.min.to_string()));
            meta_pairs.push(("price_max".to_string(), range.max.to_string()));
        }

        let mut pipe = redis::pipe();
        pipe.atomic().del(&keys).ignore();
        for (dimension, pairs) in [
            (Dimension::Category, &category_pairs),
            (Dimension::Location, &location_pairs),
            (Dimension::TimeOfDay, &time_pairs),
        ] {
            // HSET with no fields is a syntax error.
            if !pairs.is_empty() {
                pipe.hset_multiple(self.dimension_key(user_id, dimension), pairs.as_slice())
                    .ignore();
            }
        }
        pipe.hset_multiple(self.meta_key(user_id), meta_pairs.as_slice()).ignore();

        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn increment_field(
        &self,
        user_id: &str,
        dimension: Dimension,
        key: &str,
        amount: f64,
    ) -> Result<()> {
        let mut conn = self.client.get_async_connection().await?;
        let _: f64 = conn.hincr(self.dimension_key(user_id, dimension), key, amount).await?;
        Ok(())
    }

    async fn touch(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut conn = self.client.get_async_connection().await?;
        let fields = [("user_id", user_id.to_string()), ("last_updated", at.to_rfc3339())];
        let _: () = conn.hset_multiple(self.meta_key(user_id), &fields[..]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let client = Arc::new(redis::Client::open("redis://localhost:6379").unwrap());
        let profiles = RedisProfileStore::new(client.clone(), "eventrec");
        let interactions = RedisInteractionStore::new(client, "eventrec");

        assert_eq!(profiles.meta_key("u1"), "eventrec:profile:u1:meta");
        assert_eq!(
            profiles.dimension_key("u1", Dimension::TimeOfDay),
            "eventrec:profile:u1:time_of_day"
        );
        assert_eq!(interactions.key("u1"), "eventrec:interactions:u1");
    }

    #[test]
    fn test_decode_record() {
        let record = InteractionRecord::new("u1", "e1", ActionKind::Saved);
        let payload = serde_json::to_string(&record).unwrap();
        assert_eq!(decode_record(&payload).unwrap().event_id, "e1");

        assert!(matches!(decode_record("{not json"), Err(RecError::Malformed(_))));
        assert!(matches!(decode_record(r#"{"user_id":"u1"}"#), Err(RecError::Malformed(_))));
    }
}
