use crate::models::*;
use anyhow::{anyhow, Result};

const MAX_ID_LENGTH: usize = 128;
const MAX_LABEL_LENGTH: usize = 100;

pub fn validate_identifier(kind: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(anyhow!("{} cannot be empty", kind));
    }

    if id.len() > MAX_ID_LENGTH {
        return Err(anyhow!("{} too long (max {} characters)", kind, MAX_ID_LENGTH));
    }

    Ok(())
}

pub fn validate_record_request(request: &RecordActionRequest) -> Result<()> {
    validate_identifier("Event ID", &request.event_id)?;

    if let Some(ref snapshot) = request.snapshot {
        validate_snapshot(snapshot)?;
    }

    Ok(())
}

pub fn validate_snapshot(snapshot: &EventSnapshot) -> Result<()> {
    if let Some(ref category) = snapshot.category {
        validate_label("Category", category)?;
    }

    if let Some(ref location) = snapshot.location {
        validate_label("Location", location)?;
    }

    if let Some(price) = snapshot.price {
        if !price.is_finite() || price < 0.0 {
            return Err(anyhow!("Snapshot price must be a non-negative number"));
        }
    }

    Ok(())
}

pub fn validate_price_range(range: &PriceRange) -> Result<()> {
    if !range.min.is_finite() || !range.max.is_finite() {
        return Err(anyhow!("Price range bounds must be finite"));
    }

    if range.min < 0.0 {
        return Err(anyhow!("Price range lower bound cannot be negative"));
    }

    if range.min > range.max {
        return Err(anyhow!(
            "Price range lower bound {} exceeds upper bound {}",
            range.min,
            range.max
        ));
    }

    Ok(())
}

/// Oversized limits are accepted; the service clamps them to its maximum.
pub fn validate_limit(limit: usize) -> Result<()> {
    if limit == 0 {
        return Err(anyhow!("Limit must be greater than 0"));
    }

    Ok(())
}

pub fn validate_candidate_event(event: &CandidateEvent) -> Result<()> {
    validate_identifier("Event ID", &event.id)?;

    if let Some(ref category) = event.category {
        validate_label("Category", category)?;
    }

    if let Some(rating) = event.average_rating {
        if !(0.0..=5.0).contains(&rating) {
            return Err(anyhow!("Average rating must be between 0.0 and 5.0"));
        }
    }

    if let Some(price) = event.price {
        if price < 0.0 {
            return Err(anyhow!("Event price cannot be negative"));
        }
    }

    Ok(())
}

fn validate_label(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(anyhow!("{} cannot be empty if specified", kind));
    }

    if value.len() > MAX_LABEL_LENGTH {
        return Err(anyhow!("{} too long (max {} characters)", kind, MAX_LABEL_LENGTH));
    }

    Ok(())
}
