use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

pub mod validation;

const NAIVE_DATETIME_FORMATS: [&str; 3] =
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Decodes the date formats event documents are known to carry.
///
/// Naive timestamps are read as UTC. A bare date resolves to midnight.
pub fn parse_event_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let parsed = parse_event_date("2026-11-02T20:30:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 11, 2, 18, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_naive_formats() {
        let parsed = parse_event_date("2026-11-02 20:30:00").unwrap();
        assert_eq!(parsed.hour(), 20);
        let parsed = parse_event_date("2026-11-02").unwrap();
        assert_eq!(parsed.hour(), 0);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_event_date("").is_none());
        assert!(parse_event_date("tomorrow night").is_none());
        assert!(parse_event_date("2026-13-40").is_none());
    }
}
