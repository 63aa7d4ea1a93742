//! Boundary validation for schedule and broadcast submissions.
//!
//! Everything here runs before any controller state is touched: a request
//! that fails validation never reaches the arbiter.

use chrono::{DateTime, Local, NaiveDate, NaiveTime, Utc};

use crate::controller::task::TaskKind;

/// Validation errors surfaced to the submitting layer.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("Invalid date '{value}' (expected YYYY-MM-DD)")]
    InvalidDate { value: String },

    #[error("Invalid time '{value}' (expected HH:MM, 24-hour)")]
    InvalidTime { value: String },

    #[error("Date/time '{value}' does not exist in the local timezone")]
    NonexistentLocalTime { value: String },

    #[error("Unknown broadcast kind '{value}' (expected voice, text, or background)")]
    UnknownKind { value: String },

    #[error("Content too long (max {max} bytes)")]
    ContentTooLong { max: usize },
}

fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField { field });
    }
    Ok(())
}

/// Parse a schedule's display `date` and `time` into the instant it becomes
/// due. The fields are interpreted in the controller's local timezone;
/// instants skipped by a DST transition are rejected.
pub fn parse_schedule_datetime(date: &str, time: &str) -> Result<DateTime<Utc>, ValidationError> {
    let date_part = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|_| {
        ValidationError::InvalidDate {
            value: date.to_string(),
        }
    })?;
    let time_part = NaiveTime::parse_from_str(time.trim(), "%H:%M").map_err(|_| {
        ValidationError::InvalidTime {
            value: time.to_string(),
        }
    })?;
    let naive = date_part.and_time(time_part);
    naive
        .and_local_timezone(Local)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or(ValidationError::NonexistentLocalTime {
            value: format!("{date} {time}"),
        })
}

/// Validate a schedule submission. All five fields are required; returns
/// the parsed due instant on success.
pub fn validate_schedule_fields(
    message: &str,
    date: &str,
    time: &str,
    repeat: &str,
    zones: &str,
) -> Result<DateTime<Utc>, ValidationError> {
    require(message, "message")?;
    require(date, "date")?;
    require(time, "time")?;
    require(repeat, "repeat")?;
    require(zones, "zones")?;
    parse_schedule_datetime(date, time)
}

/// Map a submitted broadcast kind string to a task kind. Emergency has its
/// own activation path and is deliberately not accepted here.
pub fn parse_broadcast_kind(kind: &str) -> Result<TaskKind, ValidationError> {
    match kind.trim().to_ascii_lowercase().as_str() {
        "voice" => Ok(TaskKind::Voice),
        "text" => Ok(TaskKind::Text),
        "background" => Ok(TaskKind::Background),
        other => Err(ValidationError::UnknownKind {
            value: other.to_string(),
        }),
    }
}

/// Strip control characters from announcement content, keeping newlines and
/// tabs. Oversized input is rejected rather than truncated.
pub fn sanitize_content(content: &str, max_bytes: usize) -> Result<String, ValidationError> {
    if content.len() > max_bytes {
        return Err(ValidationError::ContentTooLong { max: max_bytes });
    }
    Ok(content
        .chars()
        .filter(|&c| !c.is_control() || c == '\n' || c == '\t')
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_datetime_parses() {
        let due = parse_schedule_datetime("2026-08-01", "10:30").unwrap();
        let local = due.with_timezone(&Local);
        assert_eq!(local.format("%Y-%m-%d").to_string(), "2026-08-01");
        assert_eq!(local.format("%H:%M").to_string(), "10:30");
    }

    #[test]
    fn bad_date_and_time_rejected() {
        assert!(matches!(
            parse_schedule_datetime("08/01/2026", "10:30"),
            Err(ValidationError::InvalidDate { .. })
        ));
        assert!(matches!(
            parse_schedule_datetime("2026-08-01", "10:30 PM"),
            Err(ValidationError::InvalidTime { .. })
        ));
        assert!(matches!(
            parse_schedule_datetime("2026-02-30", "10:30"),
            Err(ValidationError::InvalidDate { .. })
        ));
        assert!(matches!(
            parse_schedule_datetime("2026-08-01", "25:00"),
            Err(ValidationError::InvalidTime { .. })
        ));
    }

    #[test]
    fn required_fields_enforced() {
        assert!(matches!(
            validate_schedule_fields("", "2026-08-01", "10:30", "none", "All Zones"),
            Err(ValidationError::MissingField { field: "message" })
        ));
        assert!(matches!(
            validate_schedule_fields("hi", "2026-08-01", "10:30", "none", "  "),
            Err(ValidationError::MissingField { field: "zones" })
        ));
        assert!(validate_schedule_fields("hi", "2026-08-01", "10:30", "daily", "All Zones").is_ok());
    }

    #[test]
    fn broadcast_kinds() {
        assert_eq!(parse_broadcast_kind("voice").unwrap(), TaskKind::Voice);
        assert_eq!(parse_broadcast_kind("TEXT").unwrap(), TaskKind::Text);
        assert_eq!(parse_broadcast_kind("background").unwrap(), TaskKind::Background);
        assert!(parse_broadcast_kind("emergency").is_err());
        assert!(parse_broadcast_kind("audio").is_err());
    }

    #[test]
    fn content_sanitization() {
        assert_eq!(sanitize_content("Lunch at noon", 100).unwrap(), "Lunch at noon");
        assert_eq!(
            sanitize_content("line 1\nline 2\ttab", 100).unwrap(),
            "line 1\nline 2\ttab"
        );
        assert_eq!(sanitize_content("be\x00ll\x07", 100).unwrap(), "bell");
        assert!(sanitize_content(&"x".repeat(600), 500).is_err());
    }
}
