//! Schema validation for archive writes.
//!
//! A rejected write is a client error the caller must fix, not a retry
//! target. Location is the one lenient field: a non-postal-shaped value
//! is logged and passed through, because the record stores what the
//! caller said.

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;
use tracing::warn;

use crate::domain::Incident;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("unparseable date, expected month/day/year: {0:?}")]
    BadDate(String),

    #[error("unparseable time, expected 24-hour HH:MM: {0:?}")]
    BadTime(String),

    #[error("transcript is required by this schema but empty")]
    EmptyTranscript,
}

/// Validate a full incident record against the archive schema.
pub fn validate_incident(incident: &Incident, require_transcript: bool) -> Result<(), ValidationError> {
    let required: [(&'static str, &str); 4] = [
        ("location", &incident.location),
        ("message", &incident.message),
        ("description", &incident.description),
        ("duration", &incident.duration),
    ];

    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(ValidationError::MissingField(name));
        }
    }

    if NaiveDate::parse_from_str(incident.date.trim(), "%m/%d/%Y").is_err() {
        return Err(ValidationError::BadDate(incident.date.clone()));
    }

    if NaiveTime::parse_from_str(incident.time.trim(), "%H:%M").is_err() {
        return Err(ValidationError::BadTime(incident.time.clone()));
    }

    if !is_postal_shaped(&incident.location) {
        warn!(
            incident_id = %incident.id,
            location = %incident.location,
            "location is not postal-code shaped, storing as-is"
        );
    }

    if require_transcript && incident.transcript.is_empty() {
        return Err(ValidationError::EmptyTranscript);
    }

    Ok(())
}

/// Canadian postal shape after normalization: L#L#L#
fn is_postal_shaped(location: &str) -> bool {
    let chars: Vec<char> = location.chars().collect();
    chars.len() == 6
        && chars
            .iter()
            .enumerate()
            .all(|(i, c)| if i % 2 == 0 { c.is_ascii_uppercase() } else { c.is_ascii_digit() })
}
