//! Content fingerprints for the atomic insert-if-absent safety net.
//!
//! Two pipelines racing on genuinely duplicate calls can both pass the
//! semantic check (check-then-archive is not atomic). The fingerprint —
//! a hash over the normalized identifying fields — gives the archive an
//! exact-duplicate key to claim atomically before the first write.

use sha2::{Digest, Sha256};

use crate::domain::{normalize_location, Incident, IncidentType};

use super::engine::normalize_description;

/// Fingerprint over the normalized identifying fields of an incident.
///
/// Deliberately excludes `time`: near-simultaneous duplicate calls rarely
/// carry the same minute, and near-duplicates are the semantic check's job.
pub fn content_fingerprint(
    description: &str,
    incident_type: IncidentType,
    location: &str,
    date: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_description(description).as_bytes());
    hasher.update(b"|");
    hasher.update(incident_type.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(normalize_location(location).as_bytes());
    hasher.update(b"|");
    hasher.update(date.as_bytes());

    hex::encode(&hasher.finalize()[..16])
}

pub fn incident_fingerprint(incident: &Incident) -> String {
    content_fingerprint(
        &incident.description,
        incident.incident_type,
        &incident.location,
        &incident.date,
    )
}
