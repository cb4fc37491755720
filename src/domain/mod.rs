//! Data structures for the triage core.
//!
//! An [`Incident`] is the unit of work: one structured record of a 911 call.
//! It is built from a [`CandidateIncident`] delivered by the upstream
//! extraction stage and moves through the [`IncidentStatus`] lifecycle.

mod incident;
mod status;

pub use incident::{
    normalize_location, CandidateIncident, Incident, IncidentId, IncidentType, Severity,
    SuggestedAction, TranscriptSegment,
};
pub use status::{IncidentStatus, StatusError};
