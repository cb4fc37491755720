//! Incident deduplication.
//!
//! Decides whether a freshly extracted incident describes the same
//! real-world event as one already archived. Metadata equality is a
//! precondition; semantic similarity is only consulted for candidates
//! that survive the hard filters.

mod engine;
mod fingerprint;

pub use engine::{normalize_description, DedupConfig, DedupEngine, MetadataMatch, SimilarIncident};
pub use fingerprint::{content_fingerprint, incident_fingerprint};
