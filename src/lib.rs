//! dispatch-triage - 911-call triage core
//!
//! An incoming call is transcribed and extracted upstream; this crate
//! receives the structured candidate incident and owns the non-trivial
//! part of the pipeline: deciding whether it duplicates an already-known
//! incident, and maintaining a priority-ordered, crash-tolerant queue of
//! open incidents plus a durable archive of everything admitted.
//!
//! # Architecture
//!
//! - All queue mutations are recorded as immutable events; the open set
//!   is derived by replaying the log
//! - The archive is the identity universe for deduplication: a record
//!   must be archived before it can be a target for future checks
//! - The similarity backend is pluggable behind [`index::SimilarityIndex`]
//!
//! # Modules
//!
//! - `domain`: Data structures (Incident, closed vocabularies, status FSM)
//! - `dedup`: Deduplication engine and content fingerprints
//! - `queue`: Priority queue with pluggable scoring
//! - `archive`: Durable archive store with audit trail
//! - `index`: Similarity index backends (hosted HTTP, local lexical)
//! - `pipeline`: The triage service tying the stages together
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Triage a candidate incident
//! cat candidate.json | dispatch triage
//!
//! # Inspect the open queue
//! dispatch queue
//!
//! # Resolve an incident
//! dispatch resolve 01HZX5T9GQRS8F4N2V6B7C8D9E
//! ```

pub mod archive;
pub mod cli;
pub mod config;
pub mod dedup;
pub mod domain;
pub mod index;
pub mod pipeline;
pub mod queue;

// Re-export main types at crate root for convenience
pub use archive::{Archive, ArchiveError};
pub use dedup::{DedupConfig, DedupEngine, SimilarIncident};
pub use domain::{CandidateIncident, Incident, IncidentId, IncidentStatus, Severity};
pub use index::{IndexRecord, SearchHit, SimilarityIndex};
pub use pipeline::{ResolveOutcome, Triage, TriageError, TriageOutcome};
pub use queue::{DispatchQueue, QueueEntry, ScoreStrategy, SeverityDecay};
