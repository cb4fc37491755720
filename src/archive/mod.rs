//! Durable archive of every admitted incident.
//!
//! The archive owns the permanent record across the full lifecycle and
//! is the identity universe for deduplication: an incident must be
//! written here before it can be a target for future duplicate checks.

mod store;
mod validate;

pub use store::{Archive, ArchiveError};
pub use validate::{validate_incident, ValidationError};
