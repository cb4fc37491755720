//! Similarity index abstraction.
//!
//! The core never implements the embedding/ranking model itself; it owns
//! only the policy for interpreting results (see `dedup`). Any
//! nearest-neighbor text-similarity service satisfies [`SimilarityIndex`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Incident, IncidentId, IncidentType};

mod http;
mod memory;

pub use http::{HttpIndex, HttpIndexConfig};
pub use memory::LexicalIndex;

/// The per-incident payload stored in the index: the searchable
/// description plus the metadata the dedup filters need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: IncidentId,
    pub description: String,
    pub incident_type: IncidentType,
    pub location: String,
    pub date: String,
    pub time: String,
}

impl IndexRecord {
    pub fn from_incident(incident: &Incident) -> Self {
        Self {
            id: incident.id,
            description: incident.description.clone(),
            incident_type: incident.incident_type,
            location: incident.location.clone(),
            date: incident.date.clone(),
            time: incident.time.clone(),
        }
    }
}

/// One ranked nearest-neighbor result
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub record: IndexRecord,

    /// Semantic similarity score in [0, 1], higher is closer
    pub score: f64,
}

/// Pluggable nearest-neighbor text-similarity backend.
///
/// Both calls are potentially slow network operations; implementations
/// must be safe to share across concurrently running pipelines.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Return the `top_k` nearest neighbors to `query`, ranked by the
    /// backend's own scoring
    async fn search(
        &self,
        namespace: &str,
        query: &str,
        top_k: usize,
    ) -> anyhow::Result<Vec<SearchHit>>;

    /// Insert or overwrite records in a namespace
    async fn upsert(&self, namespace: &str, records: &[IndexRecord]) -> anyhow::Result<()>;
}
