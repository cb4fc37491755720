//! The deduplication decision engine.
//!
//! Policy, in order: hard metadata filters (type, location, date, time
//! window) exclude neighbors regardless of score; survivors are admitted
//! on an exact normalized-description match or a score at/above the
//! threshold. The engine returns the ranked admitted list and makes no
//! irreversible effect itself — the caller decides what a duplicate means.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{normalize_location, CandidateIncident, IncidentId};
use crate::index::{SearchHit, SimilarityIndex};

/// Tunables for the dedup policy. All metadata filters are enabled by
/// default and may be disabled independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Index namespace holding all previously archived incidents
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Neighbors to request from the index
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Similarity score at/above which a filtered neighbor is admitted
    #[serde(default = "default_threshold")]
    pub score_threshold: f64,

    /// Window for the time filter, in minutes
    #[serde(default = "default_window")]
    pub time_window_minutes: i64,

    #[serde(default = "default_true")]
    pub match_incident_type: bool,

    #[serde(default = "default_true")]
    pub match_location: bool,

    #[serde(default = "default_true")]
    pub match_date: bool,

    #[serde(default = "default_true")]
    pub match_time: bool,

    /// Treat index failures as "no duplicates found" instead of erroring.
    /// False negatives are cheaper than lost 911 calls; some deployments
    /// prefer fail-closed to avoid flooding dispatchers during an outage.
    #[serde(default = "default_true")]
    pub fail_open: bool,
}

fn default_namespace() -> String {
    "incidents".to_string()
}
fn default_top_k() -> usize {
    10
}
fn default_threshold() -> f64 {
    0.85
}
fn default_window() -> i64 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            top_k: default_top_k(),
            score_threshold: default_threshold(),
            time_window_minutes: default_window(),
            match_incident_type: true,
            match_location: true,
            match_date: true,
            match_time: true,
            fail_open: true,
        }
    }
}

/// Per-filter breakdown for one neighbor, computed whether or not the
/// corresponding filter is enabled
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetadataMatch {
    pub incident_type: bool,
    pub location: bool,
    pub date: bool,
    pub time_within_window: bool,
}

impl MetadataMatch {
    /// Whether every *enabled* filter passed
    fn passes(&self, config: &DedupConfig) -> bool {
        (!config.match_incident_type || self.incident_type)
            && (!config.match_location || self.location)
            && (!config.match_date || self.date)
            && (!config.match_time || self.time_within_window)
    }
}

/// An admitted neighbor: the caller's evidence that the candidate
/// duplicates an archived incident
#[derive(Debug, Clone, Serialize)]
pub struct SimilarIncident {
    pub id: IncidentId,

    /// The index's similarity score
    pub score: f64,

    /// Normalized descriptions matched byte-for-byte. Set independently
    /// of the score; used for display and logging, never for reordering.
    pub is_exact: bool,

    pub metadata: MetadataMatch,

    /// The neighbor's stored description, for operator display
    pub description: String,
}

/// Deduplication engine over a pluggable similarity index
pub struct DedupEngine {
    index: Arc<dyn SimilarityIndex>,
    config: DedupConfig,
}

impl DedupEngine {
    pub fn new(index: Arc<dyn SimilarityIndex>, config: DedupConfig) -> Self {
        Self { index, config }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Run the full dedup policy against the archive namespace.
    ///
    /// Returns the ranked list of admitted similar incidents, preserving
    /// the index's own ordering. A candidate with no usable description
    /// has nothing to compare against and yields an empty list.
    pub async fn find_similar(
        &self,
        candidate: &CandidateIncident,
    ) -> anyhow::Result<Vec<SimilarIncident>> {
        let query = candidate.description.trim();
        if query.is_empty() {
            debug!("candidate has no description text, skipping dedup check");
            return Ok(Vec::new());
        }

        let hits = self
            .index
            .search(&self.config.namespace, query, self.config.top_k)
            .await?;

        let query_normalized = normalize_description(query);
        let candidate_location = normalize_location(&candidate.location);
        let candidate_ts = parse_timestamp(&candidate.date, &candidate.time);

        let mut admitted = Vec::new();

        for hit in hits {
            let metadata = self.metadata_match(candidate, &candidate_location, candidate_ts, &hit);

            if !metadata.passes(&self.config) {
                continue;
            }

            let is_exact = normalize_description(&hit.record.description) == query_normalized;

            if is_exact || hit.score >= self.config.score_threshold {
                admitted.push(SimilarIncident {
                    id: hit.record.id,
                    score: hit.score,
                    is_exact,
                    metadata,
                    description: hit.record.description,
                });
            }
        }

        debug!(count = admitted.len(), "dedup check complete");
        Ok(admitted)
    }

    /// [`find_similar`](Self::find_similar) with the configured failure
    /// policy applied: when failing open, a backend error is logged and
    /// treated as "no similar incidents found".
    pub async fn check(&self, candidate: &CandidateIncident) -> anyhow::Result<Vec<SimilarIncident>> {
        match self.find_similar(candidate).await {
            Ok(matches) => Ok(matches),
            Err(e) if self.config.fail_open => {
                warn!(error = %e, "similarity backend failed, admitting candidate as new");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    fn metadata_match(
        &self,
        candidate: &CandidateIncident,
        candidate_location: &str,
        candidate_ts: Option<NaiveDateTime>,
        hit: &SearchHit,
    ) -> MetadataMatch {
        let time_within_window = match (candidate_ts, parse_timestamp(&hit.record.date, &hit.record.time)) {
            (Some(a), Some(b)) => {
                (a - b).num_minutes().abs() <= self.config.time_window_minutes
            }
            // Unparseable on either side: treat the pair as distinct,
            // which errs toward admitting a new incident
            _ => false,
        };

        MetadataMatch {
            incident_type: hit.record.incident_type == candidate.incident_type,
            location: normalize_location(&hit.record.location) == candidate_location,
            date: hit.record.date == candidate.date,
            time_within_window,
        }
    }
}

/// Casefold and collapse whitespace for exact-duplicate comparison
pub fn normalize_description(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Parse `m/d/Y` + `HH:MM` into one timestamp; None if either is malformed
fn parse_timestamp(date: &str, time: &str) -> Option<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(date.trim(), "%m/%d/%Y").ok()?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M").ok()?;
    Some(date.and_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IncidentType, Severity, SuggestedAction};
    use crate::index::IndexRecord;
    use async_trait::async_trait;

    /// Index double returning canned hits (or an error) regardless of query
    struct StubIndex {
        hits: Vec<SearchHit>,
        fail: bool,
    }

    impl StubIndex {
        fn with_hits(hits: Vec<SearchHit>) -> Arc<Self> {
            Arc::new(Self { hits, fail: false })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                hits: Vec::new(),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl SimilarityIndex for StubIndex {
        async fn search(
            &self,
            _namespace: &str,
            _query: &str,
            _top_k: usize,
        ) -> anyhow::Result<Vec<SearchHit>> {
            if self.fail {
                anyhow::bail!("index unreachable");
            }
            Ok(self.hits.clone())
        }

        async fn upsert(&self, _namespace: &str, _records: &[IndexRecord]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn candidate(description: &str, time: &str) -> CandidateIncident {
        CandidateIncident {
            id: None,
            incident_type: IncidentType::Fire,
            location: "M5H2N2".to_string(),
            date: "1/10/2026".to_string(),
            time: time.to_string(),
            duration: "2 minutes".to_string(),
            message: "there is a fire".to_string(),
            description: description.to_string(),
            suggested_action: SuggestedAction::DispatchFirefighters,
            severity: Severity::Critical,
            transcript: Vec::new(),
        }
    }

    fn hit(description: &str, time: &str, score: f64) -> SearchHit {
        SearchHit {
            record: IndexRecord {
                id: IncidentId::new(),
                description: description.to_string(),
                incident_type: IncidentType::Fire,
                location: "M5H2N2".to_string(),
                date: "1/10/2026".to_string(),
                time: time.to_string(),
            },
            score,
        }
    }

    #[tokio::test]
    async fn test_warehouse_fire_scenario() {
        // Archived: "structure fire at warehouse" at 14:00.
        // Candidate: "fire at the warehouse downtown" at 14:20, score 0.9.
        let index = StubIndex::with_hits(vec![hit("structure fire at warehouse", "14:00", 0.9)]);
        let engine = DedupEngine::new(index, DedupConfig::default());

        let matches = engine
            .find_similar(&candidate("fire at the warehouse downtown", "14:20"))
            .await
            .unwrap();

        assert_eq!(matches.len(), 1);
        assert!(!matches[0].is_exact);
        assert!(matches[0].metadata.time_within_window);
    }

    #[tokio::test]
    async fn test_different_type_never_matches() {
        let mut theft = hit("structure fire at warehouse", "14:00", 0.99);
        theft.record.incident_type = IncidentType::Theft;

        let index = StubIndex::with_hits(vec![theft]);
        let engine = DedupEngine::new(index, DedupConfig::default());

        let matches = engine
            .find_similar(&candidate("structure fire at warehouse", "14:00"))
            .await
            .unwrap();

        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_exact_normalized_match_ignores_low_score() {
        let index = StubIndex::with_hits(vec![hit("Structure  FIRE at warehouse", "14:00", 0.10)]);
        let engine = DedupEngine::new(index, DedupConfig::default());

        let matches = engine
            .find_similar(&candidate("structure fire at warehouse", "14:10"))
            .await
            .unwrap();

        assert_eq!(matches.len(), 1);
        assert!(matches[0].is_exact);
    }

    #[tokio::test]
    async fn test_below_threshold_non_exact_excluded() {
        let index = StubIndex::with_hits(vec![hit("structure fire at warehouse", "14:00", 0.6)]);
        let engine = DedupEngine::new(index, DedupConfig::default());

        let matches = engine
            .find_similar(&candidate("smoke seen near industrial park", "14:05"))
            .await
            .unwrap();

        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_time_outside_window_excluded() {
        let index = StubIndex::with_hits(vec![hit("structure fire at warehouse", "14:00", 0.95)]);
        let engine = DedupEngine::new(index, DedupConfig::default());

        let matches = engine
            .find_similar(&candidate("fire at warehouse building", "15:00"))
            .await
            .unwrap();

        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_time_filter_can_be_disabled() {
        let index = StubIndex::with_hits(vec![hit("structure fire at warehouse", "14:00", 0.95)]);
        let engine = DedupEngine::new(
            index,
            DedupConfig {
                match_time: false,
                ..DedupConfig::default()
            },
        );

        let matches = engine
            .find_similar(&candidate("fire at warehouse building", "19:00"))
            .await
            .unwrap();

        assert_eq!(matches.len(), 1);
        // Breakdown still reports the raw result for the disabled filter
        assert!(!matches[0].metadata.time_within_window);
    }

    #[tokio::test]
    async fn test_unparseable_time_fails_window_check() {
        let index = StubIndex::with_hits(vec![hit("structure fire at warehouse", "around 2pm", 0.95)]);
        let engine = DedupEngine::new(index, DedupConfig::default());

        let matches = engine
            .find_similar(&candidate("fire at warehouse building", "14:00"))
            .await
            .unwrap();

        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_empty_description_is_not_a_duplicate() {
        let index = StubIndex::with_hits(vec![hit("structure fire at warehouse", "14:00", 0.99)]);
        let engine = DedupEngine::new(index, DedupConfig::default());

        let matches = engine.find_similar(&candidate("   ", "14:00")).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_ranking_preserved_exact_flag_does_not_reorder() {
        let exact = hit("fire at warehouse building", "14:00", 0.80);
        let higher = hit("structure fire at warehouse", "14:05", 0.92);

        let index = StubIndex::with_hits(vec![higher, exact]);
        let engine = DedupEngine::new(index, DedupConfig::default());

        let matches = engine
            .find_similar(&candidate("fire at warehouse building", "14:10"))
            .await
            .unwrap();

        assert_eq!(matches.len(), 2);
        // Index order preserved: the non-exact higher-ranked hit stays first
        assert!(!matches[0].is_exact);
        assert!(matches[1].is_exact);
    }

    #[tokio::test]
    async fn test_fail_open_maps_backend_error_to_empty() {
        let engine = DedupEngine::new(StubIndex::failing(), DedupConfig::default());

        let matches = engine
            .check(&candidate("structure fire at warehouse", "14:00"))
            .await
            .unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_fail_closed_propagates_backend_error() {
        let engine = DedupEngine::new(
            StubIndex::failing(),
            DedupConfig {
                fail_open: false,
                ..DedupConfig::default()
            },
        );

        let result = engine.check(&candidate("structure fire at warehouse", "14:00")).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_normalize_description() {
        assert_eq!(
            normalize_description("  Structure   FIRE\tat warehouse "),
            "structure fire at warehouse"
        );
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("1/10/2026", "14:00").is_some());
        assert!(parse_timestamp("01/10/2026", "09:05").is_some());
        assert!(parse_timestamp("2026-01-10", "14:00").is_none());
        assert!(parse_timestamp("1/10/2026", "2pm").is_none());
    }
}
