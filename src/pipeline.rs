//! The triage pipeline: one sequential chain per incoming call.
//!
//! candidate → dedup check → (duplicate: discard with a reference)
//! → validate → fingerprint claim → archive write → index upsert
//! → queue insert.
//!
//! Dedup reads follow the configured failure policy (fail-open by
//! default); archive and queue writes are fatal for the request — no
//! silent drop on the write path. A fingerprint claim only outlives the
//! request when the archive write it guards succeeded, so a rejected or
//! failed write never blocks a corrected resubmission.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::archive::{Archive, ArchiveError, ValidationError};
use crate::config::ResolvedConfig;
use crate::dedup::{incident_fingerprint, DedupEngine, SimilarIncident};
use crate::domain::{CandidateIncident, Incident, IncidentId, IncidentStatus};
use crate::index::{HttpIndex, IndexRecord, LexicalIndex, SimilarityIndex};
use crate::queue::{DispatchQueue, QueueError, SeverityDecay};

/// Errors surfaced by pipeline operations, split along the §7 taxonomy:
/// client-fixable schema errors, normal not-found outcomes, and fatal
/// backend failures.
#[derive(Debug, Error)]
pub enum TriageError {
    #[error("invalid incident record: {0}")]
    Schema(#[from] ValidationError),

    #[error("incident not found: {0}")]
    NotFound(IncidentId),

    #[error(transparent)]
    Status(#[from] crate::domain::StatusError),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<ArchiveError> for TriageError {
    fn from(e: ArchiveError) -> Self {
        match e {
            ArchiveError::Validation(v) => TriageError::Schema(v),
            ArchiveError::NotFound(id) => TriageError::NotFound(id),
            ArchiveError::Status(s) => TriageError::Status(s),
            other => TriageError::Backend(other.into()),
        }
    }
}

impl From<QueueError> for TriageError {
    fn from(e: QueueError) -> Self {
        TriageError::Backend(e.into())
    }
}

/// Result of one pipeline run. Duplicate detection is a normal,
/// successful outcome, never an error.
#[derive(Debug, serde::Serialize)]
pub struct TriageOutcome {
    pub incident: Incident,
    pub enqueued: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<IncidentId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub similar: Vec<SimilarIncident>,
}

/// Result of resolving an open incident
#[derive(Debug, serde::Serialize)]
pub struct ResolveOutcome {
    pub incident: Incident,

    /// Queue entries removed (0 when the incident was archived but no
    /// longer on the open queue)
    pub removed: usize,
}

/// The triage service: owns the dedup engine, the open queue, and the
/// archive, and coordinates them per request.
pub struct Triage {
    dedup: DedupEngine,
    queue: DispatchQueue,
    archive: Archive,
    index: Arc<dyn SimilarityIndex>,
}

impl Triage {
    pub fn new(
        index: Arc<dyn SimilarityIndex>,
        dedup: DedupEngine,
        queue: DispatchQueue,
        archive: Archive,
    ) -> Self {
        Self {
            dedup,
            queue,
            archive,
            index,
        }
    }

    /// Build the service from resolved configuration
    pub fn from_config(config: &ResolvedConfig) -> anyhow::Result<Self> {
        let index: Arc<dyn SimilarityIndex> = match &config.index {
            crate::config::IndexSettings::Memory => {
                Arc::new(LexicalIndex::new(config.home.join("index")))
            }
            crate::config::IndexSettings::Http(http) => Arc::new(HttpIndex::new(http.clone())?),
        };

        let dedup = DedupEngine::new(Arc::clone(&index), config.dedup.clone());
        let queue = DispatchQueue::new(
            config.home.join("queue.jsonl"),
            Box::new(SeverityDecay {
                seconds_per_level: config.queue_decay_seconds,
            }),
        );
        let archive = Archive::new(config.home.join("archive"), config.require_transcript);

        Ok(Self::new(index, dedup, queue, archive))
    }

    /// Run the full triage pipeline for one candidate incident.
    #[instrument(skip(self, candidate), fields(incident_type = %candidate.incident_type))]
    pub async fn process(&self, candidate: CandidateIncident) -> Result<TriageOutcome, TriageError> {
        let similar = self.dedup.check(&candidate).await?;

        if let Some(top) = similar.first() {
            let duplicate_of = top.id;
            info!(
                %duplicate_of,
                score = top.score,
                exact = top.is_exact,
                "duplicate incident, not enqueueing"
            );

            self.requeue_if_missing(duplicate_of).await?;

            return Ok(TriageOutcome {
                incident: Incident::from_candidate(candidate),
                enqueued: false,
                duplicate_of: Some(duplicate_of),
                similar,
            });
        }

        let mut incident = Incident::from_candidate(candidate);

        // Schema errors are client-fixable; reject before the claim so a
        // corrected resubmission still finds its content unclaimed.
        self.archive.validate(&incident)?;

        // Safety net for the check-then-archive race: two pipelines can
        // both pass the semantic check, but only one wins this claim.
        let fingerprint = incident_fingerprint(&incident);
        if let Some(owner) = self
            .archive
            .claim_fingerprint(&fingerprint, incident.id)
            .await?
        {
            info!(duplicate_of = %owner, "lost fingerprint claim, treating as duplicate");
            self.requeue_if_missing(owner).await?;
            return Ok(TriageOutcome {
                incident,
                enqueued: false,
                duplicate_of: Some(owner),
                similar: Vec::new(),
            });
        }

        incident.status = incident.status.transition_to(IncidentStatus::InProgress)?;

        if let Err(e) = self.archive.put(&incident).await {
            // The claim must not outlive the write it guards, or a retry
            // of this call would be dropped as a duplicate of a record
            // that was never archived
            if let Err(release) = self
                .archive
                .release_fingerprint(&fingerprint, incident.id)
                .await
            {
                warn!(error = %release, incident_id = %incident.id, "failed to release fingerprint claim");
            }
            return Err(e.into());
        }

        // The archive is the dedup universe: make the record findable for
        // future checks. An upsert failure follows the dedup failure
        // policy — the call itself is already safely archived.
        let record = IndexRecord::from_incident(&incident);
        if let Err(e) = self
            .index
            .upsert(&self.dedup.config().namespace, &[record])
            .await
        {
            if self.dedup.config().fail_open {
                warn!(error = %e, incident_id = %incident.id, "index upsert failed");
            } else {
                return Err(TriageError::Backend(e));
            }
        }

        self.queue
            .insert(crate::queue::QueueEntry::from_incident(&incident))
            .await?;

        info!(incident_id = %incident.id, severity = %incident.severity, "incident enqueued");

        Ok(TriageOutcome {
            incident,
            enqueued: true,
            duplicate_of: None,
            similar: Vec::new(),
        })
    }

    /// A duplicate report is only safe when its target is dispatchable.
    /// If an earlier run archived the record but failed before the queue
    /// insert, every retry of that call dedups against it, so put it on
    /// the open queue now. Records in any other status never belong on
    /// the queue (seeded history, resolved incidents).
    async fn requeue_if_missing(&self, id: IncidentId) -> Result<(), TriageError> {
        let Some(target) = self.archive.get(id).await? else {
            return Ok(());
        };

        if target.status != IncidentStatus::InProgress || self.queue.contains(id).await? {
            return Ok(());
        }

        warn!(incident_id = %id, "open incident missing from queue, re-enqueueing");
        self.queue
            .insert(crate::queue::QueueEntry::from_incident(&target))
            .await?;

        Ok(())
    }

    /// Current open queue, most urgent first
    pub async fn open_queue(&self) -> Result<Vec<crate::queue::QueueEntry>, TriageError> {
        Ok(self.queue.list().await?)
    }

    /// Point lookup of an archived incident
    pub async fn incident(&self, id: IncidentId) -> Result<Option<Incident>, TriageError> {
        Ok(self.archive.get(id).await?)
    }

    /// Mark an incident completed and remove it from the open queue
    #[instrument(skip(self))]
    pub async fn resolve(&self, id: IncidentId) -> Result<ResolveOutcome, TriageError> {
        let incident = self
            .archive
            .update_status(id, IncidentStatus::Completed)
            .await?;

        let removed = self.queue.remove(id).await?;
        info!(incident_id = %id, removed, "incident resolved");

        Ok(ResolveOutcome { incident, removed })
    }

    /// Bulk-load already-triaged incidents into the archive and index
    /// (seeding a fresh deployment from an export).
    pub async fn seed(&self, incidents: Vec<Incident>) -> Result<usize, TriageError> {
        let mut records = Vec::with_capacity(incidents.len());

        for incident in &incidents {
            self.archive.put(incident).await?;
            records.push(IndexRecord::from_incident(incident));
        }

        self.index
            .upsert(&self.dedup.config().namespace, &records)
            .await
            .map_err(TriageError::Backend)?;

        Ok(records.len())
    }
}
