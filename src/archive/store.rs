//! File-backed archive store.
//!
//! Layout under the archive root:
//! - `records/<id>.json` — full record, point lookup by id
//! - `audit.jsonl` — append-only trail of every write (fast-path
//!   retrieval before the similarity index catches up)
//! - `fingerprints/<hash>` — claim files for atomic insert-if-absent;
//!   each contains the owning incident id

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{Incident, IncidentId, IncidentStatus, StatusError};

use super::validate::{validate_incident, ValidationError};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("incident not found: {0}")]
    NotFound(IncidentId),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Status(#[from] StatusError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt fingerprint claim: {0}")]
    CorruptClaim(String),
}

/// Durable incident archive with a fast-path read cache
pub struct Archive {
    dir: PathBuf,
    require_transcript: bool,
    cache: Mutex<HashMap<IncidentId, Incident>>,
}

impl Archive {
    pub fn new(dir: PathBuf, require_transcript: bool) -> Self {
        Self {
            dir,
            require_transcript,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn record_path(&self, id: IncidentId) -> PathBuf {
        self.dir.join("records").join(format!("{}.json", id))
    }

    fn audit_path(&self) -> PathBuf {
        self.dir.join("audit.jsonl")
    }

    fn fingerprint_path(&self, fingerprint: &str) -> PathBuf {
        self.dir.join("fingerprints").join(fingerprint)
    }

    /// Check a record against the write schema without storing it
    pub fn validate(&self, incident: &Incident) -> Result<(), ArchiveError> {
        validate_incident(incident, self.require_transcript)?;
        Ok(())
    }

    /// Validate and store a full record, indexed for point lookup by id.
    /// Validation failure is a rejected write — the caller must fix the
    /// record; the archive never retries.
    pub async fn put(&self, incident: &Incident) -> Result<(), ArchiveError> {
        self.validate(incident)?;

        let path = self.record_path(incident.id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(incident)?;
        fs::write(&path, json).await?;

        self.append_audit(incident).await?;

        self.cache
            .lock()
            .await
            .insert(incident.id, incident.clone());

        debug!(incident_id = %incident.id, "archived incident");
        Ok(())
    }

    /// Point lookup by id; absent is a normal outcome
    pub async fn get(&self, id: IncidentId) -> Result<Option<Incident>, ArchiveError> {
        if let Some(cached) = self.cache.lock().await.get(&id) {
            return Ok(Some(cached.clone()));
        }

        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let incident: Incident = serde_json::from_str(&content)?;

        self.cache.lock().await.insert(id, incident.clone());
        Ok(Some(incident))
    }

    /// Load the record, check the transition against the lifecycle,
    /// rewrite it, and evict the stale cached copy so subsequent lookups
    /// observe the new status immediately.
    pub async fn update_status(
        &self,
        id: IncidentId,
        new_status: IncidentStatus,
    ) -> Result<Incident, ArchiveError> {
        let mut incident = self.get(id).await?.ok_or(ArchiveError::NotFound(id))?;

        incident.status = incident.status.transition_to(new_status)?;

        let json = serde_json::to_string_pretty(&incident)?;
        fs::write(self.record_path(id), json).await?;
        self.append_audit(&incident).await?;

        self.cache.lock().await.remove(&id);

        debug!(incident_id = %id, status = %new_status, "updated incident status");
        Ok(incident)
    }

    /// Atomically claim a content fingerprint for `id`.
    ///
    /// Returns `None` when the claim is won, or the id of the prior owner
    /// when another incident already holds it. The atomic primitive is
    /// exclusive file creation.
    pub async fn claim_fingerprint(
        &self,
        fingerprint: &str,
        id: IncidentId,
    ) -> Result<Option<IncidentId>, ArchiveError> {
        let path = self.fingerprint_path(fingerprint);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(mut file) => {
                file.write_all(id.to_string().as_bytes()).await?;
                file.flush().await?;
                Ok(None)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let owner = fs::read_to_string(&path).await?;
                let owner = IncidentId::from_str(owner.trim())
                    .map_err(|_| ArchiveError::CorruptClaim(owner))?;
                Ok(Some(owner))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Release a fingerprint claim held by `id`, making the content
    /// claimable again after a failed archive write. A claim owned by a
    /// different incident is left untouched; an absent claim is a no-op.
    pub async fn release_fingerprint(
        &self,
        fingerprint: &str,
        id: IncidentId,
    ) -> Result<(), ArchiveError> {
        let path = self.fingerprint_path(fingerprint);

        let owner = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if owner.trim() == id.to_string() {
            fs::remove_file(&path).await?;
        }

        Ok(())
    }

    async fn append_audit(&self, incident: &Incident) -> Result<(), ArchiveError> {
        let path = self.audit_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let json = serde_json::to_string(incident)?;
        file.write_all(format!("{}\n", json).as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CandidateIncident, IncidentType, Severity, SuggestedAction};
    use tempfile::TempDir;

    fn incident(description: &str) -> Incident {
        Incident::from_candidate(CandidateIncident {
            id: None,
            incident_type: IncidentType::Fire,
            location: "M5H2N2".to_string(),
            date: "1/10/2026".to_string(),
            time: "14:00".to_string(),
            duration: "2 minutes".to_string(),
            message: "warehouse on fire".to_string(),
            description: description.to_string(),
            suggested_action: SuggestedAction::DispatchFirefighters,
            severity: Severity::Critical,
            transcript: Vec::new(),
        })
    }

    #[tokio::test]
    async fn test_put_then_get_round_trips() {
        let temp = TempDir::new().unwrap();
        let archive = Archive::new(temp.path().to_path_buf(), false);

        let record = incident("structure fire at warehouse");
        archive.put(&record).await.unwrap();

        let loaded = archive.get(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.description, record.description);
        assert_eq!(loaded.status, record.status);
        assert_eq!(loaded.severity, record.severity);
    }

    #[tokio::test]
    async fn test_get_unknown_id_is_none() {
        let temp = TempDir::new().unwrap();
        let archive = Archive::new(temp.path().to_path_buf(), false);

        assert!(archive.get(IncidentId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_record_is_a_rejected_write() {
        let temp = TempDir::new().unwrap();
        let archive = Archive::new(temp.path().to_path_buf(), false);

        let mut record = incident("structure fire at warehouse");
        record.date = "not a date".to_string();

        assert!(matches!(
            archive.put(&record).await,
            Err(ArchiveError::Validation(_))
        ));
        assert!(archive.get(record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_update_follows_lifecycle() {
        let temp = TempDir::new().unwrap();
        let archive = Archive::new(temp.path().to_path_buf(), false);

        let record = incident("structure fire at warehouse");
        archive.put(&record).await.unwrap();

        let updated = archive
            .update_status(record.id, IncidentStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(updated.status, IncidentStatus::InProgress);

        // Fresh read observes the new status (stale cache evicted)
        let loaded = archive.get(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, IncidentStatus::InProgress);
    }

    #[tokio::test]
    async fn test_completed_is_terminal() {
        let temp = TempDir::new().unwrap();
        let archive = Archive::new(temp.path().to_path_buf(), false);

        let record = incident("structure fire at warehouse");
        archive.put(&record).await.unwrap();
        archive
            .update_status(record.id, IncidentStatus::InProgress)
            .await
            .unwrap();
        archive
            .update_status(record.id, IncidentStatus::Completed)
            .await
            .unwrap();

        assert!(matches!(
            archive
                .update_status(record.id, IncidentStatus::InProgress)
                .await,
            Err(ArchiveError::Status(_))
        ));
    }

    #[tokio::test]
    async fn test_update_status_unknown_id() {
        let temp = TempDir::new().unwrap();
        let archive = Archive::new(temp.path().to_path_buf(), false);

        assert!(matches!(
            archive
                .update_status(IncidentId::new(), IncidentStatus::InProgress)
                .await,
            Err(ArchiveError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fingerprint_claim_is_first_writer_wins() {
        let temp = TempDir::new().unwrap();
        let archive = Archive::new(temp.path().to_path_buf(), false);

        let first = IncidentId::new();
        let second = IncidentId::new();

        assert_eq!(archive.claim_fingerprint("abc123", first).await.unwrap(), None);
        assert_eq!(
            archive.claim_fingerprint("abc123", second).await.unwrap(),
            Some(first)
        );
    }

    #[tokio::test]
    async fn test_released_fingerprint_is_claimable_again() {
        let temp = TempDir::new().unwrap();
        let archive = Archive::new(temp.path().to_path_buf(), false);

        let first = IncidentId::new();
        let second = IncidentId::new();

        assert_eq!(archive.claim_fingerprint("abc123", first).await.unwrap(), None);
        archive.release_fingerprint("abc123", first).await.unwrap();

        // The content is unclaimed again; a later call wins it outright
        assert_eq!(archive.claim_fingerprint("abc123", second).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_release_by_non_owner_keeps_the_claim() {
        let temp = TempDir::new().unwrap();
        let archive = Archive::new(temp.path().to_path_buf(), false);

        let owner = IncidentId::new();
        let other = IncidentId::new();

        assert_eq!(archive.claim_fingerprint("abc123", owner).await.unwrap(), None);
        archive.release_fingerprint("abc123", other).await.unwrap();

        assert_eq!(
            archive.claim_fingerprint("abc123", other).await.unwrap(),
            Some(owner)
        );
    }

    #[tokio::test]
    async fn test_release_of_absent_claim_is_a_no_op() {
        let temp = TempDir::new().unwrap();
        let archive = Archive::new(temp.path().to_path_buf(), false);

        archive
            .release_fingerprint("missing", IncidentId::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_audit_trail_appends_every_write() {
        let temp = TempDir::new().unwrap();
        let archive = Archive::new(temp.path().to_path_buf(), false);

        let record = incident("structure fire at warehouse");
        archive.put(&record).await.unwrap();
        archive
            .update_status(record.id, IncidentStatus::InProgress)
            .await
            .unwrap();

        let audit = std::fs::read_to_string(temp.path().join("audit.jsonl")).unwrap();
        let lines: Vec<&str> = audit.lines().collect();
        assert_eq!(lines.len(), 2);

        let last: Incident = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(last.status, IncidentStatus::InProgress);
    }
}
