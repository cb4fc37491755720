//! JSONL-backed dispatch queue.
//!
//! Insertions and removals are appended as events; the open set is
//! derived by replay, keyed by incident id. Scores are computed at read
//! time through the configured strategy, so the aging curve can change
//! without rewriting persisted state.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::domain::{Incident, IncidentId, IncidentType, Severity, SuggestedAction};

use super::score::{ScoreStrategy, SeverityDecay};

/// Errors from the queue backend. A write failure is fatal for the
/// current request; there is no silent drop on the write path.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Minimal queue payload for one open incident
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: IncidentId,
    pub incident_type: IncidentType,
    pub location: String,
    pub time: String,
    pub severity: Severity,
    pub suggested_action: SuggestedAction,

    /// When the entry was admitted to the queue
    pub inserted_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn from_incident(incident: &Incident) -> Self {
        Self {
            id: incident.id,
            incident_type: incident.incident_type,
            location: incident.location.clone(),
            time: incident.time.clone(),
            severity: incident.severity,
            suggested_action: incident.suggested_action,
            inserted_at: Utc::now(),
        }
    }
}

/// An event in the queue log (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum QueueEvent {
    Inserted { entry: QueueEntry },
    Removed { id: IncidentId },
}

/// The open-incident queue
pub struct DispatchQueue {
    queue_path: PathBuf,
    strategy: Box<dyn ScoreStrategy>,

    /// Serializes replay-then-append cycles so concurrent removals of
    /// the same id cannot both observe it as present
    write_lock: Mutex<()>,
}

impl DispatchQueue {
    pub fn new(queue_path: PathBuf, strategy: Box<dyn ScoreStrategy>) -> Self {
        Self {
            queue_path,
            strategy,
            write_lock: Mutex::new(()),
        }
    }

    /// Queue with the default severity-decay scoring
    pub fn with_default_strategy(queue_path: PathBuf) -> Self {
        Self::new(queue_path, Box::new(SeverityDecay::default()))
    }

    async fn append_event(&self, event: &QueueEvent) -> Result<(), QueueError> {
        if let Some(parent) = self.queue_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.queue_path)
            .await?;

        let json = serde_json::to_string(event)?;
        file.write_all(format!("{}\n", json).as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }

    /// Replay the event log into the current open set
    async fn replay(&self) -> Result<HashMap<IncidentId, QueueEntry>, QueueError> {
        let mut entries: HashMap<IncidentId, QueueEntry> = HashMap::new();

        if !self.queue_path.exists() {
            return Ok(entries);
        }

        let file = File::open(&self.queue_path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<QueueEvent>(&line)? {
                QueueEvent::Inserted { entry } => {
                    entries.insert(entry.id, entry);
                }
                QueueEvent::Removed { id } => {
                    entries.remove(&id);
                }
            }
        }

        Ok(entries)
    }

    /// Insert an open incident. Re-inserting an id overwrites its entry.
    pub async fn insert(&self, entry: QueueEntry) -> Result<(), QueueError> {
        let _guard = self.write_lock.lock().await;
        self.append_event(&QueueEvent::Inserted { entry }).await
    }

    /// Whether an id is currently on the open queue
    pub async fn contains(&self, id: IncidentId) -> Result<bool, QueueError> {
        Ok(self.replay().await?.contains_key(&id))
    }

    /// All open incidents in ascending score order (most urgent first).
    ///
    /// Ties break on id so repeated listings without mutation return the
    /// same ordered set.
    pub async fn list(&self) -> Result<Vec<QueueEntry>, QueueError> {
        let entries = self.replay().await?;

        let mut ordered: Vec<QueueEntry> = entries.into_values().collect();
        ordered.sort_by(|a, b| {
            self.strategy
                .score(a)
                .cmp(&self.strategy.score(b))
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(ordered)
    }

    /// Remove an incident by identity. Returns the count removed (0 or 1);
    /// zero is a normal not-found outcome, not an error.
    pub async fn remove(&self, id: IncidentId) -> Result<usize, QueueError> {
        let _guard = self.write_lock.lock().await;
        let entries = self.replay().await?;

        if !entries.contains_key(&id) {
            return Ok(0);
        }

        self.append_event(&QueueEvent::Removed { id }).await?;
        Ok(1)
    }

    /// Number of open incidents
    pub async fn len(&self) -> Result<usize, QueueError> {
        Ok(self.replay().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.replay().await?.is_empty())
    }
}
