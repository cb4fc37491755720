//! Incident status lifecycle.
//!
//! Transitions are monotonic: `called` → `in progress` → `completed`.
//! `completed` is terminal. Invalid transitions are a validation error,
//! never a silent overwrite.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a status transition violates the lifecycle
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid status transition: {from} → {to}")]
pub struct StatusError {
    pub from: IncidentStatus,
    pub to: IncidentStatus,
}

/// Lifecycle state of an incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentStatus {
    /// Call received, not yet admitted to the queue
    #[serde(rename = "called")]
    Called,

    /// Admitted to the open queue, awaiting dispatch
    #[serde(rename = "in progress")]
    InProgress,

    /// Resolved; removed from the open queue (terminal)
    #[serde(rename = "completed")]
    Completed,
}

impl IncidentStatus {
    /// Static transition table for the lifecycle
    const TRANSITIONS: &'static [(IncidentStatus, IncidentStatus)] = &[
        (IncidentStatus::Called, IncidentStatus::InProgress),
        (IncidentStatus::InProgress, IncidentStatus::Completed),
    ];

    /// Check whether moving to `next` is a valid forward transition
    pub fn can_transition_to(self, next: IncidentStatus) -> bool {
        Self::TRANSITIONS.contains(&(self, next))
    }

    /// Validate a transition, returning the would-be transition on failure
    pub fn transition_to(self, next: IncidentStatus) -> Result<IncidentStatus, StatusError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(StatusError {
                from: self,
                to: next,
            })
        }
    }

    /// Whether this status is terminal
    pub fn is_terminal(self) -> bool {
        matches!(self, IncidentStatus::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IncidentStatus::Called => "called",
            IncidentStatus::InProgress => "in progress",
            IncidentStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
