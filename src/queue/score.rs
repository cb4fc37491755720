//! Priority scoring strategies.
//!
//! The default is a heuristic, not a provably optimal priority function;
//! it is behind a trait so alternative aging curves can be substituted
//! without touching queue mechanics.

use super::store::QueueEntry;

/// Maps a queue entry to its sortable priority score. Lower = served first.
pub trait ScoreStrategy: Send + Sync {
    fn score(&self, entry: &QueueEntry) -> i64;
}

/// `score = inserted_at − severity × seconds_per_level`.
///
/// Each severity point subtracts 30 minutes of effective age by default:
/// a fresh severity-3 incident outranks a severity-1 incident that arrived
/// up to 90 minutes earlier, but an old enough severity-1 incident
/// eventually outranks a brand-new severity-3 one.
#[derive(Debug, Clone)]
pub struct SeverityDecay {
    pub seconds_per_level: i64,
}

impl Default for SeverityDecay {
    fn default() -> Self {
        Self {
            seconds_per_level: 1800,
        }
    }
}

impl ScoreStrategy for SeverityDecay {
    fn score(&self, entry: &QueueEntry) -> i64 {
        entry.inserted_at.timestamp() - i64::from(entry.severity.level()) * self.seconds_per_level
    }
}
