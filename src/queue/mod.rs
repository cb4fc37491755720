//! Priority queue of open incidents.
//!
//! Append-only JSONL event log with state derived from replay, keyed by
//! incident id. Ordering is the only contract: ascending priority score,
//! where the score blends urgency with recency decay so no severity class
//! can starve another indefinitely.

mod score;
mod store;

pub use score::{ScoreStrategy, SeverityDecay};
pub use store::{DispatchQueue, QueueEntry, QueueError};
