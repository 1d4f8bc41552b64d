use chrono::{DateTime, Utc};

use crate::{event::Event, scoring::ScoreResult};

/// Frozen copy of a burst at the moment its flush timer fired.
///
/// Only the latest merged event is carried; earlier events of the burst
/// are represented by `count` and `first_seen_at` alone.
#[derive(Debug, Clone)]
pub struct BurstSnapshot {
    pub key: String,
    pub count: u64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub latest_event: Event,
    pub latest_score: ScoreResult,
}
