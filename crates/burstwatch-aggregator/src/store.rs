use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use burstwatch_core::{
    burst::BurstSnapshot,
    config::{AggregationSettings, CountMode},
    event::Event,
    identity::key_digest,
    scoring::ScoreResult,
    sink::FlushHandler,
};

use crate::scheduler::{Scheduler, TimerKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// A flush timer is pending.
    Armed,
    /// Flushed; waiting for eviction unless another event re-arms it.
    Held,
}

struct Burst {
    /// Identifies this incarnation of the key, so a stale eviction timer
    /// cannot remove a burst created after it was scheduled.
    epoch: u64,
    /// Bumped on every (re)arm; a flush timer only acts on its own generation.
    generation: u64,
    phase: Phase,
    count: u64,
    first_seen_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
    latest_event: Event,
    latest_score: ScoreResult,
}

impl Burst {
    fn snapshot(&self, key: &str) -> BurstSnapshot {
        BurstSnapshot {
            key: key.to_string(),
            count: self.count,
            first_seen_at: self.first_seen_at,
            last_seen_at: self.last_seen_at,
            latest_event: self.latest_event.clone(),
            latest_score: self.latest_score.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Created,
    Merged { count: u64 },
}

/// Process-wide map from identity key to in-flight burst.
///
/// Every read-check-write on the map, including timer re-arming, happens
/// under one async mutex. Flushes copy the burst under that lock and release
/// it before the [`FlushHandler`] runs, so a slow sink never blocks ingest.
pub struct AggregationStore {
    bursts: Mutex<HashMap<String, Burst>>,
    scheduler: Arc<dyn Scheduler>,
    handler: Arc<dyn FlushHandler>,
    settings: AggregationSettings,
    next_epoch: AtomicU64,
    me: Weak<AggregationStore>,
}

impl AggregationStore {
    pub fn new(
        settings: AggregationSettings,
        scheduler: Arc<dyn Scheduler>,
        handler: Arc<dyn FlushHandler>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            bursts: Mutex::new(HashMap::new()),
            scheduler,
            handler,
            settings,
            next_epoch: AtomicU64::new(0),
            me: me.clone(),
        })
    }

    pub fn settings(&self) -> &AggregationSettings {
        &self.settings
    }

    /// Merge `event` into the burst for its identity key, creating the burst
    /// if none exists, and push the flush back by a full window.
    pub async fn ingest(&self, event: Event, score: ScoreResult) -> IngestOutcome {
        let key = event.identity.key();
        let now = event.received_at;
        let mut bursts = self.bursts.lock().await;

        let outcome = match bursts.get_mut(&key) {
            Some(burst) => {
                if burst.phase == Phase::Held && self.settings.count_mode == CountMode::Reset {
                    burst.count = 1;
                    burst.first_seen_at = now;
                } else {
                    burst.count += 1;
                }
                burst.last_seen_at = now;
                burst.latest_event = event;
                burst.latest_score = score;
                self.arm_flush(&key, burst);
                IngestOutcome::Merged { count: burst.count }
            }
            None => {
                let mut burst = Burst {
                    epoch: self.next_epoch.fetch_add(1, Ordering::Relaxed),
                    generation: 0,
                    phase: Phase::Armed,
                    count: 1,
                    first_seen_at: now,
                    last_seen_at: now,
                    latest_event: event,
                    latest_score: score,
                };
                self.arm_flush(&key, &mut burst);
                bursts.insert(key.clone(), burst);
                IngestOutcome::Created
            }
        };

        debug!(key_digest = %key_digest(&key), outcome = ?outcome, "event ingested");
        outcome
    }

    /// Number of bursts currently held in the store, armed or not.
    pub async fn len(&self) -> usize {
        self.bursts.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bursts.lock().await.is_empty()
    }

    /// Current count for `key`, if a burst exists.
    pub async fn count_for(&self, key: &str) -> Option<u64> {
        self.bursts.lock().await.get(key).map(|b| b.count)
    }

    /// Flush every armed burst right away. Called on graceful shutdown;
    /// returns how many bursts were handed to the flush handler.
    pub async fn drain(&self) -> usize {
        let snapshots: Vec<BurstSnapshot> = {
            let mut bursts = self.bursts.lock().await;
            bursts
                .iter_mut()
                .filter(|(_, burst)| burst.phase == Phase::Armed)
                .map(|(key, burst)| {
                    self.scheduler.cancel(&TimerKey::Flush(key.clone()));
                    burst.generation += 1;
                    burst.phase = Phase::Held;
                    self.arm_eviction(key, burst.epoch);
                    burst.snapshot(key)
                })
                .collect()
        };

        let drained = snapshots.len();
        for snapshot in snapshots {
            self.handler.flush(snapshot).await;
        }
        if drained > 0 {
            info!(count = drained, "Drained pending bursts");
        }
        drained
    }

    fn arm_flush(&self, key: &str, burst: &mut Burst) {
        burst.generation += 1;
        burst.phase = Phase::Armed;

        let store = self.me.clone();
        let owned_key = key.to_string();
        let generation = burst.generation;
        self.scheduler.schedule_once(
            TimerKey::Flush(key.to_string()),
            self.settings.window,
            Box::pin(async move {
                if let Some(store) = store.upgrade() {
                    store.fire_flush(owned_key, generation).await;
                }
            }),
        );
    }

    fn arm_eviction(&self, key: &str, epoch: u64) {
        let store = self.me.clone();
        let owned_key = key.to_string();
        self.scheduler.schedule_once(
            TimerKey::Evict(key.to_string()),
            self.settings.hold,
            Box::pin(async move {
                if let Some(store) = store.upgrade() {
                    store.evict(owned_key, epoch).await;
                }
            }),
        );
    }

    async fn fire_flush(&self, key: String, generation: u64) {
        let snapshot = {
            let mut bursts = self.bursts.lock().await;
            let Some(burst) = bursts.get_mut(&key) else {
                debug!(key_digest = %key_digest(&key), "Flush timer fired for evicted burst");
                return;
            };
            if burst.generation != generation || burst.phase != Phase::Armed {
                debug!(key_digest = %key_digest(&key), "Superseded flush timer ignored");
                return;
            }
            burst.phase = Phase::Held;
            self.arm_eviction(&key, burst.epoch);
            burst.snapshot(&key)
        };

        info!(
            key_digest = %key_digest(&key),
            count = snapshot.count,
            score = snapshot.latest_score.score,
            "Burst flushed"
        );
        self.handler.flush(snapshot).await;
    }

    async fn evict(&self, key: String, epoch: u64) {
        let mut bursts = self.bursts.lock().await;
        if !bursts.get(&key).is_some_and(|b| b.epoch == epoch) {
            return;
        }
        if let Some(burst) = bursts.remove(&key) {
            if burst.phase == Phase::Armed {
                // The pending flush will find nothing and do nothing.
                debug!(
                    key_digest = %key_digest(&key),
                    count = burst.count,
                    "Evicted burst with a pending flush"
                );
            } else {
                debug!(key_digest = %key_digest(&key), "Burst evicted");
            }
        }
    }
}
