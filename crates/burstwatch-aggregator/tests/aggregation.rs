use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::time::{sleep, Instant};

use burstwatch_aggregator::{
    AggregationStore, IngestOutcome, Scheduler, TimerKey, TimerTask, TokioScheduler,
};
use burstwatch_core::{
    burst::BurstSnapshot,
    config::{AggregationSettings, CountMode},
    event::{ClientSignals, Event, Geo, IdentitySeed},
    scoring::{evaluate, ScoreResult},
    sink::FlushHandler,
};

#[derive(Default)]
struct RecordingHandler {
    flushes: StdMutex<Vec<(Instant, BurstSnapshot)>>,
}

impl RecordingHandler {
    fn flushes(&self) -> Vec<(Instant, BurstSnapshot)> {
        self.flushes.lock().expect("lock flushes").clone()
    }
}

#[async_trait]
impl FlushHandler for RecordingHandler {
    async fn flush(&self, snapshot: BurstSnapshot) {
        self.flushes
            .lock()
            .expect("lock flushes")
            .push((Instant::now(), snapshot));
    }
}

/// Scheduler that never runs anything on its own and ignores cancellation,
/// so tests can replay timers that lost a cancellation race.
#[derive(Default)]
struct ManualScheduler {
    tasks: StdMutex<Vec<(TimerKey, TimerTask)>>,
}

impl ManualScheduler {
    fn take(&self) -> Vec<(TimerKey, TimerTask)> {
        std::mem::take(&mut *self.tasks.lock().expect("lock tasks"))
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_once(&self, key: TimerKey, _delay: Duration, task: TimerTask) {
        self.tasks.lock().expect("lock tasks").push((key, task));
    }

    fn cancel(&self, _key: &TimerKey) {}
}

fn settings(window_ms: u64, hold_ms: u64, count_mode: CountMode) -> AggregationSettings {
    AggregationSettings {
        window: Duration::from_millis(window_ms),
        hold: Duration::from_millis(hold_ms),
        count_mode,
    }
}

fn event(ip: &str, path: &str, language: &str) -> Event {
    Event {
        identity: IdentitySeed {
            ip: ip.to_string(),
            device: "PC".to_string(),
            browser: "Chrome".to_string(),
            path: path.to_string(),
            fp_hash: Some("fp".to_string()),
            click_id: None,
        },
        received_at: Utc::now(),
        geo: Geo {
            country_code: "US".to_string(),
            ..Geo::default()
        },
        signals: ClientSignals {
            language: language.to_string(),
            ..ClientSignals::default()
        },
        user_agent: "Mozilla/5.0 Chrome/120".to_string(),
        raw_headers: json!({}),
        raw_body: json!({}),
    }
}

fn score_of(event: &Event) -> ScoreResult {
    evaluate(&event.geo, &event.signals, "")
}

async fn ingest(store: &AggregationStore, event: Event) -> IngestOutcome {
    let score = score_of(&event);
    store.ingest(event, score).await
}

fn tokio_store(
    settings: AggregationSettings,
) -> (Arc<AggregationStore>, Arc<RecordingHandler>) {
    let handler = Arc::new(RecordingHandler::default());
    let store = AggregationStore::new(
        settings,
        Arc::new(TokioScheduler::new()),
        handler.clone(),
    );
    (store, handler)
}

#[tokio::test(start_paused = true)]
async fn three_events_500ms_apart_flush_once_after_the_last() {
    let (store, handler) = tokio_store(settings(3_000, 12_000, CountMode::Accumulate));
    let start = Instant::now();

    assert_eq!(ingest(&store, event("1.2.3.4", "/", "en")).await, IngestOutcome::Created);
    sleep(Duration::from_millis(500)).await;
    assert_eq!(
        ingest(&store, event("1.2.3.4", "/", "en")).await,
        IngestOutcome::Merged { count: 2 }
    );
    sleep(Duration::from_millis(500)).await;
    assert_eq!(
        ingest(&store, event("1.2.3.4", "/", "en")).await,
        IngestOutcome::Merged { count: 3 }
    );
    assert_eq!(store.len().await, 1);
    let key = event("1.2.3.4", "/", "en").identity.key();
    assert_eq!(store.count_for(&key).await, Some(3));

    sleep(Duration::from_millis(2_900)).await;
    assert!(handler.flushes().is_empty(), "window restarts on every merge");

    sleep(Duration::from_millis(200)).await;
    let flushes = handler.flushes();
    assert_eq!(flushes.len(), 1);
    let (fired_at, snapshot) = &flushes[0];
    assert_eq!(snapshot.count, 3);
    let elapsed = fired_at.duration_since(start);
    assert!(
        elapsed >= Duration::from_millis(4_000) && elapsed < Duration::from_millis(4_100),
        "flush fired {elapsed:?} after the first event"
    );

    // Held, not yet evicted.
    assert_eq!(store.len().await, 1);
}

#[tokio::test(start_paused = true)]
async fn latest_event_overwrites_earlier_ones() {
    let (store, handler) = tokio_store(settings(1_000, 5_000, CountMode::Accumulate));

    ingest(&store, event("1.2.3.4", "/", "en-US")).await;
    ingest(&store, event("1.2.3.4", "/", "de-DE")).await;
    sleep(Duration::from_millis(1_100)).await;

    let flushes = handler.flushes();
    assert_eq!(flushes.len(), 1);
    let snapshot = &flushes[0].1;
    assert_eq!(snapshot.latest_event.signals.language, "de-DE");
    assert_eq!(snapshot.latest_score.reasons, vec!["Non-EN language in US".to_string()]);
    assert!(snapshot.first_seen_at <= snapshot.last_seen_at);
}

#[tokio::test(start_paused = true)]
async fn different_keys_flush_independently() {
    let (store, handler) = tokio_store(settings(1_000, 5_000, CountMode::Accumulate));

    ingest(&store, event("1.2.3.4", "/", "en")).await;
    ingest(&store, event("1.2.3.4", "/about", "en")).await;
    ingest(&store, event("5.6.7.8", "/", "en")).await;
    assert_eq!(store.len().await, 3);

    sleep(Duration::from_millis(1_100)).await;
    let flushes = handler.flushes();
    assert_eq!(flushes.len(), 3);
    assert!(flushes.iter().all(|(_, s)| s.count == 1));
}

#[tokio::test(start_paused = true)]
async fn events_after_window_and_hold_start_a_new_burst() {
    let (store, handler) = tokio_store(settings(3_000, 12_000, CountMode::Accumulate));

    ingest(&store, event("1.2.3.4", "/", "en")).await;
    // flush at 3s, eviction at 15s
    sleep(Duration::from_millis(16_000)).await;
    assert!(store.is_empty().await);

    assert_eq!(ingest(&store, event("1.2.3.4", "/", "en")).await, IngestOutcome::Created);
    sleep(Duration::from_millis(3_100)).await;

    let flushes = handler.flushes();
    assert_eq!(flushes.len(), 2);
    assert_eq!(flushes[0].1.count, 1);
    assert_eq!(flushes[1].1.count, 1);
}

#[tokio::test(start_paused = true)]
async fn count_accumulates_through_the_hold_period() {
    let (store, handler) = tokio_store(settings(1_000, 10_000, CountMode::Accumulate));

    ingest(&store, event("1.2.3.4", "/", "en")).await;
    ingest(&store, event("1.2.3.4", "/", "en")).await;
    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(handler.flushes().len(), 1);

    assert_eq!(
        ingest(&store, event("1.2.3.4", "/", "en")).await,
        IngestOutcome::Merged { count: 3 }
    );
    sleep(Duration::from_millis(1_100)).await;

    let flushes = handler.flushes();
    assert_eq!(flushes.len(), 2);
    assert_eq!(flushes[1].1.count, 3);
    assert_eq!(flushes[0].1.first_seen_at, flushes[1].1.first_seen_at);
}

#[tokio::test(start_paused = true)]
async fn reset_mode_starts_a_fresh_tally_after_flush() {
    let (store, handler) = tokio_store(settings(1_000, 10_000, CountMode::Reset));

    ingest(&store, event("1.2.3.4", "/", "en")).await;
    ingest(&store, event("1.2.3.4", "/", "en")).await;
    sleep(Duration::from_millis(1_500)).await;

    assert_eq!(
        ingest(&store, event("1.2.3.4", "/", "en")).await,
        IngestOutcome::Merged { count: 1 }
    );
    assert_eq!(
        ingest(&store, event("1.2.3.4", "/", "en")).await,
        IngestOutcome::Merged { count: 2 }
    );
    sleep(Duration::from_millis(1_100)).await;

    let flushes = handler.flushes();
    assert_eq!(flushes.len(), 2);
    assert_eq!(flushes[0].1.count, 2);
    assert_eq!(flushes[1].1.count, 2);
}

#[tokio::test(start_paused = true)]
async fn flush_for_an_evicted_burst_is_a_no_op() {
    let (store, handler) = tokio_store(settings(3_000, 5_000, CountMode::Accumulate));

    ingest(&store, event("1.2.3.4", "/", "en")).await;
    // flush at 3s schedules eviction at 8s
    sleep(Duration::from_millis(6_000)).await;
    assert_eq!(handler.flushes().len(), 1);

    // re-armed flush would fire at 9s, after the eviction
    ingest(&store, event("1.2.3.4", "/", "en")).await;
    sleep(Duration::from_millis(4_000)).await;

    assert_eq!(handler.flushes().len(), 1);
    assert!(store.is_empty().await);

    assert_eq!(ingest(&store, event("1.2.3.4", "/", "en")).await, IngestOutcome::Created);
}

#[tokio::test]
async fn superseded_timer_never_flushes_twice() {
    let handler = Arc::new(RecordingHandler::default());
    let scheduler = Arc::new(ManualScheduler::default());
    let store = AggregationStore::new(
        settings(1_000, 5_000, CountMode::Accumulate),
        scheduler.clone(),
        handler.clone(),
    );

    ingest(&store, event("1.2.3.4", "/", "en")).await;
    ingest(&store, event("1.2.3.4", "/", "en")).await;

    // Both flush timers "elapse", the stale one first.
    let timers = scheduler.take();
    assert_eq!(timers.len(), 2);
    for (key, task) in timers {
        assert!(matches!(key, TimerKey::Flush(_)));
        task.await;
    }

    let flushes = handler.flushes();
    assert_eq!(flushes.len(), 1);
    assert_eq!(flushes[0].1.count, 2);

    // The flush armed exactly one eviction.
    let timers = scheduler.take();
    assert_eq!(timers.len(), 1);
    assert!(matches!(timers[0].0, TimerKey::Evict(_)));
}

#[tokio::test(start_paused = true)]
async fn concurrent_ingests_for_one_key_create_one_burst() {
    let (store, handler) = tokio_store(settings(1_000, 5_000, CountMode::Accumulate));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { ingest(&store, event("1.2.3.4", "/", "en")).await })
        })
        .collect();
    let mut created = 0;
    for task in tasks {
        if task.await.expect("ingest task") == IngestOutcome::Created {
            created += 1;
        }
    }
    assert_eq!(created, 1);
    assert_eq!(store.len().await, 1);

    sleep(Duration::from_millis(1_100)).await;
    let flushes = handler.flushes();
    assert_eq!(flushes.len(), 1);
    assert_eq!(flushes[0].1.count, 16);
}

#[tokio::test(start_paused = true)]
async fn drain_flushes_armed_bursts_immediately() {
    let (store, handler) = tokio_store(settings(3_000, 5_000, CountMode::Accumulate));

    ingest(&store, event("1.2.3.4", "/", "en")).await;
    ingest(&store, event("5.6.7.8", "/", "en")).await;

    assert_eq!(store.drain().await, 2);
    assert_eq!(handler.flushes().len(), 2);

    // Nothing left to drain, and the cancelled timers stay quiet.
    assert_eq!(store.drain().await, 0);
    sleep(Duration::from_millis(4_000)).await;
    assert_eq!(handler.flushes().len(), 2);
}
