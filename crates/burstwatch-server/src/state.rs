use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use burstwatch_aggregator::{AggregationStore, Scheduler};
use burstwatch_core::{
    burst::BurstSnapshot,
    identity::key_digest,
    sink::{FlushHandler, NotificationSink, ReverseDnsResolver},
};

use crate::{config::Config, delivery::DeliveryAdapter, geo::GeoIpDb, rdns::ScoringEngine};

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
pub struct AppState {
    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,

    /// Burst map plus its flush/evict timers. Flushes are delivered through
    /// a [`DeliveryAdapter`] wrapping `sink`.
    pub store: Arc<AggregationStore>,

    pub scoring: ScoringEngine,

    /// `None` when no webhook URL is configured; beacon routes then answer
    /// `500 sink_not_configured`.
    pub sink: Option<Arc<dyn NotificationSink>>,

    /// Optional MaxMind fallback for requests without edge geo headers.
    pub geoip: Option<GeoIpDb>,
}

impl AppState {
    pub fn new(
        config: Config,
        sink: Option<Arc<dyn NotificationSink>>,
        resolver: Arc<dyn ReverseDnsResolver>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let handler: Arc<dyn FlushHandler> = match &sink {
            Some(sink) => Arc::new(DeliveryAdapter::new(
                Arc::clone(sink),
                config.debug_max_chars,
                config.display_timezone,
            )),
            None => Arc::new(Undeliverable),
        };
        let store = AggregationStore::new(config.aggregation_settings(), scheduler, handler);
        let scoring = ScoringEngine::new(resolver, config.rdns_timeout());
        let geoip = GeoIpDb::open(&config.geoip_path);

        Self {
            config: Arc::new(config),
            store,
            scoring,
            sink,
            geoip,
        }
    }

    pub fn sink_configured(&self) -> bool {
        self.sink.is_some()
    }
}

/// Flush target when no sink exists. Unreachable in practice because the
/// beacon routes refuse events before ingest in that case.
struct Undeliverable;

#[async_trait]
impl FlushHandler for Undeliverable {
    async fn flush(&self, snapshot: BurstSnapshot) {
        warn!(
            key_digest = %key_digest(&snapshot.key),
            count = snapshot.count,
            "Burst dropped: no notification sink configured"
        );
    }
}
