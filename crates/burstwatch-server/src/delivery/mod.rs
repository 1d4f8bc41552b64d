//! Turns a flushed burst into webhook messages and sends them.

pub mod discord;
pub mod format;

use std::sync::Arc;

use async_trait::async_trait;
use chrono_tz::Tz;
use serde_json::Value;
use tracing::{info, warn};

use burstwatch_core::{
    burst::BurstSnapshot,
    identity::key_digest,
    sink::{DeliveryResult, FlushHandler, NotificationSink, SinkError},
};

pub use discord::DiscordWebhookSink;

pub struct DeliveryAdapter {
    sink: Arc<dyn NotificationSink>,
    debug_max_chars: usize,
    display_tz: Tz,
}

impl DeliveryAdapter {
    pub fn new(sink: Arc<dyn NotificationSink>, debug_max_chars: usize, display_tz: Tz) -> Self {
        Self {
            sink,
            debug_max_chars,
            display_tz,
        }
    }

    /// Summary embed first, then the diagnostic block.
    pub fn payloads(&self, snapshot: &BurstSnapshot) -> Vec<Value> {
        vec![
            format::summary_payload(snapshot, self.display_tz),
            format::debug_payload(snapshot, self.debug_max_chars),
        ]
    }

    /// Send every payload in order.
    ///
    /// A rejected payload triggers exactly one fallback notice and ends the
    /// delivery; transport failures are logged and the next payload is
    /// still attempted. Never returns an error.
    pub async fn deliver(&self, snapshot: &BurstSnapshot) -> DeliveryResult {
        let digest = key_digest(&snapshot.key);
        let mut delivered = 0;

        for payload in self.payloads(snapshot) {
            match self.sink.send(&payload).await {
                Ok(()) => delivered += 1,
                Err(SinkError::Rejected { status }) => {
                    warn!(key_digest = %digest, status, "Sink rejected payload; sending fallback");
                    if let Err(e) = self.sink.send(&format::fallback_payload()).await {
                        warn!(key_digest = %digest, error = %e, "Fallback delivery failed");
                    }
                    return DeliveryResult::FellBack {
                        delivered_before: delivered,
                    };
                }
                Err(e) => {
                    warn!(key_digest = %digest, error = %e, "Payload delivery failed");
                }
            }
        }

        if delivered == 0 {
            DeliveryResult::Failed
        } else {
            DeliveryResult::Delivered {
                payloads: delivered,
            }
        }
    }
}

#[async_trait]
impl FlushHandler for DeliveryAdapter {
    async fn flush(&self, snapshot: BurstSnapshot) {
        let result = self.deliver(&snapshot).await;
        info!(
            key_digest = %key_digest(&snapshot.key),
            count = snapshot.count,
            result = ?result,
            "Burst delivered"
        );
    }
}
