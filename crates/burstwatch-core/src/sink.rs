use std::net::IpAddr;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::burst::BurstSnapshot;

#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink answered with a non-success status (typically a size limit).
    #[error("sink rejected payload with status {status}")]
    Rejected { status: u16 },

    #[error("sink transport failure: {0}")]
    Transport(String),

    #[error("invalid sink target: {0}")]
    InvalidTarget(String),
}

/// Chat-webhook style destination for formatted notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn send(&self, payload: &Value) -> Result<(), SinkError>;
}

/// PTR lookup. Implementations return `None` on any failure; callers impose
/// their own deadline on top.
#[async_trait]
pub trait ReverseDnsResolver: Send + Sync + 'static {
    async fn reverse(&self, ip: IpAddr) -> Option<String>;
}

/// Resolver used when reverse lookups are disabled.
pub struct NullReverseDns;

#[async_trait]
impl ReverseDnsResolver for NullReverseDns {
    async fn reverse(&self, _ip: IpAddr) -> Option<String> {
        None
    }
}

/// Receives each burst once its quiet period has elapsed.
#[async_trait]
pub trait FlushHandler: Send + Sync + 'static {
    async fn flush(&self, snapshot: BurstSnapshot);
}

/// Outcome of delivering one flushed burst.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    /// Every payload was accepted (transport errors on individual payloads
    /// are logged and skipped).
    Delivered { payloads: usize },
    /// A payload was rejected; the minimal fallback was attempted and the
    /// remaining payloads were dropped.
    FellBack { delivered_before: usize },
    /// Nothing reached the sink.
    Failed,
}
