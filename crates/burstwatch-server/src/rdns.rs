use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use burstwatch_core::{
    event::Event,
    scoring::{self, ScoreResult},
    sink::ReverseDnsResolver,
};

/// PTR lookup through the system resolver.
///
/// `dns_lookup::lookup_addr` blocks, so it runs on the blocking pool. A
/// "hostname" that parses back as an IP means no PTR record existed.
pub struct SystemReverseDns;

#[async_trait]
impl ReverseDnsResolver for SystemReverseDns {
    async fn reverse(&self, ip: IpAddr) -> Option<String> {
        let hostname = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip))
            .await
            .ok()?
            .ok()?;
        if hostname.parse::<IpAddr>().is_ok() {
            return None;
        }
        Some(hostname)
    }
}

/// Scores events, bounding the reverse-DNS lookup by `timeout`.
pub struct ScoringEngine {
    resolver: Arc<dyn ReverseDnsResolver>,
    timeout: Duration,
}

impl ScoringEngine {
    pub fn new(resolver: Arc<dyn ReverseDnsResolver>, timeout: Duration) -> Self {
        Self { resolver, timeout }
    }

    /// Hostname for `ip`, or `""` when the IP is unparseable, the lookup
    /// fails, or the deadline passes first.
    pub async fn reverse_lookup(&self, ip: &str) -> String {
        let Ok(addr) = IpAddr::from_str(ip.trim()) else {
            return String::new();
        };
        match tokio::time::timeout(self.timeout, self.resolver.reverse(addr)).await {
            Ok(Some(hostname)) => hostname.trim_end_matches('.').to_string(),
            Ok(None) => String::new(),
            Err(_) => {
                tracing::debug!(timeout_ms = self.timeout.as_millis() as u64, "rDNS lookup timed out");
                String::new()
            }
        }
    }

    pub async fn score(&self, event: &Event) -> ScoreResult {
        let hostname = self.reverse_lookup(&event.identity.ip).await;
        scoring::evaluate(&event.geo, &event.signals, &hostname)
    }
}
