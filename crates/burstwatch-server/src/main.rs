use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use burstwatch_aggregator::TokioScheduler;
use burstwatch_core::sink::{NotificationSink, NullReverseDns, ReverseDnsResolver};
use burstwatch_server::{
    config::Config, delivery::DiscordWebhookSink, rdns::SystemReverseDns, state::AppState,
};

/// `burstwatch health`: liveness check for container health checks.
///
/// Calls `GET http://localhost:$BURSTWATCH_PORT/health`.
/// Exits 0 if the server responds with HTTP 200, exits 1 otherwise.
fn run_health_check() -> ! {
    let port = std::env::var("BURSTWATCH_PORT").unwrap_or_else(|_| "3000".to_string());
    let url = format!("http://localhost:{}/health", port);
    match ureq::get(&url).call() {
        Ok(resp) if resp.status() == 200 => std::process::exit(0),
        _ => std::process::exit(1),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("health") {
        run_health_check();
    }

    // Structured JSON logging. Level controlled via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("burstwatch=info".parse()?),
        )
        .json()
        .init();

    let cfg = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    let sink: Option<Arc<dyn NotificationSink>> = match &cfg.webhook_url {
        Some(url) => Some(Arc::new(DiscordWebhookSink::new(url)?)),
        None => {
            tracing::warn!(
                "BURSTWATCH_WEBHOOK_URL is not set. Beacon routes will answer 500 \
                 until a webhook is configured."
            );
            None
        }
    };

    let resolver: Arc<dyn ReverseDnsResolver> = if cfg.rdns_timeout_ms == 0 {
        info!("Reverse DNS disabled (BURSTWATCH_RDNS_TIMEOUT_MS=0)");
        Arc::new(NullReverseDns)
    } else {
        Arc::new(SystemReverseDns)
    };

    if !std::path::Path::new(&cfg.geoip_path).exists() {
        tracing::warn!(
            geoip_path = %cfg.geoip_path,
            "GeoIP database not found. Location relies on edge headers only."
        );
    }

    let state = Arc::new(AppState::new(
        cfg.clone(),
        sink,
        resolver,
        Arc::new(TokioScheduler::new()),
    ));

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = burstwatch_server::app::build_app(Arc::clone(&state));

    info!(
        port = cfg.port,
        window_ms = cfg.aggregation_window_ms,
        hold_ms = cfg.hold_ms,
        count_mode = ?cfg.count_mode,
        "burstwatch listening on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    // Bursts still inside their window would otherwise be lost.
    tokio::time::timeout(Duration::from_secs(5), state.store.drain())
        .await
        .ok();

    Ok(())
}
