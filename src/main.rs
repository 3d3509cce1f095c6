use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use tower_http::trace::TraceLayer;
use tracing::info;
use price_relay::api::{create_router, ApiState};
use price_relay::config::AppConfig;
use price_relay::observability::{metrics, tracing as relay_tracing};
use price_relay::relay::{PriceRelay, RelayHandle};
use price_relay::utils::helper::alert_operations_team_critical;

const WATCHDOG_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("PRICERELAY_ENV").unwrap_or_else(|_| "development".to_string());
    let config = AppConfig::load(&env).context("loading configuration")?;
    relay_tracing::init(config.server.json_logs);
    metrics::register_metrics().context("registering metrics")?;

    let relay = Arc::new(
        PriceRelay::new(config.clone())
            .start()
            .await
            .context("starting price relay")?,
    );

    let state = Arc::new(ApiState::new(relay.clone(), config.server.admin_jwt_secret.as_deref()));
    let app = create_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, env = %env, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(relay.clone()))
        .await
        .context("serving HTTP")?;

    relay.shutdown().await;
    Ok(())
}

/// Resolves on Ctrl-C or when a relay worker dies. Stops the relay before
/// returning so open tick streams end and the server can drain.
async fn wait_for_shutdown(relay: Arc<RelayHandle>) {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut watchdog = tokio::time::interval(WATCHDOG_INTERVAL);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Shutdown signal received");
                break;
            }
            _ = watchdog.tick() => {
                if let Err(e) = relay.check_health().await {
                    alert_operations_team_critical(format!("Price relay worker died: {}", e));
                    break;
                }
            }
        }
    }

    relay.shutdown().await;
}
