use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use energy_service::{
    api::{self, AppState, StaticTokenIdentity},
    config::AppConfig,
    metrics_server, observability, store,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr).await?;
    }

    let store = store::from_config(&cfg.store).await?;

    if cfg.auth.tokens.is_empty() {
        tracing::warn!("no auth tokens configured; every request will be rejected");
    }
    let identity = Arc::new(StaticTokenIdentity::new(cfg.auth.tokens.clone()));

    let state = AppState::new(store, identity, cfg.pricing.rate_per_kwh, cfg.http.max_upload_bytes);
    let app = api::router(state);

    let addr: SocketAddr = cfg
        .http
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid http.bind_addr: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        store = ?cfg.store.kind,
        rate_per_kwh = cfg.pricing.rate_per_kwh,
        "energy service listening"
    );

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
