//! breakscope -- anomaly flagging for account-reconciliation time series.
//!
//! This crate provides CSV ingest, per-group feature engineering, rule-based
//! labeling, a per-batch gradient-boosted classifier, comment synthesis,
//! and the HTTP service that exposes them.

pub mod api;
pub mod config;
pub mod detect;
pub mod ingest;
pub mod store;

use anyhow::{Context, Result};

use crate::config::AppConfig;
use crate::detect::ScoredBatch;

/// Start the breakscope HTTP service.
pub async fn serve(config: AppConfig) -> Result<()> {
    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;

    let state = api::state::AppState::new(config);
    let app = api::router(state);

    tracing::info!(%addr, "breakscope listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Parse and score a CSV payload without storing the result.
pub fn score_csv(data: &[u8], config: &AppConfig) -> Result<ScoredBatch> {
    let batch = ingest::parse_csv(data)?;
    let scored = detect::detect_anomalies(&batch, &config.features, &config.model)?;
    Ok(scored)
}
