// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runtara Bridge - standalone mode
//!
//! Runs the bridge against the in-process mock engine and in-memory bus.
//! Production deployments embed [`runtara_bridge::BridgeRuntime`] with real
//! engine and transport clients.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use runtara_bridge::config::Config;
use runtara_bridge::engine::MockEngine;
use runtara_bridge::runtime::BridgeRuntime;
use runtara_bridge::transport::InMemoryBus;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("runtara_bridge=info".parse()?),
        )
        .init();

    info!("Starting Runtara Bridge");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        job_type = %config.job_type,
        correlation_key_field = %config.correlation_key_field,
        inbound_suffix = %config.inbound_topic_suffix,
        outbound_suffix = %config.outbound_topic_suffix,
        "Configuration loaded"
    );

    let runtime = BridgeRuntime::builder()
        .config(config)
        .engine(Arc::new(MockEngine::new()))
        .transport(Arc::new(InMemoryBus::new()))
        .build()?
        .start()
        .await?;

    info!("Runtara Bridge initialized successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    runtime.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}
