// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for runtara-bridge.
//!
//! This module provides [`BridgeRuntime`] which wires the process-scoped
//! services (correlation store, consumer registry, reply handler, job intake)
//! and runs the job worker pool and reply dispatcher inside an existing tokio
//! application.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use runtara_bridge::config::Config;
//! use runtara_bridge::runtime::BridgeRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = BridgeRuntime::builder()
//!         .config(Config::from_env()?)
//!         .engine(Arc::new(MyEngineClient::connect().await?))
//!         .transport(Arc::new(MyBusClient::connect().await?))
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... run your application ...
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::config::Config;
use crate::consumer_registry::ConsumerRegistry;
use crate::correlation::CorrelationStore;
use crate::engine::WorkflowEngine;
use crate::error::{Error, Result};
use crate::job_intake::JobIntake;
use crate::reply_dispatcher::{ReplyDispatcher, reply_queue};
use crate::reply_handler::ReplyHandler;
use crate::transport::MessageTransport;
use crate::worker_pool::{JobWorkerConfig, JobWorkerPool};

/// Builder for creating a [`BridgeRuntime`].
#[derive(Default)]
pub struct BridgeRuntimeBuilder {
    config: Option<Config>,
    engine: Option<Arc<dyn WorkflowEngine>>,
    transport: Option<Arc<dyn MessageTransport>>,
}

impl std::fmt::Debug for BridgeRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeRuntimeBuilder")
            .field("config", &self.config)
            .field("engine", &self.engine.as_ref().map(|_| "..."))
            .field("transport", &self.transport.as_ref().map(|_| "..."))
            .finish()
    }
}

impl BridgeRuntimeBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bridge configuration (required).
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the workflow engine client (required).
    pub fn engine(mut self, engine: Arc<dyn WorkflowEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Set the message transport (required).
    pub fn transport(mut self, transport: Arc<dyn MessageTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<BridgeRuntimeConfig> {
        Ok(BridgeRuntimeConfig {
            config: self.config.ok_or(Error::MissingComponent("config"))?,
            engine: self.engine.ok_or(Error::MissingComponent("engine"))?,
            transport: self
                .transport
                .ok_or(Error::MissingComponent("transport"))?,
        })
    }
}

/// Configuration for a [`BridgeRuntime`].
pub struct BridgeRuntimeConfig {
    config: Config,
    engine: Arc<dyn WorkflowEngine>,
    transport: Arc<dyn MessageTransport>,
}

impl std::fmt::Debug for BridgeRuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeRuntimeConfig")
            .field("config", &self.config)
            .field("engine", &"...")
            .field("transport", &"...")
            .finish()
    }
}

impl BridgeRuntimeConfig {
    /// Start the runtime, spawning the reply dispatcher and job workers.
    pub async fn start(self) -> Result<BridgeRuntime> {
        let config = Arc::new(self.config);
        let store = Arc::new(CorrelationStore::new());
        let registry = Arc::new(ConsumerRegistry::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let (reply_sink, reply_receiver) = reply_queue(config.reply_queue_capacity);
        let reply_handler = Arc::new(ReplyHandler::new(
            store.clone(),
            self.engine.clone(),
            config.correlation_key_field.clone(),
        ));
        let dispatcher = ReplyDispatcher::spawn(
            reply_handler,
            reply_receiver,
            config.reply_workers,
            shutdown_rx.clone(),
        );

        let intake = Arc::new(JobIntake::new(
            config.clone(),
            store.clone(),
            registry.clone(),
            self.transport,
            reply_sink,
        ));

        let worker_config =
            JobWorkerConfig::from_config(&config, self.engine.execution_threads());
        let workers = JobWorkerPool::spawn(self.engine, intake.clone(), worker_config, shutdown_rx);

        info!(
            job_type = %config.job_type,
            job_workers = workers.worker_count(),
            reply_workers = dispatcher.worker_count(),
            "BridgeRuntime started"
        );

        Ok(BridgeRuntime {
            workers,
            dispatcher,
            shutdown_tx,
            store,
            registry,
            intake,
        })
    }
}

/// A running bridge that can be embedded in an application.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct BridgeRuntime {
    workers: JobWorkerPool,
    dispatcher: ReplyDispatcher,
    shutdown_tx: watch::Sender<bool>,
    store: Arc<CorrelationStore>,
    registry: Arc<ConsumerRegistry>,
    intake: Arc<JobIntake>,
}

impl BridgeRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> BridgeRuntimeBuilder {
        BridgeRuntimeBuilder::new()
    }

    /// Jobs waiting for a reply.
    pub fn store(&self) -> &Arc<CorrelationStore> {
        &self.store
    }

    /// Dynamic consumers claimed or active.
    pub fn registry(&self) -> &Arc<ConsumerRegistry> {
        &self.registry
    }

    /// Intake shared by the job workers.
    pub fn intake(&self) -> &Arc<JobIntake> {
        &self.intake
    }

    /// Number of job worker tasks.
    pub fn job_worker_count(&self) -> usize {
        self.workers.worker_count()
    }

    /// Check if the runtime is still running.
    pub fn is_running(&self) -> bool {
        self.workers.is_running() || self.dispatcher.is_running()
    }

    /// Gracefully shut down the runtime.
    ///
    /// Job workers finish the job in hand, reply workers finish the reply in
    /// hand. Dynamic consumers stay bound; they live as long as the transport.
    /// The reply queue is closed once the reply workers stop, so a bound
    /// channel delivering after shutdown gets an error from its sink instead
    /// of blocking on a full queue.
    pub async fn shutdown(self) {
        info!(
            pending_jobs = self.store.size(),
            consumers = self.registry.len(),
            "BridgeRuntime shutting down..."
        );

        let _ = self.shutdown_tx.send(true);
        self.workers.join().await;
        self.dispatcher.join().await;

        info!("BridgeRuntime shutdown complete");
    }
}
