// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for runtara-bridge integration tests.
//!
//! Provides TestContext wiring the bridge components over the mock engine and
//! the in-memory bus, with a running reply dispatcher.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;

use runtara_bridge::config::Config;
use runtara_bridge::consumer_registry::ConsumerRegistry;
use runtara_bridge::correlation::CorrelationStore;
use runtara_bridge::engine::{ActivatedJob, MockEngine};
use runtara_bridge::job_intake::JobIntake;
use runtara_bridge::reply_dispatcher::{ReplyDispatcher, reply_queue};
use runtara_bridge::reply_handler::ReplyHandler;
use runtara_bridge::transport::{InMemoryBus, MessageTransport};

pub const JOB_TYPE: &str = "payment-request";
pub const CORRELATION_FIELD: &str = "corrId";
pub const OUTBOUND_SUFFIX: &str = "-request";

/// Default test configuration.
pub fn test_config() -> Config {
    let mut config = Config::new(JOB_TYPE, CORRELATION_FIELD, OUTBOUND_SUFFIX);
    config.poll_interval = Duration::from_millis(10);
    config.reply_workers = 2;
    config
}

/// Build an activated job on `element_id` with the given variables.
pub fn job(key: i64, element_id: &str, variables: Value) -> ActivatedJob {
    ActivatedJob {
        key,
        process_instance_key: 1000 + key,
        element_id: element_id.to_string(),
        job_type: JOB_TYPE.to_string(),
        variables: variables.as_object().cloned().unwrap_or_default(),
    }
}

/// Bridge components over the mock engine and in-memory bus.
pub struct TestContext {
    pub bus: InMemoryBus,
    pub engine: Arc<MockEngine>,
    pub store: Arc<CorrelationStore>,
    pub registry: Arc<ConsumerRegistry>,
    pub intake: Arc<JobIntake>,
    dispatcher: Option<ReplyDispatcher>,
    shutdown_tx: watch::Sender<bool>,
}

impl TestContext {
    /// Create a context with the default configuration.
    pub fn new() -> Self {
        Self::with_bus(InMemoryBus::new(), test_config())
    }

    /// Create a context over a specific bus and configuration.
    pub fn with_bus(bus: InMemoryBus, config: Config) -> Self {
        let transport = Arc::new(bus.clone());
        Self::with_transport(bus, transport, config)
    }

    /// Create a context whose intake talks to `transport`.
    ///
    /// `bus` is kept for inspection; it should be the bus `transport` wraps.
    pub fn with_transport(
        bus: InMemoryBus,
        transport: Arc<dyn MessageTransport>,
        config: Config,
    ) -> Self {
        let config = Arc::new(config);
        let engine = Arc::new(MockEngine::new());
        let store = Arc::new(CorrelationStore::new());
        let registry = Arc::new(ConsumerRegistry::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let (sink, receiver) = reply_queue(config.reply_queue_capacity);
        let handler = Arc::new(ReplyHandler::new(
            store.clone(),
            engine.clone(),
            config.correlation_key_field.clone(),
        ));
        let dispatcher =
            ReplyDispatcher::spawn(handler, receiver, config.reply_workers, shutdown_rx);

        let intake = Arc::new(JobIntake::new(
            config,
            store.clone(),
            registry.clone(),
            transport,
            sink,
        ));

        Self {
            bus,
            engine,
            store,
            registry,
            intake,
            dispatcher: Some(dispatcher),
            shutdown_tx,
        }
    }

    /// Stop the reply workers and wait for them.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(dispatcher) = self.dispatcher.take() {
            tokio::time::timeout(Duration::from_secs(5), dispatcher.join())
                .await
                .expect("reply workers should stop");
        }
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
