// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory message bus.
//!
//! Loopback transport used by tests and the standalone binary. Publishing to
//! a channel with a bound subscription delivers straight into that
//! subscription's sink. Failures can be injected per channel.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use super::traits::*;

#[derive(Default)]
struct BusState {
    created: HashMap<String, ChannelHandle>,
    bound: HashMap<String, (ChannelHandle, InboundSink)>,
    published: Vec<(String, Value)>,
    create_calls: HashMap<String, usize>,
    unbind_calls: Vec<String>,
    dropped_loopbacks: usize,
    fail_create: HashSet<String>,
    fail_bind: HashSet<String>,
    fail_publish: HashSet<String>,
}

/// In-memory transport with loopback delivery.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    state: Arc<Mutex<BusState>>,
    /// Artificial latency for `bind`, to simulate a slow subscribe.
    bind_delay: Duration,
}

impl InMemoryBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bus whose `bind` takes `delay` to complete.
    pub fn with_bind_delay(delay: Duration) -> Self {
        Self {
            state: Arc::default(),
            bind_delay: delay,
        }
    }

    /// Make channel creation fail for `channel`.
    pub async fn fail_create_for(&self, channel: &str) {
        self.state.lock().await.fail_create.insert(channel.to_string());
    }

    /// Make binding fail for `channel`.
    pub async fn fail_bind_for(&self, channel: &str) {
        self.state.lock().await.fail_bind.insert(channel.to_string());
    }

    /// Make publishing fail for `channel`.
    pub async fn fail_publish_for(&self, channel: &str) {
        self.state.lock().await.fail_publish.insert(channel.to_string());
    }

    /// Remove every injected failure.
    pub async fn clear_failures(&self) {
        let mut state = self.state.lock().await;
        state.fail_create.clear();
        state.fail_bind.clear();
        state.fail_publish.clear();
    }

    /// Deliver a JSON payload to the subscriber of `channel`.
    pub async fn deliver(&self, channel: &str, payload: &Value) -> Result<()> {
        self.deliver_raw(channel, serde_json::to_vec(payload)?).await
    }

    /// Deliver raw bytes to the subscriber of `channel`.
    pub async fn deliver_raw(&self, channel: &str, payload: Vec<u8>) -> Result<()> {
        let sink = self
            .sink_for(channel)
            .await
            .ok_or_else(|| TransportError::NotBound(channel.to_string()))?;
        sink.send(InboundMessage::new(channel, payload))
            .await
            .map_err(|_| TransportError::NotBound(channel.to_string()))
    }

    /// Messages published so far, in order.
    pub async fn published(&self) -> Vec<(String, Value)> {
        self.state.lock().await.published.clone()
    }

    /// Messages published to `channel`.
    pub async fn published_to(&self, channel: &str) -> Vec<Value> {
        self.state
            .lock()
            .await
            .published
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// How many times a channel object was requested for `channel`.
    pub async fn create_calls(&self, channel: &str) -> usize {
        self.state
            .lock()
            .await
            .create_calls
            .get(channel)
            .copied()
            .unwrap_or(0)
    }

    /// Channels passed to `unbind`, in order.
    pub async fn unbind_calls(&self) -> Vec<String> {
        self.state.lock().await.unbind_calls.clone()
    }

    /// Loopback deliveries dropped because the subscriber's queue was closed.
    pub async fn dropped_loopbacks(&self) -> usize {
        self.state.lock().await.dropped_loopbacks
    }

    /// Whether `channel` has a live subscription.
    pub async fn is_bound(&self, channel: &str) -> bool {
        self.state.lock().await.bound.contains_key(channel)
    }

    /// Whether a channel object exists for `channel` (bound or not).
    pub async fn is_created(&self, channel: &str) -> bool {
        self.state.lock().await.created.contains_key(channel)
    }

    async fn sink_for(&self, channel: &str) -> Option<InboundSink> {
        self.state
            .lock()
            .await
            .bound
            .get(channel)
            .map(|(_, sink)| sink.clone())
    }
}

#[async_trait]
impl MessageTransport for InMemoryBus {
    async fn publish(&self, channel: &str, payload: &Value) -> Result<()> {
        let sink = {
            let mut state = self.state.lock().await;
            if state.fail_publish.contains(channel) {
                return Err(TransportError::Publish {
                    channel: channel.to_string(),
                    reason: "injected failure".to_string(),
                });
            }
            state.published.push((channel.to_string(), payload.clone()));
            state.bound.get(channel).map(|(_, sink)| sink.clone())
        };

        // Loopback: a subscribed channel receives what is published to it.
        if let Some(sink) = sink {
            let message = InboundMessage::new(channel, serde_json::to_vec(payload)?);
            if sink.send(message).await.is_err() {
                debug!(channel, "Reply queue closed, loopback delivery dropped");
                self.state.lock().await.dropped_loopbacks += 1;
            }
        }
        Ok(())
    }

    async fn create_inbound_channel(&self, config: &SubscriptionConfig) -> Result<ChannelHandle> {
        let mut state = self.state.lock().await;
        *state
            .create_calls
            .entry(config.destination.clone())
            .or_insert(0) += 1;

        if state.fail_create.contains(&config.destination) {
            return Err(TransportError::ChannelCreation {
                channel: config.destination.clone(),
                reason: "injected failure".to_string(),
            });
        }

        let handle = ChannelHandle {
            destination: config.destination.clone(),
            group: config.group.clone(),
            binding_name: config.binding_name.clone(),
            created_at: Utc::now(),
        };
        state
            .created
            .insert(config.destination.clone(), handle.clone());
        Ok(handle)
    }

    async fn bind(&self, handle: &ChannelHandle, sink: InboundSink) -> Result<()> {
        if !self.bind_delay.is_zero() {
            tokio::time::sleep(self.bind_delay).await;
        }

        let mut state = self.state.lock().await;
        if state.fail_bind.contains(&handle.destination) {
            return Err(TransportError::Bind {
                channel: handle.destination.clone(),
                reason: "injected failure".to_string(),
            });
        }
        if !state.created.contains_key(&handle.destination) {
            return Err(TransportError::Bind {
                channel: handle.destination.clone(),
                reason: "channel was not created".to_string(),
            });
        }
        state
            .bound
            .insert(handle.destination.clone(), (handle.clone(), sink));
        Ok(())
    }

    async fn unbind(&self, channel: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.unbind_calls.push(channel.to_string());
        state.created.remove(channel);
        state.bound.remove(channel);
        Ok(())
    }
}
