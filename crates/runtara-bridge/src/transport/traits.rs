// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message transport trait definitions.
//!
//! The transport owns topic I/O. Partitioning, offsets and delivery
//! guarantees are its business; the bridge assumes at-least-once delivery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from transport operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The inbound channel object could not be created.
    #[error("Failed to create channel '{channel}': {reason}")]
    ChannelCreation {
        /// Channel being created.
        channel: String,
        /// Transport-specific reason.
        reason: String,
    },

    /// Subscribing the channel to its topic failed.
    #[error("Failed to bind channel '{channel}': {reason}")]
    Bind {
        /// Channel being bound.
        channel: String,
        /// Transport-specific reason.
        reason: String,
    },

    /// Sending a message failed.
    #[error("Failed to publish to '{channel}': {reason}")]
    Publish {
        /// Destination channel.
        channel: String,
        /// Transport-specific reason.
        reason: String,
    },

    /// No subscription exists for the channel.
    #[error("Channel not bound: {0}")]
    NotBound(String),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// A raw message received on a dynamically provisioned channel.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Channel the message arrived on
    pub channel: String,
    /// Undecoded payload
    pub payload: Vec<u8>,
    /// When the transport handed the message over
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Create a message received now.
    pub fn new(channel: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            channel: channel.into(),
            payload,
            received_at: Utc::now(),
        }
    }
}

/// Where a bound channel pushes its messages: the bounded reply queue.
pub type InboundSink = mpsc::Sender<InboundMessage>;

/// Subscription settings for a dynamic inbound channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Topic to subscribe to (also the registry key)
    pub destination: String,
    /// Consumer group to subscribe under
    pub group: String,
    /// Transport-level binding name for the consumer
    pub binding_name: String,
}

/// Handle to an inbound channel created by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    /// Topic the channel reads from
    pub destination: String,
    /// Consumer group
    pub group: String,
    /// Transport-level binding name
    pub binding_name: String,
    /// When the channel object was created
    pub created_at: DateTime<Utc>,
}

/// Trait for message transports.
///
/// Inbound channels follow a two-step lifecycle: [`create_inbound_channel`]
/// builds the channel object, [`bind`] subscribes it to its topic and starts
/// delivering into the given sink. [`unbind`] tears down whatever exists for
/// a destination and must tolerate partially created or unknown channels.
///
/// [`create_inbound_channel`]: MessageTransport::create_inbound_channel
/// [`bind`]: MessageTransport::bind
/// [`unbind`]: MessageTransport::unbind
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Fire-and-forget send of a JSON payload to a channel.
    async fn publish(&self, channel: &str, payload: &Value) -> Result<()>;

    /// Create (but do not subscribe) an inbound channel.
    async fn create_inbound_channel(&self, config: &SubscriptionConfig) -> Result<ChannelHandle>;

    /// Subscribe a created channel under its consumer group, delivering into `sink`.
    async fn bind(&self, handle: &ChannelHandle, sink: InboundSink) -> Result<()>;

    /// Remove any channel object and subscription for `channel`.
    async fn unbind(&self, channel: &str) -> Result<()>;
}
