// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dynamic consumer provisioning.
//!
//! Creates an inbound channel for a reply topic at runtime and binds it to
//! the reply queue. A failed attempt unbinds whatever was partially created
//! before reporting the error. Successfully bound channels are never torn
//! down; later jobs with the same prefix reuse them.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::transport::{
    ChannelHandle, InboundSink, MessageTransport, SubscriptionConfig, TransportError,
};

/// Provisioning of an inbound channel failed.
#[derive(Debug, Error)]
#[error("Failed to provision consumer for '{channel}': {source}")]
pub struct ProvisionError {
    /// Inbound channel that could not be provisioned.
    pub channel: String,
    /// Underlying transport failure.
    #[source]
    pub source: TransportError,
}

/// Creates and binds dynamic inbound channels.
pub struct ConsumerProvisioner {
    transport: Arc<dyn MessageTransport>,
    consumer_group: Option<String>,
    binding_suffix: String,
}

impl ConsumerProvisioner {
    /// Create a provisioner.
    ///
    /// `consumer_group` overrides the per-prefix default group.
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        consumer_group: Option<String>,
        binding_suffix: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            consumer_group,
            binding_suffix: binding_suffix.into(),
        }
    }

    /// Subscription settings for the inbound `channel` derived from `prefix`.
    pub fn subscription_config(&self, prefix: &str, channel: &str) -> SubscriptionConfig {
        SubscriptionConfig {
            destination: channel.to_string(),
            group: self
                .consumer_group
                .clone()
                .unwrap_or_else(|| prefix.to_string()),
            binding_name: format!("{}{}", prefix, self.binding_suffix),
        }
    }

    /// Create `channel`, subscribe it under its consumer group and route its
    /// messages into `sink`.
    #[instrument(skip(self, sink))]
    pub async fn provision(
        &self,
        prefix: &str,
        channel: &str,
        sink: InboundSink,
    ) -> Result<ChannelHandle, ProvisionError> {
        let config = self.subscription_config(prefix, channel);
        debug!(group = %config.group, binding = %config.binding_name, "Provisioning consumer");

        let handle = match self.transport.create_inbound_channel(&config).await {
            Ok(handle) => handle,
            Err(e) => return Err(self.unwind(channel, e).await),
        };

        if let Err(e) = self.transport.bind(&handle, sink).await {
            return Err(self.unwind(channel, e).await);
        }

        info!(group = %handle.group, "Consumer provisioned");
        Ok(handle)
    }

    /// Best-effort teardown of a partially provisioned channel.
    async fn unwind(&self, channel: &str, cause: TransportError) -> ProvisionError {
        if let Err(e) = self.transport.unbind(channel).await {
            warn!(channel, error = %e, "Failed to unbind partially provisioned consumer");
        }
        ProvisionError {
            channel: channel.to_string(),
            source: cause,
        }
    }
}
