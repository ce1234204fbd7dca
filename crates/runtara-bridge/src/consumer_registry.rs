// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Registry of dynamically provisioned inbound channels.
//!
//! Membership is the single source of truth for "a subscription exists or is
//! being created" for a channel. A claim is taken before provisioning starts,
//! confirmed with the channel handle on success, and released on failure so
//! that a later job can try again.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::transport::ChannelHandle;

/// State of a registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerState {
    /// Claimed; the winner is provisioning the channel.
    Provisioning {
        /// When the claim was taken.
        claimed_at: DateTime<Utc>,
    },
    /// Provisioned and bound for the rest of the process lifetime.
    Active(ChannelHandle),
}

/// Concurrent registry keyed by inbound channel name.
#[derive(Debug, Default)]
pub struct ConsumerRegistry {
    consumers: DashMap<String, ConsumerState>,
}

impl ConsumerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the right to provision `channel`.
    ///
    /// Returns `true` for exactly one caller per channel until the claim is
    /// released; everyone else gets `false`.
    pub fn claim_if_absent(&self, channel: &str) -> bool {
        match self.consumers.entry(channel.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(ConsumerState::Provisioning {
                    claimed_at: Utc::now(),
                });
                true
            }
        }
    }

    /// Record the handle of a successfully provisioned channel.
    pub fn confirm(&self, channel: &str, handle: ChannelHandle) {
        self.consumers
            .insert(channel.to_string(), ConsumerState::Active(handle));
    }

    /// Drop membership of `channel` so that it can be claimed again.
    ///
    /// Returns whether an entry was removed.
    pub fn release(&self, channel: &str) -> bool {
        self.consumers.remove(channel).is_some()
    }

    /// Whether `channel` is claimed or active.
    pub fn contains(&self, channel: &str) -> bool {
        self.consumers.contains_key(channel)
    }

    /// Current state of `channel`.
    pub fn state(&self, channel: &str) -> Option<ConsumerState> {
        self.consumers.get(channel).map(|entry| entry.value().clone())
    }

    /// Handle of `channel` once it is active.
    pub fn handle(&self, channel: &str) -> Option<ChannelHandle> {
        match self.state(channel)? {
            ConsumerState::Active(handle) => Some(handle),
            ConsumerState::Provisioning { .. } => None,
        }
    }

    /// Number of claimed or active channels.
    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }
}
