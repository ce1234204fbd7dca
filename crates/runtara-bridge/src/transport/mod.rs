// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message transport collaborator - topic publish and dynamic subscriptions.

pub mod memory;
mod traits;

pub use memory::InMemoryBus;
pub use traits::*;
