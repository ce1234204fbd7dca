// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow engine collaborator - job activation and completion reporting.

pub mod mock;
mod traits;

pub use mock::MockEngine;
pub use traits::*;
