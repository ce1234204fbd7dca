// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Correlation store linking outbound jobs to their future replies.
//!
//! Written to by job workers on intake and drained by reply workers. There is
//! no expiry: an entry whose reply never arrives stays until the process
//! exits, and the engine's own job timeout decides what happens to the job.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::engine::ActivatedJob;

/// A job waiting for its reply.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingJob {
    /// Business key carried by the request and echoed by the reply
    pub correlation_key: String,
    /// Originating workflow instance
    pub process_instance_key: i64,
    /// Key used to report completion of this job
    pub job_key: i64,
    /// Workflow element that produced the job
    pub element_id: String,
    /// Original job variables
    pub variables: Map<String, Value>,
    /// When the job was recorded
    pub registered_at: DateTime<Utc>,
}

impl PendingJob {
    /// Build a pending entry from an activated job.
    pub fn from_job(correlation_key: impl Into<String>, job: &ActivatedJob) -> Self {
        Self {
            correlation_key: correlation_key.into(),
            process_instance_key: job.process_instance_key,
            job_key: job.key,
            element_id: job.element_id.clone(),
            variables: job.variables.clone(),
            registered_at: Utc::now(),
        }
    }
}

/// Errors from the correlation store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CorrelationError {
    /// The key is already mapped to a pending job.
    #[error("Correlation key '{correlation_key}' already pending for job {existing_job_key}")]
    DuplicateKey {
        /// The colliding key.
        correlation_key: String,
        /// Job currently holding the key.
        existing_job_key: i64,
    },
}

/// Concurrent map from correlation key to pending job.
#[derive(Debug, Default)]
pub struct CorrelationStore {
    pending: DashMap<String, PendingJob>,
}

impl CorrelationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pending job under its correlation key.
    ///
    /// Never overwrites: an occupied key is reported as
    /// [`CorrelationError::DuplicateKey`] together with the job holding it.
    pub fn put(&self, job: PendingJob) -> Result<(), CorrelationError> {
        match self.pending.entry(job.correlation_key.clone()) {
            Entry::Occupied(existing) => Err(CorrelationError::DuplicateKey {
                correlation_key: job.correlation_key,
                existing_job_key: existing.get().job_key,
            }),
            Entry::Vacant(slot) => {
                slot.insert(job);
                Ok(())
            }
        }
    }

    /// Atomically remove and return the job for `correlation_key`.
    pub fn take(&self, correlation_key: &str) -> Option<PendingJob> {
        self.pending.remove(correlation_key).map(|(_, job)| job)
    }

    /// Whether `correlation_key` is pending.
    pub fn contains(&self, correlation_key: &str) -> bool {
        self.pending.contains_key(correlation_key)
    }

    /// Number of pending jobs.
    pub fn size(&self) -> usize {
        self.pending.len()
    }
}
