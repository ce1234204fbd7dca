// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reply handling for dynamically provisioned channels.
//!
//! A reply is a JSON object carrying the correlation key field plus arbitrary
//! result fields. The key is used to take the pending job out of the
//! correlation store; the remaining fields become the job's output
//! variables. Taking the entry is what makes reply processing idempotent: a
//! redelivered reply finds nothing and is dropped.

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::correlation::CorrelationStore;
use crate::engine::{EngineError, WorkflowEngine};
use crate::transport::InboundMessage;

/// Errors while processing a reply. None of them are retried here.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReplyError {
    /// The payload is not a JSON object with a usable correlation key.
    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    /// No pending job holds the correlation key.
    #[error("No pending job for correlation key '{correlation_key}'")]
    UnmatchedReply {
        /// Key carried by the reply.
        correlation_key: String,
    },

    /// The engine rejected the completion.
    #[error("Failed to report completion of job {job_key}: {source}")]
    ReportCompletion {
        /// Job that could not be completed.
        job_key: i64,
        /// Engine failure.
        #[source]
        source: EngineError,
    },
}

impl ReplyError {
    /// Whether the error points at a problem beyond the single message.
    ///
    /// Malformed and unmatched replies are expected under redelivery and
    /// are not systemic.
    pub fn is_systemic(&self) -> bool {
        matches!(self, Self::ReportCompletion { .. })
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MalformedReply(_) => "MALFORMED_REPLY",
            Self::UnmatchedReply { .. } => "UNMATCHED_REPLY",
            Self::ReportCompletion { .. } => "REPORT_COMPLETION_FAILED",
        }
    }
}

/// A reply that completed its job.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedReply {
    /// Correlation key of the reply
    pub correlation_key: String,
    /// Job reported as completed
    pub job_key: i64,
    /// Workflow instance of the job
    pub process_instance_key: i64,
}

/// Resolves replies to pending jobs and reports their completion.
pub struct ReplyHandler {
    store: Arc<CorrelationStore>,
    engine: Arc<dyn WorkflowEngine>,
    correlation_key_field: String,
}

impl ReplyHandler {
    /// Create a handler reading the correlation key from `correlation_key_field`.
    pub fn new(
        store: Arc<CorrelationStore>,
        engine: Arc<dyn WorkflowEngine>,
        correlation_key_field: impl Into<String>,
    ) -> Self {
        Self {
            store,
            engine,
            correlation_key_field: correlation_key_field.into(),
        }
    }

    /// Split a raw reply into its correlation key and output variables.
    pub fn parse(&self, payload: &[u8]) -> Result<(String, Map<String, Value>), ReplyError> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| ReplyError::MalformedReply(format!("invalid JSON: {}", e)))?;

        let Value::Object(mut fields) = value else {
            return Err(ReplyError::MalformedReply(
                "payload is not a JSON object".to_string(),
            ));
        };

        match fields.remove(&self.correlation_key_field) {
            Some(Value::String(key)) if !key.is_empty() => Ok((key, fields)),
            Some(Value::String(_)) => Err(ReplyError::MalformedReply(format!(
                "'{}' is empty",
                self.correlation_key_field
            ))),
            Some(_) => Err(ReplyError::MalformedReply(format!(
                "'{}' is not a string",
                self.correlation_key_field
            ))),
            None => Err(ReplyError::MalformedReply(format!(
                "'{}' is missing",
                self.correlation_key_field
            ))),
        }
    }

    /// Resolve one reply and report the job's completion.
    #[instrument(skip(self, message), fields(channel = %message.channel))]
    pub async fn handle(&self, message: &InboundMessage) -> Result<CompletedReply, ReplyError> {
        let (correlation_key, output) = self.parse(&message.payload)?;

        let job = self
            .store
            .take(&correlation_key)
            .ok_or_else(|| ReplyError::UnmatchedReply {
                correlation_key: correlation_key.clone(),
            })?;

        debug!(
            correlation_key = %correlation_key,
            job_key = job.job_key,
            "Reply matched pending job"
        );

        self.engine
            .complete_job(job.job_key, output)
            .await
            .map_err(|source| ReplyError::ReportCompletion {
                job_key: job.job_key,
                source,
            })?;

        Ok(CompletedReply {
            correlation_key,
            job_key: job.job_key,
            process_instance_key: job.process_instance_key,
        })
    }

    /// Handle a reply and log the outcome. Never fails.
    pub async fn process(&self, message: &InboundMessage) {
        match self.handle(message).await {
            Ok(reply) => {
                info!(
                    channel = %message.channel,
                    correlation_key = %reply.correlation_key,
                    job_key = reply.job_key,
                    process_instance_key = reply.process_instance_key,
                    "Job completed from reply"
                );
            }
            Err(e @ ReplyError::MalformedReply(_)) => {
                warn!(channel = %message.channel, error = %e, "Dropping malformed reply");
            }
            Err(e @ ReplyError::UnmatchedReply { .. }) => {
                info!(channel = %message.channel, error = %e, "Dropping unmatched reply");
            }
            Err(e @ ReplyError::ReportCompletion { .. }) => {
                error!(
                    channel = %message.channel,
                    code = e.error_code(),
                    error = %e,
                    "Failed to complete job from reply"
                );
            }
        }
    }
}
