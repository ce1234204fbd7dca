// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Job intake - the per-job orchestration.
//!
//! For every activated job:
//!
//! 1. Extract the correlation key and channel prefix (reject if either is missing)
//! 2. Record the job in the correlation store
//! 3. Make sure a reply consumer exists for `prefix + inbound suffix`
//! 4. Publish the job variables to `prefix + outbound suffix`
//!
//! The request is published even if provisioning the reply consumer failed.
//! The failed claim is rolled back, so a later job (or a redelivery of this
//! one) with the same prefix retries provisioning. Intake never waits for the
//! reply.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::config::Config;
use crate::consumer_registry::ConsumerRegistry;
use crate::correlation::{CorrelationError, CorrelationStore, PendingJob};
use crate::engine::ActivatedJob;
use crate::provisioner::ConsumerProvisioner;
use crate::transport::{InboundSink, MessageTransport, TransportError};

/// Name reported when the channel prefix comes from the job's element id.
const ELEMENT_ID_FIELD: &str = "elementId";

/// Errors that reject an activated job.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IntakeError {
    /// The job lacks a correlation key or a channel prefix.
    #[error("Job {job_key} is missing required variable '{field}'")]
    MissingCorrelationData {
        /// Rejected job.
        job_key: i64,
        /// Variable that was absent or empty.
        field: String,
    },

    /// The correlation key is already pending for another job.
    #[error(transparent)]
    DuplicateKey(#[from] CorrelationError),

    /// The request could not be published.
    #[error("Failed to publish job {job_key} to '{channel}': {source}")]
    Publish {
        /// Job whose request failed.
        job_key: i64,
        /// Outbound channel.
        channel: String,
        /// Transport failure.
        #[source]
        source: TransportError,
    },
}

impl IntakeError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingCorrelationData { .. } => "MISSING_CORRELATION_DATA",
            Self::DuplicateKey(_) => "DUPLICATE_KEY",
            Self::Publish { .. } => "PUBLISH_FAILED",
        }
    }
}

/// What happened to the reply consumer while taking in a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerStatus {
    /// This job provisioned the consumer.
    Provisioned,
    /// Another job already owns (or is creating) the consumer.
    AlreadyClaimed,
    /// Provisioning failed and the claim was rolled back.
    Failed,
}

/// Result of taking in one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDispatch {
    /// Correlation key recorded for the job
    pub correlation_key: String,
    /// Channel the reply is expected on
    pub inbound_channel: String,
    /// Channel the request was published to
    pub outbound_channel: String,
    /// Reply consumer outcome
    pub consumer: ConsumerStatus,
}

/// Per-job orchestration over the process-scoped services.
pub struct JobIntake {
    config: Arc<Config>,
    store: Arc<CorrelationStore>,
    registry: Arc<ConsumerRegistry>,
    provisioner: ConsumerProvisioner,
    transport: Arc<dyn MessageTransport>,
    reply_sink: InboundSink,
}

impl JobIntake {
    /// Create the intake. `reply_sink` is where provisioned consumers deliver.
    pub fn new(
        config: Arc<Config>,
        store: Arc<CorrelationStore>,
        registry: Arc<ConsumerRegistry>,
        transport: Arc<dyn MessageTransport>,
        reply_sink: InboundSink,
    ) -> Self {
        let provisioner = ConsumerProvisioner::new(
            transport.clone(),
            config.consumer_group.clone(),
            config.binding_suffix.clone(),
        );
        Self {
            config,
            store,
            registry,
            provisioner,
            transport,
            reply_sink,
        }
    }

    /// Take in one activated job.
    #[instrument(skip(self, job), fields(job_key = job.key, element_id = %job.element_id))]
    pub async fn handle(&self, job: &ActivatedJob) -> Result<JobDispatch, IntakeError> {
        let correlation_key = job
            .string_variable(&self.config.correlation_key_field)
            .ok_or_else(|| IntakeError::MissingCorrelationData {
                job_key: job.key,
                field: self.config.correlation_key_field.clone(),
            })?
            .to_string();
        let prefix = self.channel_prefix(job)?;

        match self.store.put(PendingJob::from_job(&correlation_key, job)) {
            Ok(()) => {}
            Err(CorrelationError::DuplicateKey {
                existing_job_key, ..
            }) if existing_job_key == job.key => {
                debug!(correlation_key = %correlation_key, "Job redelivered, keeping pending entry");
            }
            Err(e) => return Err(e.into()),
        }

        let inbound_channel = self.config.inbound_channel(prefix);
        let consumer = self.ensure_consumer(prefix, &inbound_channel).await;

        let outbound_channel = self.config.outbound_channel(prefix);
        self.transport
            .publish(&outbound_channel, &Value::Object(job.variables.clone()))
            .await
            .map_err(|source| IntakeError::Publish {
                job_key: job.key,
                channel: outbound_channel.clone(),
                source,
            })?;

        info!(
            correlation_key = %correlation_key,
            outbound = %outbound_channel,
            inbound = %inbound_channel,
            consumer = ?consumer,
            "Job request published"
        );

        Ok(JobDispatch {
            correlation_key,
            inbound_channel,
            outbound_channel,
            consumer,
        })
    }

    /// Channel prefix of a job: the configured variable, or the element id.
    fn channel_prefix<'a>(&self, job: &'a ActivatedJob) -> Result<&'a str, IntakeError> {
        let (prefix, field) = match &self.config.channel_prefix_field {
            Some(field) => (job.string_variable(field), field.as_str()),
            None => (
                Some(job.element_id.as_str()).filter(|id| !id.is_empty()),
                ELEMENT_ID_FIELD,
            ),
        };
        prefix.ok_or_else(|| IntakeError::MissingCorrelationData {
            job_key: job.key,
            field: field.to_string(),
        })
    }

    /// Provision the reply consumer if nobody has claimed it yet.
    async fn ensure_consumer(&self, prefix: &str, inbound_channel: &str) -> ConsumerStatus {
        if !self.registry.claim_if_absent(inbound_channel) {
            return ConsumerStatus::AlreadyClaimed;
        }

        match self
            .provisioner
            .provision(prefix, inbound_channel, self.reply_sink.clone())
            .await
        {
            Ok(handle) => {
                self.registry.confirm(inbound_channel, handle);
                ConsumerStatus::Provisioned
            }
            Err(e) => {
                error!(channel = %inbound_channel, error = %e, "Error while building the consumer");
                // The provisioner has already unwound the partial channel.
                // The claim must outlive every teardown of that channel.
                self.registry.release(inbound_channel);
                debug!(channel = %inbound_channel, "Consumer claim rolled back");
                ConsumerStatus::Failed
            }
        }
    }
}
