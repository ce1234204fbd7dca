// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::time::Duration;

/// Suffix appended to the channel prefix for inbound (reply) topics.
pub const DEFAULT_INBOUND_TOPIC_SUFFIX: &str = "-response";

/// Suffix appended to the channel prefix for dynamic consumer binding names.
pub const DEFAULT_BINDING_SUFFIX: &str = "-in-0";

/// Runtara Bridge configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Job type this bridge activates on the workflow engine
    pub job_type: String,
    /// Name of the job variable holding the correlation key
    pub correlation_key_field: String,
    /// Suffix appended to the channel prefix for reply topics
    pub inbound_topic_suffix: String,
    /// Suffix appended to the channel prefix for request topics
    pub outbound_topic_suffix: String,
    /// Consumer group for dynamic consumers (defaults to the channel prefix)
    pub consumer_group: Option<String>,
    /// Number of job worker tasks (defaults to the engine's execution threads)
    pub worker_concurrency: Option<usize>,
    /// Job variable holding the channel prefix (defaults to the job's element id)
    pub channel_prefix_field: Option<String>,
    /// Suffix appended to the channel prefix for consumer binding names
    pub binding_suffix: String,
    /// Worker name reported to the engine on activation
    pub worker_name: String,
    /// Maximum jobs activated per poll
    pub max_jobs_active: u32,
    /// Lock timeout requested for activated jobs
    pub job_timeout: Duration,
    /// Delay between polls when no jobs were activated
    pub poll_interval: Duration,
    /// Capacity of the bounded inbound reply queue
    pub reply_queue_capacity: usize,
    /// Number of reply-processing tasks
    pub reply_workers: usize,
}

impl Config {
    /// Create a configuration with the required values and defaults for everything else.
    pub fn new(
        job_type: impl Into<String>,
        correlation_key_field: impl Into<String>,
        outbound_topic_suffix: impl Into<String>,
    ) -> Self {
        Self {
            job_type: job_type.into(),
            correlation_key_field: correlation_key_field.into(),
            inbound_topic_suffix: DEFAULT_INBOUND_TOPIC_SUFFIX.to_string(),
            outbound_topic_suffix: outbound_topic_suffix.into(),
            consumer_group: None,
            worker_concurrency: None,
            channel_prefix_field: None,
            binding_suffix: DEFAULT_BINDING_SUFFIX.to_string(),
            worker_name: "default".to_string(),
            max_jobs_active: 32,
            job_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(100),
            reply_queue_capacity: 1024,
            reply_workers: 4,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Required (absent or empty is fatal):
    /// - `RUNTARA_BRIDGE_JOB_TYPE`
    /// - `RUNTARA_BRIDGE_CORRELATION_KEY_FIELD`
    /// - `RUNTARA_BRIDGE_OUTBOUND_TOPIC_SUFFIX`
    ///
    /// Optional (with defaults):
    /// - `RUNTARA_BRIDGE_INBOUND_TOPIC_SUFFIX` (default: `-response`)
    /// - `RUNTARA_BRIDGE_CONSUMER_GROUP` (default: channel prefix)
    /// - `RUNTARA_BRIDGE_WORKER_CONCURRENCY` (default: engine execution threads)
    /// - `RUNTARA_BRIDGE_CHANNEL_PREFIX_FIELD` (default: job element id)
    /// - `RUNTARA_BRIDGE_BINDING_SUFFIX` (default: `-in-0`)
    /// - `RUNTARA_BRIDGE_WORKER_NAME` (default: `default`)
    /// - `RUNTARA_BRIDGE_MAX_JOBS_ACTIVE` (default: 32)
    /// - `RUNTARA_BRIDGE_JOB_TIMEOUT_SECS` (default: 300)
    /// - `RUNTARA_BRIDGE_POLL_INTERVAL_MS` (default: 100)
    /// - `RUNTARA_BRIDGE_REPLY_QUEUE_CAPACITY` (default: 1024)
    /// - `RUNTARA_BRIDGE_REPLY_WORKERS` (default: 4)
    pub fn from_env() -> Result<Self, ConfigError> {
        let job_type = required("RUNTARA_BRIDGE_JOB_TYPE")?;
        let correlation_key_field = required("RUNTARA_BRIDGE_CORRELATION_KEY_FIELD")?;
        let outbound_topic_suffix = required("RUNTARA_BRIDGE_OUTBOUND_TOPIC_SUFFIX")?;

        let mut config = Self::new(job_type, correlation_key_field, outbound_topic_suffix);

        if let Ok(suffix) = std::env::var("RUNTARA_BRIDGE_INBOUND_TOPIC_SUFFIX") {
            if suffix.is_empty() {
                return Err(ConfigError::Invalid(
                    "RUNTARA_BRIDGE_INBOUND_TOPIC_SUFFIX",
                    "must not be empty",
                ));
            }
            config.inbound_topic_suffix = suffix;
        }

        config.consumer_group = optional("RUNTARA_BRIDGE_CONSUMER_GROUP");
        config.channel_prefix_field = optional("RUNTARA_BRIDGE_CHANNEL_PREFIX_FIELD");

        if let Some(suffix) = optional("RUNTARA_BRIDGE_BINDING_SUFFIX") {
            config.binding_suffix = suffix;
        }
        if let Some(name) = optional("RUNTARA_BRIDGE_WORKER_NAME") {
            config.worker_name = name;
        }

        if let Some(concurrency) = optional("RUNTARA_BRIDGE_WORKER_CONCURRENCY") {
            config.worker_concurrency = Some(positive(
                &concurrency,
                "RUNTARA_BRIDGE_WORKER_CONCURRENCY",
            )?);
        }

        config.max_jobs_active = std::env::var("RUNTARA_BRIDGE_MAX_JOBS_ACTIVE")
            .unwrap_or_else(|_| "32".to_string())
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::Invalid(
                "RUNTARA_BRIDGE_MAX_JOBS_ACTIVE",
                "must be a positive integer",
            ))?;

        let timeout_secs: u64 = std::env::var("RUNTARA_BRIDGE_JOB_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(
                    "RUNTARA_BRIDGE_JOB_TIMEOUT_SECS",
                    "must be a number of seconds",
                )
            })?;
        config.job_timeout = Duration::from_secs(timeout_secs);

        let poll_ms: u64 = std::env::var("RUNTARA_BRIDGE_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(
                    "RUNTARA_BRIDGE_POLL_INTERVAL_MS",
                    "must be a number of milliseconds",
                )
            })?;
        config.poll_interval = Duration::from_millis(poll_ms);

        if let Some(capacity) = optional("RUNTARA_BRIDGE_REPLY_QUEUE_CAPACITY") {
            config.reply_queue_capacity =
                positive(&capacity, "RUNTARA_BRIDGE_REPLY_QUEUE_CAPACITY")?;
        }
        if let Some(workers) = optional("RUNTARA_BRIDGE_REPLY_WORKERS") {
            config.reply_workers = positive(&workers, "RUNTARA_BRIDGE_REPLY_WORKERS")?;
        }

        Ok(config)
    }

    /// Inbound (reply) channel name for a prefix.
    pub fn inbound_channel(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.inbound_topic_suffix)
    }

    /// Outbound (request) channel name for a prefix.
    pub fn outbound_channel(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.outbound_topic_suffix)
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    optional(key).ok_or(ConfigError::Missing(key))
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn positive(value: &str, key: &'static str) -> Result<usize, ConfigError> {
    value
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or(ConfigError::Invalid(key, "must be a positive integer"))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing or empty.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
