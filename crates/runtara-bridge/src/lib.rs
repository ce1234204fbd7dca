// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runtara Bridge - Workflow Engine to Message Bus Bridge
//!
//! This crate turns workflow-engine service-task jobs into outbound messages
//! and completes those jobs when the matching reply arrives on an inbound
//! channel. Reply channels are provisioned lazily, the first time a job for a
//! new channel prefix is seen.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Workflow Engine                                 │
//! │                 (activate / complete / fail jobs)                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//!        │ activate                                        ▲ complete
//!        ▼                                                 │
//! ┌───────────────────────┐                    ┌─────────────────────────────┐
//! │    JobWorkerPool      │                    │     ReplyDispatcher         │
//! │  (N job workers)      │                    │  (bounded queue + workers)  │
//! └───────────┬───────────┘                    └──────────────▲──────────────┘
//!             │                                               │
//!             ▼                                               │
//! ┌───────────────────────┐   put    ┌──────────────┐  take   ┌──────────────┐
//! │      JobIntake        │─────────►│ Correlation  │◄────────│ ReplyHandler │
//! │                       │          │    Store     │         └──────────────┘
//! └──┬─────────────┬──────┘          └──────────────┘
//!    │ claim       │ publish                          ▲ inbound
//!    ▼             ▼                                  │
//! ┌──────────┐ ┌─────────────────────────────────────────────────────────────┐
//! │ Consumer │ │                       Message Bus                           │
//! │ Registry │ │       {prefix}{outbound suffix}   {prefix}{inbound suffix}  │
//! └──────────┘ └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Job Flow
//!
//! 1. A job worker activates a batch of jobs of the configured type.
//! 2. [`job_intake::JobIntake`] reads the correlation key and channel prefix,
//!    records the job in the [`correlation::CorrelationStore`], provisions a
//!    reply consumer for the prefix if none exists yet, and publishes the job
//!    variables to `{prefix}{outbound suffix}`.
//! 3. A reply on `{prefix}{inbound suffix}` is queued for the
//!    [`reply_dispatcher::ReplyDispatcher`].
//! 4. [`reply_handler::ReplyHandler`] takes the pending job for the reply's
//!    correlation key and completes it with the reply's remaining fields.
//!
//! Each correlation key completes at most one job. A reply with no pending
//! job is logged and dropped.
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `RUNTARA_BRIDGE_JOB_TYPE` | Yes | - | Job type to activate |
//! | `RUNTARA_BRIDGE_CORRELATION_KEY_FIELD` | Yes | - | Variable holding the correlation key |
//! | `RUNTARA_BRIDGE_OUTBOUND_TOPIC_SUFFIX` | Yes | - | Suffix of request channels |
//! | `RUNTARA_BRIDGE_INBOUND_TOPIC_SUFFIX` | No | `-response` | Suffix of reply channels |
//! | `RUNTARA_BRIDGE_CONSUMER_GROUP` | No | channel prefix | Group for dynamic consumers |
//! | `RUNTARA_BRIDGE_WORKER_CONCURRENCY` | No | engine threads | Number of job workers |
//! | `RUNTARA_BRIDGE_CHANNEL_PREFIX_FIELD` | No | element id | Variable holding the channel prefix |
//! | `RUNTARA_BRIDGE_BINDING_SUFFIX` | No | `-in-0` | Suffix of consumer binding names |
//! | `RUNTARA_BRIDGE_WORKER_NAME` | No | `default` | Worker name reported on activation |
//! | `RUNTARA_BRIDGE_MAX_JOBS_ACTIVE` | No | `32` | Jobs activated per poll |
//! | `RUNTARA_BRIDGE_JOB_TIMEOUT_SECS` | No | `300` | Lock timeout for activated jobs |
//! | `RUNTARA_BRIDGE_POLL_INTERVAL_MS` | No | `100` | Idle delay between polls |
//! | `RUNTARA_BRIDGE_REPLY_QUEUE_CAPACITY` | No | `1024` | Inbound reply queue capacity |
//! | `RUNTARA_BRIDGE_REPLY_WORKERS` | No | `4` | Number of reply workers |
//!
//! # Modules
//!
//! - [`config`]: Bridge configuration from environment variables
//! - [`correlation`]: Pending jobs keyed by correlation key
//! - [`consumer_registry`]: Dynamic consumers claimed or active per channel
//! - [`provisioner`]: Creates and binds inbound channels at runtime
//! - [`job_intake`]: Turns an activated job into an outbound message
//! - [`reply_handler`]: Completes the job matching an inbound reply
//! - [`reply_dispatcher`]: Bounded reply queue and its worker tasks
//! - [`worker_pool`]: Job activation workers
//! - [`runtime`]: Embeddable runtime wiring everything together
//! - [`engine`]: Workflow engine client trait and mock
//! - [`transport`]: Message bus trait and in-memory bus
//! - [`error`]: Error types with error code mapping

#![deny(missing_docs)]

/// Bridge configuration loaded from environment variables.
pub mod config;

/// Registry of dynamic reply consumers.
pub mod consumer_registry;

/// Correlation store for jobs awaiting a reply.
pub mod correlation;

/// Workflow engine client abstraction.
pub mod engine;

/// Error types with error code mapping.
pub mod error;

/// Job intake (validate, record, provision, publish).
pub mod job_intake;

/// Dynamic consumer provisioning.
pub mod provisioner;

/// Reply queue and reply worker tasks.
pub mod reply_dispatcher;

/// Reply resolution and job completion.
pub mod reply_handler;

/// Embeddable bridge runtime.
pub mod runtime;

/// Message transport abstraction.
pub mod transport;

/// Job activation workers.
pub mod worker_pool;

pub use config::Config;
pub use error::{Error, Result};
pub use runtime::BridgeRuntime;
