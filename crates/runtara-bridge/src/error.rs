// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for runtara-bridge.
//!
//! Each concern has its own error enum next to the code that raises it; this
//! module gathers them into one type for callers that embed the bridge.

use thiserror::Error;

/// Bridge errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// An activated job was rejected.
    #[error("Intake error: {0}")]
    Intake(#[from] crate::job_intake::IntakeError),

    /// The correlation store refused an entry.
    #[error("Correlation error: {0}")]
    Correlation(#[from] crate::correlation::CorrelationError),

    /// A dynamic consumer could not be provisioned.
    #[error(transparent)]
    Provision(#[from] crate::provisioner::ProvisionError),

    /// A reply could not be resolved.
    #[error("Reply error: {0}")]
    Reply(#[from] crate::reply_handler::ReplyError),

    /// The workflow engine failed.
    #[error("Engine error: {0}")]
    Engine(#[from] crate::engine::EngineError),

    /// The message transport failed.
    #[error("Transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    /// The runtime was assembled without a required component.
    #[error("Missing runtime component: {0}")]
    MissingComponent(&'static str),
}

impl Error {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Intake(e) => e.error_code(),
            Self::Correlation(_) => "DUPLICATE_KEY",
            Self::Provision(_) => "PROVISION_FAILED",
            Self::Reply(e) => e.error_code(),
            Self::Engine(_) => "ENGINE_ERROR",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::MissingComponent(_) => "MISSING_COMPONENT",
        }
    }
}

/// Result type using the bridge Error.
pub type Result<T> = std::result::Result<T, Error>;
