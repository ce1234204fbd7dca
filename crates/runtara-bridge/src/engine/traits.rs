// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow engine trait definitions.
//!
//! Defines the abstract interface the bridge uses to activate jobs and
//! report their outcome. Job timeouts, retries and redelivery are owned by
//! the engine behind this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

/// Errors from workflow engine operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The job is unknown to the engine, or already completed/timed out.
    #[error("Job {0} not found")]
    JobNotFound(i64),

    /// The engine refused the command.
    #[error("Command rejected: {0}")]
    Rejected(String),

    /// The engine could not be reached.
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// A job handed to this bridge by the workflow engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivatedJob {
    /// Key used to complete or fail this specific job
    pub key: i64,
    /// Key of the originating workflow instance
    pub process_instance_key: i64,
    /// Id of the workflow element that created the job
    pub element_id: String,
    /// Job type the job was activated for
    pub job_type: String,
    /// Job input variables
    #[serde(default)]
    pub variables: Map<String, Value>,
}

impl ActivatedJob {
    /// Look up a variable that must be a non-empty string.
    pub fn string_variable(&self, name: &str) -> Option<&str> {
        self.variables
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Parameters for a single activation poll.
#[derive(Debug, Clone)]
pub struct ActivateJobsRequest {
    /// Job type to activate
    pub job_type: String,
    /// Worker name recorded by the engine
    pub worker: String,
    /// Maximum number of jobs to activate
    pub max_jobs: u32,
    /// How long activated jobs stay locked to this worker
    pub timeout: Duration,
}

/// Trait for workflow engine clients.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Activate up to `request.max_jobs` jobs of the requested type.
    ///
    /// Returns an empty vector when nothing is available.
    async fn activate_jobs(&self, request: &ActivateJobsRequest) -> Result<Vec<ActivatedJob>>;

    /// Report successful completion of a job with its output variables.
    async fn complete_job(&self, job_key: i64, variables: Map<String, Value>) -> Result<()>;

    /// Report that a job could not be handled.
    async fn fail_job(&self, job_key: i64, error_message: &str) -> Result<()>;

    /// Number of job-execution threads the engine client is configured with.
    ///
    /// Used as the default worker concurrency.
    fn execution_threads(&self) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(variables: Value) -> ActivatedJob {
        ActivatedJob {
            key: 1,
            process_instance_key: 2,
            element_id: "order-7".to_string(),
            job_type: "pay".to_string(),
            variables: variables.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_string_variable() {
        let job = job(json!({"corrId": "abc123", "empty": "", "amount": 10}));

        assert_eq!(job.string_variable("corrId"), Some("abc123"));
        assert_eq!(job.string_variable("empty"), None);
        assert_eq!(job.string_variable("amount"), None);
        assert_eq!(job.string_variable("missing"), None);
    }

    #[test]
    fn test_activated_job_deserialize_without_variables() {
        let job: ActivatedJob = serde_json::from_value(json!({
            "key": 10,
            "process_instance_key": 20,
            "element_id": "order-7",
            "job_type": "pay"
        }))
        .unwrap();

        assert!(job.variables.is_empty());
        assert_eq!(job.element_id, "order-7");
    }

    #[test]
    fn test_engine_error_display() {
        assert_eq!(EngineError::JobNotFound(42).to_string(), "Job 42 not found");
        assert_eq!(
            EngineError::Rejected("already completed".to_string()).to_string(),
            "Command rejected: already completed"
        );
    }
}
