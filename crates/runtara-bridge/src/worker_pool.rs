// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Job worker pool.
//!
//! A fixed number of tasks, each independently polling the engine for
//! activations and running [`JobIntake`] on every job up to the point of
//! publish. Per-job errors fail the job on the engine and never stop a
//! worker; the engine's retry policy decides what happens next.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::engine::{ActivateJobsRequest, ActivatedJob, WorkflowEngine};
use crate::job_intake::{IntakeError, JobIntake};

/// Job worker pool configuration.
#[derive(Debug, Clone)]
pub struct JobWorkerConfig {
    /// Job type to activate
    pub job_type: String,
    /// Worker name recorded by the engine
    pub worker_name: String,
    /// Jobs activated per poll
    pub max_jobs_active: u32,
    /// Lock timeout for activated jobs
    pub job_timeout: Duration,
    /// Delay between polls when idle or after an activation error
    pub poll_interval: Duration,
    /// Number of worker tasks
    pub concurrency: usize,
}

impl JobWorkerConfig {
    /// Derive the pool settings, falling back to the engine's thread count.
    pub fn from_config(config: &Config, engine_threads: usize) -> Self {
        Self {
            job_type: config.job_type.clone(),
            worker_name: config.worker_name.clone(),
            max_jobs_active: config.max_jobs_active,
            job_timeout: config.job_timeout,
            poll_interval: config.poll_interval,
            concurrency: config.worker_concurrency.unwrap_or(engine_threads).max(1),
        }
    }

    fn activation_request(&self) -> ActivateJobsRequest {
        ActivateJobsRequest {
            job_type: self.job_type.clone(),
            worker: self.worker_name.clone(),
            max_jobs: self.max_jobs_active,
            timeout: self.job_timeout,
        }
    }
}

/// Running job workers.
pub struct JobWorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl JobWorkerPool {
    /// Spawn `config.concurrency` job workers.
    pub fn spawn(
        engine: Arc<dyn WorkflowEngine>,
        intake: Arc<JobIntake>,
        config: JobWorkerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let config = Arc::new(config);
        let handles = (0..config.concurrency)
            .map(|index| {
                tokio::spawn(run_job_worker(
                    index,
                    engine.clone(),
                    intake.clone(),
                    config.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        Self { handles }
    }

    /// Number of worker tasks.
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Whether any worker is still running.
    pub fn is_running(&self) -> bool {
        self.handles.iter().any(|h| !h.is_finished())
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

/// Run intake for one job and fail it on the engine if it is rejected.
pub async fn process_job(engine: &dyn WorkflowEngine, intake: &JobIntake, job: &ActivatedJob) {
    let Err(e) = intake.handle(job).await else {
        return;
    };

    match &e {
        IntakeError::Publish { .. } => {
            error!(job_key = job.key, code = e.error_code(), error = %e, "Job request not published");
        }
        _ => {
            warn!(job_key = job.key, code = e.error_code(), error = %e, "Rejecting job");
        }
    }

    if let Err(fail_err) = engine.fail_job(job.key, &e.to_string()).await {
        error!(job_key = job.key, error = %fail_err, "Failed to report job failure");
    }
}

/// Sleep for `duration` unless shutdown is signalled first. Returns true on shutdown.
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        _ = tokio::time::sleep(duration) => false,
    }
}

async fn run_job_worker(
    index: usize,
    engine: Arc<dyn WorkflowEngine>,
    intake: Arc<JobIntake>,
    config: Arc<JobWorkerConfig>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        worker = index,
        job_type = %config.job_type,
        name = %config.worker_name,
        max_jobs_active = config.max_jobs_active,
        "Job worker started"
    );

    let request = config.activation_request();

    loop {
        if *shutdown.borrow() {
            break;
        }

        let activated = tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }

            activated = engine.activate_jobs(&request) => activated,
        };

        match activated {
            Ok(jobs) if jobs.is_empty() => {
                if pause(config.poll_interval, &mut shutdown).await {
                    break;
                }
            }
            Ok(jobs) => {
                debug!(worker = index, count = jobs.len(), "Jobs activated");
                for job in &jobs {
                    process_job(engine.as_ref(), &intake, job).await;
                }
            }
            Err(e) => {
                warn!(worker = index, error = %e, "Failed to activate jobs");
                if pause(config.poll_interval, &mut shutdown).await {
                    break;
                }
            }
        }
    }

    info!(worker = index, "Job worker stopped");
}
