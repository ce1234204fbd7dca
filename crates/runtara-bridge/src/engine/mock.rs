// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock workflow engine for testing.
//!
//! Hands out queued jobs on activation and records every completion and
//! failure reported back, without talking to a real engine.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use super::traits::*;

#[derive(Debug, Default)]
struct MockState {
    queued: VecDeque<ActivatedJob>,
    completed_keys: HashSet<i64>,
    completions: Vec<(i64, Map<String, Value>)>,
    failures: Vec<(i64, String)>,
}

/// Mock engine for testing.
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
    /// If true, every completion is rejected by the engine
    reject_completions: AtomicBool,
    activation_calls: AtomicUsize,
    execution_threads: usize,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Create a new mock engine with one execution thread.
    pub fn new() -> Self {
        Self::with_execution_threads(1)
    }

    /// Create a mock engine reporting the given number of execution threads.
    pub fn with_execution_threads(execution_threads: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            reject_completions: AtomicBool::new(false),
            activation_calls: AtomicUsize::new(0),
            execution_threads,
        }
    }

    /// Queue a job for the next activation poll.
    pub async fn enqueue(&self, job: ActivatedJob) {
        self.state.lock().await.queued.push_back(job);
    }

    /// Make subsequent completions fail with [`EngineError::Rejected`].
    pub fn set_reject_completions(&self, reject: bool) {
        self.reject_completions.store(reject, Ordering::SeqCst);
    }

    /// Completions accepted so far, in order.
    pub async fn completions(&self) -> Vec<(i64, Map<String, Value>)> {
        self.state.lock().await.completions.clone()
    }

    /// Failures reported so far, in order.
    pub async fn failures(&self) -> Vec<(i64, String)> {
        self.state.lock().await.failures.clone()
    }

    /// Jobs still waiting to be activated.
    pub async fn queued(&self) -> usize {
        self.state.lock().await.queued.len()
    }

    /// Number of `activate_jobs` calls served.
    pub fn activation_calls(&self) -> usize {
        self.activation_calls.load(Ordering::SeqCst)
    }

    /// Poll until at least `count` completions were recorded or `timeout` elapses.
    pub async fn wait_for_completions(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| state.completions.len() >= count)
            .await
    }

    /// Poll until at least `count` failures were recorded or `timeout` elapses.
    pub async fn wait_for_failures(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| state.failures.len() >= count)
            .await
    }

    async fn wait_until(&self, timeout: Duration, done: impl Fn(&MockState) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if done(&*self.state.lock().await) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl WorkflowEngine for MockEngine {
    async fn activate_jobs(&self, request: &ActivateJobsRequest) -> Result<Vec<ActivatedJob>> {
        self.activation_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock().await;
        let mut jobs = Vec::new();
        while jobs.len() < request.max_jobs as usize {
            match state.queued.pop_front() {
                Some(job) if job.job_type == request.job_type => jobs.push(job),
                Some(other) => {
                    // Not ours; put it back and stop scanning.
                    state.queued.push_front(other);
                    break;
                }
                None => break,
            }
        }
        Ok(jobs)
    }

    async fn complete_job(&self, job_key: i64, variables: Map<String, Value>) -> Result<()> {
        if self.reject_completions.load(Ordering::SeqCst) {
            return Err(EngineError::Rejected(format!(
                "completion of job {} rejected",
                job_key
            )));
        }

        let mut state = self.state.lock().await;
        if !state.completed_keys.insert(job_key) {
            return Err(EngineError::JobNotFound(job_key));
        }
        state.completions.push((job_key, variables));
        Ok(())
    }

    async fn fail_job(&self, job_key: i64, error_message: &str) -> Result<()> {
        self.state
            .lock()
            .await
            .failures
            .push((job_key, error_message.to_string()));
        Ok(())
    }

    fn execution_threads(&self) -> usize {
        self.execution_threads
    }
}
