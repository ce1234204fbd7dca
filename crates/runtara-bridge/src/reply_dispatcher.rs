// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reply dispatch.
//!
//! Provisioned consumers push `(channel, payload)` into one bounded queue.
//! A fixed pool of tasks drains it through the [`ReplyHandler`], so transport
//! tasks never run reply processing themselves.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::reply_handler::ReplyHandler;
use crate::transport::{InboundMessage, InboundSink};

/// Create the bounded inbound reply queue.
pub fn reply_queue(capacity: usize) -> (InboundSink, mpsc::Receiver<InboundMessage>) {
    mpsc::channel(capacity.max(1))
}

/// Pool of reply-processing tasks sharing one queue.
pub struct ReplyDispatcher {
    handles: Vec<JoinHandle<()>>,
}

impl ReplyDispatcher {
    /// Spawn `workers` tasks draining `receiver`.
    ///
    /// Tasks exit when the queue closes or `shutdown` turns true. On exit the
    /// queue is closed, so senders still held by bound channels get an error
    /// instead of waiting on a full queue nobody drains.
    pub fn spawn(
        handler: Arc<ReplyHandler>,
        receiver: mpsc::Receiver<InboundMessage>,
        workers: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));
        let handles = (0..workers.max(1))
            .map(|index| {
                tokio::spawn(run_reply_worker(
                    index,
                    handler.clone(),
                    receiver.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        Self { handles }
    }

    /// Number of reply tasks.
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Whether any reply task is still running.
    pub fn is_running(&self) -> bool {
        self.handles.iter().any(|h| !h.is_finished())
    }

    /// Wait for every reply task to exit.
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn next_message(
    receiver: &Mutex<mpsc::Receiver<InboundMessage>>,
) -> Option<InboundMessage> {
    receiver.lock().await.recv().await
}

async fn run_reply_worker(
    index: usize,
    handler: Arc<ReplyHandler>,
    receiver: Arc<Mutex<mpsc::Receiver<InboundMessage>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(worker = index, "Reply worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let message = tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }

            message = next_message(&receiver) => message,
        };

        match message {
            Some(message) => handler.process(&message).await,
            None => {
                info!(worker = index, "Reply queue closed");
                break;
            }
        }
    }

    receiver.lock().await.close();
    debug!(worker = index, "Reply worker stopped");
}
