// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end tests for the job-to-reply round trip over the in-memory bus.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::*;
use runtara_bridge::consumer_registry::ConsumerState;
use runtara_bridge::job_intake::{ConsumerStatus, IntakeError};
use runtara_bridge::transport::{
    ChannelHandle, InMemoryBus, InboundSink, MessageTransport, SubscriptionConfig, TransportError,
};
use serde_json::{Value, json};
use tokio::sync::Notify;

const REPLY_CHANNEL: &str = "order-7-response";
const REQUEST_CHANNEL: &str = "order-7-request";

#[tokio::test]
async fn test_job_round_trip() {
    let ctx = TestContext::new();

    let dispatch = ctx
        .intake
        .handle(&job(42, "order-7", json!({"corrId": "abc123", "amount": 10})))
        .await
        .expect("job should be accepted");

    assert_eq!(dispatch.correlation_key, "abc123");
    assert_eq!(dispatch.inbound_channel, REPLY_CHANNEL);
    assert_eq!(dispatch.outbound_channel, REQUEST_CHANNEL);
    assert_eq!(dispatch.consumer, ConsumerStatus::Provisioned);

    assert!(ctx.store.contains("abc123"));
    assert!(matches!(
        ctx.registry.state(REPLY_CHANNEL),
        Some(ConsumerState::Active(_))
    ));
    assert!(ctx.bus.is_bound(REPLY_CHANNEL).await);
    assert_eq!(
        ctx.bus.published_to(REQUEST_CHANNEL).await,
        vec![json!({"corrId": "abc123", "amount": 10})]
    );

    ctx.bus
        .deliver(REPLY_CHANNEL, &json!({"corrId": "abc123", "status": "ok"}))
        .await
        .unwrap();

    assert!(
        ctx.engine
            .wait_for_completions(1, Duration::from_secs(5))
            .await
    );
    let completions = ctx.engine.completions().await;
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].0, 42);
    assert_eq!(
        serde_json::Value::Object(completions[0].1.clone()),
        json!({"status": "ok"})
    );
    assert!(!ctx.store.contains("abc123"));

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_reply_completes_once() {
    let ctx = TestContext::new();

    ctx.intake
        .handle(&job(7, "order-7", json!({"corrId": "dup-1"})))
        .await
        .unwrap();

    let reply = json!({"corrId": "dup-1", "status": "ok"});
    ctx.bus.deliver(REPLY_CHANNEL, &reply).await.unwrap();
    ctx.bus.deliver(REPLY_CHANNEL, &reply).await.unwrap();

    assert!(
        ctx.engine
            .wait_for_completions(1, Duration::from_secs(5))
            .await
    );
    // Give the second reply time to be processed and dropped.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(ctx.engine.completions().await.len(), 1);
    assert_eq!(ctx.store.size(), 0);

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_replies_for_other_jobs_are_independent() {
    let ctx = TestContext::new();

    for (key, corr) in [(1, "a"), (2, "b"), (3, "c")] {
        ctx.intake
            .handle(&job(key, "order-7", json!({"corrId": corr})))
            .await
            .unwrap();
    }
    assert_eq!(ctx.store.size(), 3);
    assert_eq!(ctx.bus.create_calls(REPLY_CHANNEL).await, 1);

    ctx.bus
        .deliver(REPLY_CHANNEL, &json!({"corrId": "b", "result": 2}))
        .await
        .unwrap();
    // Unknown key and garbage are dropped without stopping the workers.
    ctx.bus
        .deliver(REPLY_CHANNEL, &json!({"corrId": "zzz"}))
        .await
        .unwrap();
    ctx.bus
        .deliver_raw(REPLY_CHANNEL, b"not json".to_vec())
        .await
        .unwrap();

    assert!(
        ctx.engine
            .wait_for_completions(1, Duration::from_secs(5))
            .await
    );
    assert!(ctx.store.contains("a"));
    assert!(!ctx.store.contains("b"));
    assert!(ctx.store.contains("c"));

    ctx.bus
        .deliver(REPLY_CHANNEL, &json!({"corrId": "c"}))
        .await
        .unwrap();
    assert!(
        ctx.engine
            .wait_for_completions(2, Duration::from_secs(5))
            .await
    );

    let keys: Vec<i64> = ctx
        .engine
        .completions()
        .await
        .iter()
        .map(|(key, _)| *key)
        .collect();
    assert_eq!(keys, vec![2, 3]);

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_jobs_share_one_consumer() {
    let ctx = TestContext::with_bus(
        InMemoryBus::with_bind_delay(Duration::from_millis(50)),
        test_config(),
    );

    let first = job(1, "order-7", json!({"corrId": "k1"}));
    let second = job(2, "order-7", json!({"corrId": "k2"}));
    let (a, b) = tokio::join!(ctx.intake.handle(&first), ctx.intake.handle(&second));
    let (a, b) = (a.unwrap(), b.unwrap());

    let mut statuses = vec![a.consumer, b.consumer];
    statuses.sort_by_key(|s| matches!(s, ConsumerStatus::AlreadyClaimed));
    assert_eq!(
        statuses,
        vec![ConsumerStatus::Provisioned, ConsumerStatus::AlreadyClaimed]
    );

    assert_eq!(ctx.bus.create_calls(REPLY_CHANNEL).await, 1);
    assert!(ctx.store.contains("k1"));
    assert!(ctx.store.contains("k2"));
    assert_eq!(ctx.bus.published_to(REQUEST_CHANNEL).await.len(), 2);
    assert_eq!(ctx.registry.len(), 1);

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_many_concurrent_jobs_provision_once() {
    let ctx = TestContext::with_bus(
        InMemoryBus::with_bind_delay(Duration::from_millis(20)),
        test_config(),
    );

    let jobs: Vec<_> = (0..16)
        .map(|i| job(i, "order-7", json!({"corrId": format!("k{}", i)})))
        .collect();
    let results = futures::future::join_all(jobs.iter().map(|j| ctx.intake.handle(j))).await;

    let provisioned = results
        .iter()
        .filter(|r| matches!(r, Ok(d) if d.consumer == ConsumerStatus::Provisioned))
        .count();
    assert_eq!(provisioned, 1);
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(ctx.bus.create_calls(REPLY_CHANNEL).await, 1);
    assert_eq!(ctx.store.size(), 16);
    assert_eq!(ctx.bus.published_to(REQUEST_CHANNEL).await.len(), 16);

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_provisioning_failure_rolls_back_claim() {
    let ctx = TestContext::new();
    ctx.bus.fail_bind_for(REPLY_CHANNEL).await;

    let dispatch = ctx
        .intake
        .handle(&job(1, "order-7", json!({"corrId": "k1"})))
        .await
        .expect("request is still published");

    assert_eq!(dispatch.consumer, ConsumerStatus::Failed);
    assert!(!ctx.registry.contains(REPLY_CHANNEL));
    assert!(!ctx.bus.is_bound(REPLY_CHANNEL).await);
    assert!(
        ctx.bus
            .unbind_calls()
            .await
            .contains(&REPLY_CHANNEL.to_string())
    );
    assert!(ctx.store.contains("k1"));
    assert_eq!(ctx.bus.published_to(REQUEST_CHANNEL).await.len(), 1);

    // The next job for the prefix retries provisioning.
    ctx.bus.clear_failures().await;
    let dispatch = ctx
        .intake
        .handle(&job(2, "order-7", json!({"corrId": "k2"})))
        .await
        .unwrap();
    assert_eq!(dispatch.consumer, ConsumerStatus::Provisioned);
    assert_eq!(ctx.bus.create_calls(REPLY_CHANNEL).await, 2);
    assert!(ctx.bus.is_bound(REPLY_CHANNEL).await);

    // The earlier job can now be completed too.
    ctx.bus
        .deliver(REPLY_CHANNEL, &json!({"corrId": "k1", "ok": true}))
        .await
        .unwrap();
    assert!(
        ctx.engine
            .wait_for_completions(1, Duration::from_secs(5))
            .await
    );
    assert_eq!(ctx.engine.completions().await[0].0, 1);

    ctx.shutdown().await;
}

/// Bus wrapper whose first bind fails and whose unbinds wait for the test.
struct PausingTransport {
    bus: InMemoryBus,
    fail_next_bind: AtomicBool,
    pause_unbinds: AtomicBool,
    unbind_started: Notify,
    unbind_resume: Notify,
}

impl PausingTransport {
    fn new(bus: InMemoryBus) -> Self {
        Self {
            bus,
            fail_next_bind: AtomicBool::new(true),
            pause_unbinds: AtomicBool::new(true),
            unbind_started: Notify::new(),
            unbind_resume: Notify::new(),
        }
    }
}

#[async_trait]
impl MessageTransport for PausingTransport {
    async fn publish(&self, channel: &str, payload: &Value) -> Result<(), TransportError> {
        self.bus.publish(channel, payload).await
    }

    async fn create_inbound_channel(
        &self,
        config: &SubscriptionConfig,
    ) -> Result<ChannelHandle, TransportError> {
        self.bus.create_inbound_channel(config).await
    }

    async fn bind(&self, handle: &ChannelHandle, sink: InboundSink) -> Result<(), TransportError> {
        if self.fail_next_bind.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Bind {
                channel: handle.destination.clone(),
                reason: "broker down".to_string(),
            });
        }
        self.bus.bind(handle, sink).await
    }

    async fn unbind(&self, channel: &str) -> Result<(), TransportError> {
        if self.pause_unbinds.load(Ordering::SeqCst) {
            self.unbind_started.notify_one();
            self.unbind_resume.notified().await;
        }
        self.bus.unbind(channel).await
    }
}

#[tokio::test]
async fn test_rollback_holds_claim_until_teardown_finishes() {
    let bus = InMemoryBus::new();
    let transport = Arc::new(PausingTransport::new(bus.clone()));
    let ctx = TestContext::with_transport(bus, transport.clone(), test_config());

    let intake = ctx.intake.clone();
    let mut failing = tokio::spawn(async move {
        intake
            .handle(&job(1, "order-7", json!({"corrId": "k1"})))
            .await
    });

    // Every teardown step of the failed job is raced by another job on the prefix.
    let mut competing_key = 100;
    let failed = loop {
        tokio::select! {
            result = &mut failing => break result.unwrap().unwrap(),
            _ = transport.unbind_started.notified() => {
                assert!(
                    ctx.registry.contains(REPLY_CHANNEL),
                    "claim released while the channel was still being torn down"
                );
                competing_key += 1;
                let competing = ctx
                    .intake
                    .handle(&job(
                        competing_key,
                        "order-7",
                        json!({"corrId": format!("k{}", competing_key)}),
                    ))
                    .await
                    .unwrap();
                assert_eq!(competing.consumer, ConsumerStatus::AlreadyClaimed);
                transport.unbind_resume.notify_one();
            }
        }
    };
    transport.pause_unbinds.store(false, Ordering::SeqCst);

    assert_eq!(failed.consumer, ConsumerStatus::Failed);
    assert!(!ctx.registry.contains(REPLY_CHANNEL));
    assert!(!ctx.bus.is_bound(REPLY_CHANNEL).await);

    let retry = ctx
        .intake
        .handle(&job(2, "order-7", json!({"corrId": "k2"})))
        .await
        .unwrap();
    assert_eq!(retry.consumer, ConsumerStatus::Provisioned);

    let active = matches!(
        ctx.registry.state(REPLY_CHANNEL),
        Some(ConsumerState::Active(_))
    );
    assert!(active);
    assert_eq!(active, ctx.bus.is_bound(REPLY_CHANNEL).await);

    // Replies for every job on the prefix still arrive.
    ctx.bus
        .deliver(REPLY_CHANNEL, &json!({"corrId": "k1"}))
        .await
        .unwrap();
    assert!(
        ctx.engine
            .wait_for_completions(1, Duration::from_secs(5))
            .await
    );

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_redelivered_job_retries_provisioning() {
    let ctx = TestContext::new();
    ctx.bus.fail_create_for(REPLY_CHANNEL).await;

    let redelivered = job(5, "order-7", json!({"corrId": "k5"}));
    let first = ctx.intake.handle(&redelivered).await.unwrap();
    assert_eq!(first.consumer, ConsumerStatus::Failed);

    ctx.bus.clear_failures().await;
    let second = ctx.intake.handle(&redelivered).await.unwrap();
    assert_eq!(second.consumer, ConsumerStatus::Provisioned);
    assert_eq!(ctx.store.size(), 1);
    assert_eq!(ctx.bus.published_to(REQUEST_CHANNEL).await.len(), 2);

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_missing_data_mutates_nothing() {
    let ctx = TestContext::new();

    let err = ctx
        .intake
        .handle(&job(1, "order-7", json!({"amount": 10})))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IntakeError::MissingCorrelationData { job_key: 1, ref field } if field == "corrId"
    ));

    let err = ctx
        .intake
        .handle(&job(2, "order-7", json!({"corrId": ""})))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "MISSING_CORRELATION_DATA");

    let err = ctx
        .intake
        .handle(&job(3, "", json!({"corrId": "k3"})))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IntakeError::MissingCorrelationData { job_key: 3, ref field } if field == "elementId"
    ));

    assert_eq!(ctx.store.size(), 0);
    assert!(ctx.registry.is_empty());
    assert!(ctx.bus.published().await.is_empty());
    assert_eq!(ctx.bus.create_calls(REPLY_CHANNEL).await, 0);

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_key_from_other_job_is_rejected() {
    let ctx = TestContext::new();

    ctx.intake
        .handle(&job(1, "order-7", json!({"corrId": "same"})))
        .await
        .unwrap();
    let err = ctx
        .intake
        .handle(&job(2, "order-7", json!({"corrId": "same"})))
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "DUPLICATE_KEY");
    assert_eq!(ctx.store.take("same").map(|p| p.job_key), Some(1));
    assert_eq!(ctx.bus.published_to(REQUEST_CHANNEL).await.len(), 1);

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_completion_rejected_by_engine_consumes_entry() {
    let ctx = TestContext::new();
    ctx.engine.set_reject_completions(true);

    ctx.intake
        .handle(&job(9, "order-7", json!({"corrId": "k9"})))
        .await
        .unwrap();
    ctx.bus
        .deliver(REPLY_CHANNEL, &json!({"corrId": "k9"}))
        .await
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(5), || !ctx.store.contains("k9")).await,
        "entry should be taken even when completion fails"
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(ctx.engine.completions().await.is_empty());

    ctx.shutdown().await;
}
