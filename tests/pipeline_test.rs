//! End-to-end pipeline tests over the in-memory queue store, in-memory
//! marketplace store, and recording transports: webhook reconciliation,
//! duplicate delivery, the full paid/shipped/delivered/settled cascade,
//! fan-out independence, and the no-device-token push outcome.

use std::sync::Arc;
use std::time::Duration;

use fulfillment_core::config::{BackoffConfig, PipelineConfig, WorkerConfig};
use fulfillment_core::constants::lifecycle_events;
use fulfillment_core::events::{DomainEvent, EventEmitter, OrderEventPayload};
use fulfillment_core::models::{NewOrder, NewPayment, Order, UserContact};
use fulfillment_core::persistence::{InMemoryMarketplaceStore, MarketplaceStore};
use fulfillment_core::queue::{InMemoryQueueStore, Job, JobPayload, QueueStore};
use fulfillment_core::runtime::{PipelineRuntime, Transports};
use fulfillment_core::state::{OrderStatus, ShipmentStatus};
use fulfillment_core::test_helpers::*;
use uuid::Uuid;

struct Pipeline {
    runtime: PipelineRuntime,
    queue: Arc<InMemoryQueueStore>,
    store: Arc<InMemoryMarketplaceStore>,
    email: Arc<RecordingEmailSender>,
    push: Arc<RecordingPushSender>,
    carrier: Arc<RecordingCarrier>,
    analytics: Arc<RecordingAnalyticsSink>,
}

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        worker: WorkerConfig {
            handler_timeout_ms: 2_000,
            poll_interval_ms: 10,
            shutdown_grace_ms: 2_000,
        },
        backoff: BackoffConfig {
            base_delay_ms: 10,
            max_attempts: 3,
        },
        ..PipelineConfig::default()
    }
}

fn build_pipeline() -> Pipeline {
    let queue = Arc::new(InMemoryQueueStore::new());
    let store = Arc::new(InMemoryMarketplaceStore::new());
    let email = Arc::new(RecordingEmailSender::default());
    let push = Arc::new(RecordingPushSender::default());
    let carrier = Arc::new(RecordingCarrier::default());
    let analytics = Arc::new(RecordingAnalyticsSink::default());

    let transports = Transports {
        email: email.clone(),
        push: push.clone(),
        gateway: Arc::new(RecordingGateway::default()),
        carrier: carrier.clone(),
        search: Arc::new(RecordingSearchIndexer::default()),
        analytics: analytics.clone(),
        images: Arc::new(RecordingImageProcessor::default()),
    };

    let runtime = PipelineRuntime::new(fast_config(), queue.clone(), store.clone(), transports)
        .expect("runtime construction");

    Pipeline {
        runtime,
        queue,
        store,
        email,
        push,
        carrier,
        analytics,
    }
}

async fn seed_order(store: &InMemoryMarketplaceStore) -> (Order, Uuid, Uuid) {
    let buyer_id = Uuid::new_v4();
    let seller_id = Uuid::new_v4();
    store
        .upsert_contact(UserContact {
            user_id: buyer_id,
            email: Some("buyer@example.com".to_string()),
            device_token: Some("buyer-device".to_string()),
        })
        .await
        .unwrap();
    store
        .upsert_contact(UserContact {
            user_id: seller_id,
            email: Some("seller@example.com".to_string()),
            device_token: Some("seller-device".to_string()),
        })
        .await
        .unwrap();

    let order = store
        .create_order(NewOrder {
            listing_id: Uuid::new_v4(),
            buyer_id,
            seller_id,
            amount_cents: 80_000,
        })
        .await
        .unwrap();
    (order, buyer_id, seller_id)
}

async fn seed_payment(store: &InMemoryMarketplaceStore, order: &Order) {
    store
        .create_payment(NewPayment {
            order_id: order.order_id,
            amount_cents: order.amount_cents,
            provider_payment_id: Some("pay_e2e".to_string()),
            conversation_id: Some("conv_e2e".to_string()),
        })
        .await
        .unwrap();
}

async fn wait_for_order_status(
    store: &InMemoryMarketplaceStore,
    order_id: Uuid,
    status: OrderStatus,
) {
    for _ in 0..500 {
        let order = store.find_order(order_id).await.unwrap().unwrap();
        if order.status == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let order = store.find_order(order_id).await.unwrap().unwrap();
    panic!("order never reached {status}, stuck at {}", order.status);
}

async fn drain(queue: &InMemoryQueueStore, queues: &[&str]) {
    for _ in 0..500 {
        let mut total = 0;
        for q in queues {
            total += queue.depth(q).await.unwrap();
        }
        if total == 0 {
            // One extra poll interval so in-flight jobs resolve
            tokio::time::sleep(Duration::from_millis(50)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("queues never drained");
}

#[tokio::test]
async fn test_webhook_success_pays_order_and_creates_exactly_one_shipment() {
    let mut p = build_pipeline();
    let (order, _, _) = seed_order(&p.store).await;
    seed_payment(&p.store, &order).await;
    p.runtime.start();

    p.runtime
        .enqueue_gateway_webhook(
            Some("pay_e2e".to_string()),
            None,
            "SUCCESS".to_string(),
            serde_json::json!({"signature": "opaque"}),
        )
        .await
        .unwrap();

    // Payment completed, order paid, then the fan-out ships it
    wait_for_order_status(&p.store, order.order_id, OrderStatus::Shipped).await;

    let shipment = p
        .store
        .find_shipment_by_order(order.order_id)
        .await
        .unwrap()
        .expect("shipment created");
    assert!(shipment.tracking_number.starts_with("AR"));
    assert_eq!(p.carrier.created().len(), 1);

    p.runtime.shutdown().await;
}

#[tokio::test]
async fn test_redelivered_webhook_changes_nothing() {
    let mut p = build_pipeline();
    let (order, _, _) = seed_order(&p.store).await;
    seed_payment(&p.store, &order).await;
    p.runtime.start();

    for _ in 0..2 {
        p.runtime
            .enqueue_gateway_webhook(
                Some("pay_e2e".to_string()),
                None,
                "SUCCESS".to_string(),
                serde_json::json!({}),
            )
            .await
            .unwrap();
    }

    wait_for_order_status(&p.store, order.order_id, OrderStatus::Shipped).await;
    drain(&p.queue, &["payment", "shipping"]).await;

    // No second shipment, no second carrier registration
    assert_eq!(p.carrier.created().len(), 1);
    assert!(p
        .queue
        .dead_lettered("payment")
        .await
        .unwrap()
        .is_empty());

    p.runtime.shutdown().await;
}

#[tokio::test]
async fn test_full_cascade_from_payment_to_settled_commission() {
    let mut p = build_pipeline();
    let (order, _, _) = seed_order(&p.store).await;
    seed_payment(&p.store, &order).await;
    p.runtime.start();

    p.runtime
        .enqueue_gateway_webhook(
            Some("pay_e2e".to_string()),
            None,
            "SUCCESS".to_string(),
            serde_json::json!({}),
        )
        .await
        .unwrap();
    wait_for_order_status(&p.store, order.order_id, OrderStatus::Shipped).await;

    let shipment = p
        .store
        .find_shipment_by_order(order.order_id)
        .await
        .unwrap()
        .unwrap();
    p.runtime
        .enqueue_carrier_webhook(
            shipment.tracking_number.clone(),
            "DELIVERED".to_string(),
            Some("Kadikoy".to_string()),
            serde_json::json!({"carrier": "raw"}),
        )
        .await
        .unwrap();

    // Delivery advances the order; escrow release settles it
    wait_for_order_status(&p.store, order.order_id, OrderStatus::Completed).await;

    let settled = p.store.find_order(order.order_id).await.unwrap().unwrap();
    assert_eq!(settled.commission_cents, Some(8_000)); // 10% of 80000

    let shipment = p
        .store
        .find_shipment_by_order(order.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(shipment.status, ShipmentStatus::Delivered);
    let history = p.store.shipment_events(shipment.shipment_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].carrier_status, "DELIVERED");

    drain(&p.queue, &["email", "push", "analytics"]).await;

    // Buyer got receipt, shipped, and delivered mails
    let subjects: Vec<String> = p.email.sent().iter().map(|m| m.subject.clone()).collect();
    assert!(subjects.contains(&"Payment confirmed".to_string()));
    assert!(subjects.contains(&"Your order is on the way".to_string()));
    assert!(subjects.contains(&"Your order arrived".to_string()));

    // paid, shipped, delivered metrics landed
    assert_eq!(p.analytics.records().len(), 3);

    p.runtime.shutdown().await;
}

#[tokio::test]
async fn test_push_without_device_token_is_skipped_not_retried() {
    let mut p = build_pipeline();
    let mut lifecycle = p.runtime.subscribe();
    p.runtime.start();

    let user_without_token = Uuid::new_v4();
    p.queue
        .enqueue(Job::new(JobPayload::SendPush {
            user_id: user_without_token,
            title: "hello".to_string(),
            body: "anyone there?".to_string(),
            data: serde_json::json!({}),
        }))
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = lifecycle.recv().await.unwrap();
            if event.name == lifecycle_events::JOB_SKIPPED {
                return event;
            }
        }
    })
    .await
    .expect("job.skipped published");

    assert!(event.context["reason"]
        .as_str()
        .unwrap()
        .contains("no device token"));
    assert!(p.push.batches().is_empty());
    assert!(p.queue.dead_lettered("push").await.unwrap().is_empty());

    p.runtime.shutdown().await;
}

#[tokio::test]
async fn test_fan_out_survives_one_unavailable_queue() {
    let inner = Arc::new(InMemoryQueueStore::new());
    let store: Arc<dyn QueueStore> = Arc::new(PartiallyUnavailableQueueStore::new(
        inner.clone(),
        &["email"],
    ));
    let emitter = EventEmitter::new(store, BackoffConfig::default());

    let summary = emitter
        .emit(DomainEvent::OrderPaid(OrderEventPayload {
            order_id: Uuid::new_v4(),
            listing_id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            amount_cents: 10_000,
        }))
        .await;

    // The email enqueue failed; the other three landed anyway
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.enqueued, 3);
    assert_eq!(inner.depth("push").await.unwrap(), 1);
    assert_eq!(inner.depth("shipping").await.unwrap(), 1);
    assert_eq!(inner.depth("analytics").await.unwrap(), 1);
}

#[tokio::test]
async fn test_flaky_transport_yields_exactly_one_side_effect() {
    let queue = Arc::new(InMemoryQueueStore::new());
    let store = Arc::new(InMemoryMarketplaceStore::new());
    let flaky_email = Arc::new(FlakyEmailSender::failing_first(2));

    let transports = Transports {
        email: flaky_email.clone(),
        push: Arc::new(RecordingPushSender::default()),
        gateway: Arc::new(RecordingGateway::default()),
        carrier: Arc::new(RecordingCarrier::default()),
        search: Arc::new(RecordingSearchIndexer::default()),
        analytics: Arc::new(RecordingAnalyticsSink::default()),
        images: Arc::new(RecordingImageProcessor::default()),
    };
    let mut runtime =
        PipelineRuntime::new(fast_config(), queue.clone(), store.clone(), transports).unwrap();

    let user_id = Uuid::new_v4();
    store
        .upsert_contact(UserContact {
            user_id,
            email: Some("flaky@example.com".to_string()),
            device_token: None,
        })
        .await
        .unwrap();

    runtime.start();
    queue
        .enqueue(
            Job::new(JobPayload::SendEmail {
                user_id,
                template: "order_confirmation".to_string(),
                data: serde_json::json!({"order_id": "o-1"}),
            })
            .with_retry_policy(
                3,
                fulfillment_core::BackoffPolicy::Fixed { delay_ms: 10 },
            ),
        )
        .await
        .unwrap();

    for _ in 0..500 {
        if flaky_email.sent().len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    runtime.shutdown().await;

    // Two transient failures, then exactly one delivered message
    assert_eq!(flaky_email.calls(), 3);
    assert_eq!(flaky_email.sent().len(), 1);
    assert!(queue.dead_lettered("email").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_exhausted_email_job_is_dead_lettered_with_attempt_count() {
    let queue = Arc::new(InMemoryQueueStore::new());
    let store = Arc::new(InMemoryMarketplaceStore::new());
    let flaky_email = Arc::new(FlakyEmailSender::failing_first(u32::MAX));

    let transports = Transports {
        email: flaky_email.clone(),
        push: Arc::new(RecordingPushSender::default()),
        gateway: Arc::new(RecordingGateway::default()),
        carrier: Arc::new(RecordingCarrier::default()),
        search: Arc::new(RecordingSearchIndexer::default()),
        analytics: Arc::new(RecordingAnalyticsSink::default()),
        images: Arc::new(RecordingImageProcessor::default()),
    };
    let mut runtime =
        PipelineRuntime::new(fast_config(), queue.clone(), store.clone(), transports).unwrap();

    let user_id = Uuid::new_v4();
    store
        .upsert_contact(UserContact {
            user_id,
            email: Some("unlucky@example.com".to_string()),
            device_token: None,
        })
        .await
        .unwrap();

    runtime.start();
    queue
        .enqueue(
            Job::new(JobPayload::SendEmail {
                user_id,
                template: "order_confirmation".to_string(),
                data: serde_json::json!({}),
            })
            .with_retry_policy(
                3,
                fulfillment_core::BackoffPolicy::Fixed { delay_ms: 10 },
            ),
        )
        .await
        .unwrap();

    for _ in 0..500 {
        if !queue.dead_lettered("email").await.unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    runtime.shutdown().await;

    let dead = queue.dead_lettered("email").await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].job.attempts, 3);
    assert!(dead[0].reason.contains("smtp connection reset"));
    // Dead-lettered, not retried indefinitely
    assert_eq!(flaky_email.calls(), 3);
}

#[tokio::test]
async fn test_out_of_order_jobs_never_regress_an_order() {
    let mut p = build_pipeline();
    let (order, _, _) = seed_order(&p.store).await;
    seed_payment(&p.store, &order).await;
    p.runtime.start();

    p.runtime
        .enqueue_gateway_webhook(
            Some("pay_e2e".to_string()),
            None,
            "SUCCESS".to_string(),
            serde_json::json!({}),
        )
        .await
        .unwrap();
    wait_for_order_status(&p.store, order.order_id, OrderStatus::Shipped).await;

    // A delayed duplicate of the pay fan-out arrives after shipping
    p.runtime
        .enqueue_gateway_webhook(
            Some("pay_e2e".to_string()),
            None,
            "SUCCESS".to_string(),
            serde_json::json!({}),
        )
        .await
        .unwrap();
    drain(&p.queue, &["payment", "shipping"]).await;

    let stored = p.store.find_order(order.order_id).await.unwrap().unwrap();
    // Still shipped (or later), never back to paid
    assert!(matches!(
        stored.status,
        OrderStatus::Shipped | OrderStatus::Delivered | OrderStatus::Completed
    ));

    p.runtime.shutdown().await;
}

#[tokio::test]
async fn test_unknown_payment_webhook_reaches_the_dead_letter_shelf() {
    let mut p = build_pipeline();
    p.runtime.start();

    p.runtime
        .enqueue_gateway_webhook(
            Some("pay_never_created".to_string()),
            None,
            "SUCCESS".to_string(),
            serde_json::json!({}),
        )
        .await
        .unwrap();

    for _ in 0..500 {
        if !p.runtime.dead_letters("payment").await.unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let dead = p.runtime.dead_letters("payment").await.unwrap();
    assert_eq!(dead.len(), 1);
    assert!(dead[0].reason.contains("payment not found"));

    p.runtime.shutdown().await;
}
