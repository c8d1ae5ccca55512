//! # Pipeline Runtime
//!
//! The owning object for the whole pipeline: queue store, handler registry,
//! event emitter, and one worker pool per named queue. Everything is wired
//! by explicit construction and passed by reference; there is no ambient or
//! global registry, and an incomplete handler map fails construction, not a
//! job at 3am.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::constants::{job_types, queues};
use crate::error::Result;
use crate::events::{EventEmitter, EventPublisher, PublishedEvent};
use crate::handlers::{
    AnalyticsHandler, EmailHandler, ImageHandler, PaymentHandler, PushHandler, SearchHandler,
    ShippingHandler,
};
use crate::persistence::MarketplaceStore;
use crate::queue::{DeadLetteredJob, Job, JobPayload, Priority, QueueStore};
use crate::registry::HandlerRegistry;
use crate::transport::{
    AnalyticsSink, CarrierClient, EmailSender, ImageProcessor, PaymentGateway, PushSender,
    SearchIndexer,
};
use crate::worker::QueueWorkerPool;

/// The outbound collaborators the handlers depend on
#[derive(Clone)]
pub struct Transports {
    pub email: Arc<dyn EmailSender>,
    pub push: Arc<dyn PushSender>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub carrier: Arc<dyn CarrierClient>,
    pub search: Arc<dyn SearchIndexer>,
    pub analytics: Arc<dyn AnalyticsSink>,
    pub images: Arc<dyn ImageProcessor>,
}

/// Owns the named queue handles and their worker pools
pub struct PipelineRuntime {
    queue_store: Arc<dyn QueueStore>,
    emitter: Arc<EventEmitter>,
    publisher: EventPublisher,
    pools: Vec<QueueWorkerPool>,
}

impl PipelineRuntime {
    /// Build the runtime: construct handlers, register them for every job
    /// type, validate the registry, and prepare one pool per queue.
    pub fn new(
        config: PipelineConfig,
        queue_store: Arc<dyn QueueStore>,
        store: Arc<dyn MarketplaceStore>,
        transports: Transports,
    ) -> Result<Self> {
        config.validate()?;

        let emitter = Arc::new(EventEmitter::new(
            queue_store.clone(),
            config.backoff.clone(),
        ));
        let publisher = EventPublisher::default();

        let payment = Arc::new(PaymentHandler::new(
            store.clone(),
            transports.gateway.clone(),
            emitter.clone(),
            config.payment.commission_rate,
        ));
        let shipping = Arc::new(ShippingHandler::new(
            store.clone(),
            transports.carrier.clone(),
            emitter.clone(),
            config.shipping.clone(),
        ));
        let email = Arc::new(EmailHandler::new(store.clone(), transports.email.clone()));
        let push = Arc::new(PushHandler::new(
            store.clone(),
            transports.push.clone(),
            config.notification.push_batch_size,
        ));
        let search = Arc::new(SearchHandler::new(transports.search.clone()));
        let analytics = Arc::new(AnalyticsHandler::new(transports.analytics.clone()));
        let image = Arc::new(ImageHandler::new(transports.images.clone()));

        let mut registry = HandlerRegistry::new();
        registry
            .register(queues::EMAIL, job_types::EMAIL_SEND, email)
            .register(queues::PUSH, job_types::PUSH_SEND, push)
            .register(
                queues::SHIPPING,
                job_types::SHIPPING_CREATE_SHIPMENT,
                shipping.clone(),
            )
            .register(
                queues::SHIPPING,
                job_types::SHIPPING_TRACK_UPDATE,
                shipping.clone(),
            )
            .register(queues::SHIPPING, job_types::SHIPPING_GENERATE_LABEL, shipping)
            .register(
                queues::PAYMENT,
                job_types::PAYMENT_PROCESS_WEBHOOK,
                payment.clone(),
            )
            .register(
                queues::PAYMENT,
                job_types::PAYMENT_RELEASE_ESCROW,
                payment.clone(),
            )
            .register(queues::PAYMENT, job_types::PAYMENT_REFUND, payment)
            .register(queues::SEARCH, job_types::SEARCH_INDEX, search.clone())
            .register(queues::SEARCH, job_types::SEARCH_DELETE, search)
            .register(queues::ANALYTICS, job_types::ANALYTICS_RECORD, analytics)
            .register(queues::IMAGE, job_types::IMAGE_PROCESS, image);
        registry.validate()?;
        let registry = Arc::new(registry);

        let pools = queues::ALL
            .iter()
            .map(|queue| {
                QueueWorkerPool::new(
                    *queue,
                    config.concurrency.for_queue(queue),
                    queue_store.clone(),
                    registry.clone(),
                    publisher.clone(),
                    config.worker.clone(),
                )
            })
            .collect();

        Ok(Self {
            queue_store,
            emitter,
            publisher,
            pools,
        })
    }

    /// Start every worker pool
    pub fn start(&mut self) {
        for pool in &mut self.pools {
            pool.start();
        }
        info!(pools = self.pools.len(), "pipeline runtime started");
    }

    /// Graceful shutdown: every pool stops dequeuing, in-flight jobs finish
    /// or time out, then the runtime returns. Pools drain concurrently.
    pub async fn shutdown(self) {
        futures::future::join_all(self.pools.into_iter().map(QueueWorkerPool::shutdown)).await;
        info!("pipeline runtime stopped");
    }

    /// The emitter business code calls after committing a state change
    pub fn emitter(&self) -> Arc<EventEmitter> {
        self.emitter.clone()
    }

    /// Subscribe to job lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.publisher.subscribe()
    }

    /// Intake for gateway callbacks: enqueue a reconciliation job rather
    /// than mutating state inline. The raw payload is kept opaque for audit.
    pub async fn enqueue_gateway_webhook(
        &self,
        provider_payment_id: Option<String>,
        conversation_id: Option<String>,
        reported_status: String,
        raw_payload: Value,
    ) -> Result<Uuid> {
        let job = Job::new(JobPayload::ProcessPaymentWebhook {
            provider_payment_id,
            conversation_id,
            reported_status,
            raw_payload,
        })
        .with_priority(Priority::High);
        Ok(self.queue_store.enqueue(job).await?)
    }

    /// Intake for carrier callbacks
    pub async fn enqueue_carrier_webhook(
        &self,
        tracking_number: String,
        carrier_status: String,
        location: Option<String>,
        raw_payload: Value,
    ) -> Result<Uuid> {
        let job = Job::new(JobPayload::TrackUpdate {
            tracking_number,
            carrier_status,
            location,
            raw_payload,
        });
        Ok(self.queue_store.enqueue(job).await?)
    }

    /// Operator surface: jobs held on a queue's dead-letter shelf
    pub async fn dead_letters(&self, queue: &str) -> Result<Vec<DeadLetteredJob>> {
        Ok(self.queue_store.dead_lettered(queue).await?)
    }
}
