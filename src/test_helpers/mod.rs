//! # Test Helpers
//!
//! Recording fakes for every outbound transport, plus a flaky sender and a
//! selectively failing queue store for exercising retry and partial-failure
//! paths. Compiled into the library so downstream crates can drive the
//! pipeline in their own tests without a database or live providers.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::queue::{DeadLetteredJob, Job, QueueError, QueueStore};
use crate::transport::{
    AnalyticsSink, CarrierClient, EmailSender, ImageProcessor, PaymentGateway, PushMessage,
    PushSender, PushTicket, PushTicketStatus, SearchIndexer, TrackingSnapshot, TransportError,
};

/// One captured outbound email
#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: Option<String>,
}

#[derive(Debug, Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<SentEmail>>,
}

impl RecordingEmailSender {
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        text_body: Option<&str>,
    ) -> Result<String, TransportError> {
        self.sent.lock().push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            html_body: html_body.to_string(),
            text_body: text_body.map(str::to_string),
        });
        Ok(format!("msg-{}", Uuid::new_v4().simple()))
    }
}

/// Email sender that fails its first `fail_first` calls with a transient
/// error, then succeeds; for retry/backoff tests
#[derive(Debug)]
pub struct FlakyEmailSender {
    inner: RecordingEmailSender,
    fail_first: u32,
    calls: AtomicU32,
}

impl FlakyEmailSender {
    pub fn failing_first(fail_first: u32) -> Self {
        Self {
            inner: RecordingEmailSender::default(),
            fail_first,
            calls: AtomicU32::new(0),
        }
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.inner.sent()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmailSender for FlakyEmailSender {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        text_body: Option<&str>,
    ) -> Result<String, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(TransportError::Unavailable(format!(
                "smtp connection reset (call {call})"
            )));
        }
        self.inner.send(to, subject, html_body, text_body).await
    }
}

#[derive(Debug, Default)]
pub struct RecordingPushSender {
    batches: Mutex<Vec<Vec<PushMessage>>>,
}

impl RecordingPushSender {
    pub fn batches(&self) -> Vec<Vec<PushMessage>> {
        self.batches.lock().clone()
    }
}

#[async_trait]
impl PushSender for RecordingPushSender {
    async fn send_batch(
        &self,
        messages: &[PushMessage],
    ) -> Result<Vec<PushTicket>, TransportError> {
        self.batches.lock().push(messages.to_vec());
        Ok(messages
            .iter()
            .map(|_| PushTicket {
                status: PushTicketStatus::Ok,
                detail: None,
            })
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct RecordingGateway {
    refunds: Mutex<Vec<(String, i64)>>,
}

impl RecordingGateway {
    pub fn refunds(&self) -> Vec<(String, i64)> {
        self.refunds.lock().clone()
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn refund(
        &self,
        provider_payment_id: &str,
        amount_cents: i64,
    ) -> Result<(), TransportError> {
        self.refunds
            .lock()
            .push((provider_payment_id.to_string(), amount_cents));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingCarrier {
    created: Mutex<Vec<String>>,
    labels: Mutex<Vec<String>>,
}

impl RecordingCarrier {
    pub fn created(&self) -> Vec<String> {
        self.created.lock().clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.labels.lock().clone()
    }
}

#[async_trait]
impl CarrierClient for RecordingCarrier {
    async fn create_shipment(
        &self,
        _order_id: Uuid,
        tracking_number: &str,
    ) -> Result<(), TransportError> {
        self.created.lock().push(tracking_number.to_string());
        Ok(())
    }

    async fn fetch_tracking(
        &self,
        _tracking_number: &str,
    ) -> Result<TrackingSnapshot, TransportError> {
        Ok(TrackingSnapshot {
            status: "IN_TRANSIT".to_string(),
            location: None,
        })
    }

    async fn generate_label(&self, tracking_number: &str) -> Result<String, TransportError> {
        let label = format!("label://{tracking_number}");
        self.labels.lock().push(label.clone());
        Ok(label)
    }
}

#[derive(Debug, Default)]
pub struct RecordingSearchIndexer {
    upserts: Mutex<Vec<(String, Uuid, Value)>>,
    deletes: Mutex<Vec<(String, Uuid)>>,
}

impl RecordingSearchIndexer {
    pub fn upserts(&self) -> Vec<(String, Uuid, Value)> {
        self.upserts.lock().clone()
    }

    pub fn deletes(&self) -> Vec<(String, Uuid)> {
        self.deletes.lock().clone()
    }
}

#[async_trait]
impl SearchIndexer for RecordingSearchIndexer {
    async fn upsert(
        &self,
        entity: &str,
        entity_id: Uuid,
        document: &Value,
    ) -> Result<(), TransportError> {
        self.upserts
            .lock()
            .push((entity.to_string(), entity_id, document.clone()));
        Ok(())
    }

    async fn delete(&self, entity: &str, entity_id: Uuid) -> Result<(), TransportError> {
        self.deletes.lock().push((entity.to_string(), entity_id));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingAnalyticsSink {
    records: Mutex<Vec<(String, Uuid, Value)>>,
}

impl RecordingAnalyticsSink {
    pub fn records(&self) -> Vec<(String, Uuid, Value)> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl AnalyticsSink for RecordingAnalyticsSink {
    async fn record(
        &self,
        event: &str,
        entity_id: Uuid,
        properties: &Value,
    ) -> Result<(), TransportError> {
        self.records
            .lock()
            .push((event.to_string(), entity_id, properties.clone()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingImageProcessor {
    processed: Mutex<Vec<(Uuid, String)>>,
}

impl RecordingImageProcessor {
    pub fn processed(&self) -> Vec<(Uuid, String)> {
        self.processed.lock().clone()
    }
}

#[async_trait]
impl ImageProcessor for RecordingImageProcessor {
    async fn process(
        &self,
        listing_id: Uuid,
        image_url: &str,
    ) -> Result<Vec<String>, TransportError> {
        self.processed
            .lock()
            .push((listing_id, image_url.to_string()));
        Ok(vec![
            format!("{image_url}?w=200"),
            format!("{image_url}?w=800"),
        ])
    }
}

/// Queue store wrapper that rejects enqueues for the named queues and
/// delegates everything else; for partial-fan-out-failure tests
pub struct PartiallyUnavailableQueueStore {
    inner: Arc<dyn QueueStore>,
    unavailable_queues: Vec<String>,
}

impl PartiallyUnavailableQueueStore {
    pub fn new(inner: Arc<dyn QueueStore>, unavailable_queues: &[&str]) -> Self {
        Self {
            inner,
            unavailable_queues: unavailable_queues.iter().map(|q| q.to_string()).collect(),
        }
    }
}

#[async_trait]
impl QueueStore for PartiallyUnavailableQueueStore {
    async fn enqueue(&self, job: Job) -> Result<Uuid, QueueError> {
        if self.unavailable_queues.contains(&job.queue) {
            return Err(QueueError::Unavailable(format!(
                "queue {} is down",
                job.queue
            )));
        }
        self.inner.enqueue(job).await
    }

    async fn dequeue(&self, queue: &str) -> Result<Option<Job>, QueueError> {
        self.inner.dequeue(queue).await
    }

    async fn ack(&self, job: &Job) -> Result<(), QueueError> {
        self.inner.ack(job).await
    }

    async fn retry(&self, job: Job, delay: Duration) -> Result<(), QueueError> {
        self.inner.retry(job, delay).await
    }

    async fn dead_letter(&self, job: Job, reason: &str) -> Result<(), QueueError> {
        self.inner.dead_letter(job, reason).await
    }

    async fn dead_lettered(&self, queue: &str) -> Result<Vec<DeadLetteredJob>, QueueError> {
        self.inner.dead_lettered(queue).await
    }

    async fn depth(&self, queue: &str) -> Result<usize, QueueError> {
        self.inner.depth(queue).await
    }
}
