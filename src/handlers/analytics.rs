//! # Analytics Handler
//!
//! Appends aggregation records to the analytics sink. Explicitly allowed to
//! lag behind the source of truth.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::queue::{Job, JobPayload};
use crate::transport::AnalyticsSink;
use crate::worker::{HandlerError, JobHandler, Outcome};

pub struct AnalyticsHandler {
    sink: Arc<dyn AnalyticsSink>,
}

impl AnalyticsHandler {
    pub fn new(sink: Arc<dyn AnalyticsSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl JobHandler for AnalyticsHandler {
    async fn handle(&self, job: &Job) -> Result<Outcome, HandlerError> {
        match &job.payload {
            JobPayload::RecordMetric {
                event,
                entity_id,
                properties,
            } => {
                self.sink.record(event, *entity_id, properties).await?;
                debug!(event, %entity_id, "metric recorded");
                Ok(Outcome::Completed)
            }
            other => Err(HandlerError::contract(format!(
                "analytics handler received {} payload",
                other.job_type()
            ))),
        }
    }
}
