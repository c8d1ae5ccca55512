//! # Image Handler
//!
//! Best-effort derived-variant generation for listing images, through an
//! opaque processor. Same retry posture as the other enrichment queues.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::queue::{Job, JobPayload};
use crate::transport::ImageProcessor;
use crate::worker::{HandlerError, JobHandler, Outcome};

pub struct ImageHandler {
    processor: Arc<dyn ImageProcessor>,
}

impl ImageHandler {
    pub fn new(processor: Arc<dyn ImageProcessor>) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl JobHandler for ImageHandler {
    async fn handle(&self, job: &Job) -> Result<Outcome, HandlerError> {
        match &job.payload {
            JobPayload::ProcessImage {
                listing_id,
                image_url,
            } => {
                let variants = self.processor.process(*listing_id, image_url).await?;
                debug!(%listing_id, variant_count = variants.len(), "image processed");
                Ok(Outcome::Completed)
            }
            other => Err(HandlerError::contract(format!(
                "image handler received {} payload",
                other.job_type()
            ))),
        }
    }
}
