//! # Search Handler
//!
//! Best-effort denormalized document maintenance. A failed index job
//! degrades search staleness, never order progress; the standard retry
//! policy applies and exhaustion dead-letters like any other job.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::queue::{Job, JobPayload};
use crate::transport::SearchIndexer;
use crate::worker::{HandlerError, JobHandler, Outcome};

pub struct SearchHandler {
    indexer: Arc<dyn SearchIndexer>,
}

impl SearchHandler {
    pub fn new(indexer: Arc<dyn SearchIndexer>) -> Self {
        Self { indexer }
    }
}

#[async_trait]
impl JobHandler for SearchHandler {
    async fn handle(&self, job: &Job) -> Result<Outcome, HandlerError> {
        match &job.payload {
            JobPayload::IndexDocument {
                entity,
                entity_id,
                document,
            } => {
                self.indexer.upsert(entity, *entity_id, document).await?;
                debug!(entity, %entity_id, "document indexed");
                Ok(Outcome::Completed)
            }
            JobPayload::DeleteDocument { entity, entity_id } => {
                self.indexer.delete(entity, *entity_id).await?;
                debug!(entity, %entity_id, "document deleted");
                Ok(Outcome::Completed)
            }
            other => Err(HandlerError::contract(format!(
                "search handler received {} payload",
                other.job_type()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::RecordingSearchIndexer;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_index_and_delete_reach_the_indexer() {
        let indexer = Arc::new(RecordingSearchIndexer::default());
        let handler = SearchHandler::new(indexer.clone());
        let entity_id = Uuid::new_v4();

        handler
            .handle(&Job::new(JobPayload::IndexDocument {
                entity: "order".to_string(),
                entity_id,
                document: serde_json::json!({"status": "created"}),
            }))
            .await
            .unwrap();
        handler
            .handle(&Job::new(JobPayload::DeleteDocument {
                entity: "order".to_string(),
                entity_id,
            }))
            .await
            .unwrap();

        assert_eq!(indexer.upserts().len(), 1);
        assert_eq!(indexer.deletes().len(), 1);
    }
}
