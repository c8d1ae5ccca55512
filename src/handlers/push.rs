//! # Push Notification Handler
//!
//! Device-token resolution plus delivery. A user with no registered token is
//! a terminal "nothing to send" outcome, not a failure. Bulk sends are
//! chunked to the transport's batch limit.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::persistence::MarketplaceStore;
use crate::queue::{Job, JobPayload};
use crate::transport::{PushMessage, PushSender, PushTicket, PushTicketStatus};
use crate::worker::{HandlerError, JobHandler, Outcome};

pub struct PushHandler {
    store: Arc<dyn MarketplaceStore>,
    sender: Arc<dyn PushSender>,
    batch_size: usize,
}

impl PushHandler {
    pub fn new(
        store: Arc<dyn MarketplaceStore>,
        sender: Arc<dyn PushSender>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            sender,
            batch_size: batch_size.max(1),
        }
    }

    async fn send(
        &self,
        user_id: Uuid,
        title: &str,
        body: &str,
        data: &Value,
    ) -> Result<Outcome, HandlerError> {
        let token = self
            .store
            .find_contact(user_id)
            .await?
            .and_then(|contact| contact.device_token);

        let Some(device_token) = token else {
            return Ok(Outcome::skipped(format!(
                "no device token registered for {user_id}"
            )));
        };

        let tickets = self
            .sender
            .send_batch(&[PushMessage {
                device_token,
                title: title.to_string(),
                body: body.to_string(),
                data: data.clone(),
            }])
            .await?;

        match tickets.first() {
            Some(PushTicket {
                status: PushTicketStatus::Ok,
                ..
            }) => {
                debug!(%user_id, title, "push delivered");
                Ok(Outcome::Completed)
            }
            Some(PushTicket { detail, .. }) => Err(HandlerError::transient(format!(
                "push transport returned error ticket: {}",
                detail.as_deref().unwrap_or("no detail")
            ))),
            None => Err(HandlerError::transient(
                "push transport returned no ticket",
            )),
        }
    }

    /// Send many messages, chunked to the transport's batch limit.
    /// Returns one ticket per input message, in order.
    pub async fn send_bulk(
        &self,
        messages: Vec<PushMessage>,
    ) -> Result<Vec<PushTicket>, HandlerError> {
        let mut tickets = Vec::with_capacity(messages.len());
        for chunk in messages.chunks(self.batch_size) {
            tickets.extend(self.sender.send_batch(chunk).await?);
        }
        Ok(tickets)
    }
}

#[async_trait]
impl JobHandler for PushHandler {
    async fn handle(&self, job: &Job) -> Result<Outcome, HandlerError> {
        match &job.payload {
            JobPayload::SendPush {
                user_id,
                title,
                body,
                data,
            } => self.send(*user_id, title, body, data).await,
            other => Err(HandlerError::contract(format!(
                "push handler received {} payload",
                other.job_type()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserContact;
    use crate::persistence::InMemoryMarketplaceStore;
    use crate::test_helpers::RecordingPushSender;

    async fn fixture(
        batch_size: usize,
    ) -> (Arc<InMemoryMarketplaceStore>, Arc<RecordingPushSender>, PushHandler) {
        let store = Arc::new(InMemoryMarketplaceStore::new());
        let sender = Arc::new(RecordingPushSender::default());
        let handler = PushHandler::new(store.clone(), sender.clone(), batch_size);
        (store, sender, handler)
    }

    fn push_job(user_id: Uuid) -> Job {
        Job::new(JobPayload::SendPush {
            user_id,
            title: "Payment received".to_string(),
            body: "Time to ship.".to_string(),
            data: serde_json::json!({"order_id": "o-1"}),
        })
    }

    #[tokio::test]
    async fn test_delivers_to_registered_token() {
        let (store, sender, handler) = fixture(100).await;
        let user_id = Uuid::new_v4();
        store
            .upsert_contact(UserContact {
                user_id,
                email: None,
                device_token: Some("token-1".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(
            handler.handle(&push_job(user_id)).await.unwrap(),
            Outcome::Completed
        );
        let batches = sender.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].device_token, "token-1");
    }

    #[tokio::test]
    async fn test_missing_token_is_terminal_nothing_to_send() {
        let (_, sender, handler) = fixture(100).await;

        let outcome = handler.handle(&push_job(Uuid::new_v4())).await.unwrap();
        assert!(matches!(outcome, Outcome::Skipped { .. }));
        assert!(sender.batches().is_empty());
    }

    #[tokio::test]
    async fn test_bulk_send_chunks_to_batch_limit() {
        let (_, sender, handler) = fixture(100).await;

        let messages: Vec<PushMessage> = (0..250)
            .map(|i| PushMessage {
                device_token: format!("token-{i}"),
                title: "t".to_string(),
                body: "b".to_string(),
                data: serde_json::json!({}),
            })
            .collect();

        let tickets = handler.send_bulk(messages).await.unwrap();
        assert_eq!(tickets.len(), 250);

        let batches = sender.batches();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 100);
        assert_eq!(batches[1].len(), 100);
        assert_eq!(batches[2].len(), 50);
    }
}
