//! # Email Handler
//!
//! Stateless render-and-send: resolve the recipient's address, render
//! subject and body by template key, call the transactional sender. Template
//! lookup falls back to a generic message for unknown keys so a malformed
//! key never blocks delivery of *some* message.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::persistence::MarketplaceStore;
use crate::queue::{Job, JobPayload};
use crate::transport::EmailSender;
use crate::worker::{HandlerError, JobHandler, Outcome};

/// A rendered message ready for the transport
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

fn cents_to_display(data: &Value) -> String {
    let cents = data["amount_cents"].as_i64().unwrap_or(0);
    format!("{}.{:02}", cents / 100, (cents % 100).abs())
}

fn order_ref(data: &Value) -> String {
    data["order_id"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| "your order".to_string())
}

/// Render subject and body for a template key.
///
/// Known keys get a tailored message; anything else gets the generic
/// fallback rather than an error.
pub fn render(template: &str, data: &Value) -> RenderedEmail {
    let (subject, body) = match template {
        "order_confirmation" => (
            "Order received".to_string(),
            format!(
                "Thanks for your order ({}). We'll let you know as soon as payment clears.",
                order_ref(data)
            ),
        ),
        "payment_receipt" => (
            "Payment confirmed".to_string(),
            format!(
                "We received your payment of {} for order {}. The seller is preparing your shipment.",
                cents_to_display(data),
                order_ref(data)
            ),
        ),
        "order_shipped" => (
            "Your order is on the way".to_string(),
            format!(
                "Order {} shipped via {}, tracking number {}.",
                order_ref(data),
                data["carrier"].as_str().unwrap_or("carrier"),
                data["tracking_number"].as_str().unwrap_or("unavailable")
            ),
        ),
        "order_delivered" => (
            "Your order arrived".to_string(),
            format!(
                "Order {} was delivered. We hope the piece is everything you wanted.",
                order_ref(data)
            ),
        ),
        "offer_accepted" => (
            "Offer accepted".to_string(),
            format!(
                "The seller accepted your offer of {}. Complete checkout to claim the item.",
                cents_to_display(data)
            ),
        ),
        _ => (
            "Update on your order".to_string(),
            "There's news about your recent marketplace activity. \
             Open the app for details."
                .to_string(),
        ),
    };

    RenderedEmail {
        html_body: format!("<p>{body}</p>"),
        text_body: body,
        subject,
    }
}

pub struct EmailHandler {
    store: Arc<dyn MarketplaceStore>,
    sender: Arc<dyn EmailSender>,
}

impl EmailHandler {
    pub fn new(store: Arc<dyn MarketplaceStore>, sender: Arc<dyn EmailSender>) -> Self {
        Self { store, sender }
    }

    async fn send(
        &self,
        user_id: Uuid,
        template: &str,
        data: &Value,
    ) -> Result<Outcome, HandlerError> {
        let Some(contact) = self.store.find_contact(user_id).await? else {
            return Ok(Outcome::skipped(format!("no contact record for {user_id}")));
        };
        let Some(address) = contact.email else {
            return Ok(Outcome::skipped(format!(
                "no email address registered for {user_id}"
            )));
        };

        let rendered = render(template, data);
        let message_id = self
            .sender
            .send(
                &address,
                &rendered.subject,
                &rendered.html_body,
                Some(&rendered.text_body),
            )
            .await?;
        debug!(%user_id, template, %message_id, "email sent");
        Ok(Outcome::Completed)
    }
}

#[async_trait]
impl JobHandler for EmailHandler {
    async fn handle(&self, job: &Job) -> Result<Outcome, HandlerError> {
        match &job.payload {
            JobPayload::SendEmail {
                user_id,
                template,
                data,
            } => self.send(*user_id, template, data).await,
            other => Err(HandlerError::contract(format!(
                "email handler received {} payload",
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
    use crate::test_helpers::RecordingEmailSender;

    async fn fixture() -> (Arc<InMemoryMarketplaceStore>, Arc<RecordingEmailSender>, EmailHandler) {
        let store = Arc::new(InMemoryMarketplaceStore::new());
        let sender = Arc::new(RecordingEmailSender::default());
        let handler = EmailHandler::new(store.clone(), sender.clone());
        (store, sender, handler)
    }

    #[tokio::test]
    async fn test_sends_rendered_template() {
        let (store, sender, handler) = fixture().await;
        let user_id = Uuid::new_v4();
        store
            .upsert_contact(UserContact {
                user_id,
                email: Some("buyer@example.com".to_string()),
                device_token: None,
            })
            .await
            .unwrap();

        let job = Job::new(JobPayload::SendEmail {
            user_id,
            template: "payment_receipt".to_string(),
            data: serde_json::json!({"order_id": "o-1", "amount_cents": 12_345}),
        });
        assert_eq!(handler.handle(&job).await.unwrap(), Outcome::Completed);

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "buyer@example.com");
        assert_eq!(sent[0].subject, "Payment confirmed");
        assert!(sent[0].html_body.contains("123.45"));
    }

    #[tokio::test]
    async fn test_unknown_template_falls_back_instead_of_failing() {
        let (store, sender, handler) = fixture().await;
        let user_id = Uuid::new_v4();
        store
            .upsert_contact(UserContact {
                user_id,
                email: Some("buyer@example.com".to_string()),
                device_token: None,
            })
            .await
            .unwrap();

        let job = Job::new(JobPayload::SendEmail {
            user_id,
            template: "definitely_not_a_template".to_string(),
            data: serde_json::json!({}),
        });
        assert_eq!(handler.handle(&job).await.unwrap(), Outcome::Completed);
        assert_eq!(sender.sent()[0].subject, "Update on your order");
    }

    #[tokio::test]
    async fn test_missing_address_is_skipped_not_retried() {
        let (store, sender, handler) = fixture().await;
        let user_id = Uuid::new_v4();
        store
            .upsert_contact(UserContact {
                user_id,
                email: None,
                device_token: None,
            })
            .await
            .unwrap();

        let job = Job::new(JobPayload::SendEmail {
            user_id,
            template: "order_confirmation".to_string(),
            data: serde_json::json!({}),
        });
        assert!(matches!(
            handler.handle(&job).await.unwrap(),
            Outcome::Skipped { .. }
        ));
        assert!(sender.sent().is_empty());
    }

    #[test]
    fn test_render_shipped_includes_tracking() {
        let rendered = render(
            "order_shipped",
            &serde_json::json!({
                "order_id": "o-9",
                "carrier": "aras",
                "tracking_number": "AR240101120000ABCDEF",
            }),
        );
        assert!(rendered.text_body.contains("AR240101120000ABCDEF"));
        assert!(rendered.text_body.contains("aras"));
    }
}
