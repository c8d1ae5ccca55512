//! # Payment Model
//!
//! One payment attempt per order. The gateway's external identifiers
//! (`provider_payment_id`, `conversation_id`) are both stored because inbound
//! webhooks may carry either one, and may arrive before the local write they
//! reconcile, out of order, or more than once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::PaymentStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    /// Charged amount in minor units (cents)
    pub amount_cents: i64,
    pub status: PaymentStatus,
    /// Gateway-side payment identifier
    pub provider_payment_id: Option<String>,
    /// Gateway-side conversation/token identifier
    pub conversation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payment fields for creation (without generated columns)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayment {
    pub order_id: Uuid,
    pub amount_cents: i64,
    pub provider_payment_id: Option<String>,
    pub conversation_id: Option<String>,
}

impl Payment {
    /// Whether a webhook identifier pair refers to this payment
    pub fn matches_provider_ref(
        &self,
        provider_payment_id: Option<&str>,
        conversation_id: Option<&str>,
    ) -> bool {
        let by_payment_id = match (provider_payment_id, self.provider_payment_id.as_deref()) {
            (Some(incoming), Some(stored)) => incoming == stored,
            _ => false,
        };
        let by_conversation = match (conversation_id, self.conversation_id.as_deref()) {
            (Some(incoming), Some(stored)) => incoming == stored,
            _ => false,
        };
        by_payment_id || by_conversation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment() -> Payment {
        Payment {
            payment_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            amount_cents: 10_000,
            status: PaymentStatus::Pending,
            provider_payment_id: Some("pay_123".to_string()),
            conversation_id: Some("conv_456".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_matches_by_either_identifier() {
        let p = payment();
        assert!(p.matches_provider_ref(Some("pay_123"), None));
        assert!(p.matches_provider_ref(None, Some("conv_456")));
        assert!(p.matches_provider_ref(Some("pay_999"), Some("conv_456")));
    }

    #[test]
    fn test_no_match_without_identifiers() {
        let p = payment();
        assert!(!p.matches_provider_ref(None, None));
        assert!(!p.matches_provider_ref(Some("pay_999"), Some("conv_999")));
    }
}
