use crate::application::fulfillment::FulfillmentCoordinator;
use crate::domain::order::PaymentStatus;
use crate::domain::reply::SideEffect;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Payment-provider notification payload.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    /// Gateway payment reference (the session's `payment_invoice_id`).
    pub reference: String,
    pub status: PaymentStatus,
}

/// Receiver verdict. `Received` must be acknowledged to the sender even when
/// internal processing failed, so a flaky store does not cause retry storms;
/// only a bad signature is rejected outright.
#[derive(Debug, PartialEq)]
pub enum WebhookAck {
    /// Signature mismatch; the event never reached the coordinator.
    Unauthorized,
    /// Acknowledged. Carries the deliveries the transport should send out.
    Received(Vec<SideEffect>),
}

/// Validates and processes inbound payment-provider webhooks.
pub struct WebhookReceiver {
    secret: String,
    coordinator: Arc<FulfillmentCoordinator>,
    admin_recipients: Vec<String>,
}

impl WebhookReceiver {
    pub fn new(
        secret: String,
        coordinator: Arc<FulfillmentCoordinator>,
        admin_recipients: Vec<String>,
    ) -> Self {
        Self {
            secret,
            coordinator,
            admin_recipients,
        }
    }

    /// Handles one webhook delivery.
    ///
    /// `signature` is the shared-secret header value presented by the sender.
    pub async fn handle(&self, signature: Option<&str>, body: &str) -> WebhookAck {
        // An unconfigured secret authenticates nothing; without this check an
        // empty secret would match requests carrying no signature at all.
        if self.secret.is_empty() {
            warn!("security: webhook rejected, no shared secret configured");
            return WebhookAck::Unauthorized;
        }
        let presented = signature.unwrap_or_default();
        if !constant_time_eq(presented.as_bytes(), self.secret.as_bytes()) {
            warn!("security: webhook with invalid signature rejected");
            return WebhookAck::Unauthorized;
        }

        // Best-effort from here on; every path below acknowledges.
        let event: WebhookEvent = match serde_json::from_str(body) {
            Ok(event) => event,
            Err(error) => {
                warn!(%error, "webhook payload did not parse, acknowledging anyway");
                return WebhookAck::Received(Vec::new());
            }
        };

        if !event.status.is_terminal() {
            return WebhookAck::Received(Vec::new());
        }

        match self
            .coordinator
            .settle_by_reference(&event.reference, event.status)
            .await
        {
            Ok(Some(settlement)) => {
                let mut effects = Vec::new();
                if !settlement.customer_text.is_empty() {
                    effects.push(SideEffect::DeliverTo {
                        customer_id: settlement.customer_id.clone(),
                        text: settlement.customer_text.clone(),
                    });
                }
                if let Some(alert) = settlement.admin_alert {
                    effects.push(SideEffect::Broadcast {
                        recipients: self.admin_recipients.clone(),
                        text: alert,
                    });
                }
                info!(
                    reference = %event.reference,
                    outcome = ?settlement.outcome,
                    "webhook settled"
                );
                WebhookAck::Received(effects)
            }
            Ok(None) => {
                warn!(reference = %event.reference, "webhook for unknown payment reference");
                WebhookAck::Received(Vec::new())
            }
            Err(error) => {
                warn!(%error, reference = %event.reference, "webhook processing failed, acknowledging anyway");
                WebhookAck::Received(Vec::new())
            }
        }
    }
}

/// Comparison that does not short-circuit on the first mismatching byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
