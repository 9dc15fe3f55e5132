use crate::application::checkout::mask;
use crate::domain::order::{OrderOutcome, PaymentStatus};
use crate::domain::ports::{CacheBackendBox, CredentialVaultBox, PaymentGatewayBox};
use crate::error::{Result, StoreError};
use crate::infrastructure::catalog::ProductCatalog;
use crate::infrastructure::session_store::SessionStore;
use std::sync::Arc;
use tracing::{info, warn};

/// How a fulfillment attempt was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleTrigger {
    /// Customer asked for a status check; status is re-read from the gateway.
    CustomerPoll,
    /// Gateway webhook pushed a status (at-least-once delivery).
    Webhook(PaymentStatus),
    /// Admin confirmed an out-of-band payment; status is re-verified with
    /// the gateway and the approval refused if it disagrees.
    AdminApproval,
}

/// Result of one fulfillment attempt.
#[derive(Debug, PartialEq, Clone)]
pub enum SettleOutcome {
    /// Payment not confirmed yet; no transition.
    Pending,
    /// Another trigger holds the claim but has not recorded a terminal
    /// outcome yet; this attempt did nothing.
    InFlight,
    /// Admin approval where the gateway does not report success.
    Refused(PaymentStatus),
    /// The order reached (or had already reached) a terminal outcome.
    /// `first` is true only for the attempt that performed the side effects.
    Terminal { outcome: OrderOutcome, first: bool },
}

/// What the caller should tell whom after an attempt.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub outcome: SettleOutcome,
    pub customer_id: String,
    /// Message for the order's customer (delivery, expiry notice, ...).
    pub customer_text: String,
    /// Shortfall report for admins, when delivery material ran out.
    pub admin_alert: Option<String>,
}

const CLAIM_MARKER: &str = "claimed";

/// Durable mapping from a payment reference to its order, written when a
/// claim is taken. Lets a late webhook retry find the terminal record after
/// the owning session was reset or expired.
#[derive(serde::Serialize, serde::Deserialize)]
struct InvoiceIndex {
    order_id: String,
    customer_id: String,
}

/// Convergence point of the two payment-confirmation paths.
///
/// The customer poll and the gateway webhook can race on the same order,
/// possibly repeatedly. Every attempt first takes an atomic claim
/// (set-if-not-exists on `order_status:<id>`) before any side effect runs;
/// losers observe the claim or the terminal record and do nothing. Stock
/// units were reserved at checkout, so the coordinator releases them on
/// expiry/failure and consumes delivery credentials exactly once on success.
pub struct FulfillmentCoordinator {
    sessions: Arc<SessionStore>,
    catalog: ProductCatalog,
    gateway: PaymentGatewayBox,
    vault: CredentialVaultBox,
    claims: CacheBackendBox,
}

impl FulfillmentCoordinator {
    pub fn new(
        sessions: Arc<SessionStore>,
        catalog: ProductCatalog,
        gateway: PaymentGatewayBox,
        vault: CredentialVaultBox,
        claims: CacheBackendBox,
    ) -> Self {
        Self {
            sessions,
            catalog,
            gateway,
            vault,
            claims,
        }
    }

    fn claim_key(order_id: &str) -> String {
        format!("order_status:{order_id}")
    }

    /// Attempts to settle the customer's open order.
    pub async fn settle(&self, customer_id: &str, trigger: SettleTrigger) -> Result<Settlement> {
        let session = self.sessions.get(customer_id).await;
        let order_id = session
            .order_id
            .clone()
            .ok_or_else(|| StoreError::Validation("no active order".to_string()))?;
        let reference = session
            .payment_invoice_id
            .clone()
            .ok_or_else(|| StoreError::Validation("no payment channel open".to_string()))?;
        let key = Self::claim_key(&order_id);

        // Fast path: a previous trigger already reached a terminal outcome.
        if let Some(raw) = self.claims.get(&key).await? {
            return Ok(self.absorbed(customer_id, &raw));
        }

        let status = match trigger {
            SettleTrigger::Webhook(status) => status,
            SettleTrigger::CustomerPoll => self.gateway.check_status(&reference).await?,
            SettleTrigger::AdminApproval => {
                let status = self.gateway.check_status(&reference).await?;
                if status != PaymentStatus::Succeeded {
                    info!(
                        %order_id,
                        ?status,
                        "admin approval refused, gateway disagrees"
                    );
                    return Ok(Settlement {
                        outcome: SettleOutcome::Refused(status),
                        customer_id: customer_id.to_string(),
                        customer_text: String::new(),
                        admin_alert: None,
                    });
                }
                status
            }
        };

        if !status.is_terminal() {
            return Ok(Settlement {
                outcome: SettleOutcome::Pending,
                customer_id: customer_id.to_string(),
                customer_text: format!(
                    "Order {order_id} is still awaiting payment. Type 'status' to check again."
                ),
                admin_alert: None,
            });
        }

        // Atomic claim: exactly one concurrent attempt wins the right to
        // perform side effects.
        if !self.claims.set_nx(&key, CLAIM_MARKER, None).await? {
            let raw = self.claims.get(&key).await?.unwrap_or_default();
            return Ok(self.absorbed(customer_id, &raw));
        }
        self.index_invoice(&reference, &order_id, customer_id).await;

        let settlement = match status {
            PaymentStatus::Succeeded => self.deliver(customer_id, &order_id).await,
            PaymentStatus::Expired => {
                self.abort(customer_id, &order_id, OrderOutcome::Expired).await
            }
            PaymentStatus::Failed => {
                self.abort(customer_id, &order_id, OrderOutcome::Failed).await
            }
            PaymentStatus::Pending => unreachable!("terminal statuses only"),
        };
        Ok(settlement)
    }

    /// Winner path for a succeeded payment: consume delivery credentials,
    /// record the terminal outcome and reset the session, each exactly once.
    async fn deliver(&self, customer_id: &str, order_id: &str) -> Settlement {
        let session = self.sessions.get(customer_id).await;

        let mut delivered_lines: Vec<String> = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        // Delivery follows the cart snapshot frozen at checkout; the live
        // cart may have drifted since the order was created.
        for item in &session.order_lines {
            match self.vault.fetch_credentials(&item.product_id).await {
                Ok(Some(credentials)) => {
                    delivered_lines.push(format!("{}: {credentials}", item.name));
                }
                Ok(None) => pending.push(item.name.clone()),
                Err(error) => {
                    warn!(%error, product = %item.product_id, "credential fetch failed");
                    pending.push(item.name.clone());
                }
            }
        }

        let outcome = if pending.is_empty() {
            OrderOutcome::Delivered
        } else {
            OrderOutcome::DeliveredPartial {
                pending: pending.clone(),
            }
        };
        self.record(order_id, &outcome).await;
        self.sessions.mutate(customer_id, |session| session.reset()).await;

        let mut customer_text = format!(
            "Payment confirmed for order {order_id}. Your items:\n{}",
            delivered_lines.join("\n")
        );
        let admin_alert = if pending.is_empty() {
            None
        } else {
            customer_text.push_str(&format!(
                "\nStill being prepared (we will deliver shortly): {}",
                pending.join(", ")
            ));
            Some(format!(
                "Delivery shortfall on order {order_id} (customer {}): no credentials left for {}",
                mask(customer_id),
                pending.join(", ")
            ))
        };

        info!(
            %order_id,
            customer = %mask(customer_id),
            delivered = delivered_lines.len(),
            shortfall = pending.len(),
            "order fulfilled"
        );
        Settlement {
            outcome: SettleOutcome::Terminal {
                outcome,
                first: true,
            },
            customer_id: customer_id.to_string(),
            customer_text,
            admin_alert,
        }
    }

    /// Winner path for expired/failed payments: return reserved stock,
    /// record the outcome and reset the session.
    async fn abort(
        &self,
        customer_id: &str,
        order_id: &str,
        outcome: OrderOutcome,
    ) -> Settlement {
        let session = self.sessions.get(customer_id).await;
        // Only the units the order actually reserved go back.
        let line_ids: Vec<String> = session
            .order_lines
            .iter()
            .map(|item| item.product_id.clone())
            .collect();
        self.catalog.release(&line_ids).await;
        self.record(order_id, &outcome).await;
        self.sessions.mutate(customer_id, |session| session.reset()).await;

        let customer_text = match outcome {
            OrderOutcome::Expired => format!(
                "The payment window for order {order_id} has expired. Your cart was cleared; type 'menu' to start over."
            ),
            _ => format!(
                "Payment for order {order_id} failed. Your cart was cleared; type 'menu' to start over."
            ),
        };
        info!(%order_id, ?outcome, "order aborted");
        Settlement {
            outcome: SettleOutcome::Terminal {
                outcome,
                first: true,
            },
            customer_id: customer_id.to_string(),
            customer_text,
            admin_alert: None,
        }
    }

    /// A later trigger found the order claimed or terminal; absorb silently.
    fn absorbed(&self, customer_id: &str, raw: &str) -> Settlement {
        if raw == CLAIM_MARKER {
            return Settlement {
                outcome: SettleOutcome::InFlight,
                customer_id: customer_id.to_string(),
                customer_text: "Your order is being processed.".to_string(),
                admin_alert: None,
            };
        }
        let outcome = serde_json::from_str::<OrderOutcome>(raw)
            .unwrap_or(OrderOutcome::Failed);
        let customer_text = match &outcome {
            OrderOutcome::Delivered | OrderOutcome::DeliveredPartial { .. } => {
                "This order has already been delivered.".to_string()
            }
            OrderOutcome::Expired => "This order's payment window expired.".to_string(),
            OrderOutcome::Failed => "This order's payment failed.".to_string(),
        };
        Settlement {
            outcome: SettleOutcome::Terminal {
                outcome,
                first: false,
            },
            customer_id: customer_id.to_string(),
            customer_text,
            admin_alert: None,
        }
    }

    /// Webhook entry point: resolves the owning customer from the payment
    /// reference. Returns `None` when the reference is unknown, which the
    /// receiver logs and acknowledges anyway.
    pub async fn settle_by_reference(
        &self,
        reference: &str,
        status: PaymentStatus,
    ) -> Result<Option<Settlement>> {
        if let Some(customer_id) = self.sessions.find_by_invoice_id(reference).await {
            return self
                .settle(&customer_id, SettleTrigger::Webhook(status))
                .await
                .map(Some);
        }

        // The session may be gone (reset after delivery, or TTL-expired);
        // the invoice index still resolves redelivered webhooks to their
        // terminal record.
        let index_key = format!("invoice_order:{reference}");
        if let Some(raw) = self.claims.get(&index_key).await? {
            let index: InvoiceIndex = serde_json::from_str(&raw)?;
            let record = self
                .claims
                .get(&Self::claim_key(&index.order_id))
                .await?
                .unwrap_or_else(|| CLAIM_MARKER.to_string());
            return Ok(Some(self.absorbed(&index.customer_id, &record)));
        }
        Ok(None)
    }

    async fn index_invoice(&self, reference: &str, order_id: &str, customer_id: &str) {
        let index = InvoiceIndex {
            order_id: order_id.to_string(),
            customer_id: customer_id.to_string(),
        };
        match serde_json::to_string(&index) {
            Ok(raw) => {
                let key = format!("invoice_order:{reference}");
                if let Err(error) = self.claims.set(&key, &raw, None).await {
                    warn!(%error, reference, "failed to index payment reference");
                }
            }
            Err(error) => warn!(%error, reference, "invoice index serialization failed"),
        }
    }

    async fn record(&self, order_id: &str, outcome: &OrderOutcome) {
        let key = Self::claim_key(order_id);
        match serde_json::to_string(outcome) {
            Ok(raw) => {
                if let Err(error) = self.claims.set(&key, &raw, None).await {
                    // The claim marker still blocks duplicates in-process.
                    warn!(%error, %order_id, "failed to record terminal order status");
                }
            }
            Err(error) => warn!(%error, %order_id, "terminal status serialization failed"),
        }
    }
}
