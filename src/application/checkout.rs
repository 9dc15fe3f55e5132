use crate::domain::order::generate_order_id;
use crate::domain::ports::{ChannelRequest, ChannelType, PaymentGatewayBox};
use crate::domain::reply::{Attachment, Reply};
use crate::domain::session::Step;
use crate::error::{Result, StoreError};
use crate::infrastructure::catalog::ProductCatalog;
use crate::infrastructure::session_store::SessionStore;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Promo codes with single-use-per-customer redemption.
pub struct PromoRegistry {
    codes: HashMap<String, Decimal>,
    redeemed: Mutex<HashSet<(String, String)>>,
}

impl PromoRegistry {
    pub fn new(codes: HashMap<String, Decimal>) -> Self {
        let codes = codes
            .into_iter()
            .map(|(code, percent)| (code.to_uppercase(), percent))
            .collect();
        Self {
            codes,
            redeemed: Mutex::new(HashSet::new()),
        }
    }

    /// Validates a code for staging: it must exist and be unredeemed by this
    /// customer. Does not mark it consumed.
    pub async fn stage(&self, customer_id: &str, code: &str) -> Result<Decimal> {
        let code = code.to_uppercase();
        let percent = *self
            .codes
            .get(&code)
            .ok_or_else(|| StoreError::NotFound(format!("promo code '{code}'")))?;
        let redeemed = self.redeemed.lock().await;
        if redeemed.contains(&(customer_id.to_string(), code.clone())) {
            return Err(StoreError::Validation(
                "promo code already used".to_string(),
            ));
        }
        Ok(percent)
    }

    /// Marks the code consumed. The check and the insert happen under one
    /// lock, so a double-tapped checkout cannot redeem twice.
    pub async fn consume(&self, customer_id: &str, code: &str) -> Result<Decimal> {
        let code = code.to_uppercase();
        let percent = *self
            .codes
            .get(&code)
            .ok_or_else(|| StoreError::NotFound(format!("promo code '{code}'")))?;
        let mut redeemed = self.redeemed.lock().await;
        if !redeemed.insert((customer_id.to_string(), code)) {
            return Err(StoreError::Validation(
                "promo code already used".to_string(),
            ));
        }
        Ok(percent)
    }
}

/// Runs checkout: stock reservation, totals, promo consumption, order id
/// assignment and opening a payment channel with the gateway.
pub struct CheckoutOrchestrator {
    sessions: Arc<SessionStore>,
    catalog: ProductCatalog,
    gateway: PaymentGatewayBox,
    promos: PromoRegistry,
}

impl CheckoutOrchestrator {
    pub fn new(
        sessions: Arc<SessionStore>,
        catalog: ProductCatalog,
        gateway: PaymentGatewayBox,
        promos: PromoRegistry,
    ) -> Self {
        Self {
            sessions,
            catalog,
            gateway,
            promos,
        }
    }

    /// Stages a promo discount on the session without transitioning.
    pub async fn stage_promo(&self, customer_id: &str, code: &str) -> Result<Reply> {
        let percent = self.promos.stage(customer_id, code).await?;
        let session = self
            .sessions
            .mutate(customer_id, |session| {
                session.promo_code = Some(code.to_uppercase());
                session.discount_percent = Some(percent);
            })
            .await;
        Ok(Reply::text(format!(
            "Promo {} staged: {percent}% off. New total Rp{}. Type 'checkout' to continue.",
            code.to_uppercase(),
            session.discounted_total()
        )))
    }

    /// Validates the cart, reserves stock, consumes the staged promo and
    /// moves the session to payment selection.
    ///
    /// Out-of-stock lines reject the whole checkout and leave the cart
    /// untouched so the customer can remove the offending line.
    pub async fn begin(&self, customer_id: &str) -> Result<Reply> {
        let session = self.sessions.get(customer_id).await;
        if session.cart.is_empty() {
            return Err(StoreError::Validation("your cart is empty".to_string()));
        }

        let line_ids: Vec<String> = session
            .cart
            .iter()
            .map(|item| item.product_id.clone())
            .collect();

        // A re-run of checkout (abandoned payment attempt) exchanges the
        // units the previous order holds for the current cart in one step.
        // The held lines come from the order snapshot, not the live cart,
        // which may have been edited since.
        let reserved = if session.order_id.is_some() {
            let held_ids: Vec<String> = session
                .order_lines
                .iter()
                .map(|item| item.product_id.clone())
                .collect();
            self.catalog.try_swap(&held_ids, &line_ids).await
        } else {
            self.catalog.try_reserve(&line_ids).await
        };
        if let Err(shortage) = reserved {
            // On a failed swap the old units stayed released, so the stale
            // order must be dropped or a later settlement would release twice.
            if session.order_id.is_some() {
                self.sessions
                    .mutate(customer_id, |session| {
                        session.order_id = None;
                        session.order_lines.clear();
                    })
                    .await;
            }
            return Ok(Reply::text(format!(
                "Out of stock: {}. Remove those items (type 'clear' to restart) and try again.",
                shortage.join(", ")
            )));
        }

        let mut promo_note = String::new();
        let discount = match (&session.promo_code, session.discount_percent) {
            (Some(code), _) => match self.promos.consume(customer_id, code).await {
                Ok(percent) => Some(percent),
                // A retried checkout keeps the discount it already consumed
                // for this flow; a stale code from a previous flow is dropped.
                Err(_) if session.order_id.is_some() => session.discount_percent,
                Err(_) => {
                    promo_note = format!("\nPromo {code} is no longer valid and was removed.");
                    None
                }
            },
            (None, _) => None,
        };

        let order_id = generate_order_id(customer_id, Utc::now().timestamp_millis());
        info!(%order_id, customer = %mask(customer_id), "checkout started");

        let session = self
            .sessions
            .mutate(customer_id, |session| {
                session.order_id = Some(order_id.clone());
                session.order_lines = session.cart.clone();
                session.discount_percent = discount;
                if discount.is_none() {
                    session.promo_code = None;
                }
                session.step = Step::SelectPayment;
            })
            .await;

        let total = session.discounted_total();
        Ok(Reply::text(format!(
            "Order {order_id} created. Total: Rp{total}.{promo_note}\n\
             Choose a payment method:\n1. QRIS\n2. E-Wallet\n3. Bank transfer",
        )))
    }

    /// Opens a payment channel for the session's order and records the
    /// returned reference before transitioning to `awaiting_payment`.
    ///
    /// A gateway failure propagates without touching the session, so the
    /// customer can retry the same selection.
    pub async fn open_channel(&self, customer_id: &str, channel: ChannelType) -> Result<Reply> {
        let session = self.sessions.get(customer_id).await;
        let order_id = session
            .order_id
            .clone()
            .ok_or_else(|| StoreError::Validation("no order in progress".to_string()))?;

        let details = self
            .gateway
            .create_channel(ChannelRequest {
                amount: session.discounted_total(),
                order_id: order_id.clone(),
                channel: channel.clone(),
                customer_id: customer_id.to_string(),
            })
            .await?;

        let label = channel.label();
        self.sessions
            .mutate(customer_id, |session| {
                session.payment_method = Some(label.clone());
                session.payment_invoice_id = Some(details.reference.clone());
                session.step = Step::AwaitingPayment;
            })
            .await;
        info!(
            %order_id,
            reference = %details.reference,
            method = %label,
            "payment channel opened"
        );

        let mut reply = Reply::text(format!(
            "{}\n\nType 'status' after paying to check your order.",
            details.instructions
        ));
        if let Some(qr) = details.qr_image {
            reply = reply.with_attachment(Attachment::Image(qr));
        }
        Ok(reply)
    }
}

pub(crate) fn mask(customer_id: &str) -> String {
    let chars: Vec<char> = customer_id.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("***{visible}")
}
