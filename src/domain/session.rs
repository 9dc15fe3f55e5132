use crate::domain::product::Product;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The named state of a customer's conversation.
///
/// There is no terminal state; every completed or abandoned flow re-enters
/// `Menu`, so the machine cycles indefinitely per customer.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    Menu,
    Browsing,
    Checkout,
    SelectPayment,
    SelectBank,
    AwaitingPayment,
    AwaitingAdminApproval,
}

impl Step {
    /// Steps during which a payment reference may be held on the session.
    pub fn is_payment_pending(self) -> bool {
        matches!(self, Step::AwaitingPayment | Step::AwaitingAdminApproval)
    }
}

/// Immutable snapshot of a product at add-to-cart time.
///
/// Owned exclusively by the session that holds it; the price is frozen so a
/// later catalog edit cannot change an in-flight cart's total.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    pub unit_price: Decimal,
}

impl From<&Product> for CartItem {
    fn from(product: &Product) -> Self {
        Self {
            product_id: product.id.clone(),
            name: product.name.clone(),
            unit_price: product.unit_price,
        }
    }
}

/// Per-customer conversational state.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Session {
    pub customer_id: String,
    pub step: Step,
    /// Insertion order is significant for display and total computation.
    pub cart: Vec<CartItem>,
    pub order_id: Option<String>,
    /// Frozen copy of the cart taken when the order was created. Fulfillment
    /// delivers and releases against this snapshot, never the live cart.
    #[serde(default)]
    pub order_lines: Vec<CartItem>,
    pub payment_method: Option<String>,
    pub payment_invoice_id: Option<String>,
    pub promo_code: Option<String>,
    pub discount_percent: Option<Decimal>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    /// Creates a fresh session at the main menu with an empty cart.
    pub fn new(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            step: Step::Menu,
            cart: Vec::new(),
            order_id: None,
            order_lines: Vec::new(),
            payment_method: None,
            payment_invoice_id: None,
            promo_code: None,
            discount_percent: None,
            last_activity: Utc::now(),
        }
    }

    /// Clears the flow back to the main menu.
    ///
    /// Used after fulfillment, cancellation and admin rejection; TTL expiry
    /// in the store is independent of this.
    pub fn reset(&mut self) {
        self.step = Step::Menu;
        self.cart.clear();
        self.order_id = None;
        self.order_lines.clear();
        self.payment_method = None;
        self.payment_invoice_id = None;
        self.promo_code = None;
        self.discount_percent = None;
    }

    /// Sum of cart line prices, in insertion order.
    pub fn cart_total(&self) -> Decimal {
        self.cart
            .iter()
            .map(|item| item.unit_price)
            .sum::<Decimal>()
    }

    /// Cart total after the staged discount, if any.
    pub fn discounted_total(&self) -> Decimal {
        let subtotal = self.cart_total();
        match self.discount_percent {
            Some(percent) => subtotal - subtotal * percent / Decimal::from(100),
            None => subtotal,
        }
    }
}
