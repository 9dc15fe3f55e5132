use serde::{Deserialize, Serialize};
use std::hash::{DefaultHasher, Hash, Hasher};

/// Gateway-reported status of a payment channel.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Expired,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

/// Terminal outcome of an order.
///
/// Once recorded, no further fulfillment action is permitted for the order;
/// later triggers observe the record and do nothing.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum OrderOutcome {
    Delivered,
    /// Payment consumed but some lines had no delivery credentials left.
    DeliveredPartial { pending: Vec<String> },
    Expired,
    Failed,
}

/// Generates an order identifier of the form `ORD-<millis>-<4 chars>`.
///
/// The suffix is derived from the customer id, so two customers checking out
/// in the same millisecond still get distinct identifiers without any
/// cross-customer coordination.
pub fn generate_order_id(customer_id: &str, now_millis: i64) -> String {
    let mut hasher = DefaultHasher::new();
    customer_id.hash(&mut hasher);
    let digest = hasher.finish();

    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut suffix = String::with_capacity(4);
    let mut rest = digest;
    for _ in 0..4 {
        let idx = (rest % ALPHABET.len() as u64) as usize;
        suffix.push(ALPHABET[idx] as char);
        rest /= ALPHABET.len() as u64;
    }

    format!("ORD-{now_millis}-{suffix}")
}
