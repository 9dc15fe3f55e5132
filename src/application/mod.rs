//! Conversation routing, checkout orchestration and fulfillment.

pub mod admin;
pub mod checkout;
pub mod fulfillment;
pub mod router;
