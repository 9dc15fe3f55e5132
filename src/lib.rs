//! Conversational storefront engine.
//!
//! Customers browse a catalog, fill a cart and pay through a chat channel;
//! the crate owns the per-customer conversation state machine, checkout
//! orchestration and the exactly-once fulfillment convergence of the two
//! payment-confirmation paths (customer poll and gateway webhook).
//!
//! The chat transport, the real payment gateway and the networked cache are
//! collaborators behind the ports in [`domain::ports`].

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
