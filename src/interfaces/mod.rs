//! Inbound adapters: the payment-provider webhook and file-based loaders.

pub mod csv;
pub mod webhook;
