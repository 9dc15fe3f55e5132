//! Concrete adapters behind the domain ports.

pub mod catalog;
pub mod in_memory;
pub mod rate_limit;
pub mod sandbox_gateway;
pub mod session_store;
