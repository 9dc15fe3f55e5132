//! Domain types and the ports the engine depends on.

pub mod matcher;
pub mod order;
pub mod ports;
pub mod product;
pub mod reply;
pub mod session;
