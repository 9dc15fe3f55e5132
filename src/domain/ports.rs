use crate::domain::order::PaymentStatus;
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;

/// Payment channel kinds the gateway can open.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ChannelType {
    Qris,
    EWallet,
    VirtualAccount { bank: String },
}

impl ChannelType {
    pub fn label(&self) -> String {
        match self {
            ChannelType::Qris => "QRIS".to_string(),
            ChannelType::EWallet => "E-Wallet".to_string(),
            ChannelType::VirtualAccount { bank } => {
                format!("VA {}", bank.to_uppercase())
            }
        }
    }
}

/// Request to open a payment channel for one order.
#[derive(Debug, Clone)]
pub struct ChannelRequest {
    pub amount: Decimal,
    pub order_id: String,
    pub channel: ChannelType,
    pub customer_id: String,
}

/// What the gateway hands back when a channel is opened.
#[derive(Debug, Clone)]
pub struct ChannelDetails {
    /// Gateway-assigned payment reference, recorded on the session.
    pub reference: String,
    /// Human-readable payment instructions.
    pub instructions: String,
    /// QR image reference for scannable channels.
    pub qr_image: Option<String>,
}

/// Remote payment gateway, specified only at its interface boundary.
///
/// The core never calls gateway mutation endpoints outside the checkout
/// orchestrator and the fulfillment coordinator.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_channel(&self, request: ChannelRequest) -> Result<ChannelDetails>;
    async fn check_status(&self, reference: &str) -> Result<PaymentStatus>;
}

/// Pre-provisioned delivery material, one unit consumed per fetch.
///
/// `None` means out-of-stock-for-delivery even when the catalog stock counter
/// is non-zero; the two counters are intentionally distinct.
#[async_trait]
pub trait CredentialVault: Send + Sync {
    async fn fetch_credentials(&self, product_id: &str) -> Result<Option<String>>;
}

/// Networked key-value cache with TTL semantics.
///
/// Implementations may fail on any call; callers that promise availability
/// (the session store) fall back to an in-process map instead of surfacing
/// the error.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;
    /// Set-if-not-exists. Returns `true` when this call created the key.
    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// All `(key, value)` pairs whose key starts with `prefix`.
    async fn scan(&self, prefix: &str) -> Result<Vec<(String, String)>>;
}

/// Authorization policy for `/`-prefixed commands.
///
/// Passed into the router explicitly at construction; handlers never read
/// ambient configuration.
pub trait AdminPolicy: Send + Sync {
    fn is_admin(&self, customer_id: &str) -> bool;
}

/// Allow-list backed policy.
#[derive(Debug, Default, Clone)]
pub struct AllowListPolicy {
    admins: Vec<String>,
}

impl AllowListPolicy {
    pub fn new(admins: Vec<String>) -> Self {
        Self { admins }
    }
}

impl AdminPolicy for AllowListPolicy {
    fn is_admin(&self, customer_id: &str) -> bool {
        self.admins.iter().any(|admin| admin == customer_id)
    }
}

pub type PaymentGatewayBox = std::sync::Arc<dyn PaymentGateway>;
pub type CredentialVaultBox = std::sync::Arc<dyn CredentialVault>;
pub type CacheBackendBox = std::sync::Arc<dyn CacheBackend>;
pub type AdminPolicyBox = std::sync::Arc<dyn AdminPolicy>;
