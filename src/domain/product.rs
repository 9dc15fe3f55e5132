use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A catalog entry.
///
/// `stock` counts sellable units; the pre-provisioned delivery credentials
/// held by the [`CredentialVault`](crate::domain::ports::CredentialVault) are
/// a separate counter and may diverge from it.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Product {
    /// Unique, lowercase, stable identifier.
    pub id: String,
    pub name: String,
    pub description: String,
    /// Price in the display currency.
    pub unit_price: Decimal,
    pub stock: u32,
    pub category: String,
}

impl Product {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        unit_price: Decimal,
        stock: u32,
    ) -> Self {
        Self {
            id: id.into().to_lowercase(),
            name: name.into(),
            description: String::new(),
            unit_price,
            stock,
            category: "general".to_string(),
        }
    }
}
