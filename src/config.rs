use crate::error::{Result, StoreError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Runtime configuration, loaded from TOML.
///
/// Every field has a default so the engine boots without a config file; the
/// admin allow-list defaults to empty, which means every admin command is
/// denied until one is configured.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Customer ids allowed to run `/`-prefixed commands.
    pub admins: Vec<String>,
    /// Shared secret expected in the webhook signature header.
    pub webhook_secret: String,
    /// Promo code -> discount percent (0-100).
    pub promo_codes: HashMap<String, Decimal>,
    /// Bank codes offered for virtual-account transfers.
    pub banks: Vec<String>,
    pub limits: Limits,
    /// Session inactivity window in seconds; doubles as the cache TTL.
    pub session_ttl_secs: u64,
    /// Store name used in rendered menus.
    pub store_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Messages allowed per customer within `message_window_secs`.
    pub messages_per_window: u32,
    pub message_window_secs: u64,
    /// Orders allowed per customer within `order_window_secs`.
    pub orders_per_window: u32,
    pub order_window_secs: u64,
    /// Cooldown applied after an unhandled routing error.
    pub error_cooldown_secs: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            messages_per_window: 20,
            message_window_secs: 60,
            orders_per_window: 5,
            order_window_secs: 3600,
            error_cooldown_secs: 30,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            admins: Vec::new(),
            webhook_secret: String::new(),
            promo_codes: HashMap::new(),
            banks: vec![
                "bca".to_string(),
                "bni".to_string(),
                "bri".to_string(),
                "mandiri".to_string(),
            ],
            limits: Limits::default(),
            session_ttl_secs: 1800,
            store_name: "Kedai".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| StoreError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_boot_without_file() {
        let config = Config::default();
        assert!(config.admins.is_empty());
        assert_eq!(config.limits.messages_per_window, 20);
        assert_eq!(config.banks.len(), 4);
    }

    #[test]
    fn test_parse_partial_toml() {
        let raw = r#"
            admins = ["628123"]
            webhook_secret = "s3cret"

            [promo_codes]
            HEMAT10 = "10"

            [limits]
            messages_per_window = 5
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.admins, vec!["628123".to_string()]);
        assert_eq!(config.promo_codes.get("HEMAT10"), Some(&dec!(10)));
        assert_eq!(config.limits.messages_per_window, 5);
        // Unspecified fields keep their defaults.
        assert_eq!(config.limits.orders_per_window, 5);
        assert_eq!(config.session_ttl_secs, 1800);
    }
}
