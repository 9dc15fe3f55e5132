use kedai::application::admin::AdminCommands;
use kedai::application::checkout::{CheckoutOrchestrator, PromoRegistry};
use kedai::application::fulfillment::FulfillmentCoordinator;
use kedai::application::router::ConversationRouter;
use kedai::config::Config;
use kedai::domain::ports::{AllowListPolicy, CacheBackendBox};
use kedai::domain::product::Product;
use kedai::infrastructure::catalog::ProductCatalog;
use kedai::infrastructure::in_memory::{InMemoryCache, InMemoryCredentialVault};
use kedai::infrastructure::rate_limit::RateLimiter;
use kedai::infrastructure::sandbox_gateway::SandboxGateway;
use kedai::infrastructure::session_store::SessionStore;
use kedai::interfaces::webhook::WebhookReceiver;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

pub const ADMIN: &str = "628999";
pub const SECRET: &str = "test-secret";

/// Fully wired engine over in-memory adapters and the sandbox gateway.
pub struct Harness {
    pub router: ConversationRouter,
    pub sessions: Arc<SessionStore>,
    pub catalog: ProductCatalog,
    pub gateway: Arc<SandboxGateway>,
    pub vault: Arc<InMemoryCredentialVault>,
    pub receiver: WebhookReceiver,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.admins = vec![ADMIN.to_string()];
    config.webhook_secret = SECRET.to_string();
    config
        .promo_codes
        .insert("HEMAT10".to_string(), dec!(10));
    config
}

pub fn default_products() -> Vec<Product> {
    vec![
        Product::new("netflix", "Netflix Premium", dec!(54000), 5),
        Product::new("spotify", "Spotify Family", dec!(25000), 5),
        Product::new("vpn", "VPN Pro", dec!(15000), 1),
    ]
}

pub async fn harness(config: Config, products: Vec<Product>) -> Harness {
    harness_with_backend(config, products, Arc::new(InMemoryCache::new())).await
}

/// Same wiring with a caller-supplied session cache backend, for exercising
/// outage behavior end to end.
pub async fn harness_with_backend(
    config: Config,
    products: Vec<Product>,
    backend: CacheBackendBox,
) -> Harness {
    let config = Arc::new(config);
    let sessions = Arc::new(SessionStore::new(
        backend,
        Duration::from_secs(config.session_ttl_secs),
    ));
    let catalog = ProductCatalog::with_products(products).await;
    let gateway = Arc::new(SandboxGateway::new());
    let vault = Arc::new(InMemoryCredentialVault::new());
    vault
        .seed(
            "netflix",
            vec!["net-1:pw".to_string(), "net-2:pw".to_string()],
        )
        .await;
    vault.seed("spotify", vec!["spo-1:pw".to_string()]).await;
    vault.seed("vpn", vec!["vpn-1".to_string()]).await;

    let limiter = Arc::new(RateLimiter::new(config.limits.clone()));
    let checkout = Arc::new(CheckoutOrchestrator::new(
        Arc::clone(&sessions),
        catalog.clone(),
        gateway.clone(),
        PromoRegistry::new(config.promo_codes.clone()),
    ));
    let coordinator = Arc::new(FulfillmentCoordinator::new(
        Arc::clone(&sessions),
        catalog.clone(),
        gateway.clone(),
        vault.clone(),
        Arc::new(InMemoryCache::new()),
    ));
    let admin = AdminCommands::new(
        Arc::clone(&sessions),
        catalog.clone(),
        Arc::clone(&coordinator),
        Arc::new(AllowListPolicy::new(config.admins.clone())),
    );
    let router = ConversationRouter::new(
        Arc::clone(&config),
        Arc::clone(&sessions),
        catalog.clone(),
        limiter,
        checkout,
        Arc::clone(&coordinator),
        admin,
        gateway.clone(),
    );
    let receiver = WebhookReceiver::new(
        SECRET.to_string(),
        Arc::clone(&coordinator),
        config.admins.clone(),
    );

    Harness {
        router,
        sessions,
        catalog,
        gateway,
        vault,
        receiver,
    }
}

/// Drives a customer through browse -> cart -> checkout -> QRIS and returns
/// the invoice reference.
pub async fn place_qris_order(harness: &Harness, customer: &str, product: &str) -> String {
    harness.router.handle(customer, "1", false).await;
    harness.router.handle(customer, product, false).await;
    harness.router.handle(customer, "cart", false).await;
    harness.router.handle(customer, "checkout", false).await;
    harness.router.handle(customer, "1", false).await;
    harness
        .sessions
        .get(customer)
        .await
        .payment_invoice_id
        .expect("payment channel should be open")
}
