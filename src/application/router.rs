use crate::application::admin::AdminCommands;
use crate::application::checkout::{CheckoutOrchestrator, mask};
use crate::application::fulfillment::{FulfillmentCoordinator, SettleTrigger};
use crate::config::Config;
use crate::domain::matcher;
use crate::domain::ports::{ChannelType, PaymentGatewayBox};
use crate::domain::reply::{Reply, SideEffect};
use crate::domain::session::{CartItem, Session, Step};
use crate::error::{Result, StoreError};
use crate::infrastructure::catalog::ProductCatalog;
use crate::infrastructure::rate_limit::{Decision, RateLimiter};
use crate::infrastructure::session_store::SessionStore;
use std::sync::Arc;
use tracing::{error, warn};

/// Keywords that claim a manual payment was made (with or without a proof
/// image) and hand the order to admin verification.
const PAYMENT_CLAIM_WORDS: &[&str] = &["paid", "done", "sudah", "transferred"];

/// Interprets a normalized inbound message against the customer's current
/// step and dispatches to the matching handler.
///
/// Owns the state-machine transition table; collaborators (catalog, checkout,
/// fulfillment, admin surface) are injected at construction. `handle` never
/// fails and never panics: unhandled errors become a generic apology plus an
/// error cooldown, without altering session state.
pub struct ConversationRouter {
    config: Arc<Config>,
    sessions: Arc<SessionStore>,
    catalog: ProductCatalog,
    limiter: Arc<RateLimiter>,
    checkout: Arc<CheckoutOrchestrator>,
    coordinator: Arc<FulfillmentCoordinator>,
    admin: AdminCommands,
    gateway: PaymentGatewayBox,
}

impl ConversationRouter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        sessions: Arc<SessionStore>,
        catalog: ProductCatalog,
        limiter: Arc<RateLimiter>,
        checkout: Arc<CheckoutOrchestrator>,
        coordinator: Arc<FulfillmentCoordinator>,
        admin: AdminCommands,
        gateway: PaymentGatewayBox,
    ) -> Self {
        Self {
            config,
            sessions,
            catalog,
            limiter,
            checkout,
            coordinator,
            admin,
            gateway,
        }
    }

    /// Entry point for one inbound chat message.
    pub async fn handle(&self, customer_id: &str, text: &str, has_media: bool) -> Reply {
        if self.limiter.is_in_cooldown(customer_id).await {
            return Reply::text(
                "We hit a snag just now. Please wait a moment and try again.",
            );
        }

        match self.route(customer_id, text, has_media).await {
            Ok(reply) => reply,
            Err(StoreError::Validation(message)) | Err(StoreError::NotFound(message)) => {
                Reply::text(format!("Sorry, {message}."))
            }
            Err(StoreError::RateLimited(reason)) => {
                warn!(
                    customer = %mask(customer_id),
                    %reason,
                    "security: rate limit exceeded"
                );
                Reply::text("You're sending requests too quickly. Please slow down and try again shortly.")
            }
            Err(StoreError::Unauthorized) => Reply::text("Unknown command."),
            Err(StoreError::Gateway(message)) | Err(StoreError::Cache(message)) => {
                warn!(customer = %mask(customer_id), %message, "collaborator unavailable");
                Reply::text(
                    "The payment service is unreachable right now. Please try again in a minute.",
                )
            }
            Err(other) => {
                error!(
                    customer = %mask(customer_id),
                    error = %other,
                    "unhandled routing error"
                );
                self.limiter.set_error_cooldown(customer_id).await;
                Reply::text("Something went wrong on our side. Please try again in a moment.")
            }
        }
    }

    async fn route(&self, customer_id: &str, text: &str, has_media: bool) -> Result<Reply> {
        let text = text.trim();

        // Admin surface bypasses the customer state machine, but sits behind
        // the same inbound message gate.
        if let Decision::Denied { reason } = self.limiter.check_message(customer_id).await {
            return Err(StoreError::RateLimited(reason));
        }
        if text.starts_with('/') {
            return self.admin.handle(customer_id, text).await;
        }

        let lower = text.to_lowercase();
        let session = self.sessions.get(customer_id).await;

        // Read-only lookups work from any step.
        if matches!(lower.as_str(), "history" | "track") {
            return self.history(&session).await;
        }

        // Global commands take priority over step-scoped handling, but a
        // session holding an open payment reference stays pinned to its step
        // until the payment settles or an admin intervenes.
        if !session.step.is_payment_pending() {
            match lower.as_str() {
                "menu" | "help" => {
                    self.sessions
                        .mutate(customer_id, |session| session.step = Step::Menu)
                        .await;
                    return Ok(Reply::text(self.render_menu()));
                }
                "cart" => return self.view_cart(customer_id, &session).await,
                _ => {}
            }
        }

        match session.step {
            Step::Menu => self.in_menu(customer_id, &lower).await,
            Step::Browsing => self.in_browsing(customer_id, text).await,
            Step::Checkout => self.in_checkout(customer_id, &lower).await,
            Step::SelectPayment => self.in_select_payment(customer_id, &lower).await,
            Step::SelectBank => self.in_select_bank(customer_id, &lower).await,
            Step::AwaitingPayment => {
                self.in_awaiting_payment(customer_id, &session, &lower, has_media)
                    .await
            }
            Step::AwaitingAdminApproval => Ok(Reply::text(
                "Your payment is awaiting verification by our team. We'll deliver your order as soon as it is confirmed.",
            )),
        }
    }

    async fn in_menu(&self, customer_id: &str, lower: &str) -> Result<Reply> {
        match lower {
            "1" | "browse" | "products" | "catalog" => {
                self.sessions
                    .mutate(customer_id, |session| session.step = Step::Browsing)
                    .await;
                Ok(Reply::text(self.render_products().await))
            }
            "2" => {
                let session = self.sessions.get(customer_id).await;
                self.view_cart(customer_id, &session).await
            }
            "3" | "about" => Ok(Reply::text(format!(
                "{} sells digital products delivered instantly over chat once payment clears.",
                self.config.store_name
            ))),
            "4" | "contact" => Ok(Reply::text(
                "Need a human? Reply here and an operator will pick up the conversation.",
            )),
            _ => Ok(Reply::text(format!(
                "Sorry, I didn't understand that.\n\n{}",
                self.render_menu()
            ))),
        }
    }

    async fn in_browsing(&self, customer_id: &str, query: &str) -> Result<Reply> {
        let products = self.catalog.all().await;
        let Some(product) = matcher::resolve(query, &products) else {
            return Ok(Reply::text(format!(
                "No product matches '{query}'. Type part of a product name, or 'menu' to go back."
            )));
        };

        let item = CartItem::from(product);
        let name = product.name.clone();
        let session = self
            .sessions
            .mutate(customer_id, |session| session.cart.push(item))
            .await;
        Ok(Reply::text(format!(
            "Added {name} to your cart ({} item(s), total Rp{}). Add more, or type 'cart' to check out.",
            session.cart.len(),
            session.cart_total()
        )))
    }

    async fn in_checkout(&self, customer_id: &str, lower: &str) -> Result<Reply> {
        if let Some(code) = lower.strip_prefix("promo ") {
            return self.checkout.stage_promo(customer_id, code.trim()).await;
        }
        match lower {
            "checkout" | "buy" | "order" => {
                if let Decision::Denied { reason } = self.limiter.check_order(customer_id).await {
                    return Err(StoreError::RateLimited(reason));
                }
                self.checkout.begin(customer_id).await
            }
            "clear" => {
                // An abandoned checkout may still hold reserved units.
                let session = self.sessions.get(customer_id).await;
                if session.order_id.is_some() {
                    let held_ids: Vec<String> = session
                        .order_lines
                        .iter()
                        .map(|item| item.product_id.clone())
                        .collect();
                    self.catalog.release(&held_ids).await;
                }
                self.sessions
                    .mutate(customer_id, |session| session.reset())
                    .await;
                Ok(Reply::text(format!(
                    "Cart cleared.\n\n{}",
                    self.render_menu()
                )))
            }
            _ => {
                let session = self.sessions.get(customer_id).await;
                Ok(Reply::text(render_cart(&session)))
            }
        }
    }

    async fn in_select_payment(&self, customer_id: &str, lower: &str) -> Result<Reply> {
        match lower {
            "1" | "qris" => {
                self.checkout
                    .open_channel(customer_id, ChannelType::Qris)
                    .await
            }
            "2" | "ewallet" | "e-wallet" => {
                self.checkout
                    .open_channel(customer_id, ChannelType::EWallet)
                    .await
            }
            "3" | "bank" | "transfer" | "va" => {
                self.sessions
                    .mutate(customer_id, |session| session.step = Step::SelectBank)
                    .await;
                Ok(Reply::text(self.render_banks()))
            }
            _ => Ok(Reply::text(
                "Choose a payment method:\n1. QRIS\n2. E-Wallet\n3. Bank transfer",
            )),
        }
    }

    async fn in_select_bank(&self, customer_id: &str, lower: &str) -> Result<Reply> {
        let banks = &self.config.banks;
        let chosen = lower
            .parse::<usize>()
            .ok()
            .and_then(|n| banks.get(n.wrapping_sub(1)))
            .or_else(|| banks.iter().find(|bank| bank.as_str() == lower));

        match chosen {
            Some(bank) => {
                self.checkout
                    .open_channel(
                        customer_id,
                        ChannelType::VirtualAccount { bank: bank.clone() },
                    )
                    .await
            }
            None => Ok(Reply::text(self.render_banks())),
        }
    }

    async fn in_awaiting_payment(
        &self,
        customer_id: &str,
        session: &Session,
        lower: &str,
        has_media: bool,
    ) -> Result<Reply> {
        if matches!(lower, "status" | "check" | "cek") {
            let settlement = self
                .coordinator
                .settle(customer_id, SettleTrigger::CustomerPoll)
                .await?;
            let mut reply = Reply::text(settlement.customer_text);
            if let Some(alert) = settlement.admin_alert {
                reply = reply.with_side_effect(SideEffect::Broadcast {
                    recipients: self.config.admins.clone(),
                    text: alert,
                });
            }
            return Ok(reply);
        }

        // A proof-of-payment image (or a claim keyword) hands the order to
        // manual admin verification.
        if has_media || PAYMENT_CLAIM_WORDS.contains(&lower) {
            let order_id = session.order_id.clone().unwrap_or_default();
            self.sessions
                .mutate(customer_id, |session| {
                    session.step = Step::AwaitingAdminApproval;
                })
                .await;
            return Ok(Reply::text(
                "Thanks! Your payment is now awaiting verification by our team.",
            )
            .with_side_effect(SideEffect::Broadcast {
                recipients: self.config.admins.clone(),
                text: format!(
                    "Customer {} reports payment for order {order_id}. Verify and run /approve {order_id}.",
                    mask(customer_id)
                ),
            }));
        }

        Ok(Reply::text(
            "We're waiting for your payment. Type 'status' to check, or pay using the instructions above.",
        ))
    }

    /// Global `cart`: renders the cart and moves to checkout when non-empty.
    async fn view_cart(&self, customer_id: &str, session: &Session) -> Result<Reply> {
        if session.cart.is_empty() {
            return Ok(Reply::text(
                "Your cart is empty. Type '1' to browse products.",
            ));
        }
        let session = self
            .sessions
            .mutate(customer_id, |session| session.step = Step::Checkout)
            .await;
        Ok(Reply::text(render_cart(&session)))
    }

    /// Read-only order lookup; never transitions.
    async fn history(&self, session: &Session) -> Result<Reply> {
        let Some(order_id) = &session.order_id else {
            return Ok(Reply::text("No orders in this session yet."));
        };
        let status = match &session.payment_invoice_id {
            Some(reference) => match self.gateway.check_status(reference).await {
                Ok(status) => format!("{status:?}").to_lowercase(),
                Err(_) => "unknown".to_string(),
            },
            None => "no payment channel opened".to_string(),
        };
        Ok(Reply::text(format!(
            "Order {order_id}: payment {status} (method: {}).",
            session.payment_method.as_deref().unwrap_or("not chosen")
        )))
    }

    fn render_menu(&self) -> String {
        format!(
            "Welcome to {}!\n1. Browse products\n2. View cart\n3. About us\n4. Contact\n\nReply with a number.",
            self.config.store_name
        )
    }

    async fn render_products(&self) -> String {
        let products = self.catalog.all().await;
        if products.is_empty() {
            return "The catalog is empty right now. Check back soon!".to_string();
        }
        let mut out = String::from("Our products (type a name to add it to your cart):\n");
        for product in &products {
            let availability = if product.stock == 0 {
                " - SOLD OUT".to_string()
            } else {
                String::new()
            };
            out.push_str(&format!(
                "- {} — Rp{}{availability}\n  {}\n",
                product.name, product.unit_price, product.description
            ));
        }
        out
    }

    fn render_banks(&self) -> String {
        let mut out = String::from("Choose your bank for the virtual account:\n");
        for (index, bank) in self.config.banks.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", index + 1, bank.to_uppercase()));
        }
        out
    }
}

fn render_cart(session: &Session) -> String {
    let mut out = String::from("Your cart:\n");
    for item in &session.cart {
        out.push_str(&format!("- {} — Rp{}\n", item.name, item.unit_price));
    }
    out.push_str(&format!("Subtotal: Rp{}\n", session.cart_total()));
    if let (Some(code), Some(percent)) = (&session.promo_code, session.discount_percent) {
        out.push_str(&format!(
            "Promo {code} (-{percent}%): Rp{}\n",
            session.discounted_total()
        ));
    }
    out.push_str("\nType 'checkout' to buy, 'promo <code>' for a discount, or 'clear' to start over.");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::checkout::PromoRegistry;
    use crate::config::Limits;
    use crate::domain::order::PaymentStatus;
    use crate::domain::ports::AllowListPolicy;
    use crate::domain::product::Product;
    use crate::infrastructure::in_memory::{InMemoryCache, InMemoryCredentialVault};
    use crate::infrastructure::sandbox_gateway::SandboxGateway;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::time::Duration;

    pub(crate) struct Fixture {
        pub router: ConversationRouter,
        pub sessions: Arc<SessionStore>,
        pub catalog: ProductCatalog,
        pub gateway: Arc<SandboxGateway>,
    }

    pub(crate) async fn fixture(config: Config) -> Fixture {
        let config = Arc::new(config);
        let sessions = Arc::new(SessionStore::new(
            Arc::new(InMemoryCache::new()),
            Duration::from_secs(config.session_ttl_secs),
        ));
        let catalog = ProductCatalog::with_products(vec![
            Product::new("netflix", "Netflix Premium", dec!(54000), 5),
            Product::new("spotify", "Spotify Family", dec!(25000), 5),
        ])
        .await;
        let gateway = Arc::new(SandboxGateway::new());
        let vault = Arc::new(InMemoryCredentialVault::new());
        vault.seed("netflix", vec!["net-1:pw".to_string()]).await;

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
            vault,
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
            coordinator,
            admin,
            gateway.clone(),
        );
        Fixture {
            router,
            sessions,
            catalog,
            gateway,
        }
    }

    #[tokio::test]
    async fn test_menu_renders_and_stays() {
        let fixture = fixture(Config::default()).await;
        let reply = fixture.router.handle("628111", "menu", false).await;
        assert!(reply.text.contains("1. Browse products"));
        assert_eq!(fixture.sessions.get("628111").await.step, Step::Menu);
    }

    #[tokio::test]
    async fn test_invalid_menu_input_rerenders_with_error() {
        let fixture = fixture(Config::default()).await;
        let reply = fixture.router.handle("628111", "xyzzy", false).await;
        assert!(reply.text.starts_with("Sorry, I didn't understand"));
        assert!(reply.text.contains("1. Browse products"));
        assert_eq!(fixture.sessions.get("628111").await.step, Step::Menu);
    }

    #[tokio::test]
    async fn test_browse_then_add_by_fuzzy_name() {
        let fixture = fixture(Config::default()).await;
        fixture.router.handle("628111", "1", false).await;
        assert_eq!(fixture.sessions.get("628111").await.step, Step::Browsing);

        // Typo still resolves.
        let reply = fixture.router.handle("628111", "netflix premum", false).await;
        assert!(reply.text.contains("Added Netflix Premium"));
        let session = fixture.sessions.get("628111").await;
        assert_eq!(session.step, Step::Browsing);
        assert_eq!(session.cart.len(), 1);
    }

    #[tokio::test]
    async fn test_no_match_stays_in_browsing() {
        let fixture = fixture(Config::default()).await;
        fixture.router.handle("628111", "1", false).await;
        let reply = fixture.router.handle("628111", "minecraft", false).await;
        assert!(reply.text.contains("No product matches"));
        assert_eq!(fixture.sessions.get("628111").await.step, Step::Browsing);
    }

    #[tokio::test]
    async fn test_cart_global_command_transitions_when_nonempty() {
        let fixture = fixture(Config::default()).await;
        let reply = fixture.router.handle("628111", "cart", false).await;
        assert!(reply.text.contains("empty"));
        assert_eq!(fixture.sessions.get("628111").await.step, Step::Menu);

        fixture.router.handle("628111", "1", false).await;
        fixture.router.handle("628111", "spotify", false).await;
        let reply = fixture.router.handle("628111", "cart", false).await;
        assert!(reply.text.contains("Subtotal: Rp25000"));
        assert_eq!(fixture.sessions.get("628111").await.step, Step::Checkout);
    }

    #[tokio::test]
    async fn test_clear_returns_to_menu() {
        let fixture = fixture(Config::default()).await;
        fixture.router.handle("628111", "1", false).await;
        fixture.router.handle("628111", "spotify", false).await;
        fixture.router.handle("628111", "cart", false).await;
        fixture.router.handle("628111", "clear", false).await;

        let session = fixture.sessions.get("628111").await;
        assert_eq!(session.step, Step::Menu);
        assert!(session.cart.is_empty());
    }

    #[tokio::test]
    async fn test_bank_transfer_path() {
        let fixture = fixture(Config::default()).await;
        fixture.router.handle("628111", "1", false).await;
        fixture.router.handle("628111", "spotify", false).await;
        fixture.router.handle("628111", "cart", false).await;
        fixture.router.handle("628111", "checkout", false).await;
        assert_eq!(
            fixture.sessions.get("628111").await.step,
            Step::SelectPayment
        );

        let reply = fixture.router.handle("628111", "3", false).await;
        assert!(reply.text.contains("BCA"));
        assert_eq!(fixture.sessions.get("628111").await.step, Step::SelectBank);

        // Invalid bank re-renders, no transition.
        let reply = fixture.router.handle("628111", "hsbc", false).await;
        assert!(reply.text.contains("Choose your bank"));
        assert_eq!(fixture.sessions.get("628111").await.step, Step::SelectBank);

        let reply = fixture.router.handle("628111", "1", false).await;
        assert!(reply.text.contains("virtual account"));
        let session = fixture.sessions.get("628111").await;
        assert_eq!(session.step, Step::AwaitingPayment);
        assert_eq!(session.payment_method.as_deref(), Some("VA BCA"));
    }

    #[tokio::test]
    async fn test_awaiting_payment_ignores_chatter() {
        let fixture = fixture(Config::default()).await;
        fixture.router.handle("628111", "1", false).await;
        fixture.router.handle("628111", "netflix", false).await;
        fixture.router.handle("628111", "cart", false).await;
        fixture.router.handle("628111", "checkout", false).await;
        fixture.router.handle("628111", "1", false).await;

        let reply = fixture.router.handle("628111", "hello?", false).await;
        assert!(reply.text.contains("waiting for your payment"));
        assert_eq!(
            fixture.sessions.get("628111").await.step,
            Step::AwaitingPayment
        );
    }

    #[tokio::test]
    async fn test_payment_proof_moves_to_admin_approval() {
        let admins = vec!["628999".to_string()];
        let config = Config {
            admins: admins.clone(),
            ..Config::default()
        };
        let fixture = fixture(config).await;
        fixture.router.handle("628111", "1", false).await;
        fixture.router.handle("628111", "netflix", false).await;
        fixture.router.handle("628111", "cart", false).await;
        fixture.router.handle("628111", "checkout", false).await;
        fixture.router.handle("628111", "3", false).await;
        fixture.router.handle("628111", "bca", false).await;

        let reply = fixture.router.handle("628111", "", true).await;
        assert!(reply.text.contains("awaiting verification"));
        assert!(matches!(
            &reply.side_effects[0],
            SideEffect::Broadcast { recipients, .. } if recipients == &admins
        ));
        let session = fixture.sessions.get("628111").await;
        assert_eq!(session.step, Step::AwaitingAdminApproval);

        // Customer input cannot leave this state.
        fixture.router.handle("628111", "status", false).await;
        assert_eq!(
            fixture.sessions.get("628111").await.step,
            Step::AwaitingAdminApproval
        );
    }

    #[tokio::test]
    async fn test_menu_cannot_leave_awaiting_payment() {
        let fixture = fixture(Config::default()).await;
        fixture.router.handle("628111", "1", false).await;
        fixture.router.handle("628111", "netflix", false).await;
        fixture.router.handle("628111", "cart", false).await;
        fixture.router.handle("628111", "checkout", false).await;
        fixture.router.handle("628111", "1", false).await;

        for escape in ["menu", "help", "cart"] {
            let reply = fixture.router.handle("628111", escape, false).await;
            assert!(reply.text.contains("waiting for your payment"), "{escape}");
        }
        let session = fixture.sessions.get("628111").await;
        assert_eq!(session.step, Step::AwaitingPayment);
        assert!(session.payment_invoice_id.is_some());
    }

    #[tokio::test]
    async fn test_menu_cannot_leave_admin_approval() {
        let fixture = fixture(Config::default()).await;
        fixture.router.handle("628111", "1", false).await;
        fixture.router.handle("628111", "netflix", false).await;
        fixture.router.handle("628111", "cart", false).await;
        fixture.router.handle("628111", "checkout", false).await;
        fixture.router.handle("628111", "1", false).await;
        fixture.router.handle("628111", "paid", false).await;
        assert_eq!(
            fixture.sessions.get("628111").await.step,
            Step::AwaitingAdminApproval
        );

        let reply = fixture.router.handle("628111", "menu", false).await;
        assert!(reply.text.contains("awaiting verification"));
        let session = fixture.sessions.get("628111").await;
        assert_eq!(session.step, Step::AwaitingAdminApproval);
        assert!(session.payment_invoice_id.is_some());
    }

    #[tokio::test]
    async fn test_clear_after_checkout_releases_reservation() {
        let fixture = fixture(Config::default()).await;
        fixture.router.handle("628111", "1", false).await;
        fixture.router.handle("628111", "netflix", false).await;
        fixture.router.handle("628111", "cart", false).await;
        fixture.router.handle("628111", "checkout", false).await;
        assert_eq!(fixture.catalog.get("netflix").await.unwrap().stock, 4);

        // Customer backs out of payment selection entirely.
        fixture.router.handle("628111", "menu", false).await;
        fixture.router.handle("628111", "cart", false).await;
        fixture.router.handle("628111", "clear", false).await;

        assert_eq!(fixture.catalog.get("netflix").await.unwrap().stock, 5);
        let session = fixture.sessions.get("628111").await;
        assert_eq!(session.step, Step::Menu);
        assert!(session.order_id.is_none());
        assert!(session.order_lines.is_empty());
    }

    #[tokio::test]
    async fn test_message_rate_limit_denies_politely() {
        let config = Config {
            limits: Limits {
                messages_per_window: 2,
                ..Limits::default()
            },
            ..Config::default()
        };
        let fixture = fixture(config).await;
        fixture.router.handle("628111", "menu", false).await;
        fixture.router.handle("628111", "menu", false).await;
        let reply = fixture.router.handle("628111", "menu", false).await;
        assert!(reply.text.contains("too quickly"));
    }

    #[tokio::test]
    async fn test_history_is_read_only() {
        let fixture = fixture(Config::default()).await;
        let reply = fixture.router.handle("628111", "history", false).await;
        assert!(reply.text.contains("No orders"));

        fixture.router.handle("628111", "1", false).await;
        fixture.router.handle("628111", "netflix", false).await;
        fixture.router.handle("628111", "cart", false).await;
        fixture.router.handle("628111", "checkout", false).await;
        fixture.router.handle("628111", "1", false).await;

        let step_before = fixture.sessions.get("628111").await.step;
        let reply = fixture.router.handle("628111", "track", false).await;
        assert!(reply.text.contains("payment pending"));
        assert_eq!(fixture.sessions.get("628111").await.step, step_before);
    }

    #[tokio::test]
    async fn test_status_poll_after_success_delivers_once() {
        let fixture = fixture(Config::default()).await;
        fixture.router.handle("628111", "1", false).await;
        fixture.router.handle("628111", "netflix", false).await;
        fixture.router.handle("628111", "cart", false).await;
        fixture.router.handle("628111", "checkout", false).await;
        fixture.router.handle("628111", "1", false).await;

        let reference = fixture
            .sessions
            .get("628111")
            .await
            .payment_invoice_id
            .unwrap();
        fixture
            .gateway
            .mark(&reference, PaymentStatus::Succeeded)
            .await
            .unwrap();

        let reply = fixture.router.handle("628111", "status", false).await;
        assert!(reply.text.contains("net-1:pw"));
        let session = fixture.sessions.get("628111").await;
        assert_eq!(session.step, Step::Menu);
        assert!(session.cart.is_empty());
    }
}
