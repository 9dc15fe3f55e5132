use crate::application::checkout::mask;
use crate::application::fulfillment::{FulfillmentCoordinator, SettleOutcome, SettleTrigger};
use crate::domain::ports::AdminPolicyBox;
use crate::domain::product::Product;
use crate::domain::reply::{Reply, SideEffect};
use crate::error::{Result, StoreError};
use crate::infrastructure::catalog::ProductCatalog;
use crate::infrastructure::session_store::SessionStore;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// `/`-prefixed command surface for store operators.
///
/// Bypasses the customer state machine entirely. Authorization happens here
/// against the injected policy; unauthorized attempts get a generic denial
/// that leaks nothing about valid admin identities.
pub struct AdminCommands {
    sessions: Arc<SessionStore>,
    catalog: ProductCatalog,
    coordinator: Arc<FulfillmentCoordinator>,
    policy: AdminPolicyBox,
}

impl AdminCommands {
    pub fn new(
        sessions: Arc<SessionStore>,
        catalog: ProductCatalog,
        coordinator: Arc<FulfillmentCoordinator>,
        policy: AdminPolicyBox,
    ) -> Self {
        Self {
            sessions,
            catalog,
            coordinator,
            policy,
        }
    }

    pub async fn handle(&self, sender_id: &str, text: &str) -> Result<Reply> {
        if !self.policy.is_admin(sender_id) {
            warn!(
                sender = %mask(sender_id),
                "security: admin command from non-admin"
            );
            return Ok(Reply::text("Unknown command."));
        }

        let trimmed = text.trim();
        let (command, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (trimmed, ""),
        };

        match command {
            "/approve" => self.approve(rest).await,
            "/addproduct" => self.add_product(rest).await,
            "/delproduct" => self.del_product(rest).await,
            "/stock" => self.set_stock(rest).await,
            "/broadcast" => self.broadcast(rest).await,
            _ => Ok(Reply::text(
                "Admin commands: /approve <orderId>, /addproduct id|name|price|stock[|description[|category]], \
                 /delproduct <id>, /stock <id> <count>, /broadcast <text>",
            )),
        }
    }

    /// Manual fulfillment entry for out-of-band payment channels.
    async fn approve(&self, order_id: &str) -> Result<Reply> {
        if order_id.is_empty() {
            return Err(StoreError::Validation("usage: /approve <orderId>".to_string()));
        }
        let customer_id = self
            .sessions
            .find_by_order_id(order_id)
            .await
            .ok_or_else(|| StoreError::NotFound(format!("order '{order_id}'")))?;

        let settlement = self
            .coordinator
            .settle(&customer_id, SettleTrigger::AdminApproval)
            .await?;
        info!(order_id, customer = %mask(&customer_id), "admin approval processed");

        let reply = match &settlement.outcome {
            SettleOutcome::Refused(status) => Reply::text(format!(
                "Refused: gateway reports '{}' for order {order_id}; not delivering.",
                serde_json::to_string(status)?.trim_matches('"')
            )),
            SettleOutcome::Pending => Reply::text(format!(
                "Order {order_id} is still pending at the gateway."
            )),
            SettleOutcome::InFlight => Reply::text(format!(
                "Order {order_id} is already being processed."
            )),
            SettleOutcome::Terminal { first, .. } => {
                let mut reply = Reply::text(if *first {
                    format!("Order {order_id} approved and delivered.")
                } else {
                    format!("Order {order_id} had already been settled.")
                });
                if *first {
                    reply = reply.with_side_effect(SideEffect::DeliverTo {
                        customer_id: settlement.customer_id.clone(),
                        text: settlement.customer_text.clone(),
                    });
                }
                if let Some(alert) = &settlement.admin_alert {
                    reply.text.push_str(&format!("\n{alert}"));
                }
                reply
            }
        };
        Ok(reply)
    }

    async fn add_product(&self, args: &str) -> Result<Reply> {
        let fields: Vec<&str> = args.split('|').map(str::trim).collect();
        if fields.len() < 4 {
            return Err(StoreError::Validation(
                "usage: /addproduct id|name|price|stock[|description[|category]]".to_string(),
            ));
        }
        let unit_price = Decimal::from_str(fields[2])
            .map_err(|_| StoreError::Validation(format!("bad price '{}'", fields[2])))?;
        if unit_price <= Decimal::ZERO {
            return Err(StoreError::Validation("price must be positive".to_string()));
        }
        let stock: u32 = fields[3]
            .parse()
            .map_err(|_| StoreError::Validation(format!("bad stock count '{}'", fields[3])))?;

        let mut product = Product::new(fields[0], fields[1], unit_price, stock);
        if let Some(description) = fields.get(4) {
            product.description = (*description).to_string();
        }
        if let Some(category) = fields.get(5) {
            product.category = (*category).to_string();
        }
        let id = product.id.clone();
        self.catalog.add(product).await?;
        Ok(Reply::text(format!("Product '{id}' added.")))
    }

    async fn del_product(&self, product_id: &str) -> Result<Reply> {
        self.catalog.remove(product_id).await?;
        Ok(Reply::text(format!("Product '{product_id}' removed.")))
    }

    async fn set_stock(&self, args: &str) -> Result<Reply> {
        let (product_id, count) = args
            .split_once(char::is_whitespace)
            .ok_or_else(|| StoreError::Validation("usage: /stock <id> <count>".to_string()))?;
        let count: u32 = count
            .trim()
            .parse()
            .map_err(|_| StoreError::Validation(format!("bad stock count '{}'", count.trim())))?;
        self.catalog.set_stock(product_id, count).await?;
        Ok(Reply::text(format!("Stock for '{product_id}' set to {count}.")))
    }

    async fn broadcast(&self, text: &str) -> Result<Reply> {
        if text.is_empty() {
            return Err(StoreError::Validation("usage: /broadcast <text>".to_string()));
        }
        let recipients = self.sessions.active_customers().await;
        let count = recipients.len();
        Ok(
            Reply::text(format!("Broadcast queued for {count} customers."))
                .with_side_effect(SideEffect::Broadcast {
                    recipients,
                    text: text.to_string(),
                }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::checkout::{CheckoutOrchestrator, PromoRegistry};
    use crate::domain::ports::{AllowListPolicy, ChannelType};
    use crate::domain::session::{CartItem, Step};
    use crate::infrastructure::in_memory::{InMemoryCache, InMemoryCredentialVault};
    use crate::infrastructure::sandbox_gateway::SandboxGateway;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::time::Duration;

    struct Fixture {
        sessions: Arc<SessionStore>,
        catalog: ProductCatalog,
        gateway: Arc<SandboxGateway>,
        checkout: CheckoutOrchestrator,
        admin: AdminCommands,
    }

    async fn fixture() -> Fixture {
        let sessions = Arc::new(SessionStore::new(
            Arc::new(InMemoryCache::new()),
            Duration::from_secs(1800),
        ));
        let catalog =
            ProductCatalog::with_products(vec![Product::new("vpn", "VPN Pro", dec!(15000), 5)])
                .await;
        let gateway = Arc::new(SandboxGateway::new());
        let vault = Arc::new(InMemoryCredentialVault::new());
        vault.seed("vpn", vec!["vpn-key-1".to_string()]).await;

        let checkout = CheckoutOrchestrator::new(
            Arc::clone(&sessions),
            catalog.clone(),
            gateway.clone(),
            PromoRegistry::new(HashMap::new()),
        );
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
            coordinator,
            Arc::new(AllowListPolicy::new(vec!["628999".to_string()])),
        );
        Fixture {
            sessions,
            catalog,
            gateway,
            checkout,
            admin,
        }
    }

    async fn place_order(fixture: &Fixture, customer_id: &str) -> (String, String) {
        let product = fixture.catalog.get("vpn").await.unwrap();
        let item = CartItem::from(&product);
        fixture
            .sessions
            .mutate(customer_id, |session| {
                session.cart.push(item);
                session.step = Step::Checkout;
            })
            .await;
        fixture.checkout.begin(customer_id).await.unwrap();
        fixture
            .checkout
            .open_channel(customer_id, ChannelType::EWallet)
            .await
            .unwrap();
        let session = fixture.sessions.get(customer_id).await;
        (
            session.order_id.unwrap(),
            session.payment_invoice_id.unwrap(),
        )
    }

    #[tokio::test]
    async fn test_non_admin_gets_generic_denial() {
        let fixture = fixture().await;
        let (order_id, _) = place_order(&fixture, "628111").await;
        let step_before = fixture.sessions.get("628111").await.step;

        let reply = fixture
            .admin
            .handle("628444", &format!("/approve {order_id}"))
            .await
            .unwrap();
        assert_eq!(reply.text, "Unknown command.");
        // The order's session is unchanged.
        assert_eq!(fixture.sessions.get("628111").await.step, step_before);
    }

    #[tokio::test]
    async fn test_approve_refused_until_gateway_agrees() {
        let fixture = fixture().await;
        let (order_id, reference) = place_order(&fixture, "628111").await;

        let reply = fixture
            .admin
            .handle("628999", &format!("/approve {order_id}"))
            .await
            .unwrap();
        assert!(reply.text.contains("Refused"));
        assert!(reply.side_effects.is_empty());

        fixture
            .gateway
            .mark(&reference, crate::domain::order::PaymentStatus::Succeeded)
            .await
            .unwrap();
        let reply = fixture
            .admin
            .handle("628999", &format!("/approve {order_id}"))
            .await
            .unwrap();
        assert!(reply.text.contains("approved and delivered"));
        // Credentials go to the customer, not the admin.
        assert!(matches!(
            &reply.side_effects[0],
            SideEffect::DeliverTo { customer_id, text }
                if customer_id == "628111" && text.contains("vpn-key-1")
        ));
    }

    #[tokio::test]
    async fn test_approve_unknown_order() {
        let fixture = fixture().await;
        assert!(matches!(
            fixture.admin.handle("628999", "/approve ORD-0-XXXX").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_catalog_mutation_commands() {
        let fixture = fixture().await;
        fixture
            .admin
            .handle("628999", "/addproduct canva|Canva Pro|20000|7|Design tool|productivity")
            .await
            .unwrap();
        let product = fixture.catalog.get("canva").await.unwrap();
        assert_eq!(product.stock, 7);
        assert_eq!(product.category, "productivity");

        fixture.admin.handle("628999", "/stock canva 2").await.unwrap();
        assert_eq!(fixture.catalog.get("canva").await.unwrap().stock, 2);

        fixture
            .admin
            .handle("628999", "/delproduct canva")
            .await
            .unwrap();
        assert!(fixture.catalog.get("canva").await.is_none());
    }

    #[tokio::test]
    async fn test_addproduct_validation() {
        let fixture = fixture().await;
        assert!(matches!(
            fixture.admin.handle("628999", "/addproduct a|b").await,
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            fixture
                .admin
                .handle("628999", "/addproduct a|b|free|1")
                .await,
            Err(StoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_broadcast_targets_active_sessions() {
        let fixture = fixture().await;
        fixture.sessions.get("628111").await;
        fixture.sessions.get("628222").await;

        let reply = fixture
            .admin
            .handle("628999", "/broadcast Stock refilled!")
            .await
            .unwrap();
        match &reply.side_effects[0] {
            SideEffect::Broadcast { recipients, text } => {
                assert_eq!(recipients.len(), 2);
                assert_eq!(text, "Stock refilled!");
            }
            other => panic!("expected broadcast, got {other:?}"),
        }
    }
}
