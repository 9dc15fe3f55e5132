use clap::Parser;
use kedai::application::admin::AdminCommands;
use kedai::application::checkout::{CheckoutOrchestrator, PromoRegistry};
use kedai::application::fulfillment::FulfillmentCoordinator;
use kedai::application::router::ConversationRouter;
use kedai::config::Config;
use kedai::domain::order::PaymentStatus;
use kedai::domain::ports::AllowListPolicy;
use kedai::domain::reply::{Attachment, Reply, SideEffect};
use kedai::infrastructure::catalog::ProductCatalog;
use kedai::infrastructure::in_memory::{InMemoryCache, InMemoryCredentialVault};
use kedai::infrastructure::rate_limit::RateLimiter;
use kedai::infrastructure::sandbox_gateway::SandboxGateway;
use kedai::infrastructure::session_store::SessionStore;
use kedai::interfaces::csv::catalog_reader::CatalogReader;
use kedai::interfaces::webhook::{WebhookAck, WebhookReceiver};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Local chat loop against the storefront engine, using the sandbox payment
/// gateway. Each stdin line is routed as one inbound message; `!paid`
/// simulates the gateway webhook for the current invoice.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Product catalog CSV (id,name,description,price,stock,category)
    catalog: PathBuf,

    /// Optional TOML config (admins, promos, limits, webhook secret)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Customer id to chat as
    #[arg(long, default_value = "demo-customer")]
    customer: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("kedai=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Arc::new(match &cli.config {
        Some(path) => Config::load(path).into_diagnostic()?,
        None => Config::default(),
    });

    let file = File::open(&cli.catalog).into_diagnostic()?;
    let mut products = Vec::new();
    for product in CatalogReader::new(file).products() {
        match product {
            Ok(product) => products.push(product),
            Err(e) => eprintln!("Skipping catalog row: {e}"),
        }
    }

    let vault = Arc::new(InMemoryCredentialVault::new());
    for product in &products {
        // Sandbox delivery material: one credential per sellable unit.
        let credentials = (1..=product.stock)
            .map(|n| format!("{}-key-{n}", product.id))
            .collect();
        vault.seed(&product.id, credentials).await;
    }

    let catalog = ProductCatalog::with_products(products).await;
    let sessions = Arc::new(SessionStore::new(
        Arc::new(InMemoryCache::new()),
        Duration::from_secs(config.session_ttl_secs),
    ));
    let gateway = Arc::new(SandboxGateway::new());
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
        catalog,
        limiter,
        checkout,
        Arc::clone(&coordinator),
        admin,
        gateway.clone(),
    );
    // The receiver refuses an empty secret outright, so an unconfigured run
    // gets a process-local one for the sandbox webhook loop.
    let webhook_secret = if config.webhook_secret.is_empty() {
        format!("sandbox-{}", std::process::id())
    } else {
        config.webhook_secret.clone()
    };
    let receiver = WebhookReceiver::new(
        webhook_secret.clone(),
        coordinator,
        config.admins.clone(),
    );

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    for line in stdin.lock().lines() {
        let line = line.into_diagnostic()?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        if text == "!paid" || text == "!expired" {
            let status = if text == "!paid" {
                PaymentStatus::Succeeded
            } else {
                PaymentStatus::Expired
            };
            simulate_webhook(
                &cli.customer,
                status,
                &sessions,
                &gateway,
                &receiver,
                &webhook_secret,
            )
            .await;
            stdout.flush().into_diagnostic()?;
            continue;
        }

        let reply = router.handle(&cli.customer, text, false).await;
        print_reply(&reply);
        stdout.flush().into_diagnostic()?;
    }

    Ok(())
}

/// Flips the current invoice at the sandbox gateway, then delivers the
/// webhook through the authenticated receiver path.
async fn simulate_webhook(
    customer: &str,
    status: PaymentStatus,
    sessions: &SessionStore,
    gateway: &SandboxGateway,
    receiver: &WebhookReceiver,
    secret: &str,
) {
    let Some(reference) = sessions.get(customer).await.payment_invoice_id else {
        println!("[sandbox] no open invoice to update");
        return;
    };
    if let Err(e) = gateway.mark(&reference, status).await {
        println!("[sandbox] {e}");
        return;
    }
    let body = format!(
        r#"{{"reference":"{reference}","status":{}}}"#,
        serde_json::to_string(&status).unwrap_or_else(|_| "\"failed\"".to_string())
    );
    match receiver.handle(Some(secret), &body).await {
        WebhookAck::Unauthorized => println!("[webhook] rejected: bad signature"),
        WebhookAck::Received(effects) => {
            println!("[webhook] acknowledged");
            for effect in effects {
                print_side_effect(&effect);
            }
        }
    }
}

fn print_reply(reply: &Reply) {
    println!("{}", reply.text);
    for attachment in &reply.attachments {
        match attachment {
            Attachment::Image(reference) => println!("[image] {reference}"),
        }
    }
    for effect in &reply.side_effects {
        print_side_effect(effect);
    }
}

fn print_side_effect(effect: &SideEffect) {
    match effect {
        SideEffect::DeliverTo { customer_id, text } => {
            println!("[deliver -> {customer_id}] {text}");
        }
        SideEffect::Broadcast { recipients, text } => {
            println!("[broadcast -> {} recipients] {text}", recipients.len());
        }
    }
}
