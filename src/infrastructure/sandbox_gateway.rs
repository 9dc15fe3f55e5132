use crate::domain::order::PaymentStatus;
use crate::domain::ports::{ChannelDetails, ChannelRequest, ChannelType, PaymentGateway};
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Invoice {
    status: PaymentStatus,
    order_id: String,
}

/// In-process payment gateway for the demo binary and tests.
///
/// Issues invoice references and lets callers flip their status out of band,
/// which stands in for the remote provider confirming or expiring a payment.
#[derive(Default, Clone)]
pub struct SandboxGateway {
    invoices: Arc<RwLock<HashMap<String, Invoice>>>,
    counter: Arc<AtomicU64>,
}

impl SandboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the remote provider moving an invoice to a new status.
    pub async fn mark(&self, reference: &str, status: PaymentStatus) -> Result<()> {
        let mut invoices = self.invoices.write().await;
        match invoices.get_mut(reference) {
            Some(invoice) => {
                invoice.status = status;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("invoice '{reference}'"))),
        }
    }

    pub async fn order_id_of(&self, reference: &str) -> Option<String> {
        let invoices = self.invoices.read().await;
        invoices.get(reference).map(|inv| inv.order_id.clone())
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_channel(&self, request: ChannelRequest) -> Result<ChannelDetails> {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let reference = format!("inv_{seq}");

        let (instructions, qr_image) = match &request.channel {
            ChannelType::Qris => (
                format!("Scan the QRIS code to pay Rp{}", request.amount),
                Some(format!("qris://{reference}")),
            ),
            ChannelType::EWallet => (
                format!("Approve the Rp{} charge in your e-wallet app", request.amount),
                None,
            ),
            ChannelType::VirtualAccount { bank } => (
                format!(
                    "Transfer Rp{} to virtual account 88{}{} ({})",
                    request.amount,
                    seq,
                    request.customer_id.len(),
                    bank.to_uppercase()
                ),
                None,
            ),
        };

        let mut invoices = self.invoices.write().await;
        invoices.insert(
            reference.clone(),
            Invoice {
                status: PaymentStatus::Pending,
                order_id: request.order_id,
            },
        );

        Ok(ChannelDetails {
            reference,
            instructions,
            qr_image,
        })
    }

    async fn check_status(&self, reference: &str) -> Result<PaymentStatus> {
        let invoices = self.invoices.read().await;
        invoices
            .get(reference)
            .map(|invoice| invoice.status)
            .ok_or_else(|| StoreError::Gateway(format!("unknown reference '{reference}'")))
    }
}
