use crate::domain::product::Product;
use crate::error::{Result, StoreError};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared product registry with atomic stock operations.
///
/// Callers never receive a mutable reference into the catalog; all stock
/// movement goes through [`ProductCatalog::try_reserve`] and
/// [`ProductCatalog::release`], which hold the write guard across the whole
/// check-then-decrement so a race for the last unit has exactly one winner.
#[derive(Default, Clone)]
pub struct ProductCatalog {
    products: Arc<RwLock<Vec<Product>>>,
}

impl ProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_products(products: Vec<Product>) -> Self {
        let catalog = Self::new();
        for product in products {
            // Seed order defines the matcher's tie-break order.
            let _ = catalog.add(product).await;
        }
        catalog
    }

    pub async fn get(&self, product_id: &str) -> Option<Product> {
        let products = self.products.read().await;
        products.iter().find(|p| p.id == product_id).cloned()
    }

    /// Snapshot of the catalog in listing order.
    pub async fn all(&self) -> Vec<Product> {
        self.products.read().await.clone()
    }

    pub async fn add(&self, product: Product) -> Result<()> {
        let mut products = self.products.write().await;
        if products.iter().any(|p| p.id == product.id) {
            return Err(StoreError::Validation(format!(
                "product '{}' already exists",
                product.id
            )));
        }
        products.push(product);
        Ok(())
    }

    pub async fn remove(&self, product_id: &str) -> Result<()> {
        let mut products = self.products.write().await;
        let before = products.len();
        products.retain(|p| p.id != product_id);
        if products.len() == before {
            return Err(StoreError::NotFound(format!("product '{product_id}'")));
        }
        Ok(())
    }

    pub async fn set_stock(&self, product_id: &str, stock: u32) -> Result<()> {
        let mut products = self.products.write().await;
        match products.iter_mut().find(|p| p.id == product_id) {
            Some(product) => {
                product.stock = stock;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("product '{product_id}'"))),
        }
    }

    /// Atomically decrements stock for every line, all-or-nothing.
    ///
    /// On failure returns the ids that were out of stock (or missing) and
    /// leaves every counter untouched.
    pub async fn try_reserve(&self, product_ids: &[String]) -> std::result::Result<(), Vec<String>> {
        let mut products = self.products.write().await;
        Self::reserve_locked(&mut products, product_ids)
    }

    /// Returns previously reserved units (failure compensation path).
    pub async fn release(&self, product_ids: &[String]) {
        let mut products = self.products.write().await;
        Self::release_locked(&mut products, product_ids);
    }

    /// Returns one reservation and takes another under a single write guard,
    /// so no other checkout can slip in between the release and the reserve.
    ///
    /// On shortage the old units stay returned and nothing is reserved; the
    /// caller must drop the order that held them.
    pub async fn try_swap(
        &self,
        release_ids: &[String],
        reserve_ids: &[String],
    ) -> std::result::Result<(), Vec<String>> {
        let mut products = self.products.write().await;
        Self::release_locked(&mut products, release_ids);
        Self::reserve_locked(&mut products, reserve_ids)
    }

    fn reserve_locked(
        products: &mut [Product],
        product_ids: &[String],
    ) -> std::result::Result<(), Vec<String>> {
        let mut shortage: Vec<String> = Vec::new();
        for id in product_ids {
            let wanted = product_ids.iter().filter(|other| *other == id).count() as u32;
            match products.iter().find(|p| &p.id == id) {
                Some(product) if product.stock >= wanted => {}
                _ => {
                    if !shortage.contains(id) {
                        shortage.push(id.clone());
                    }
                }
            }
        }
        if !shortage.is_empty() {
            return Err(shortage);
        }

        for id in product_ids {
            if let Some(product) = products.iter_mut().find(|p| &p.id == id) {
                product.stock -= 1;
            }
        }
        Ok(())
    }

    fn release_locked(products: &mut [Product], product_ids: &[String]) {
        for id in product_ids {
            if let Some(product) = products.iter_mut().find(|p| &p.id == id) {
                product.stock += 1;
            }
        }
    }
}
