use crate::domain::product::Product;
use crate::error::{Result, StoreError};
use std::io::Read;

/// Reads the product catalog from a CSV source.
///
/// Expected header: `id,name,description,price,stock,category`. Whitespace is
/// trimmed and record lengths are flexible, so hand-edited files load fine.
pub struct CatalogReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CatalogReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes products.
    pub fn products(self) -> impl Iterator<Item = Result<Product>> {
        self.reader.into_deserialize::<RawProduct>().map(|result| {
            result
                .map_err(StoreError::from)
                .map(|raw| raw.into_product())
        })
    }
}

#[derive(serde::Deserialize)]
struct RawProduct {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    price: rust_decimal::Decimal,
    stock: u32,
    #[serde(default)]
    category: String,
}

impl RawProduct {
    fn into_product(self) -> Product {
        let mut product = Product::new(self.id, self.name, self.price, self.stock);
        product.description = self.description;
        if !self.category.is_empty() {
            product.category = self.category;
        }
        product
    }
}
