use crate::{
    db_types::{NewProduct, Product},
    traits::LedgerError,
};

/// Read access to the storefront's product catalog. Catalog management itself lives outside the engine; the upsert is
/// here so that deployments and tests can seed products.
#[allow(async_fn_in_trait)]
pub trait ProductCatalog {
    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, LedgerError>;

    async fn fetch_active_products(&self) -> Result<Vec<Product>, LedgerError>;

    /// Inserts the product, or replaces every field of the product with the same id if `id` is given and exists.
    async fn upsert_product(&self, id: Option<i64>, product: NewProduct) -> Result<Product, LedgerError>;
}
