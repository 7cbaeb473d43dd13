//! Storage seam for the checkout pipeline.
//!
//! Two backends implement [`CheckoutStore`]: Postgres for production and an
//! in-memory twin for tests and offline development.

pub mod memory;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::checkout::validate::StockReport;
use crate::domain::order::{Order, ResolvedLine, ShippingInfo, StockSourceId};
use crate::domain::product::{AttributeCatalog, Product};

/// Catalog data loaded for one checkout attempt: the referenced products
/// (variants included) and the attribute names their options point at.
#[derive(Clone, Debug, Default)]
pub struct CatalogSnapshot {
    pub products: HashMap<Uuid, Product>,
    pub attribute_names: HashMap<Uuid, String>,
}

impl CatalogSnapshot {
    /// Stock on hand for a resolved source, as of this snapshot.
    pub fn stock_of(&self, source: &StockSourceId) -> Option<i64> {
        let product = self.products.get(&source.product_id)?;
        match source.variant_id {
            Some(variant_id) => product.variant(variant_id).map(|v| v.stock),
            None => Some(product.base_stock),
        }
    }
}

impl AttributeCatalog for CatalogSnapshot {
    fn attribute_name(&self, id: Uuid) -> Option<&str> {
        self.attribute_names.get(&id).map(String::as_str)
    }
}

/// One applied stock mutation, kept for compensation and reconciliation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StockDecrement {
    pub source: StockSourceId,
    pub quantity: u32,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("order not found")]
    OrderNotFound,
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Inventory commit failure. Either way, nothing was mutated.
#[derive(Debug, Error)]
pub enum CommitError {
    /// The authoritative re-check under the commit protocol found
    /// shortfalls; every failing line is reported.
    #[error("insufficient stock for {} line(s)", .0.issues.len())]
    Insufficient(StockReport),
    /// A concurrent commit collided with this one; the attempt may be
    /// re-validated and retried.
    #[error("commit conflicted with a concurrent checkout")]
    Conflict,
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// An order awaiting its number and persistence.
#[derive(Clone, Debug)]
pub struct OrderDraft {
    pub customer_id: Option<Uuid>,
    pub lines: Vec<ResolvedLine>,
    pub shipping: ShippingInfo,
    pub total: i64,
}

/// Storage backend for checkout.
///
/// Implementations must make `commit_inventory` atomic across every line of
/// the set: all decrements applied or none, stock never observable below
/// zero, quantities re-checked authoritatively inside the commit protocol.
/// `insert_order` must allocate the year-scoped order number with an atomic
/// increment-and-return, in the same unit of work that persists the order —
/// never by scanning existing orders.
#[async_trait]
pub trait CheckoutStore: Send + Sync {
    /// Load products and attribute names referenced by one order attempt.
    async fn load_catalog(&self, product_ids: &[Uuid]) -> Result<CatalogSnapshot, StoreError>;

    /// Atomically decrement every line's stock source, bump its sales
    /// counter, and recompute product aggregate stock.
    async fn commit_inventory(
        &self,
        lines: &[ResolvedLine],
    ) -> Result<Vec<StockDecrement>, CommitError>;

    /// Compensate a failed order insert by restoring earlier decrements.
    async fn restore_inventory(&self, decrements: &[StockDecrement]) -> Result<(), StoreError>;

    /// Allocate the order number and persist the order with its lines.
    async fn insert_order(&self, draft: OrderDraft) -> Result<Order, StoreError>;

    async fn get_order(&self, id: Uuid) -> Result<Order, StoreError>;
}
