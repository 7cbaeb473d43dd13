//! In-memory store: test and development twin of the Postgres backend.
//!
//! One lock over the commit section gives the same all-or-nothing guarantee
//! the Postgres transaction does. Carries injectable failure hooks so the
//! pipeline's retry and compensation paths can be exercised.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use uuid::Uuid;

use crate::checkout::validate::{StockIssue, StockReport};
use crate::domain::order::{Order, OrderNumber, OrderStatus, ResolvedLine, StockSourceId};
use crate::domain::product::{Attribute, Product};
use super::{
    CatalogSnapshot, CheckoutStore, CommitError, OrderDraft, StockDecrement, StoreError,
};

#[derive(Default)]
struct Inner {
    attributes: HashMap<Uuid, Attribute>,
    products: HashMap<Uuid, Product>,
    orders: HashMap<Uuid, Order>,
    sequences: HashMap<i32, i64>,
    pending_commit_conflicts: u32,
    fail_next_insert: bool,
}

impl Inner {
    fn stock_for(&self, source: &StockSourceId) -> Option<i64> {
        let product = self.products.get(&source.product_id)?;
        match source.variant_id {
            Some(variant_id) => product.variant(variant_id).map(|v| v.stock),
            None => Some(product.base_stock),
        }
    }

    fn adjust(&mut self, source: &StockSourceId, delta: i64) {
        let Some(product) = self.products.get_mut(&source.product_id) else {
            return;
        };
        match source.variant_id {
            Some(variant_id) => {
                if let Some(variant) = product.variants.iter_mut().find(|v| v.id == variant_id) {
                    variant.stock += delta;
                    variant.sales_count -= delta;
                }
            }
            None => {
                product.base_stock += delta;
                product.sales_count -= delta;
            }
        }
        product.stock = product.aggregate_stock();
        product.updated_at = Utc::now();
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn seed_attribute(&self, attribute: Attribute) {
        self.lock().attributes.insert(attribute.id, attribute);
    }

    /// Insert a product, fixing up the aggregate stock invariant.
    pub fn seed_product(&self, mut product: Product) {
        product.stock = product.aggregate_stock();
        self.lock().products.insert(product.id, product);
    }

    /// Current stock of a source (variant, or base stock when `None`).
    pub fn stock_of(&self, product_id: Uuid, variant_id: Option<Uuid>) -> Option<i64> {
        self.lock().stock_for(&StockSourceId {
            product_id,
            variant_id,
        })
    }

    /// Current aggregate stock of a product.
    pub fn aggregate_stock_of(&self, product_id: Uuid) -> Option<i64> {
        self.lock().products.get(&product_id).map(|p| p.stock)
    }

    pub fn sales_count_of(&self, product_id: Uuid, variant_id: Option<Uuid>) -> Option<i64> {
        let inner = self.lock();
        let product = inner.products.get(&product_id)?;
        match variant_id {
            Some(vid) => product.variant(vid).map(|v| v.sales_count),
            None => Some(product.sales_count),
        }
    }

    pub fn order_count(&self) -> usize {
        self.lock().orders.len()
    }

    /// Test hook: each call makes one upcoming `commit_inventory` report a
    /// conflict. Stack calls to exhaust the pipeline's retry allowance.
    pub fn fail_next_commit(&self) {
        self.lock().pending_commit_conflicts += 1;
    }

    /// Test hook: the next `insert_order` fails.
    pub fn fail_next_insert(&self) {
        self.lock().fail_next_insert = true;
    }
}

#[async_trait]
impl CheckoutStore for MemoryStore {
    async fn load_catalog(&self, product_ids: &[Uuid]) -> Result<CatalogSnapshot, StoreError> {
        let inner = self.lock();
        let mut snapshot = CatalogSnapshot::default();
        for id in product_ids {
            if let Some(product) = inner.products.get(id) {
                snapshot.products.insert(*id, product.clone());
            }
        }
        snapshot.attribute_names = inner
            .attributes
            .values()
            .map(|a| (a.id, a.name.clone()))
            .collect();
        Ok(snapshot)
    }

    async fn commit_inventory(
        &self,
        lines: &[ResolvedLine],
    ) -> Result<Vec<StockDecrement>, CommitError> {
        let mut inner = self.lock();
        if inner.pending_commit_conflicts > 0 {
            inner.pending_commit_conflicts -= 1;
            return Err(CommitError::Conflict);
        }

        // Authoritative re-check of every line before any mutation.
        let mut report = StockReport::default();
        for line in lines {
            match inner.stock_for(&line.source) {
                None => report.push(StockIssue::unknown_product(line.source.product_id)),
                Some(available) if i64::from(line.quantity) > available => {
                    report.push(StockIssue::insufficient(line, available));
                }
                Some(_) => {}
            }
        }
        if !report.is_empty() {
            return Err(CommitError::Insufficient(report));
        }

        let mut decrements = Vec::with_capacity(lines.len());
        for line in lines {
            inner.adjust(&line.source, -i64::from(line.quantity));
            decrements.push(StockDecrement {
                source: line.source,
                quantity: line.quantity,
            });
        }
        Ok(decrements)
    }

    async fn restore_inventory(&self, decrements: &[StockDecrement]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for d in decrements {
            inner.adjust(&d.source, i64::from(d.quantity));
        }
        Ok(())
    }

    async fn insert_order(&self, draft: OrderDraft) -> Result<Order, StoreError> {
        let mut inner = self.lock();
        if std::mem::take(&mut inner.fail_next_insert) {
            return Err(StoreError::Storage("injected order insert failure".into()));
        }

        let now = Utc::now();
        let year = now.year();
        let seq = {
            let entry = inner.sequences.entry(year).or_insert(0);
            *entry += 1;
            *entry
        };
        let order = Order {
            id: Uuid::now_v7(),
            number: OrderNumber::new(year, seq),
            customer_id: draft.customer_id,
            lines: draft.lines,
            shipping: draft.shipping,
            total: draft.total,
            status: OrderStatus::Pending,
            created_at: now,
        };
        inner.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: Uuid) -> Result<Order, StoreError> {
        self.lock()
            .orders
            .get(&id)
            .cloned()
            .ok_or(StoreError::OrderNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cart::AttributeSelection;
    use crate::domain::order::ShippingInfo;
    use crate::domain::product::Variant;

    fn variant(stock: i64) -> Variant {
        Variant {
            id: Uuid::now_v7(),
            options: vec![],
            stock,
            price: None,
            image: None,
            sales_count: 0,
        }
    }

    fn product_with(variants: Vec<Variant>, base_stock: i64) -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::now_v7(),
            name: "Shirt".into(),
            price: 1500,
            image: None,
            category: None,
            base_stock,
            stock: 0,
            sales_count: 0,
            variants,
            created_at: now,
            updated_at: now,
        }
    }

    fn resolved(source: StockSourceId, quantity: u32) -> ResolvedLine {
        ResolvedLine {
            source,
            quantity,
            unit_price: 1500,
            name: "Shirt".into(),
            image: None,
            category: None,
            selection: AttributeSelection::default(),
        }
    }

    #[tokio::test]
    async fn test_commit_decrements_and_recomputes_aggregate() {
        let store = MemoryStore::new();
        let red = variant(5);
        let blue = variant(4);
        let (red_id, blue_id) = (red.id, blue.id);
        let product = product_with(vec![red, blue], 0);
        let product_id = product.id;
        store.seed_product(product);

        let source = StockSourceId {
            product_id,
            variant_id: Some(red_id),
        };
        let decrements = store.commit_inventory(&[resolved(source, 3)]).await.unwrap();
        assert_eq!(decrements.len(), 1);
        assert_eq!(store.stock_of(product_id, Some(red_id)), Some(2));
        assert_eq!(store.stock_of(product_id, Some(blue_id)), Some(4));
        assert_eq!(store.aggregate_stock_of(product_id), Some(6));
        assert_eq!(store.sales_count_of(product_id, Some(red_id)), Some(3));
    }

    #[tokio::test]
    async fn test_commit_rejects_whole_set_and_reports_all_shortfalls() {
        let store = MemoryStore::new();
        let a = product_with(vec![], 1);
        let b = product_with(vec![], 10);
        let c = product_with(vec![], 0);
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);
        for p in [a, b, c] {
            store.seed_product(p);
        }

        let lines = [
            resolved(StockSourceId { product_id: a_id, variant_id: None }, 2),
            resolved(StockSourceId { product_id: b_id, variant_id: None }, 2),
            resolved(StockSourceId { product_id: c_id, variant_id: None }, 1),
        ];
        let err = store.commit_inventory(&lines).await.unwrap_err();
        let CommitError::Insufficient(report) = err else {
            panic!("expected Insufficient, got {err:?}");
        };
        assert_eq!(report.issues.len(), 2);
        // The valid middle line must not have been committed.
        assert_eq!(store.stock_of(b_id, None), Some(10));
    }

    #[tokio::test]
    async fn test_restore_reverses_decrements() {
        let store = MemoryStore::new();
        let product = product_with(vec![], 8);
        let product_id = product.id;
        store.seed_product(product);

        let source = StockSourceId {
            product_id,
            variant_id: None,
        };
        let decrements = store.commit_inventory(&[resolved(source, 5)]).await.unwrap();
        assert_eq!(store.stock_of(product_id, None), Some(3));
        store.restore_inventory(&decrements).await.unwrap();
        assert_eq!(store.stock_of(product_id, None), Some(8));
        assert_eq!(store.sales_count_of(product_id, None), Some(0));
    }

    #[tokio::test]
    async fn test_insert_order_allocates_sequential_numbers() {
        let store = MemoryStore::new();
        let year = Utc::now().year();
        for seq in 1..=3i64 {
            let order = store
                .insert_order(OrderDraft {
                    customer_id: None,
                    lines: vec![],
                    shipping: ShippingInfo::default(),
                    total: 0,
                })
                .await
                .unwrap();
            assert_eq!(order.number, OrderNumber::new(year, seq));
        }
    }
}
