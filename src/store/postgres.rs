//! Postgres store: transactional inventory commit and order persistence.
//!
//! The commit protocol locks every touched stock row (`FOR UPDATE`) inside
//! one transaction, re-checks all quantities, then applies the decrements.
//! Order numbers come from a per-year counter row bumped atomically in the
//! same transaction that persists the order.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::checkout::validate::{StockIssue, StockReport};
use crate::domain::cart::{AttributeSelection, SelectedAttribute};
use crate::domain::order::{Order, OrderNumber, OrderStatus, ResolvedLine, ShippingInfo, StockSourceId};
use crate::domain::product::{Product, Variant, VariantOption};
use super::{
    CatalogSnapshot, CheckoutStore, CommitError, OrderDraft, StockDecrement, StoreError,
};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    price: i64,
    image: Option<String>,
    category: Option<String>,
    base_stock: i64,
    stock: i64,
    sales_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct VariantRow {
    id: Uuid,
    product_id: Uuid,
    options: serde_json::Value,
    stock: i64,
    price: Option<i64>,
    image: Option<String>,
    sales_count: i64,
}

#[derive(sqlx::FromRow)]
struct AttributeRow {
    id: Uuid,
    name: String,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    customer_id: Option<Uuid>,
    shipping: serde_json::Value,
    total: i64,
    status: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    product_id: Uuid,
    variant_id: Option<Uuid>,
    name: String,
    image: Option<String>,
    category: Option<String>,
    quantity: i32,
    unit_price: i64,
    selected_attributes: serde_json::Value,
}

/// Serialization failures and deadlocks are retryable conflicts; everything
/// else is a storage fault.
fn commit_error(e: sqlx::Error) -> CommitError {
    if let sqlx::Error::Database(db) = &e {
        if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) {
            return CommitError::Conflict;
        }
    }
    CommitError::Storage(StoreError::from(e))
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Storage(e.to_string()))
}

#[async_trait]
impl CheckoutStore for PgStore {
    async fn load_catalog(&self, product_ids: &[Uuid]) -> Result<CatalogSnapshot, StoreError> {
        let products = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, price, image, category, base_stock, stock, sales_count, \
             created_at, updated_at FROM products WHERE id = ANY($1)",
        )
        .bind(product_ids)
        .fetch_all(&self.pool)
        .await?;

        let variants = sqlx::query_as::<_, VariantRow>(
            "SELECT id, product_id, options, stock, price, image, sales_count \
             FROM variants WHERE product_id = ANY($1)",
        )
        .bind(product_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut attribute_ids: Vec<Uuid> = Vec::new();
        let mut by_product: HashMap<Uuid, Vec<Variant>> = HashMap::new();
        for row in variants {
            let options: Vec<VariantOption> = serde_json::from_value(row.options)
                .map_err(|e| StoreError::Storage(format!("malformed options for variant {}: {e}", row.id)))?;
            attribute_ids.extend(options.iter().map(|o| o.attribute_id));
            by_product.entry(row.product_id).or_default().push(Variant {
                id: row.id,
                options,
                stock: row.stock,
                price: row.price,
                image: row.image,
                sales_count: row.sales_count,
            });
        }

        let mut snapshot = CatalogSnapshot::default();
        for row in products {
            let variants = by_product.remove(&row.id).unwrap_or_default();
            snapshot.products.insert(
                row.id,
                Product {
                    id: row.id,
                    name: row.name,
                    price: row.price,
                    image: row.image,
                    category: row.category,
                    base_stock: row.base_stock,
                    stock: row.stock,
                    sales_count: row.sales_count,
                    variants,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                },
            );
        }

        if !attribute_ids.is_empty() {
            let rows = sqlx::query_as::<_, AttributeRow>(
                "SELECT id, name FROM attributes WHERE id = ANY($1)",
            )
            .bind(&attribute_ids)
            .fetch_all(&self.pool)
            .await?;
            snapshot.attribute_names = rows.into_iter().map(|r| (r.id, r.name)).collect();
        }

        Ok(snapshot)
    }

    async fn commit_inventory(
        &self,
        lines: &[ResolvedLine],
    ) -> Result<Vec<StockDecrement>, CommitError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        // Lock rows in a deterministic order so two overlapping commits
        // cannot deadlock on each other.
        let mut ordered: Vec<&ResolvedLine> = lines.iter().collect();
        ordered.sort_by_key(|l| (l.source.product_id, l.source.variant_id));

        // Re-check every line under lock, gathering every shortfall before
        // deciding; the shopper gets the complete picture even here.
        let mut report = StockReport::default();
        for line in &ordered {
            let available: Option<i64> = match line.source.variant_id {
                Some(variant_id) => {
                    sqlx::query_scalar("SELECT stock FROM variants WHERE id = $1 FOR UPDATE")
                        .bind(variant_id)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(commit_error)?
                }
                None => {
                    sqlx::query_scalar("SELECT base_stock FROM products WHERE id = $1 FOR UPDATE")
                        .bind(line.source.product_id)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(commit_error)?
                }
            };
            match available {
                None => report.push(StockIssue::unknown_product(line.source.product_id)),
                Some(a) if i64::from(line.quantity) > a => {
                    report.push(StockIssue::insufficient(line, a));
                }
                Some(_) => {}
            }
        }
        if !report.is_empty() {
            // Dropping the transaction rolls it back; nothing was written.
            drop(tx);
            return Err(CommitError::Insufficient(report));
        }

        for line in &ordered {
            let quantity = i64::from(line.quantity);
            match line.source.variant_id {
                Some(variant_id) => {
                    sqlx::query(
                        "UPDATE variants SET stock = stock - $2, sales_count = sales_count + $2 \
                         WHERE id = $1",
                    )
                    .bind(variant_id)
                    .bind(quantity)
                    .execute(&mut *tx)
                    .await
                    .map_err(commit_error)?;
                    // Relative update keeps the aggregate in step with the
                    // variant decrement even when a concurrent commit on a
                    // sibling variant lands between our statements.
                    sqlx::query(
                        "UPDATE products SET stock = stock - $2, updated_at = NOW() WHERE id = $1",
                    )
                    .bind(line.source.product_id)
                    .bind(quantity)
                    .execute(&mut *tx)
                    .await
                    .map_err(commit_error)?;
                }
                None => {
                    sqlx::query(
                        "UPDATE products SET base_stock = base_stock - $2, stock = stock - $2, \
                         sales_count = sales_count + $2, updated_at = NOW() WHERE id = $1",
                    )
                    .bind(line.source.product_id)
                    .bind(quantity)
                    .execute(&mut *tx)
                    .await
                    .map_err(commit_error)?;
                }
            }
        }

        tx.commit().await.map_err(commit_error)?;
        Ok(ordered
            .iter()
            .map(|l| StockDecrement {
                source: l.source,
                quantity: l.quantity,
            })
            .collect())
    }

    async fn restore_inventory(&self, decrements: &[StockDecrement]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for d in decrements {
            let quantity = i64::from(d.quantity);
            match d.source.variant_id {
                Some(variant_id) => {
                    sqlx::query(
                        "UPDATE variants SET stock = stock + $2, sales_count = sales_count - $2 \
                         WHERE id = $1",
                    )
                    .bind(variant_id)
                    .bind(quantity)
                    .execute(&mut *tx)
                    .await?;
                    sqlx::query(
                        "UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1",
                    )
                    .bind(d.source.product_id)
                    .bind(quantity)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query(
                        "UPDATE products SET base_stock = base_stock + $2, stock = stock + $2, \
                         sales_count = sales_count - $2, updated_at = NOW() WHERE id = $1",
                    )
                    .bind(d.source.product_id)
                    .bind(quantity)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_order(&self, draft: OrderDraft) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let year = now.year();

        // Atomic increment-and-return; never derived by scanning orders.
        let seq: i64 = sqlx::query_scalar(
            "INSERT INTO order_sequences (year, last_seq) VALUES ($1, 1) \
             ON CONFLICT (year) DO UPDATE SET last_seq = order_sequences.last_seq + 1 \
             RETURNING last_seq",
        )
        .bind(year)
        .fetch_one(&mut *tx)
        .await?;

        let number = OrderNumber::new(year, seq);
        let order_id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO orders (id, order_number, customer_id, shipping, total, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)",
        )
        .bind(order_id)
        .bind(number.as_str())
        .bind(draft.customer_id)
        .bind(encode_json(&draft.shipping)?)
        .bind(draft.total)
        .bind(OrderStatus::Pending.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for line in &draft.lines {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, variant_id, name, image, \
                 category, quantity, unit_price, selected_attributes) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(Uuid::now_v7())
            .bind(order_id)
            .bind(line.source.product_id)
            .bind(line.source.variant_id)
            .bind(&line.name)
            .bind(&line.image)
            .bind(&line.category)
            .bind(line.quantity as i32)
            .bind(line.unit_price)
            .bind(encode_json(&line.selection.pairs())?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(Order {
            id: order_id,
            number,
            customer_id: draft.customer_id,
            lines: draft.lines,
            shipping: draft.shipping,
            total: draft.total,
            status: OrderStatus::Pending,
            created_at: now,
        })
    }

    async fn get_order(&self, id: Uuid) -> Result<Order, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, order_number, customer_id, shipping, total, status, created_at \
             FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::OrderNotFound)?;

        let items = sqlx::query_as::<_, OrderItemRow>(
            "SELECT product_id, variant_id, name, image, category, quantity, unit_price, \
             selected_attributes FROM order_items WHERE order_id = $1 ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let pairs: Vec<SelectedAttribute> = serde_json::from_value(item.selected_attributes)
                .map_err(|e| StoreError::Storage(format!("malformed order item attributes: {e}")))?;
            lines.push(ResolvedLine {
                source: StockSourceId {
                    product_id: item.product_id,
                    variant_id: item.variant_id,
                },
                quantity: item.quantity.max(0) as u32,
                unit_price: item.unit_price,
                name: item.name,
                image: item.image,
                category: item.category,
                selection: AttributeSelection::new(pairs),
            });
        }

        let status = OrderStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Storage(format!("unknown order status: {}", row.status)))?;
        let shipping: ShippingInfo = serde_json::from_value(row.shipping)
            .map_err(|e| StoreError::Storage(format!("malformed shipping record: {e}")))?;

        Ok(Order {
            id: row.id,
            number: OrderNumber::from_string(row.order_number),
            customer_id: row.customer_id,
            lines,
            shipping,
            total: row.total,
            status,
            created_at: row.created_at,
        })
    }
}
