//! The order fulfillment pipeline: merge, resolve, validate, commit,
//! assemble.
//!
//! Every checkout runs as an independent unit of work; correctness under
//! concurrency comes from the store's commit protocol, not from serializing
//! requests.

pub mod resolve;
pub mod validate;

use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::cart::{merge_lines, CartLine};
use crate::domain::order::{Order, ResolvedLine, ShippingInfo};
use crate::store::{CheckoutStore, CommitError, OrderDraft, StockDecrement, StoreError};
use resolve::resolve_line;
use validate::{validate_lines, StockIssue, StockReport};

/// Extra full passes (load, resolve, validate, commit) granted after a
/// commit conflict before the attempt is rejected.
const COMMIT_RETRIES: u32 = 1;

#[derive(Debug, Error)]
pub enum CheckoutError {
    /// One or more lines cannot be fulfilled; the report lists all of them.
    /// Buyer-correctable, nothing was committed.
    #[error("stock validation failed for {} line(s)", .0.issues.len())]
    Stock(StockReport),
    /// Stock was decremented but the order record could not be written.
    /// The decrements carried here are what reconciliation needs.
    #[error("order persistence failed after inventory commit")]
    Persistence {
        decrements: Vec<StockDecrement>,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A checkout request after HTTP-level shape checks.
#[derive(Clone, Debug)]
pub struct CheckoutRequest {
    pub lines: Vec<CartLine>,
    pub shipping: ShippingInfo,
    pub customer_id: Option<Uuid>,
}

/// Run one order attempt end to end.
///
/// Duplicate cart lines are merged first. Every line is then resolved and
/// validated before anything is written; a non-empty report rejects the
/// whole attempt. A commit conflict re-runs the attempt once against fresh
/// catalog state. The order record is persisted only after the inventory
/// commit durably succeeded.
pub async fn place_order(
    store: &dyn CheckoutStore,
    request: CheckoutRequest,
) -> Result<Order, CheckoutError> {
    let merged = merge_lines(request.lines);

    let mut attempt = 0;
    loop {
        let resolved = match resolve_and_validate(store, &merged).await? {
            Ok(resolved) => resolved,
            Err(report) => return Err(CheckoutError::Stock(report)),
        };

        let decrements = match store.commit_inventory(&resolved).await {
            Ok(decrements) => decrements,
            Err(CommitError::Insufficient(report)) => return Err(CheckoutError::Stock(report)),
            Err(CommitError::Conflict) if attempt < COMMIT_RETRIES => {
                attempt += 1;
                warn!(attempt, "inventory commit conflicted; revalidating");
                continue;
            }
            Err(CommitError::Conflict) => {
                let mut report = StockReport::default();
                for line in &resolved {
                    report.push(StockIssue::conflicted(line));
                }
                return Err(CheckoutError::Stock(report));
            }
            Err(CommitError::Storage(e)) => return Err(CheckoutError::Store(e)),
        };

        let total: i64 = resolved.iter().map(ResolvedLine::line_total).sum();
        let draft = OrderDraft {
            customer_id: request.customer_id,
            lines: resolved,
            shipping: request.shipping.clone(),
            total,
        };

        return match store.insert_order(draft).await {
            Ok(order) => {
                info!(
                    order_number = %order.number,
                    lines = order.lines.len(),
                    total = order.total,
                    "order placed"
                );
                Ok(order)
            }
            Err(source) => {
                error!(error = %source, "order insert failed after inventory commit; restoring stock");
                if let Err(restore_err) = store.restore_inventory(&decrements).await {
                    // Reconciliation record: without it an operator cannot
                    // restore the lost stock.
                    for d in &decrements {
                        error!(
                            product_id = %d.source.product_id,
                            variant_id = ?d.source.variant_id,
                            quantity = d.quantity,
                            "unreconciled stock decrement; manual restoration required"
                        );
                    }
                    error!(error = %restore_err, "stock restoration failed");
                }
                Err(CheckoutError::Persistence { decrements, source })
            }
        };
    }
}

/// Load the catalog, resolve every merged line, and validate availability.
/// Resolution failures and shortfalls land in one combined report so the
/// shopper sees every problem at once.
async fn resolve_and_validate(
    store: &dyn CheckoutStore,
    merged: &[CartLine],
) -> Result<Result<Vec<ResolvedLine>, StockReport>, StoreError> {
    let product_ids: Vec<Uuid> = merged.iter().map(|l| l.product_id).collect();
    let snapshot = store.load_catalog(&product_ids).await?;

    let mut resolved = Vec::with_capacity(merged.len());
    let mut report = StockReport::default();
    for line in merged {
        let Some(product) = snapshot.products.get(&line.product_id) else {
            report.push(StockIssue::unknown_product(line.product_id));
            continue;
        };
        match resolve_line(product, line, &snapshot) {
            Ok(r) => resolved.push(r),
            Err(err) => {
                warn!(product_id = %line.product_id, error = %err, "variant resolution failed");
                report.push(StockIssue::unresolvable(product.id, &product.name));
            }
        }
    }

    report.merge(validate_lines(&resolved, &snapshot));
    if report.is_empty() {
        Ok(Ok(resolved))
    } else {
        Ok(Err(report))
    }
}
