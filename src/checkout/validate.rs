//! Availability validation: evaluate every line, report every failure.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::ResolvedLine;
use crate::store::CatalogSnapshot;

/// Why a line failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockFailure {
    /// Requested quantity exceeds available stock.
    Insufficient,
    /// The product is no longer in the catalog.
    UnknownProduct,
    /// The attribute selection does not identify exactly one stocked variant.
    Unresolvable,
    /// A concurrent checkout kept invalidating this attempt.
    Conflicted,
}

/// One failing line of an order attempt.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockIssue {
    pub product_id: Uuid,
    pub name: String,
    pub reason: StockFailure,
    /// Stock on hand for the resolved source, where known.
    pub available: Option<i64>,
    pub message: String,
}

impl StockIssue {
    pub fn insufficient(line: &ResolvedLine, available: i64) -> Self {
        Self {
            product_id: line.source.product_id,
            name: line.name.clone(),
            reason: StockFailure::Insufficient,
            available: Some(available),
            message: format!(
                "only {} of {} available (requested {})",
                available, line.name, line.quantity
            ),
        }
    }

    pub fn unknown_product(product_id: Uuid) -> Self {
        Self {
            product_id,
            name: String::new(),
            reason: StockFailure::UnknownProduct,
            available: None,
            message: "product is no longer available".into(),
        }
    }

    pub fn unresolvable(product_id: Uuid, name: &str) -> Self {
        Self {
            product_id,
            name: name.to_string(),
            reason: StockFailure::Unresolvable,
            available: None,
            message: format!("this combination of {name} is not available"),
        }
    }

    pub fn conflicted(line: &ResolvedLine) -> Self {
        Self {
            product_id: line.source.product_id,
            name: line.name.clone(),
            reason: StockFailure::Conflicted,
            available: None,
            message: format!("stock of {} changed while placing the order; please try again", line.name),
        }
    }
}

/// Aggregate failure report for one order attempt. Non-empty means the
/// whole attempt is rejected; partial orders are never created.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StockReport {
    pub issues: Vec<StockIssue>,
}

impl StockReport {
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn push(&mut self, issue: StockIssue) {
        self.issues.push(issue);
    }

    pub fn merge(&mut self, other: StockReport) {
        self.issues.extend(other.issues);
    }
}

/// Check every resolved line against its stock source in the snapshot.
///
/// Deliberately not fail-fast: the shopper sees every problem in their cart
/// in one response. The commit re-checks authoritatively afterwards.
pub fn validate_lines(lines: &[ResolvedLine], catalog: &CatalogSnapshot) -> StockReport {
    let mut report = StockReport::default();
    for line in lines {
        match catalog.stock_of(&line.source) {
            None => report.push(StockIssue::unknown_product(line.source.product_id)),
            Some(available) if i64::from(line.quantity) > available => {
                report.push(StockIssue::insufficient(line, available));
            }
            Some(_) => {}
        }
    }
    report
}
