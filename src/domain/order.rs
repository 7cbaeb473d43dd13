//! Orders: numbers, resolved lines, the persisted record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::cart::AttributeSelection;

/// Year-scoped, strictly increasing order identifier.
///
/// The textual form `YYYY-NNNNN` is shown to customers and staff; any
/// storage layer must preserve it exactly. The sequence restarts at 1 each
/// calendar year.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn new(year: i32, seq: i64) -> Self {
        Self(format!("{year:04}-{seq:05}"))
    }

    /// Rebuild from the stored textual form.
    pub fn from_string(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the stock source a line resolved to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockSourceId {
    pub product_id: Uuid,
    /// `None` means the product's own base stock.
    pub variant_id: Option<Uuid>,
}

/// A cart line bound to its stock source, carrying the authoritative price
/// and snapshot metadata. Never mutated after resolution; it becomes the
/// order line.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLine {
    pub source: StockSourceId,
    pub quantity: u32,
    /// Authoritative minor-unit price at resolution time.
    pub unit_price: i64,
    pub name: String,
    pub image: Option<String>,
    pub category: Option<String>,
    pub selection: AttributeSelection,
}

impl ResolvedLine {
    pub fn line_total(&self) -> i64 {
        self.unit_price * i64::from(self.quantity)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfo {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub street: String,
    pub street2: Option<String>,
    #[validate(length(min = 1))]
    pub city: String,
    pub state: Option<String>,
    #[validate(length(min = 1))]
    pub zip: String,
    #[validate(length(min = 1))]
    pub country: String,
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
}

/// A committed order. Created once, after the inventory commit succeeded;
/// immutable history from then on.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub number: OrderNumber,
    pub customer_id: Option<Uuid>,
    pub lines: Vec<ResolvedLine>,
    pub shipping: ShippingInfo,
    /// Computed from authoritative line prices, not the buyer-supplied total.
    pub total: i64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}
