//! Product catalog types: attributes, products, variants.
//!
//! Created and mutated by catalog management (an external collaborator);
//! the checkout pipeline only ever writes stock through the store's commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named, enumerable product dimension (e.g. Color) with its allowed labels.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Attribute {
    pub id: Uuid,
    pub name: String,
    pub labels: Vec<String>,
}

/// Read-only lookup from attribute identifier to canonical name.
pub trait AttributeCatalog {
    fn attribute_name(&self, id: Uuid) -> Option<&str>;
}

impl AttributeCatalog for std::collections::HashMap<Uuid, String> {
    fn attribute_name(&self, id: Uuid) -> Option<&str> {
        self.get(&id).map(String::as_str)
    }
}

/// One (attribute, value) pair of a variant's option set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantOption {
    pub attribute_id: Uuid,
    pub value: String,
}

/// A stocked combination of attribute values with its own counters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Variant {
    pub id: Uuid,
    pub options: Vec<VariantOption>,
    pub stock: i64,
    /// Price override in minor units; falls back to the product price.
    pub price: Option<i64>,
    pub image: Option<String>,
    pub sales_count: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    /// Minor units (e.g. cents).
    pub price: i64,
    pub image: Option<String>,
    pub category: Option<String>,
    /// Stock sold from directly when the product declares no variants.
    pub base_stock: i64,
    /// Aggregate stock. Invariant: equals the sum of variant stocks, or
    /// `base_stock` when there are no variants.
    pub stock: i64,
    pub sales_count: i64,
    pub variants: Vec<Variant>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn has_variants(&self) -> bool {
        !self.variants.is_empty()
    }

    /// Aggregate stock recomputed from current variant stocks (or base stock).
    pub fn aggregate_stock(&self) -> i64 {
        if self.variants.is_empty() {
            self.base_stock
        } else {
            self.variants.iter().map(|v| v.stock).sum()
        }
    }

    pub fn variant(&self, id: Uuid) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == id)
    }
}
