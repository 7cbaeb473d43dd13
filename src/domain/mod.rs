//! Domain types for the fulfillment pipeline.

pub mod cart;
pub mod order;
pub mod product;

pub use cart::{merge_lines, AttributeSelection, CartLine, SelectedAttribute};
pub use order::{Order, OrderNumber, OrderStatus, ResolvedLine, ShippingInfo, StockSourceId};
pub use product::{Attribute, AttributeCatalog, Product, Variant, VariantOption};
