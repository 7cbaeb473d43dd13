//! Storefront checkout service.
//!
//! Order fulfillment against live, variant-structured inventory: cart-line
//! normalization, variant resolution, availability validation, atomic
//! inventory commit, and year-scoped order-number allocation.
//!
//! Page rendering, authentication, catalog CRUD, and notification delivery
//! are external collaborators. This crate exposes the checkout pipeline
//! ([`checkout::place_order`]), its storage seam ([`store::CheckoutStore`]
//! with Postgres and in-memory backends), and the HTTP surface
//! ([`api::router`]).

pub mod api;
pub mod checkout;
pub mod domain;
pub mod notify;
pub mod store;

pub use checkout::{place_order, CheckoutError, CheckoutRequest};
pub use store::{CheckoutStore, CommitError, StoreError};
