//! Online-Store Back Office — Coupon Redemption Engine
//!
//! The back office's catalog, cart and order plumbing consume this crate
//! through a narrow boundary: given an order and a coupon code, decide
//! whether the coupon applies, compute the discount over the scoped subset
//! of order lines, and account for usage so that global and per-user limits
//! are never oversold under concurrent redemption.
//!
//! ## Operations
//! - [`CouponEngine::apply_coupon`] — validate, resolve scope, compute the
//!   discount and commit usage atomically
//! - [`CouponEngine::release_redemption`] — compensating release on order
//!   cancellation or coupon swap
//! - [`CouponEngine::is_coupon_valid_now`] — advisory validity for UI display
//!
//! ## Backends
//! Storage is consumed through the [`store`] traits; [`store::PgStore`]
//! backs the service, [`store::MemoryStore`] backs tests and demos.

pub mod catalog;
pub mod coupon;
pub mod domain;
pub mod error;
pub mod store;

pub use catalog::{CatalogIndex, CategoryAncestry, StaticCatalog};
pub use coupon::CouponEngine;
pub use domain::{
    Coupon, CouponScope, CouponType, CouponUsage, OrderLine, OrderSnapshot, RedemptionResult,
    UsageTicket,
};
pub use error::{CouponError, Result};
pub use store::{CouponStore, MemoryStore, OrderStore, PgStore, RedemptionLedger};
