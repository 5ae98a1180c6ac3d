//! Order Read Model
//!
//! Read-only snapshot of the parts of an order the coupon engine needs.
//! The wider order lifecycle lives with the checkout flow, not here.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One order line as seen by the coupon engine.
///
/// `category_id` is denormalized at order placement, so historical orders
/// keep their discount behavior even if products are later re-categorized.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub category_id: Option<Uuid>,
    /// quantity × unit price
    pub line_amount: Decimal,
}

/// Snapshot fetched once per `apply_coupon` call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub order_id: Uuid,
    pub lines: Vec<OrderLine>,
    /// Whole-order total, the basis for minimum-order checks.
    pub total: Decimal,
    pub shipping_fee: Decimal,
}
