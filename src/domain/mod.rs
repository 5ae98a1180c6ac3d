//! Domain types
pub mod coupon;
pub mod order;

pub use coupon::{Coupon, CouponScope, CouponType, CouponUsage, RedemptionResult, UsageTicket};
pub use order::{OrderLine, OrderSnapshot};
