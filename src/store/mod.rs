//! Storage Seams
//!
//! The engine consumes storage through three narrow traits so the same
//! orchestration runs against Postgres in the service and against the
//! in-memory backend in tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Coupon, OrderSnapshot, UsageTicket};
use crate::error::Result;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Read access to coupons and their usage bookkeeping.
#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Coupon with all four scope sets loaded, or `None` if the code is
    /// unknown.
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>>;

    /// How many times this user has already redeemed this coupon.
    async fn user_usage_count(&self, coupon_id: Uuid, user_id: Uuid) -> Result<u32>;
}

/// Read-only order snapshots for the checkout flow.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn order_snapshot(&self, order_id: Uuid) -> Result<Option<OrderSnapshot>>;
}

/// The one component allowed to move usage counters.
///
/// `try_redeem` must guarantee that no interleaving of concurrent calls
/// pushes `used_count` past `usage_limit`, nor a user's aggregate past
/// `usage_limit_per_user`. Both counters move in one atomic unit: either
/// the global increment, the per-user upsert, and the ticket row all
/// commit, or none do. A refused limit check surfaces as
/// `GlobalLimitReached` / `PerUserLimitReached`; a write conflict that may
/// succeed on retry surfaces as `TransientConflict`.
#[async_trait]
pub trait RedemptionLedger: Send + Sync {
    async fn try_redeem(
        &self,
        coupon_id: Uuid,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<UsageTicket>;

    /// Atomically undo one redemption: delete the ticket row and decrement
    /// both counters. Symmetric to `try_redeem`.
    async fn release(&self, ticket: UsageTicket) -> Result<()>;

    /// Live ticket already held by this order for this coupon, if any.
    /// Backs the orchestrator's idempotency pre-check.
    async fn find_ticket(&self, order_id: Uuid, coupon_id: Uuid) -> Result<Option<UsageTicket>>;
}
