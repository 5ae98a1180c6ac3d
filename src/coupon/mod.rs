//! Coupon Engine
//!
//! Composes validation, scope resolution, discount computation and the
//! redemption ledger into the three operations the checkout flow consumes:
//! `apply_coupon`, `release_redemption` and `is_coupon_valid_now`.

pub mod discount;
pub mod scope;
pub mod validate;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::catalog::{CatalogIndex, CategoryAncestry};
use crate::domain::{Coupon, OrderLine, RedemptionResult, UsageTicket};
use crate::error::{CouponError, Result};
use crate::store::{CouponStore, OrderStore, RedemptionLedger};

/// Attempts per redemption before a write conflict is surfaced.
const MAX_REDEEM_ATTEMPTS: u32 = 3;
/// First retry backoff; doubles per attempt.
const REDEEM_BACKOFF: Duration = Duration::from_millis(20);

#[derive(Clone)]
pub struct CouponEngine {
    coupons: Arc<dyn CouponStore>,
    orders: Arc<dyn OrderStore>,
    ledger: Arc<dyn RedemptionLedger>,
    catalog: Arc<dyn CatalogIndex>,
}

impl CouponEngine {
    pub fn new(
        coupons: Arc<dyn CouponStore>,
        orders: Arc<dyn OrderStore>,
        ledger: Arc<dyn RedemptionLedger>,
        catalog: Arc<dyn CatalogIndex>,
    ) -> Self {
        Self {
            coupons,
            orders,
            ledger,
            catalog,
        }
    }

    /// Apply a coupon code to an order.
    ///
    /// Validation runs first as an advisory pre-check; the ledger re-checks
    /// both usage limits atomically at commit, since another request may
    /// consume the last slot between the two. Applying the same code to the
    /// same order twice is refused with `AlreadyApplied` before the ledger
    /// is touched, so client retries cannot double-redeem.
    pub async fn apply_coupon(
        &self,
        code: &str,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<RedemptionResult> {
        let coupon = self
            .coupons
            .find_by_code(code)
            .await?
            .ok_or(CouponError::CouponNotFound)?;
        let order = self
            .orders
            .order_snapshot(order_id)
            .await?
            .ok_or(CouponError::OrderNotFound)?;

        if self.ledger.find_ticket(order_id, coupon.id).await?.is_some() {
            return Err(CouponError::AlreadyApplied);
        }

        let prior_uses = self.coupons.user_usage_count(coupon.id, user_id).await?;
        validate::validate(&coupon, Utc::now(), order.total, prior_uses)?;

        let ancestry = self.prefetch_ancestry(&coupon, &order.lines).await?;
        let (eligible, eligible_subtotal) =
            scope::resolve_eligible_lines(&coupon.scope, &order.lines, &ancestry);
        tracing::debug!(
            coupon = %coupon.code,
            order = %order_id,
            eligible_lines = eligible.len(),
            %eligible_subtotal,
            "scope resolved"
        );
        if eligible_subtotal.is_zero() {
            return Err(CouponError::NoEligibleItems);
        }

        let discount_amount = discount::compute_discount(
            coupon.kind,
            coupon.value,
            eligible_subtotal,
            order.shipping_fee,
        );

        let usage_ticket = self.redeem_with_retry(coupon.id, user_id, order_id).await?;
        tracing::info!(
            coupon = %coupon.code,
            order = %order_id,
            %discount_amount,
            ticket = %usage_ticket,
            "coupon redeemed"
        );

        Ok(RedemptionResult {
            coupon_id: coupon.id,
            discount_amount,
            eligible_subtotal,
            usage_ticket,
        })
    }

    /// Compensating release, used on order cancellation or coupon swap.
    pub async fn release_redemption(&self, ticket: UsageTicket) -> Result<()> {
        self.ledger.release(ticket).await?;
        tracing::info!(%ticket, "redemption released");
        Ok(())
    }

    /// Cheap advisory check for UI display. Runs the user-independent
    /// validation only and never touches the ledger.
    pub async fn is_coupon_valid_now(&self, code: &str) -> Result<bool> {
        let Some(coupon) = self.coupons.find_by_code(code).await? else {
            return Ok(false);
        };
        Ok(validate::validate_display(&coupon, Utc::now()).is_ok())
    }

    /// One ancestry lookup per distinct category on the order; the scope
    /// resolver then works over this snapshot without touching the catalog.
    /// Skipped entirely for coupons with no category scope.
    async fn prefetch_ancestry(
        &self,
        coupon: &Coupon,
        lines: &[OrderLine],
    ) -> Result<CategoryAncestry> {
        let mut ancestry = CategoryAncestry::new();
        if coupon.scope.applicable_categories.is_empty()
            && coupon.scope.excluded_categories.is_empty()
        {
            return Ok(ancestry);
        }
        let categories: HashSet<Uuid> = lines.iter().filter_map(|l| l.category_id).collect();
        for category_id in categories {
            let chain = self.catalog.category_ancestors(category_id).await?;
            ancestry.insert(category_id, chain);
        }
        Ok(ancestry)
    }

    async fn redeem_with_retry(
        &self,
        coupon_id: Uuid,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<UsageTicket> {
        let mut backoff = REDEEM_BACKOFF;
        for attempt in 1..=MAX_REDEEM_ATTEMPTS {
            match self.ledger.try_redeem(coupon_id, user_id, order_id).await {
                Err(CouponError::TransientConflict) if attempt < MAX_REDEEM_ATTEMPTS => {
                    tracing::warn!(coupon = %coupon_id, attempt, "redemption write conflict, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                other => return other,
            }
        }
        Err(CouponError::TransientConflict)
    }
}
