//! In-Memory Backend
//!
//! One mutex over the whole store, so the ledger's check-then-increment is
//! a single critical section and the counting guarantees hold trivially.
//! Used by the test suite and usable standalone for demos.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::domain::{Coupon, OrderSnapshot, UsageTicket};
use crate::error::{CouponError, Result};
use crate::store::{CouponStore, OrderStore, RedemptionLedger};

#[derive(Clone, Debug)]
struct RedemptionRow {
    coupon_id: Uuid,
    user_id: Uuid,
    order_id: Uuid,
}

#[derive(Debug, Default)]
struct State {
    coupons: HashMap<Uuid, Coupon>,
    codes: HashMap<String, Uuid>,
    usages: HashMap<(Uuid, Uuid), u32>,
    orders: HashMap<Uuid, OrderSnapshot>,
    redemptions: HashMap<Uuid, RedemptionRow>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_coupon(&self, coupon: Coupon) {
        let mut state = self.state();
        state.codes.insert(coupon.code.clone(), coupon.id);
        state.coupons.insert(coupon.id, coupon);
    }

    pub fn insert_order(&self, order: OrderSnapshot) {
        self.state().orders.insert(order.order_id, order);
    }

    /// Current coupon snapshot, for assertions on counter movement.
    pub fn coupon(&self, coupon_id: Uuid) -> Option<Coupon> {
        self.state().coupons.get(&coupon_id).cloned()
    }

    pub fn usage_count(&self, coupon_id: Uuid, user_id: Uuid) -> u32 {
        self.state()
            .usages
            .get(&(coupon_id, user_id))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl CouponStore for MemoryStore {
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let state = self.state();
        Ok(state
            .codes
            .get(code)
            .and_then(|id| state.coupons.get(id))
            .cloned())
    }

    async fn user_usage_count(&self, coupon_id: Uuid, user_id: Uuid) -> Result<u32> {
        Ok(self.usage_count(coupon_id, user_id))
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn order_snapshot(&self, order_id: Uuid) -> Result<Option<OrderSnapshot>> {
        Ok(self.state().orders.get(&order_id).cloned())
    }
}

#[async_trait]
impl RedemptionLedger for MemoryStore {
    async fn try_redeem(
        &self,
        coupon_id: Uuid,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<UsageTicket> {
        let mut state = self.state();

        let prior_uses = state.usages.get(&(coupon_id, user_id)).copied().unwrap_or(0);
        let coupon = state
            .coupons
            .get_mut(&coupon_id)
            .ok_or(CouponError::CouponNotFound)?;

        if let Some(limit) = coupon.usage_limit {
            if coupon.used_count >= limit {
                return Err(CouponError::GlobalLimitReached);
            }
        }
        if let Some(limit) = coupon.usage_limit_per_user {
            if prior_uses >= limit {
                return Err(CouponError::PerUserLimitReached);
            }
        }

        coupon.used_count += 1;
        *state.usages.entry((coupon_id, user_id)).or_insert(0) += 1;

        let ticket = UsageTicket::new();
        state.redemptions.insert(
            ticket.0,
            RedemptionRow {
                coupon_id,
                user_id,
                order_id,
            },
        );
        Ok(ticket)
    }

    async fn release(&self, ticket: UsageTicket) -> Result<()> {
        let mut state = self.state();

        let row = state
            .redemptions
            .remove(&ticket.0)
            .ok_or(CouponError::TicketNotFound)?;

        if let Some(coupon) = state.coupons.get_mut(&row.coupon_id) {
            coupon.used_count = coupon.used_count.saturating_sub(1);
        }
        if let Some(count) = state.usages.get_mut(&(row.coupon_id, row.user_id)) {
            *count = count.saturating_sub(1);
        }
        Ok(())
    }

    async fn find_ticket(&self, order_id: Uuid, coupon_id: Uuid) -> Result<Option<UsageTicket>> {
        Ok(self
            .state()
            .redemptions
            .iter()
            .find(|(_, row)| row.order_id == order_id && row.coupon_id == coupon_id)
            .map(|(id, _)| UsageTicket(*id)))
    }
}
