//! Shared fixtures for the engine integration tests.
#![allow(dead_code)]

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use commerce_backoffice::{
    Coupon, CouponEngine, CouponScope, CouponType, MemoryStore, OrderLine, OrderSnapshot,
    StaticCatalog,
};

pub fn engine(store: &Arc<MemoryStore>, catalog: StaticCatalog) -> CouponEngine {
    CouponEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(catalog),
    )
}

/// An active coupon valid for a day either side of now.
pub fn coupon(code: &str, kind: CouponType, value: Decimal) -> Coupon {
    let now = Utc::now();
    Coupon {
        id: Uuid::new_v4(),
        code: code.into(),
        kind,
        value,
        description: None,
        min_order_amount: None,
        starts_at: now - Duration::days(1),
        ends_at: now + Duration::days(1),
        usage_limit: None,
        used_count: 0,
        usage_limit_per_user: None,
        active: true,
        scope: CouponScope::default(),
        created_at: now,
    }
}

pub fn order(lines: Vec<OrderLine>, shipping_fee: Decimal) -> OrderSnapshot {
    let total = lines.iter().map(|l| l.line_amount).sum();
    OrderSnapshot {
        order_id: Uuid::new_v4(),
        lines,
        total,
        shipping_fee,
    }
}

pub fn line(product_id: Uuid, category_id: Option<Uuid>, amount: Decimal) -> OrderLine {
    OrderLine {
        product_id,
        category_id,
        line_amount: amount,
    }
}

/// A one-line order worth `amount`, registered in the store.
pub fn seed_order(store: &MemoryStore, amount: Decimal) -> Uuid {
    let order = order(vec![line(Uuid::new_v4(), None, amount)], Decimal::ZERO);
    let id = order.order_id;
    store.insert_order(order);
    id
}
