//! Coupon Types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

/// How a coupon's `value` is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponType {
    /// `value` is a percentage of the eligible subtotal (0–100).
    Percent,
    /// `value` is a fixed amount, clamped to the eligible subtotal.
    Fixed,
    /// Waives the shipping fee; `value > 0` caps the waived amount,
    /// `value == 0` waives the whole fee.
    FreeShipping,
}

impl fmt::Display for CouponType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Percent => write!(f, "percent"),
            Self::Fixed => write!(f, "fixed"),
            Self::FreeShipping => write!(f, "free_shipping"),
        }
    }
}

impl CouponType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "percent" => Some(Self::Percent),
            "fixed" => Some(Self::Fixed),
            "free_shipping" => Some(Self::FreeShipping),
            _ => None,
        }
    }
}

/// Product/category inclusion and exclusion lists.
///
/// Plain id sets with no back-references; loaded once per call from the
/// store. Category membership is inclusive of descendants, and exclusion
/// always overrides inclusion.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CouponScope {
    pub applicable_products: HashSet<Uuid>,
    pub applicable_categories: HashSet<Uuid>,
    pub excluded_products: HashSet<Uuid>,
    pub excluded_categories: HashSet<Uuid>,
}

impl CouponScope {
    /// A scope with all four sets empty applies to the whole order.
    pub fn is_unrestricted(&self) -> bool {
        self.applicable_products.is_empty()
            && self.applicable_categories.is_empty()
            && self.excluded_products.is_empty()
            && self.excluded_categories.is_empty()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub kind: CouponType,
    pub value: Decimal,
    pub description: Option<String>,
    pub min_order_amount: Option<Decimal>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// Global cap on redemptions; `None` means unlimited.
    pub usage_limit: Option<u32>,
    /// Mutated only by the redemption ledger.
    pub used_count: u32,
    pub usage_limit_per_user: Option<u32>,
    pub active: bool,
    pub scope: CouponScope,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now <= self.ends_at
    }

    /// Redemptions left under the global cap, if one is set.
    pub fn remaining_uses(&self) -> Option<u32> {
        self.usage_limit.map(|l| l.saturating_sub(self.used_count))
    }
}

/// Aggregated redemptions of one coupon by one user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CouponUsage {
    pub coupon_id: Uuid,
    pub user_id: Uuid,
    pub count: u32,
}

/// Opaque handle to a committed redemption, required to release it later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageTicket(pub Uuid);

impl UsageTicket {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UsageTicket {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UsageTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a successful `apply_coupon`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RedemptionResult {
    pub coupon_id: Uuid,
    pub discount_amount: Decimal,
    pub eligible_subtotal: Decimal,
    pub usage_ticket: UsageTicket,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(starts: DateTime<Utc>, ends: DateTime<Utc>) -> Coupon {
        Coupon {
            id: Uuid::new_v4(),
            code: "SAVE10".into(),
            kind: CouponType::Percent,
            value: Decimal::new(10, 0),
            description: None,
            min_order_amount: None,
            starts_at: starts,
            ends_at: ends,
            usage_limit: Some(5),
            used_count: 3,
            usage_limit_per_user: None,
            active: true,
            scope: CouponScope::default(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_window_inclusive() {
        let now = Utc::now();
        let c = coupon(now, now + Duration::hours(1));
        assert!(c.is_within_window(now));
        assert!(c.is_within_window(now + Duration::hours(1)));
        assert!(!c.is_within_window(now - Duration::seconds(1)));
    }

    #[test]
    fn test_remaining_uses() {
        let now = Utc::now();
        let mut c = coupon(now, now + Duration::hours(1));
        assert_eq!(c.remaining_uses(), Some(2));
        c.usage_limit = None;
        assert_eq!(c.remaining_uses(), None);
        c.usage_limit = Some(2);
        assert_eq!(c.remaining_uses(), Some(0));
    }

    #[test]
    fn test_coupon_type_roundtrip() {
        for k in [CouponType::Percent, CouponType::Fixed, CouponType::FreeShipping] {
            assert_eq!(CouponType::parse(&k.to_string()), Some(k));
        }
        assert_eq!(CouponType::parse("bogus"), None);
    }
}
