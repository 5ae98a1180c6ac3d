//! Eligibility Validator
//!
//! Advisory pre-checks over an already-fetched coupon snapshot. The
//! redemption ledger re-checks both usage limits atomically at commit time;
//! these checks exist to fail fast with a precise reason.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::Coupon;
use crate::error::{CouponError, Result};

/// Run the ordered eligibility checks; the first failure wins.
///
/// Order matters: cheap flag/window checks come before anything that needed
/// a ledger read (`prior_user_uses`), and the minimum-order check compares
/// the whole order total, not the eligible subtotal, so scoped coupons
/// still require a minimum overall spend.
pub fn validate(
    coupon: &Coupon,
    now: DateTime<Utc>,
    order_total: Decimal,
    prior_user_uses: u32,
) -> Result<()> {
    if !coupon.active {
        return Err(CouponError::CouponInactive);
    }
    if now < coupon.starts_at {
        return Err(CouponError::CouponNotYetStarted);
    }
    if now > coupon.ends_at {
        return Err(CouponError::CouponExpired);
    }
    if let Some(min) = coupon.min_order_amount {
        if order_total < min {
            return Err(CouponError::MinOrderNotMet {
                required: min,
                actual: order_total,
            });
        }
    }
    if let Some(limit) = coupon.usage_limit {
        if coupon.used_count >= limit {
            return Err(CouponError::GlobalLimitReached);
        }
    }
    if let Some(limit) = coupon.usage_limit_per_user {
        if prior_user_uses >= limit {
            return Err(CouponError::PerUserLimitReached);
        }
    }
    Ok(())
}

/// The user-independent subset of the checks, for advisory validity display.
pub fn validate_display(coupon: &Coupon, now: DateTime<Utc>) -> Result<()> {
    if !coupon.active {
        return Err(CouponError::CouponInactive);
    }
    if now < coupon.starts_at {
        return Err(CouponError::CouponNotYetStarted);
    }
    if now > coupon.ends_at {
        return Err(CouponError::CouponExpired);
    }
    if let Some(limit) = coupon.usage_limit {
        if coupon.used_count >= limit {
            return Err(CouponError::GlobalLimitReached);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CouponScope, CouponType};
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn base_coupon(now: DateTime<Utc>) -> Coupon {
        Coupon {
            id: Uuid::new_v4(),
            code: "WELCOME".into(),
            kind: CouponType::Fixed,
            value: dec!(5.00),
            description: None,
            min_order_amount: None,
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(1),
            usage_limit: None,
            used_count: 0,
            usage_limit_per_user: None,
            active: true,
            scope: CouponScope::default(),
            created_at: now - Duration::days(2),
        }
    }

    #[test]
    fn test_valid_coupon_passes() {
        let now = Utc::now();
        assert!(validate(&base_coupon(now), now, dec!(10.00), 0).is_ok());
    }

    #[test]
    fn test_inactive_wins_over_everything() {
        let now = Utc::now();
        let mut c = base_coupon(now);
        c.active = false;
        c.ends_at = now - Duration::days(1); // also expired
        assert_eq!(validate(&c, now, dec!(10.00), 0), Err(CouponError::CouponInactive));
    }

    #[test]
    fn test_not_yet_started() {
        let now = Utc::now();
        let mut c = base_coupon(now);
        c.starts_at = now + Duration::hours(1);
        assert_eq!(
            validate(&c, now, dec!(10.00), 0),
            Err(CouponError::CouponNotYetStarted)
        );
    }

    #[test]
    fn test_expired() {
        let now = Utc::now();
        let mut c = base_coupon(now);
        c.ends_at = now - Duration::hours(1);
        assert_eq!(validate(&c, now, dec!(10.00), 0), Err(CouponError::CouponExpired));
    }

    #[test]
    fn test_window_edges_are_inclusive() {
        let now = Utc::now();
        let mut c = base_coupon(now);
        c.starts_at = now;
        assert!(validate(&c, now, dec!(10.00), 0).is_ok());
        c.starts_at = now - Duration::days(1);
        c.ends_at = now;
        assert!(validate(&c, now, dec!(10.00), 0).is_ok());
    }

    #[test]
    fn test_min_order_checked_against_whole_total() {
        let now = Utc::now();
        let mut c = base_coupon(now);
        c.min_order_amount = Some(dec!(50.00));
        let err = validate(&c, now, dec!(49.99), 0).unwrap_err();
        assert_eq!(
            err,
            CouponError::MinOrderNotMet {
                required: dec!(50.00),
                actual: dec!(49.99)
            }
        );
        assert!(validate(&c, now, dec!(50.00), 0).is_ok());
    }

    #[test]
    fn test_global_limit() {
        let now = Utc::now();
        let mut c = base_coupon(now);
        c.usage_limit = Some(3);
        c.used_count = 3;
        assert_eq!(
            validate(&c, now, dec!(10.00), 0),
            Err(CouponError::GlobalLimitReached)
        );
        c.used_count = 2;
        assert!(validate(&c, now, dec!(10.00), 0).is_ok());
    }

    #[test]
    fn test_per_user_limit() {
        let now = Utc::now();
        let mut c = base_coupon(now);
        c.usage_limit_per_user = Some(1);
        assert_eq!(
            validate(&c, now, dec!(10.00), 1),
            Err(CouponError::PerUserLimitReached)
        );
        assert!(validate(&c, now, dec!(10.00), 0).is_ok());
    }
}
