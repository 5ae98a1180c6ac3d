//! Discount Calculator
//!
//! Pure monetary computation. All arithmetic is exact decimal; the currency
//! rounding rule (half-up to the minor unit) is applied once, at the end.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::CouponType;

/// Minor-unit digits of the store currency.
const MINOR_UNIT_SCALE: u32 = 2;

/// Compute the discount amount for a coupon against the eligible subtotal.
///
/// - `Percent`: `eligible_subtotal * value / 100`, clamped to the subtotal.
///   Creation-time validation keeps `value <= 100`, but the clamp holds
///   regardless.
/// - `Fixed`: `min(value, eligible_subtotal)`, so a fixed coupon never
///   drives the eligible lines negative.
/// - `FreeShipping`: the shipping fee, capped by `value` when `value > 0`.
pub fn compute_discount(
    kind: CouponType,
    value: Decimal,
    eligible_subtotal: Decimal,
    shipping_fee: Decimal,
) -> Decimal {
    let value = value.max(Decimal::ZERO);
    let subtotal = eligible_subtotal.max(Decimal::ZERO);
    let shipping = shipping_fee.max(Decimal::ZERO);

    let raw = match kind {
        CouponType::Percent => (subtotal * value / Decimal::ONE_HUNDRED).min(subtotal),
        CouponType::Fixed => value.min(subtotal),
        CouponType::FreeShipping => {
            if value.is_zero() {
                shipping
            } else {
                value.min(shipping)
            }
        }
    };

    raw.round_dp_with_strategy(MINOR_UNIT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_percent_discount() {
        let d = compute_discount(CouponType::Percent, dec!(10), dec!(250.00), Decimal::ZERO);
        assert_eq!(d, dec!(25.00));
    }

    #[test]
    fn test_percent_rounds_half_up_once() {
        // 15% of 0.10 = 0.015 -> 0.02
        let d = compute_discount(CouponType::Percent, dec!(15), dec!(0.10), Decimal::ZERO);
        assert_eq!(d, dec!(0.02));
    }

    #[test]
    fn test_percent_clamped_to_subtotal() {
        let d = compute_discount(CouponType::Percent, dec!(250), dec!(40.00), Decimal::ZERO);
        assert_eq!(d, dec!(40.00));
    }

    #[test]
    fn test_fixed_clamped_to_subtotal() {
        let d = compute_discount(CouponType::Fixed, dec!(500.00), dec!(300.00), Decimal::ZERO);
        assert_eq!(d, dec!(300.00));
    }

    #[test]
    fn test_fixed_below_subtotal() {
        let d = compute_discount(CouponType::Fixed, dec!(20.00), dec!(300.00), Decimal::ZERO);
        assert_eq!(d, dec!(20.00));
    }

    #[test]
    fn test_free_shipping_uncapped() {
        let d = compute_discount(CouponType::FreeShipping, Decimal::ZERO, dec!(80.00), dec!(9.90));
        assert_eq!(d, dec!(9.90));
    }

    #[test]
    fn test_free_shipping_capped() {
        let d = compute_discount(CouponType::FreeShipping, dec!(5.00), dec!(80.00), dec!(9.90));
        assert_eq!(d, dec!(5.00));
    }

    fn money() -> impl Strategy<Value = Decimal> {
        // cents in [0, 10_000_00]
        (0i64..=1_000_000).prop_map(|c| Decimal::new(c, 2))
    }

    proptest! {
        #[test]
        fn prop_line_discount_never_exceeds_subtotal(
            value in money(), subtotal in money(), shipping in money()
        ) {
            for kind in [CouponType::Percent, CouponType::Fixed] {
                let d = compute_discount(kind, value, subtotal, shipping);
                prop_assert!(d >= Decimal::ZERO);
                prop_assert!(d <= subtotal);
            }
        }

        #[test]
        fn prop_shipping_discount_never_exceeds_fee(
            value in money(), subtotal in money(), shipping in money()
        ) {
            let d = compute_discount(CouponType::FreeShipping, value, subtotal, shipping);
            prop_assert!(d >= Decimal::ZERO);
            prop_assert!(d <= shipping);
        }
    }
}
