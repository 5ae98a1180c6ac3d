//! Scope Resolver
//!
//! Decides which order lines a coupon's discount applies to, from the
//! coupon's product/category inclusion and exclusion sets. Category
//! membership is inherited by descendants via the prefetched ancestry.

use rust_decimal::Decimal;

use crate::catalog::CategoryAncestry;
use crate::domain::{CouponScope, OrderLine};

/// Resolve which lines are discount-eligible and their subtotal.
///
/// Rules, in order:
/// 1. All four sets empty: every line is eligible (whole-order coupon).
/// 2. A line is a candidate if its product is in `applicable_products`, or
///    its category (or any ancestor) is in `applicable_categories`. With
///    both applicable sets empty, all lines are candidates.
/// 3. A candidate is rejected if its product is in `excluded_products`, or
///    its category (or any ancestor) is in `excluded_categories`. Exclusion
///    overrides inclusion, so a broad category promotion can carve out
///    exceptions.
pub fn resolve_eligible_lines<'a>(
    scope: &CouponScope,
    lines: &'a [OrderLine],
    ancestry: &CategoryAncestry,
) -> (Vec<&'a OrderLine>, Decimal) {
    let eligible: Vec<&OrderLine> = if scope.is_unrestricted() {
        lines.iter().collect()
    } else {
        lines
            .iter()
            .filter(|line| is_candidate(scope, line, ancestry))
            .filter(|line| !is_excluded(scope, line, ancestry))
            .collect()
    };

    let subtotal = eligible.iter().map(|l| l.line_amount).sum();
    (eligible, subtotal)
}

fn is_candidate(scope: &CouponScope, line: &OrderLine, ancestry: &CategoryAncestry) -> bool {
    if scope.applicable_products.is_empty() && scope.applicable_categories.is_empty() {
        return true;
    }
    if scope.applicable_products.contains(&line.product_id) {
        return true;
    }
    match line.category_id {
        Some(cat) => ancestry.any_in(cat, &scope.applicable_categories),
        None => false,
    }
}

fn is_excluded(scope: &CouponScope, line: &OrderLine, ancestry: &CategoryAncestry) -> bool {
    if scope.excluded_products.contains(&line.product_id) {
        return true;
    }
    match line.category_id {
        Some(cat) => ancestry.any_in(cat, &scope.excluded_categories),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn line(product: Uuid, category: Option<Uuid>, amount: Decimal) -> OrderLine {
        OrderLine {
            product_id: product,
            category_id: category,
            line_amount: amount,
        }
    }

    /// Electronics → Phones → Smartphones, ancestry prefetched for the leaf.
    fn smartphone_ancestry() -> (Uuid, Uuid, Uuid, CategoryAncestry) {
        let electronics = Uuid::new_v4();
        let phones = Uuid::new_v4();
        let smartphones = Uuid::new_v4();
        let mut ancestry = CategoryAncestry::new();
        ancestry.insert(smartphones, vec![smartphones, phones, electronics]);
        (electronics, phones, smartphones, ancestry)
    }

    #[test]
    fn test_empty_scope_covers_whole_order() {
        let lines = vec![
            line(Uuid::new_v4(), None, dec!(10.00)),
            line(Uuid::new_v4(), Some(Uuid::new_v4()), dec!(15.50)),
        ];
        let (eligible, subtotal) =
            resolve_eligible_lines(&CouponScope::default(), &lines, &CategoryAncestry::new());
        assert_eq!(eligible.len(), 2);
        assert_eq!(subtotal, dec!(25.50));
    }

    #[test]
    fn test_category_inheritance() {
        let (electronics, _, smartphones, ancestry) = smartphone_ancestry();
        let scope = CouponScope {
            applicable_categories: [electronics].into(),
            ..Default::default()
        };
        let lines = vec![line(Uuid::new_v4(), Some(smartphones), dec!(99.99))];

        let (eligible, subtotal) = resolve_eligible_lines(&scope, &lines, &ancestry);
        assert_eq!(eligible.len(), 1);
        assert_eq!(subtotal, dec!(99.99));
    }

    #[test]
    fn test_exclusion_overrides_inclusion() {
        let (electronics, _, smartphones, ancestry) = smartphone_ancestry();
        let p1 = Uuid::new_v4();
        let scope = CouponScope {
            applicable_categories: [electronics].into(),
            excluded_products: [p1].into(),
            ..Default::default()
        };
        let lines = vec![
            line(p1, Some(smartphones), dec!(50.00)),
            line(Uuid::new_v4(), Some(smartphones), dec!(30.00)),
        ];

        let (eligible, subtotal) = resolve_eligible_lines(&scope, &lines, &ancestry);
        assert_eq!(eligible.len(), 1);
        assert_eq!(subtotal, dec!(30.00));
    }

    #[test]
    fn test_excluded_ancestor_category_rejects_descendants() {
        let (electronics, _, smartphones, ancestry) = smartphone_ancestry();
        let p = Uuid::new_v4();
        let scope = CouponScope {
            applicable_products: [p].into(),
            excluded_categories: [electronics].into(),
            ..Default::default()
        };
        let lines = vec![line(p, Some(smartphones), dec!(20.00))];

        let (eligible, subtotal) = resolve_eligible_lines(&scope, &lines, &ancestry);
        assert!(eligible.is_empty());
        assert_eq!(subtotal, Decimal::ZERO);
    }

    #[test]
    fn test_product_inclusion_without_category_match() {
        let p = Uuid::new_v4();
        let scope = CouponScope {
            applicable_products: [p].into(),
            ..Default::default()
        };
        let lines = vec![
            line(p, None, dec!(12.00)),
            line(Uuid::new_v4(), None, dec!(40.00)),
        ];

        let (eligible, subtotal) = resolve_eligible_lines(&scope, &lines, &CategoryAncestry::new());
        assert_eq!(eligible.len(), 1);
        assert_eq!(subtotal, dec!(12.00));
    }

    #[test]
    fn test_no_eligible_lines_yields_zero_subtotal() {
        let scope = CouponScope {
            applicable_products: [Uuid::new_v4()].into(),
            ..Default::default()
        };
        let lines = vec![line(Uuid::new_v4(), None, dec!(10.00))];

        let (eligible, subtotal) = resolve_eligible_lines(&scope, &lines, &CategoryAncestry::new());
        assert!(eligible.is_empty());
        assert_eq!(subtotal, Decimal::ZERO);
    }

    #[test]
    fn test_uncategorized_line_only_matches_by_product() {
        let cat = Uuid::new_v4();
        let scope = CouponScope {
            applicable_categories: [cat].into(),
            ..Default::default()
        };
        let lines = vec![line(Uuid::new_v4(), None, dec!(10.00))];

        let (eligible, _) = resolve_eligible_lines(&scope, &lines, &CategoryAncestry::new());
        assert!(eligible.is_empty());
    }
}
