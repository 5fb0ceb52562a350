//! Cart recompute pipeline.
//!
//! Totals are always derived from the item list and coupon in this order:
//!
//! 1. `subtotal = Σ price × quantity`
//! 2. `discount` from the coupon (percentage capped, fixed clamped to the subtotal)
//! 3. `tax`, quoted remotely by the caller
//! 4. `shipping`, free from [`DEFAULT_FREE_SHIPPING_THRESHOLD`] upwards, otherwise
//!    quoted remotely by the caller
//! 5. `total = max(0, subtotal - discount + tax + shipping)`, rounded to cents

use rust_decimal::Decimal;

use crate::types::{CartItem, CartTotals, Coupon, DiscountType, round_money};

/// Subtotal from which shipping is free.
pub const DEFAULT_FREE_SHIPPING_THRESHOLD: Decimal = Decimal::from_parts(150, 0, 0, false, 0);

/// Flat shipping rate used when the shipping quote is unavailable.
pub const DEFAULT_FALLBACK_SHIPPING: Decimal = Decimal::from_parts(599, 0, 0, false, 2);

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Σ unit price × quantity.
#[must_use]
pub fn subtotal(items: &[CartItem]) -> Decimal {
    items.iter().map(CartItem::line_total).sum()
}

/// Discount granted by `coupon` on `subtotal`.
#[must_use]
pub fn coupon_discount(coupon: Option<&Coupon>, subtotal: Decimal) -> Decimal {
    let Some(coupon) = coupon else {
        return Decimal::ZERO;
    };

    let discount = match coupon.discount_type {
        DiscountType::Percentage => {
            let raw = subtotal * coupon.value / HUNDRED;
            coupon.max_discount.map_or(raw, |cap| raw.min(cap))
        }
        DiscountType::Fixed => coupon.value.min(subtotal),
    };

    discount.max(Decimal::ZERO)
}

/// Whether a shipping quote is needed for this subtotal.
///
/// Empty carts and carts at or above the threshold ship for free.
#[must_use]
pub fn shipping_due(subtotal: Decimal, free_threshold: Decimal) -> bool {
    subtotal > Decimal::ZERO && subtotal < free_threshold
}

/// Amount still missing to reach free shipping.
#[must_use]
pub fn free_shipping_remaining(subtotal: Decimal, free_threshold: Decimal) -> Decimal {
    (free_threshold - subtotal).max(Decimal::ZERO)
}

/// Final payable amount, never negative, rounded to cents.
#[must_use]
pub fn total(subtotal: Decimal, discount: Decimal, tax: Decimal, shipping: Decimal) -> Decimal {
    round_money((subtotal - discount + tax + shipping).max(Decimal::ZERO))
}

/// Run the full pipeline with externally supplied tax and shipping.
#[must_use]
pub fn compute_totals(
    items: &[CartItem],
    coupon: Option<&Coupon>,
    tax: Decimal,
    shipping: Decimal,
) -> CartTotals {
    let subtotal = subtotal(items);
    let discount = coupon_discount(coupon, subtotal);

    CartTotals {
        subtotal,
        discount,
        tax,
        shipping,
        total: total(subtotal, discount, tax, shipping),
    }
}
