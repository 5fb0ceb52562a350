//! Reconciliation of local state with the copy stored on the server.
//!
//! Cart lines are matched on (product, variant) and keep the larger quantity;
//! unmatched server lines are appended. Wishlists are a union by product.
//! Neither rule is a CRDT: edits made concurrently on two devices can
//! re-inflate a quantity that was lowered on one of them.
//!
//! Lines read back from storage or the server go through
//! [`sanitize_cart_items`] and [`sanitize_wishlist_items`] first, so a cart
//! never holds an empty line and a wishlist never names a product twice.

use crate::types::{CartItem, WishlistItem};

/// Merge server cart lines into the local ones.
#[must_use]
pub fn merge_cart_items(local: &[CartItem], server: &[CartItem]) -> Vec<CartItem> {
    let mut merged = sanitize_cart_items(local);

    for server_item in server {
        let existing = merged
            .iter_mut()
            .find(|l| l.same_product(&server_item.product_id, server_item.variant_id.as_ref()));

        match existing {
            Some(local_item) => {
                local_item.quantity = local_item.quantity.max(server_item.quantity);
            }
            None if server_item.quantity > 0 => merged.push(server_item.clone()),
            None => {}
        }
    }

    merged
}

/// Union of two wishlists by product, local entries first.
#[must_use]
pub fn merge_wishlist_items(local: &[WishlistItem], server: &[WishlistItem]) -> Vec<WishlistItem> {
    let mut merged = sanitize_wishlist_items(local);

    for server_item in server {
        if !merged.iter().any(|l| l.product_id == server_item.product_id) {
            merged.push(server_item.clone());
        }
    }

    merged
}

/// Drop empty lines and fold lines for the same product, variant and
/// customization into the first one.
#[must_use]
pub fn sanitize_cart_items(items: &[CartItem]) -> Vec<CartItem> {
    let mut kept: Vec<CartItem> = Vec::with_capacity(items.len());

    for item in items.iter().filter(|i| i.quantity > 0) {
        match kept
            .iter_mut()
            .find(|k| k.matches(&item.product_id, item.variant_id.as_ref(), &item.customization))
        {
            Some(first) => first.quantity = first.quantity.saturating_add(item.quantity),
            None => kept.push(item.clone()),
        }
    }

    kept
}

/// Keep the first entry per product.
#[must_use]
pub fn sanitize_wishlist_items(items: &[WishlistItem]) -> Vec<WishlistItem> {
    let mut kept: Vec<WishlistItem> = Vec::with_capacity(items.len());

    for item in items {
        if !kept.iter().any(|k| k.product_id == item.product_id) {
            kept.push(item.clone());
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rust_decimal::Decimal;

    use super::*;
    use crate::types::{Product, ProductId, ProductVariant, VariantId};

    fn product(id: &str) -> Product {
        Product {
            id: ProductId::new(id),
            name: id.into(),
            slug: None,
            price: Decimal::from(10),
            compare_price: None,
            images: vec![],
            weight: None,
            available: true,
            quantity: 50,
            variants: vec![ProductVariant {
                id: VariantId::new("v1"),
                sku: None,
                price: None,
                compare_price: None,
                quantity: 50,
                options: BTreeMap::new(),
            }],
        }
    }

    fn line(id: &str, variant: bool, quantity: u32) -> CartItem {
        let p = product(id);
        let v = if variant { p.variants.first() } else { None };
        CartItem::from_product(&p, v, quantity, BTreeMap::new())
    }

    #[test]
    fn test_matching_line_keeps_larger_quantity() {
        let merged = merge_cart_items(&[line("a", false, 2)], &[line("a", false, 5)]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.first().map(|i| i.quantity), Some(5));

        let merged = merge_cart_items(&[line("a", false, 7)], &[line("a", false, 5)]);
        assert_eq!(merged.first().map(|i| i.quantity), Some(7));
    }

    #[test]
    fn test_variant_distinguishes_lines() {
        let merged = merge_cart_items(&[line("a", false, 1)], &[line("a", true, 3)]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get(1).map(|i| i.quantity), Some(3));
    }

    #[test]
    fn test_server_only_lines_are_appended_in_order() {
        let merged = merge_cart_items(
            &[line("a", false, 1)],
            &[line("b", false, 1), line("c", false, 2)],
        );
        let ids: Vec<_> = merged.iter().map(|i| i.product_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn test_wishlist_union() {
        let a = WishlistItem::from_product(&product("a"));
        let b = WishlistItem::from_product(&product("b"));
        let a_remote = WishlistItem::from_product(&product("a"));

        let merged = merge_wishlist_items(&[a.clone()], &[a_remote, b]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.first().map(|i| &i.id), Some(&a.id));
    }

    #[test]
    fn test_sanitize_drops_empty_and_folds_duplicate_lines() {
        let items = [
            line("a", false, 0),
            line("b", false, 2),
            line("b", true, 1),
            line("b", false, 3),
        ];
        let kept = sanitize_cart_items(&items);
        let view: Vec<_> = kept
            .iter()
            .map(|i| (i.product_id.as_str(), i.variant_id.is_some(), i.quantity))
            .collect();
        assert_eq!(view, [("b", false, 5), ("b", true, 1)]);
    }

    #[test]
    fn test_merge_never_keeps_empty_local_lines() {
        let merged = merge_cart_items(&[line("a", false, 0)], &[line("b", false, 0)]);
        assert!(merged.is_empty());
    }

    #[test]
    fn test_sanitize_wishlist_keeps_first_entry() {
        let first = WishlistItem::from_product(&product("a"));
        let again = WishlistItem::from_product(&product("a"));
        let other = WishlistItem::from_product(&product("b"));

        let kept = sanitize_wishlist_items(&[first.clone(), again, other]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept.first().map(|i| &i.id), Some(&first.id));
    }
}
