//! Wishlist state: saved-for-later products.
//!
//! A product appears at most once.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::cart::CartItem;
use super::id::{LineId, ProductId};
use super::product::Product;

/// Display data captured when the product was saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistProduct {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub compare_price: Option<Decimal>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub available: bool,
}

/// A saved product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistItem {
    pub id: LineId,
    pub product_id: ProductId,
    pub product: WishlistProduct,
    pub added_at: DateTime<Utc>,
}

impl WishlistItem {
    /// Build an entry from a catalog product.
    #[must_use]
    pub fn from_product(product: &Product) -> Self {
        Self {
            id: LineId::generate(),
            product_id: product.id.clone(),
            product: WishlistProduct {
                id: product.id.clone(),
                name: product.name.clone(),
                slug: product.slug.clone(),
                price: product.price,
                compare_price: product.compare_price,
                image: product.primary_image().map(str::to_owned),
                available: product.available,
            },
            added_at: Utc::now(),
        }
    }

    /// Build an entry from a cart line being saved for later.
    ///
    /// The line was purchasable when added, so the entry starts out available.
    #[must_use]
    pub fn from_cart_item(item: &CartItem) -> Self {
        Self {
            id: LineId::generate(),
            product_id: item.product_id.clone(),
            product: WishlistProduct {
                id: item.product_id.clone(),
                name: item.product.name.clone(),
                slug: item.product.slug.clone(),
                price: item.price,
                compare_price: item.compare_price,
                image: item.product.image.clone(),
                available: true,
            },
            added_at: Utc::now(),
        }
    }
}

/// The wishlist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wishlist {
    #[serde(default)]
    items: Vec<WishlistItem>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

impl Wishlist {
    #[must_use]
    pub fn items(&self) -> &[WishlistItem] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub const fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Position of the product in the list.
    #[must_use]
    pub fn position(&self, product_id: &ProductId) -> Option<usize> {
        self.items.iter().position(|i| &i.product_id == product_id)
    }

    #[must_use]
    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.position(product_id).is_some()
    }

    /// Append an entry unless the product is already present.
    ///
    /// Returns `false` when the product was already saved.
    pub fn insert(&mut self, item: WishlistItem) -> bool {
        if self.contains(&item.product_id) {
            return false;
        }
        self.items.push(item);
        self.touch();
        true
    }

    /// Put an entry back at a specific position (clamped to the list length).
    ///
    /// Returns `false` when the product was already saved.
    pub fn restore(&mut self, index: usize, item: WishlistItem) -> bool {
        if self.contains(&item.product_id) {
            return false;
        }
        let index = index.min(self.items.len());
        self.items.insert(index, item);
        self.touch();
        true
    }

    /// Remove the entry for a product, returning it with its former position.
    pub fn remove(&mut self, product_id: &ProductId) -> Option<(usize, WishlistItem)> {
        let index = self.position(product_id)?;
        let item = self.items.remove(index);
        self.touch();
        Some((index, item))
    }

    /// Swap in a new item list (used after merging with a remote copy).
    pub fn replace_items(&mut self, items: Vec<WishlistItem>) {
        self.items = items;
        self.touch();
    }

    fn touch(&mut self) {
        self.last_updated = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str) -> Product {
        Product {
            id: ProductId::new(id),
            name: id.to_uppercase(),
            slug: None,
            price: Decimal::from(12),
            compare_price: None,
            images: vec![],
            weight: None,
            available: true,
            quantity: 1,
            variants: vec![],
        }
    }

    #[test]
    fn test_insert_is_idempotent_per_product() {
        let mut list = Wishlist::default();
        assert!(list.insert(WishlistItem::from_product(&product("a"))));
        assert!(!list.insert(WishlistItem::from_product(&product("a"))));
        assert_eq!(list.len(), 1);
        assert!(list.last_updated().is_some());
    }

    #[test]
    fn test_restore_keeps_original_position() {
        let mut list = Wishlist::default();
        list.insert(WishlistItem::from_product(&product("a")));
        list.insert(WishlistItem::from_product(&product("b")));
        list.insert(WishlistItem::from_product(&product("c")));

        let (index, item) = list.remove(&ProductId::new("b")).unwrap_or_else(|| panic!("b saved"));
        assert_eq!(index, 1);
        assert!(list.restore(index, item));

        let ids: Vec<_> = list.items().iter().map(|i| i.product_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn test_from_cart_item_keeps_line_price() {
        let mut p = product("a");
        p.images.push(super::super::product::ProductImage { url: "/a.jpg".into() });
        let line = CartItem::from_product(&p, None, 3, std::collections::BTreeMap::new());
        let entry = WishlistItem::from_cart_item(&line);
        assert_eq!(entry.product_id, line.product_id);
        assert_eq!(entry.product.price, Decimal::from(12));
        assert_eq!(entry.product.image.as_deref(), Some("/a.jpg"));
    }

    #[test]
    fn test_remove_missing() {
        let mut list = Wishlist::default();
        assert!(list.remove(&ProductId::new("nope")).is_none());
    }
}
