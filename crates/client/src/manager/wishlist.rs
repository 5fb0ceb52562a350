//! Wishlist mutations and moves between wishlist and cart.

use basket_core::{CartItem, ProductId, WishlistItem};
use tracing::{info, instrument, warn};

use super::{AddItemOptions, CartManager};
use crate::error::{CartError, Result};
use crate::events::CartEvent;

impl CartManager {
    /// Save a product for later.
    ///
    /// # Errors
    ///
    /// - `DuplicateItem` when the product is already saved (nothing changes)
    /// - `ProductNotFound` when the product does not exist
    /// - `Network` when the catalog cannot be reached
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_to_wishlist(&self, product_id: &ProductId) -> Result<WishlistItem> {
        let mut stores = self.inner.stores.lock().await;

        let result = if stores.wishlist.contains(product_id) {
            Err(CartError::DuplicateItem(product_id.clone()))
        } else {
            self.inner
                .ctx
                .backend()
                .fetch_product(product_id)
                .await
                .map_err(CartError::from)
                .and_then(|p| p.ok_or_else(|| CartError::ProductNotFound(product_id.clone())))
        };

        let product = match result {
            Ok(product) => product,
            Err(e) => {
                self.publish(CartEvent::WishlistItemAddFailed {
                    product_id: product_id.clone(),
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let item = WishlistItem::from_product(&product);
        stores.wishlist.insert(item.clone());
        self.commit_wishlist(&mut stores).await;

        info!("Product saved to wishlist");
        self.publish(CartEvent::WishlistItemAdded { item: item.clone() });
        Ok(item)
    }

    /// Remove a saved product.
    ///
    /// # Errors
    ///
    /// Returns `NotInWishlist` when the product is not saved.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove_from_wishlist(&self, product_id: &ProductId) -> Result<WishlistItem> {
        let mut stores = self.inner.stores.lock().await;
        let (_, item) = stores
            .wishlist
            .remove(product_id)
            .ok_or_else(|| CartError::NotInWishlist(product_id.clone()))?;

        self.commit_wishlist(&mut stores).await;
        self.publish(CartEvent::WishlistItemRemoved { item: item.clone() });
        Ok(item)
    }

    /// Move a saved product into the cart.
    ///
    /// If the cart refuses the product, the wishlist entry is put back at its
    /// original position and the cart error is returned.
    ///
    /// # Errors
    ///
    /// `NotInWishlist`, or any error of [`Self::add_item`].
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn move_to_cart(&self, product_id: &ProductId, quantity: u32) -> Result<CartItem> {
        let mut stores = self.inner.stores.lock().await;
        let (index, entry) = stores
            .wishlist
            .remove(product_id)
            .ok_or_else(|| CartError::NotInWishlist(product_id.clone()))?;

        let added = self
            .add_item_locked(&mut stores, product_id, quantity, AddItemOptions::default())
            .await;

        match added {
            Ok(item) => {
                self.push_wishlist(&stores.wishlist).await;
                self.publish(CartEvent::WishlistItemRemoved { item: entry });
                self.publish(CartEvent::MovedToCart {
                    product_id: product_id.clone(),
                    quantity,
                });
                Ok(item)
            }
            Err(e) => {
                warn!(error = %e, "Move to cart failed, restoring wishlist entry");
                stores.wishlist.restore(index, entry);
                self.publish(CartEvent::ItemAddFailed {
                    product_id: product_id.clone(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Save the cart line at `index` for later and remove it from the cart.
    ///
    /// A product already in the wishlist keeps its existing entry.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` when there is no such line.
    #[instrument(skip(self))]
    pub async fn move_to_wishlist(&self, index: usize) -> Result<CartItem> {
        let mut stores = self.inner.stores.lock().await;
        let len = stores.cart.len();
        let line = stores
            .cart
            .remove_at(index)
            .ok_or(CartError::IndexOutOfRange { index, len })?;

        let saved = WishlistItem::from_cart_item(&line);
        let inserted = stores.wishlist.insert(saved.clone());

        self.commit_cart(&mut stores).await;
        self.push_wishlist(&stores.wishlist).await;

        self.publish(CartEvent::ItemRemoved { item: line.clone() });
        if inserted {
            self.publish(CartEvent::WishlistItemAdded { item: saved });
        }
        self.publish(CartEvent::MovedToWishlist {
            product_id: line.product_id.clone(),
        });
        Ok(line)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::testutil::{dec, harness};
    use super::*;

    fn sku(id: &str) -> ProductId {
        ProductId::new(id)
    }

    fn wishlist_ids(items: &[WishlistItem]) -> Vec<&str> {
        items.iter().map(|i| i.product_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_add_and_remove() {
        let h = harness();
        let item = h.manager.add_to_wishlist(&sku("sku-1")).await.unwrap();
        assert_eq!(item.product.price, dec("25.00"));
        assert!(h.manager.is_in_wishlist(&sku("sku-1")).await);
        assert_eq!(h.manager.wishlist_count(), 1);

        h.manager.remove_from_wishlist(&sku("sku-1")).await.unwrap();
        assert_eq!(h.manager.wishlist_count(), 0);

        let err = h.manager.remove_from_wishlist(&sku("sku-1")).await.unwrap_err();
        assert!(matches!(err, CartError::NotInWishlist(_)));
    }

    #[tokio::test]
    async fn test_duplicate_is_rejected_without_fetch() {
        let h = harness();
        h.manager.add_to_wishlist(&sku("sku-1")).await.unwrap();
        let fetches = h.backend.product_fetches();

        let err = h.manager.add_to_wishlist(&sku("sku-1")).await.unwrap_err();
        assert!(matches!(err, CartError::DuplicateItem(_)));
        assert_eq!(h.backend.product_fetches(), fetches);
        assert_eq!(h.manager.wishlist().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let h = harness();
        let err = h.manager.add_to_wishlist(&sku("ghost")).await.unwrap_err();
        assert!(matches!(err, CartError::ProductNotFound(_)));
        assert!(h.manager.wishlist().await.is_empty());
    }

    #[tokio::test]
    async fn test_move_to_cart() {
        let h = harness();
        h.manager.add_to_wishlist(&sku("sku-2")).await.unwrap();

        let item = h.manager.move_to_cart(&sku("sku-2"), 2).await.unwrap();
        assert_eq!(item.quantity, 2);
        assert!(!h.manager.is_in_wishlist(&sku("sku-2")).await);
        assert_eq!(h.manager.cart().await.totals().subtotal, dec("20.00"));
    }

    #[tokio::test]
    async fn test_failed_move_restores_entry_in_place() {
        let h = harness();
        for id in ["sku-1", "sku-2"] {
            h.manager.add_to_wishlist(&sku(id)).await.unwrap();
        }
        h.backend.add_product(crate::api::MockBackend::product("sku-3", dec("5.00"), 10));
        h.manager.add_to_wishlist(&sku("sku-3")).await.unwrap();
        let cart_before = h.manager.cart().await;

        h.backend.set_stock(&sku("sku-2"), 1);
        let err = h.manager.move_to_cart(&sku("sku-2"), 3).await.unwrap_err();
        assert!(matches!(err, CartError::InsufficientStock { .. }));

        let wishlist = h.manager.wishlist().await;
        assert_eq!(wishlist_ids(wishlist.items()), ["sku-1", "sku-2", "sku-3"]);
        assert_eq!(h.manager.cart().await, cart_before);
    }

    #[tokio::test]
    async fn test_move_missing_product() {
        let h = harness();
        let err = h.manager.move_to_cart(&sku("sku-1"), 1).await.unwrap_err();
        assert!(matches!(err, CartError::NotInWishlist(_)));
    }

    #[tokio::test]
    async fn test_move_to_wishlist() {
        let h = harness();
        h.manager.add_item(&sku("sku-1"), 2, AddItemOptions::default()).await.unwrap();
        h.manager.add_item(&sku("sku-2"), 1, AddItemOptions::default()).await.unwrap();

        let line = h.manager.move_to_wishlist(0).await.unwrap();
        assert_eq!(line.product_id, sku("sku-1"));

        assert!(h.manager.is_in_wishlist(&sku("sku-1")).await);
        let cart = h.manager.cart().await;
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.totals().subtotal, dec("10.00"));

        let err = h.manager.move_to_wishlist(4).await.unwrap_err();
        assert!(matches!(err, CartError::IndexOutOfRange { index: 4, len: 1 }));
    }

    #[tokio::test]
    async fn test_wishlist_pushed_immediately_when_logged_in() {
        let h = harness();
        h.manager.context().session().set_logged_in(true);
        h.manager.add_to_wishlist(&sku("sku-1")).await.unwrap();

        let pushes = h.backend.wishlist_pushes();
        assert_eq!(pushes.len(), 1);
        assert_eq!(wishlist_ids(&pushes.first().unwrap().items), ["sku-1"]);

        h.backend.set_offline(true);
        let mut events = h.manager.events();
        h.manager.remove_from_wishlist(&sku("sku-1")).await.unwrap();

        let mut sync_failed = false;
        while let Ok(event) = events.try_recv() {
            sync_failed |= matches!(event, CartEvent::SyncFailed { .. });
        }
        assert!(sync_failed);
        assert_eq!(h.manager.wishlist_count(), 0);
    }
}
