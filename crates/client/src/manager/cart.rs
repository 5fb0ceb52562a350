//! Cart mutations.

use std::collections::BTreeMap;

use basket_core::{CartItem, Coupon, ProductId, VariantId};
use tracing::{info, instrument};

use super::{CartManager, Stores, find_variant};
use crate::api::{ApiError, CouponRequest};
use crate::error::{CartError, Result};
use crate::events::CartEvent;

/// Selection details for [`CartManager::add_item`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddItemOptions {
    pub variant_id: Option<VariantId>,
    /// Personalization (engraving, length...). Lines only merge when it matches.
    pub customization: BTreeMap<String, String>,
    /// Skip the stock check.
    pub force: bool,
}

impl AddItemOptions {
    #[must_use]
    pub fn variant(variant_id: impl Into<VariantId>) -> Self {
        Self {
            variant_id: Some(variant_id.into()),
            ..Self::default()
        }
    }
}

impl CartManager {
    /// Add `quantity` units of a product, merging into an identical line.
    ///
    /// # Errors
    ///
    /// - `InvalidQuantity` for a zero quantity
    /// - `ProductNotFound` when the product or variant does not exist
    /// - `InsufficientStock` when the combined quantity exceeds stock
    /// - `CartFull` when a new line would exceed the line limit
    /// - `Network` when the catalog cannot be reached
    #[instrument(skip(self, options), fields(product_id = %product_id))]
    pub async fn add_item(
        &self,
        product_id: &ProductId,
        quantity: u32,
        options: AddItemOptions,
    ) -> Result<CartItem> {
        let mut stores = self.inner.stores.lock().await;
        let result = self
            .add_item_locked(&mut stores, product_id, quantity, options)
            .await;

        if let Err(e) = &result {
            self.publish(CartEvent::ItemAddFailed {
                product_id: product_id.clone(),
                reason: e.to_string(),
            });
        }
        result
    }

    pub(super) async fn add_item_locked(
        &self,
        stores: &mut Stores,
        product_id: &ProductId,
        quantity: u32,
        options: AddItemOptions,
    ) -> Result<CartItem> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity(quantity));
        }

        let product = self
            .inner
            .ctx
            .backend()
            .fetch_product(product_id)
            .await?
            .ok_or_else(|| CartError::ProductNotFound(product_id.clone()))?;
        let variant = find_variant(&product, options.variant_id.as_ref())?;

        let existing = stores.cart.find_line(
            product_id,
            options.variant_id.as_ref(),
            &options.customization,
        );
        let current = existing
            .and_then(|i| stores.cart.item(i))
            .map_or(0, |item| item.quantity);
        let requested = current.saturating_add(quantity);

        if !options.force && !product.is_available(variant, requested) {
            return Err(CartError::InsufficientStock {
                product_id: product_id.clone(),
                requested,
            });
        }

        let index = match existing {
            Some(index) => {
                stores.cart.set_quantity(index, requested);
                index
            }
            None => {
                let max = self.config().max_items;
                if stores.cart.len() >= max {
                    return Err(CartError::CartFull { max });
                }
                stores.cart.push_item(CartItem::from_product(
                    &product,
                    variant,
                    quantity,
                    options.customization,
                ));
                stores.cart.len() - 1
            }
        };

        let item = stores
            .cart
            .item(index)
            .cloned()
            .ok_or(CartError::IndexOutOfRange {
                index,
                len: stores.cart.len(),
            })?;

        self.commit_cart(stores).await;
        info!(quantity = item.quantity, "Item added to cart");
        self.publish(CartEvent::ItemAdded { item: item.clone() });
        Ok(item)
    }

    /// Remove the line at `index`.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` when there is no such line.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, index: usize) -> Result<CartItem> {
        let mut stores = self.inner.stores.lock().await;
        self.remove_item_locked(&mut stores, index).await
    }

    async fn remove_item_locked(&self, stores: &mut Stores, index: usize) -> Result<CartItem> {
        let len = stores.cart.len();
        let item = stores
            .cart
            .remove_at(index)
            .ok_or(CartError::IndexOutOfRange { index, len })?;

        self.commit_cart(stores).await;
        info!(product_id = %item.product_id, "Item removed from cart");
        self.publish(CartEvent::ItemRemoved { item: item.clone() });
        Ok(item)
    }

    /// Set the quantity of the line at `index`. Zero removes the line.
    ///
    /// Returns the line as it is now, or the removed line.
    ///
    /// # Errors
    ///
    /// - `IndexOutOfRange` when there is no such line
    /// - `ProductNotFound` when the product was withdrawn
    /// - `InsufficientStock` when stock cannot cover the new quantity
    /// - `Network` when the catalog cannot be reached
    #[instrument(skip(self))]
    pub async fn update_item_quantity(&self, index: usize, quantity: u32) -> Result<CartItem> {
        let mut stores = self.inner.stores.lock().await;
        if quantity == 0 {
            return self.remove_item_locked(&mut stores, index).await;
        }

        let (product_id, variant_id) = stores
            .cart
            .item(index)
            .map(|item| (item.product_id.clone(), item.variant_id.clone()))
            .ok_or(CartError::IndexOutOfRange {
                index,
                len: stores.cart.len(),
            })?;

        let product = self
            .inner
            .ctx
            .backend()
            .fetch_product(&product_id)
            .await?
            .ok_or_else(|| CartError::ProductNotFound(product_id.clone()))?;
        let variant = find_variant(&product, variant_id.as_ref())?;

        if !product.is_available(variant, quantity) {
            return Err(CartError::InsufficientStock {
                product_id,
                requested: quantity,
            });
        }

        let old_quantity = stores
            .cart
            .set_quantity(index, quantity)
            .ok_or(CartError::IndexOutOfRange {
                index,
                len: stores.cart.len(),
            })?;
        let item = stores
            .cart
            .item(index)
            .cloned()
            .ok_or(CartError::IndexOutOfRange {
                index,
                len: stores.cart.len(),
            })?;

        self.commit_cart(&mut stores).await;
        self.publish(CartEvent::ItemUpdated {
            item: item.clone(),
            old_quantity,
        });
        Ok(item)
    }

    /// Empty the cart and drop the coupon. Returns the number of removed lines.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) -> usize {
        let mut stores = self.inner.stores.lock().await;
        let removed = stores.cart.clear().len();

        self.commit_cart(&mut stores).await;
        info!(removed, "Cart cleared");
        self.publish(CartEvent::CartCleared { removed });
        removed
    }

    /// Validate a coupon with the storefront and apply it to the cart.
    ///
    /// The cart is unchanged when validation fails.
    ///
    /// # Errors
    ///
    /// - `InvalidCoupon` when the code is empty or refused
    /// - `Network` when the storefront cannot be reached
    #[instrument(skip(self))]
    pub async fn apply_coupon(&self, code: &str) -> Result<Coupon> {
        let mut stores = self.inner.stores.lock().await;

        let result = if code.trim().is_empty() {
            Err(CartError::InvalidCoupon("Coupon code is empty".to_string()))
        } else {
            let request =
                CouponRequest::new(code, stores.cart.items(), stores.cart.totals().subtotal);
            self.inner
                .ctx
                .backend()
                .validate_coupon(&request)
                .await
                .map_err(|e| match e {
                    ApiError::Rejected(reason) => CartError::InvalidCoupon(reason),
                    other => CartError::Network(other),
                })
        };

        let coupon = match result {
            Ok(coupon) => coupon,
            Err(e) => {
                self.publish(CartEvent::CouponFailed {
                    code: code.to_string(),
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        stores.cart.set_coupon(Some(coupon.clone()));
        self.commit_cart(&mut stores).await;
        info!(code = %coupon.code, "Coupon applied");
        self.publish(CartEvent::CouponApplied {
            coupon: coupon.clone(),
        });
        Ok(coupon)
    }

    /// Remove the coupon, returning it. No-op without a coupon.
    #[instrument(skip(self))]
    pub async fn remove_coupon(&self) -> Option<Coupon> {
        let mut stores = self.inner.stores.lock().await;
        let coupon = stores.cart.set_coupon(None)?;

        self.commit_cart(&mut stores).await;
        self.publish(CartEvent::CouponRemoved {
            coupon: coupon.clone(),
        });
        Some(coupon)
    }
}
