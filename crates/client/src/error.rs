//! Cart error taxonomy with Sentry integration.
//!
//! Every failed mutation returns a [`CartError`] and leaves the stores
//! untouched. The `Display` output is the message shown to the shopper.

use basket_core::ProductId;
use thiserror::Error;

use crate::api::ApiError;
use crate::storage::StorageError;

/// Errors returned by [`crate::CartManager`] operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The product (or the requested variant) does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Not enough stock for the requested quantity.
    #[error("Insufficient stock for {product_id}: {requested} requested")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
    },

    /// Quantity must be at least 1.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(u32),

    /// No cart line at this position.
    #[error("No cart item at position {index} (cart has {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// The coupon was refused by the storefront.
    #[error("Invalid coupon: {0}")]
    InvalidCoupon(String),

    /// The product is already in the wishlist.
    #[error("Already in wishlist: {0}")]
    DuplicateItem(ProductId),

    /// The product is not in the wishlist.
    #[error("Not in wishlist: {0}")]
    NotInWishlist(ProductId),

    /// The cart already holds the maximum number of lines.
    #[error("Cart is full ({max} items maximum)")]
    CartFull { max: usize },

    /// The storefront API could not be reached or answered with an error.
    #[error("Network error: {0}")]
    Network(#[from] ApiError),

    /// Local persistence failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CartError {
    /// Whether the error is a validation failure the shopper can fix.
    ///
    /// Infrastructure failures (network, storage) return `false`.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Network(_) | Self::Storage(_))
    }
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;

/// Add a breadcrumb for cart actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of cart
/// actions leading up to a sync failure.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

/// Report a failed sync to Sentry and the log.
pub fn capture_sync_failure(err: &ApiError) {
    let event_id = sentry::capture_error(err);
    tracing::warn!(
        error = %err,
        sentry_event_id = %event_id,
        "Remote sync failed, keeping local state"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_error_display() {
        let err = CartError::ProductNotFound(ProductId::new("sku-9"));
        assert_eq!(err.to_string(), "Product not found: sku-9");

        let err = CartError::IndexOutOfRange { index: 4, len: 2 };
        assert_eq!(err.to_string(), "No cart item at position 4 (cart has 2)");

        let err = CartError::InsufficientStock {
            product_id: ProductId::new("sku-1"),
            requested: 7,
        };
        assert_eq!(err.to_string(), "Insufficient stock for sku-1: 7 requested");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(CartError::InvalidCoupon("NOPE".into()).is_recoverable());
        assert!(CartError::CartFull { max: 100 }.is_recoverable());
        assert!(!CartError::Network(ApiError::Unauthenticated).is_recoverable());
    }

    #[test]
    fn test_breadcrumb_without_client_is_noop() {
        add_breadcrumb("cart", "Added item", Some(&[("product_id", "sku-1")]));
    }
}
