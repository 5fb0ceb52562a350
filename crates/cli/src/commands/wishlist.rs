//! Wishlist subcommands.

use basket_client::CartManager;
use basket_core::ProductId;
use tracing::info;

use super::{CommandError, money};

pub async fn list(manager: &CartManager) {
    let wishlist = manager.wishlist().await;
    let currency = manager.cart().await.currency();

    if wishlist.is_empty() {
        info!("Wishlist is empty");
        return;
    }

    for item in wishlist.items() {
        info!(
            product = %item.product_id,
            price = %money(item.product.price, currency),
            available = item.product.available,
            saved = %item.added_at.format("%Y-%m-%d"),
            "{}",
            item.product.name
        );
    }
}

/// Save a product for later.
///
/// # Errors
///
/// Returns an error when the product is already saved or does not exist.
pub async fn add(manager: &CartManager, product: &str) -> Result<(), CommandError> {
    let item = manager.add_to_wishlist(&ProductId::from(product)).await?;
    info!(product = %item.product_id, saved = manager.wishlist_count(), "Saved to wishlist");
    Ok(())
}

/// Remove a saved product.
///
/// # Errors
///
/// Returns an error when the product is not saved.
pub async fn remove(manager: &CartManager, product: &str) -> Result<(), CommandError> {
    let item = manager.remove_from_wishlist(&ProductId::from(product)).await?;
    info!(product = %item.product_id, "Removed from wishlist");
    Ok(())
}

/// Move a saved product into the cart.
///
/// # Errors
///
/// Returns an error when the product is not saved or the cart refuses it; the
/// wishlist is left unchanged in that case.
pub async fn move_to_cart(
    manager: &CartManager,
    product: &str,
    quantity: u32,
) -> Result<(), CommandError> {
    let item = manager
        .move_to_cart(&ProductId::from(product), quantity)
        .await?;
    info!(product = %item.product_id, quantity, "Moved to cart");
    Ok(())
}

/// Move the cart line at `index` to the wishlist.
///
/// # Errors
///
/// Returns an error when there is no such line.
pub async fn from_cart(manager: &CartManager, index: usize) -> Result<(), CommandError> {
    let line = manager.move_to_wishlist(index).await?;
    info!(product = %line.product_id, "Moved to wishlist");
    Ok(())
}
