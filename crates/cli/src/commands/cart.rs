//! Cart subcommands.

use basket_client::{AddItemOptions, CartManager};
use basket_core::{ProductId, VariantId};
use tracing::info;

use super::{CommandError, money, parse_options};

/// Print every line and the totals.
pub async fn show(manager: &CartManager) {
    let cart = manager.cart().await;
    let currency = cart.currency();

    if cart.is_empty() {
        info!("Cart is empty");
        return;
    }

    for (index, item) in cart.items().iter().enumerate() {
        info!(
            index,
            product = %item.product_id,
            variant = item.variant_id.as_ref().map_or("-", VariantId::as_str),
            quantity = item.quantity,
            unit = %money(item.price, currency),
            total = %money(item.line_total(), currency),
            "{}",
            item.product.name
        );
    }

    if let Some(coupon) = cart.coupon() {
        info!(code = %coupon.code, discount = %coupon.describe(currency), "Coupon applied");
    }

    let totals = cart.totals();
    info!(
        items = cart.items_count(),
        subtotal = %money(totals.subtotal, currency),
        discount = %money(totals.discount, currency),
        tax = %money(totals.tax, currency),
        shipping = %money(totals.shipping, currency),
        total = %money(totals.total, currency),
        "Totals"
    );
}

/// Add a product to the cart.
///
/// # Errors
///
/// Returns an error for malformed options or when the cart refuses the product.
pub async fn add(
    manager: &CartManager,
    product: &str,
    quantity: u32,
    variant: Option<String>,
    options: &[String],
    force: bool,
) -> Result<(), CommandError> {
    let options = AddItemOptions {
        variant_id: variant.map(VariantId::from),
        customization: parse_options(options)?,
        force,
    };
    let item = manager
        .add_item(&ProductId::from(product), quantity, options)
        .await?;

    info!(
        product = %item.product_id,
        quantity = item.quantity,
        items = manager.items_count(),
        "Added to cart"
    );
    Ok(())
}

/// Remove the line at `index`.
///
/// # Errors
///
/// Returns an error when there is no such line.
pub async fn remove(manager: &CartManager, index: usize) -> Result<(), CommandError> {
    let item = manager.remove_item(index).await?;
    info!(product = %item.product_id, "Removed from cart");
    Ok(())
}

/// Set the quantity of the line at `index`.
///
/// # Errors
///
/// Returns an error when there is no such line or stock is short.
pub async fn update(manager: &CartManager, index: usize, quantity: u32) -> Result<(), CommandError> {
    let item = manager.update_item_quantity(index, quantity).await?;
    if quantity == 0 {
        info!(product = %item.product_id, "Removed from cart");
    } else {
        info!(product = %item.product_id, quantity = item.quantity, "Quantity updated");
    }
    Ok(())
}

pub async fn clear(manager: &CartManager) {
    let removed = manager.clear_cart().await;
    info!(removed, "Cart cleared");
}

/// Validate and apply a coupon.
///
/// # Errors
///
/// Returns an error when the code is rejected or cannot be validated.
pub async fn apply_coupon(manager: &CartManager, code: &str) -> Result<(), CommandError> {
    let coupon = manager.apply_coupon(code).await?;
    let cart = manager.cart().await;
    info!(
        code = %coupon.code,
        discount = %money(cart.totals().discount, cart.currency()),
        total = %money(cart.totals().total, cart.currency()),
        "Coupon applied"
    );
    Ok(())
}

pub async fn remove_coupon(manager: &CartManager) {
    match manager.remove_coupon().await {
        Some(coupon) => info!(code = %coupon.code, "Coupon removed"),
        None => info!("No coupon to remove"),
    }
}
