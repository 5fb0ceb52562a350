//! In-process pub/sub for cart and wishlist changes.

use basket_core::{CartItem, CartTotals, Coupon, ProductId, WishlistItem};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Something that happened to the cart or wishlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartEvent {
    /// Stores loaded and validated.
    Ready { items: usize, wishlist: usize },
    ItemAdded { item: CartItem },
    ItemAddFailed { product_id: ProductId, reason: String },
    ItemRemoved { item: CartItem },
    ItemUpdated { item: CartItem, old_quantity: u32 },
    /// A stored line was dropped because the product is gone or out of stock.
    ItemUnavailable { item: CartItem },
    CartCleared { removed: usize },
    CouponApplied { coupon: Coupon },
    CouponFailed { code: String, reason: String },
    CouponRemoved { coupon: Coupon },
    Recalculated { totals: CartTotals },
    SavedToStorage,
    SaveFailed { reason: String },
    Synced,
    SyncFailed { reason: String },
    /// Storage was changed by another writer and reloaded.
    ExternalUpdate,
    WishlistItemAdded { item: WishlistItem },
    WishlistItemAddFailed { product_id: ProductId, reason: String },
    WishlistItemRemoved { item: WishlistItem },
    MovedToCart { product_id: ProductId, quantity: u32 },
    MovedToWishlist { product_id: ProductId },
}

impl CartEvent {
    /// Stable dotted name for logs and breadcrumbs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "cart.ready",
            Self::ItemAdded { .. } => "cart.item_added",
            Self::ItemAddFailed { .. } => "cart.item_add_failed",
            Self::ItemRemoved { .. } => "cart.item_removed",
            Self::ItemUpdated { .. } => "cart.item_updated",
            Self::ItemUnavailable { .. } => "cart.item_unavailable",
            Self::CartCleared { .. } => "cart.cleared",
            Self::CouponApplied { .. } => "cart.coupon_applied",
            Self::CouponFailed { .. } => "cart.coupon_failed",
            Self::CouponRemoved { .. } => "cart.coupon_removed",
            Self::Recalculated { .. } => "cart.recalculated",
            Self::SavedToStorage => "cart.saved",
            Self::SaveFailed { .. } => "cart.save_failed",
            Self::Synced => "cart.synced",
            Self::SyncFailed { .. } => "cart.sync_failed",
            Self::ExternalUpdate => "cart.external_update",
            Self::WishlistItemAdded { .. } => "wishlist.item_added",
            Self::WishlistItemAddFailed { .. } => "wishlist.item_add_failed",
            Self::WishlistItemRemoved { .. } => "wishlist.item_removed",
            Self::MovedToCart { .. } => "wishlist.moved_to_cart",
            Self::MovedToWishlist { .. } => "cart.moved_to_wishlist",
        }
    }
}

/// Broadcast bus. Clones publish to the same subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CartEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn publish(&self, event: CartEvent) {
        let _ = self.sender.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CartEvent> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish(CartEvent::Synced);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(CartEvent::SavedToStorage);
        bus.publish(CartEvent::CartCleared { removed: 2 });

        assert_eq!(rx.recv().await.unwrap(), CartEvent::SavedToStorage);
        assert_eq!(rx.recv().await.unwrap().name(), "cart.cleared");
    }
}
