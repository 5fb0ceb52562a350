//! Reconciliation with the server copy and session lifecycle hooks.

use std::sync::atomic::{AtomicBool, Ordering};

use basket_core::CartItem;
use basket_core::merge::{
    merge_cart_items, merge_wishlist_items, sanitize_cart_items, sanitize_wishlist_items,
};
use secrecy::SecretString;
use tracing::{info, instrument};

use super::CartManager;
use crate::error::{CartError, Result, add_breadcrumb, capture_sync_failure};
use crate::events::CartEvent;

/// Result of [`CartManager::sync_with_server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Logged out, sync disabled, or another sync is running.
    Skipped,
    Completed {
        cart_items: usize,
        wishlist_items: usize,
    },
}

/// Clears the in-progress flag when the sync ends, however it ends.
struct SyncGuard<'a>(&'a AtomicBool);

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CartManager {
    /// Pull the server copy and reconcile it with local state.
    ///
    /// With merging enabled, matching cart lines keep the larger quantity and
    /// the wishlists are united; otherwise the server copy replaces local
    /// state. When local state contributed anything, it is pushed back.
    ///
    /// # Errors
    ///
    /// Returns `Network` when the server copy cannot be fetched. Local state
    /// is left as it was.
    #[instrument(skip(self))]
    pub async fn sync_with_server(&self) -> Result<SyncOutcome> {
        if !self.should_sync() {
            return Ok(SyncOutcome::Skipped);
        }
        let Some(_guard) = SyncGuard::acquire(&self.inner.syncing) else {
            return Ok(SyncOutcome::Skipped);
        };

        let backend = self.inner.ctx.backend();
        let (server_cart, server_wishlist) =
            match tokio::try_join!(backend.fetch_cart(), backend.fetch_wishlist()) {
                Ok(remote) => remote,
                Err(e) => {
                    capture_sync_failure(&e);
                    self.publish(CartEvent::SyncFailed {
                        reason: e.to_string(),
                    });
                    return Err(CartError::Network(e));
                }
            };

        let mut stores = self.inner.stores.lock().await;

        if self.config().merge_on_login {
            let items = merge_cart_items(stores.cart.items(), &server_cart.items);
            stores.cart.replace_items(items);
            if stores.cart.coupon().is_none() && server_cart.coupon.is_some() {
                stores.cart.set_coupon(server_cart.coupon.clone());
            }
            let wishlist = merge_wishlist_items(stores.wishlist.items(), &server_wishlist.items);
            stores.wishlist.replace_items(wishlist);
        } else {
            stores.cart.replace_items(sanitize_cart_items(&server_cart.items));
            stores.cart.set_coupon(server_cart.coupon.clone());
            stores
                .wishlist
                .replace_items(sanitize_wishlist_items(&server_wishlist.items));
        }
        if server_cart.id.is_some() {
            stores.cart.set_id(server_cart.id.clone());
        }

        self.recalculate(&mut stores.cart).await;
        stores.dirty = true;
        self.persist(&mut stores).await;
        self.refresh_summary(&stores);

        let cart_items = stores.cart.len();
        let wishlist_items = stores.wishlist.len();

        if lines_differ(stores.cart.items(), &server_cart.items)
            || stores.cart.coupon() != server_cart.coupon.as_ref()
        {
            self.schedule_push();
        }
        if wishlist_items != server_wishlist.items.len() {
            self.push_wishlist(&stores.wishlist).await;
        }
        drop(stores);

        info!(cart_items, wishlist_items, "Synced with server");
        self.publish(CartEvent::Synced);
        Ok(SyncOutcome::Completed {
            cart_items,
            wishlist_items,
        })
    }

    /// Start a customer session and reconcile with the server copy.
    ///
    /// # Errors
    ///
    /// Returns `Network` when the initial sync fails; the session stays open.
    #[instrument(skip(self, token))]
    pub async fn login(&self, token: SecretString) -> Result<SyncOutcome> {
        self.inner.ctx.backend().authorize(Some(token)).await;
        self.inner.ctx.session().set_logged_in(true);
        add_breadcrumb("auth", "Customer logged in", None);
        self.sync_with_server().await
    }

    /// End the session. Local data is kept; a pending push is dropped.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        self.inner.push.cancel();
        self.inner.ctx.session().set_logged_in(false);
        self.inner.ctx.backend().authorize(None).await;
        add_breadcrumb("auth", "Customer logged out", None);
    }

    /// The network came back.
    ///
    /// # Errors
    ///
    /// See [`Self::sync_with_server`].
    pub async fn on_online(&self) -> Result<SyncOutcome> {
        self.sync_with_server().await
    }

    /// The network went away; pending pushes are dropped and local state
    /// stays authoritative until the next sync.
    pub fn on_offline(&self) {
        self.inner.push.cancel();
    }

    /// The page became visible again.
    ///
    /// # Errors
    ///
    /// See [`Self::sync_with_server`].
    pub async fn on_visibility_regained(&self) -> Result<SyncOutcome> {
        self.sync_with_server().await
    }

    /// Reload both stores after another writer changed storage. Loaded lines
    /// are validated against the catalog and the totals recomputed.
    ///
    /// # Errors
    ///
    /// Returns `Storage` when the blobs cannot be read; in-memory state is
    /// kept in that case.
    #[instrument(skip(self))]
    pub async fn reload_from_storage(&self) -> Result<()> {
        let mut stores = self.inner.stores.lock().await;
        let (cart, wishlist) = self.load_stores().await?;
        stores.cart = cart;
        stores.wishlist = wishlist;
        stores.dirty = false;
        self.settle_loaded(&mut stores).await;
        self.refresh_summary(&stores);
        drop(stores);

        self.publish(CartEvent::ExternalUpdate);
        Ok(())
    }

    /// Push the current cart now instead of waiting for the debounce.
    pub async fn push_now(&self) {
        self.inner.push.cancel();
        if self.should_sync() {
            self.push_cart().await;
        }
    }
}

/// Whether two line lists differ in products or quantities.
fn lines_differ(local: &[CartItem], server: &[CartItem]) -> bool {
    local.len() != server.len()
        || local.iter().zip(server).any(|(l, s)| {
            !l.same_product(&s.product_id, s.variant_id.as_ref()) || l.quantity != s.quantity
        })
}
