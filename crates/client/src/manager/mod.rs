//! The cart manager: the only writer of the cart and wishlist stores.
//!
//! Every mutation takes the store lock, validates against the storefront,
//! mutates, recomputes totals, persists both blobs and, for logged-in
//! customers, schedules a push of the cart to the server. Mutations are
//! therefore serialized and each runs to completion before the next starts.
//!
//! ```text
//! action -> validate -> mutate -> recompute -> persist -> publish -> (debounced push)
//! ```

mod cart;
mod sync;
mod wishlist;

#[cfg(test)]
mod testutil;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use basket_core::merge::{sanitize_cart_items, sanitize_wishlist_items};
use basket_core::pricing::{self, compute_totals, shipping_due};
use basket_core::{
    Cart, CartItem, CartSummary, Currency, Product, ProductId, ProductVariant, VariantId,
    Wishlist,
};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, error, info, instrument, warn};

pub use cart::AddItemOptions;
pub use sync::SyncOutcome;

use crate::api::{ApiError, Quote, QuoteRequest, RemoteCart, RemoteWishlist};
use crate::config::ClientConfig;
use crate::error::{CartError, add_breadcrumb};
use crate::events::CartEvent;
use crate::scheduler::{Debouncer, Periodic};
use crate::state::AppContext;
use crate::storage::{StorageError, load_json, save_json};

/// Snapshot for badges: cart summary plus wishlist size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreSummary {
    pub cart: CartSummary,
    pub wishlist_count: usize,
}

/// Cart and wishlist manager.
///
/// This struct is cheaply cloneable via `Arc`; clones operate on the same
/// stores. Background tasks hold only weak references, so dropping the last
/// clone stops them.
#[derive(Clone)]
pub struct CartManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    ctx: AppContext,
    stores: Mutex<Stores>,
    summary: watch::Sender<StoreSummary>,
    push: Debouncer,
    autosave: Periodic,
    syncing: AtomicBool,
}

struct Stores {
    cart: Cart,
    wishlist: Wishlist,
    /// Set by every mutation, cleared by a successful save.
    dirty: bool,
}

impl Stores {
    fn empty(currency: Currency) -> Self {
        Self {
            cart: Cart::new(currency),
            wishlist: Wishlist::default(),
            dirty: false,
        }
    }
}

impl CartManager {
    /// Create a manager with empty stores. Call [`Self::init`] to load.
    #[must_use]
    pub fn new(ctx: AppContext) -> Self {
        let stores = Stores::empty(ctx.config().currency);
        let (summary, _) = watch::channel(StoreSummary {
            cart: stores.cart.summary(),
            wishlist_count: 0,
        });

        Self {
            inner: Arc::new(ManagerInner {
                ctx,
                stores: Mutex::new(stores),
                summary,
                push: Debouncer::new(),
                autosave: Periodic::new(),
                syncing: AtomicBool::new(false),
            }),
        }
    }

    /// Build a manager with the HTTP backend and file storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: ClientConfig) -> Result<Self, ApiError> {
        Ok(Self::new(AppContext::from_config(config)?))
    }

    #[must_use]
    pub fn context(&self) -> &AppContext {
        &self.inner.ctx
    }

    fn config(&self) -> &ClientConfig {
        self.inner.ctx.config()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Load both stores, drop lines that can no longer be bought and, for a
    /// logged-in customer, reconcile with the server copy.
    ///
    /// An unreadable blob resets both stores to empty.
    #[instrument(skip(self))]
    pub async fn init(&self) {
        let mut stores = self.inner.stores.lock().await;

        match self.load_stores().await {
            Ok((cart, wishlist)) => {
                stores.cart = cart;
                stores.wishlist = wishlist;
                stores.dirty = false;
            }
            Err(e) => {
                error!(error = %e, "Stored cart is unreadable, starting empty");
                *stores = Stores::empty(self.config().currency);
                stores.dirty = true;
            }
        }

        self.settle_loaded(&mut stores).await;
        self.refresh_summary(&stores);

        let (items, wishlist) = (stores.cart.len(), stores.wishlist.len());
        drop(stores);

        if self.inner.ctx.session().is_logged_in()
            && let Err(e) = self.sync_with_server().await
        {
            debug!(error = %e, "Initial sync failed");
        }

        info!(items, wishlist, "Cart ready");
        self.publish(CartEvent::Ready { items, wishlist });
    }

    /// Start periodic autosave of unsaved changes.
    pub fn start(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner
            .autosave
            .start(self.config().autosave_interval, move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        Self { inner }.autosave_tick().await;
                    }
                }
            });
    }

    /// Stop background tasks, flush a pending push and save unsaved changes.
    ///
    /// Nothing is written after this returns.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.inner.autosave.cancel();

        let push_pending = self.inner.push.is_pending();
        self.inner.push.cancel();
        if push_pending && self.should_sync() {
            self.push_cart().await;
        }

        let mut stores = self.inner.stores.lock().await;
        if stores.dirty {
            self.persist(&mut stores).await;
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Copy of the current cart.
    pub async fn cart(&self) -> Cart {
        self.inner.stores.lock().await.cart.clone()
    }

    /// Copy of the current wishlist.
    pub async fn wishlist(&self) -> Wishlist {
        self.inner.stores.lock().await.wishlist.clone()
    }

    /// Latest summary, without waiting for a running mutation.
    #[must_use]
    pub fn summary(&self) -> StoreSummary {
        *self.inner.summary.borrow()
    }

    /// Watch the summary; receivers are notified after every mutation.
    #[must_use]
    pub fn subscribe_summary(&self) -> watch::Receiver<StoreSummary> {
        self.inner.summary.subscribe()
    }

    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<CartEvent> {
        self.inner.ctx.events().subscribe()
    }

    /// Total units in the cart.
    #[must_use]
    pub fn items_count(&self) -> u32 {
        self.summary().cart.items_count
    }

    #[must_use]
    pub fn wishlist_count(&self) -> usize {
        self.summary().wishlist_count
    }

    pub async fn is_in_cart(&self, product_id: &ProductId, variant_id: Option<&VariantId>) -> bool {
        self.inner
            .stores
            .lock()
            .await
            .cart
            .contains(product_id, variant_id)
    }

    pub async fn is_in_wishlist(&self, product_id: &ProductId) -> bool {
        self.inner.stores.lock().await.wishlist.contains(product_id)
    }

    /// Whether there are changes not yet written to storage.
    pub async fn has_unsaved_changes(&self) -> bool {
        self.inner.stores.lock().await.dirty
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    /// Recompute, persist and publish after a cart mutation, then schedule a
    /// push for logged-in customers.
    async fn commit_cart(&self, stores: &mut Stores) {
        self.recalculate(&mut stores.cart).await;
        stores.dirty = true;
        self.persist(stores).await;
        self.refresh_summary(stores);
        self.schedule_push();
    }

    /// Persist and publish after a wishlist mutation, pushing it right away.
    async fn commit_wishlist(&self, stores: &mut Stores) {
        stores.dirty = true;
        self.persist(stores).await;
        self.refresh_summary(stores);
        self.push_wishlist(&stores.wishlist).await;
    }

    /// Replace the cart totals with a fresh computation.
    ///
    /// Tax and shipping quotes run concurrently, each bounded by the quote
    /// timeout. A failed tax quote counts as 0, a failed shipping quote as
    /// the flat fallback rate.
    async fn recalculate(&self, cart: &mut Cart) {
        let config = self.config();
        let subtotal = pricing::subtotal(cart.items());
        let request = QuoteRequest::new(cart.items(), subtotal, cart.currency());

        let tax = async {
            if subtotal.is_zero() {
                return Decimal::ZERO;
            }
            let quote = tokio::time::timeout(
                config.quote_timeout,
                self.inner.ctx.backend().quote_tax(&request),
            )
            .await;
            quoted_or(quote, Decimal::ZERO, "tax")
        };

        let shipping = async {
            if !shipping_due(subtotal, config.pricing.free_shipping_threshold) {
                return Decimal::ZERO;
            }
            let quote = tokio::time::timeout(
                config.quote_timeout,
                self.inner.ctx.backend().quote_shipping(&request),
            )
            .await;
            quoted_or(quote, config.pricing.fallback_shipping, "shipping")
        };

        let (tax, shipping) = tokio::join!(tax, shipping);
        let totals = compute_totals(cart.items(), cart.coupon(), tax, shipping);
        cart.set_totals(totals);

        debug!(
            subtotal = %totals.subtotal,
            discount = %totals.discount,
            tax = %totals.tax,
            shipping = %totals.shipping,
            total = %totals.total,
            "Cart recalculated"
        );
        self.publish(CartEvent::Recalculated { totals });
    }

    /// Write both blobs. Failures are logged and published; the stores stay
    /// dirty so autosave retries.
    async fn persist(&self, stores: &mut Stores) {
        match self.save_stores(stores).await {
            Ok(()) => {
                stores.dirty = false;
                self.publish(CartEvent::SavedToStorage);
            }
            Err(e) => {
                error!(error = %e, "Failed to save cart to storage");
                self.publish(CartEvent::SaveFailed {
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn save_stores(&self, stores: &Stores) -> Result<(), StorageError> {
        let storage = self.inner.ctx.storage();
        let keys = &self.config().storage_keys;
        save_json(storage, &keys.cart, &stores.cart).await?;
        save_json(storage, &keys.wishlist, &stores.wishlist).await
    }

    async fn load_stores(&self) -> Result<(Cart, Wishlist), StorageError> {
        let storage = self.inner.ctx.storage();
        let keys = &self.config().storage_keys;
        let mut cart = load_json::<Cart>(storage, &keys.cart)
            .await?
            .unwrap_or_else(|| Cart::new(self.config().currency));
        let mut wishlist = load_json::<Wishlist>(storage, &keys.wishlist)
            .await?
            .unwrap_or_default();

        let lines = sanitize_cart_items(cart.items());
        if lines.len() != cart.len() {
            warn!(
                dropped = cart.len() - lines.len(),
                "Stored cart had empty or duplicate lines"
            );
            cart.replace_items(lines);
        }
        let saved = sanitize_wishlist_items(wishlist.items());
        if saved.len() != wishlist.len() {
            warn!(
                dropped = wishlist.len() - saved.len(),
                "Stored wishlist had duplicate entries"
            );
            wishlist.replace_items(saved);
        }
        Ok((cart, wishlist))
    }

    /// Validate freshly loaded lines and recompute the totals. Stored totals
    /// are never trusted; the blobs are rewritten when anything changed.
    async fn settle_loaded(&self, stores: &mut Stores) {
        let stored = *stores.cart.totals();
        let removed = self.validate_cart_items(stores).await;
        self.recalculate(&mut stores.cart).await;

        if removed > 0 || stores.dirty || *stores.cart.totals() != stored {
            stores.dirty = true;
            self.persist(stores).await;
        }
    }

    /// Drop stored lines whose product is gone or can no longer cover the
    /// line quantity. Lines that cannot be checked are kept.
    async fn validate_cart_items(&self, stores: &mut Stores) -> usize {
        let mut kept = Vec::with_capacity(stores.cart.len());
        let mut unavailable = Vec::new();

        for item in stores.cart.items() {
            match self.inner.ctx.backend().fetch_product(&item.product_id).await {
                Ok(Some(product)) if line_available(&product, item) => kept.push(item.clone()),
                Ok(_) => unavailable.push(item.clone()),
                Err(e) => {
                    warn!(
                        product_id = %item.product_id,
                        error = %e,
                        "Could not validate cart item, keeping it"
                    );
                    kept.push(item.clone());
                }
            }
        }

        let removed = unavailable.len();
        if removed > 0 {
            stores.cart.replace_items(kept);
            for item in unavailable {
                warn!(product_id = %item.product_id, "Cart item no longer available");
                self.publish(CartEvent::ItemUnavailable { item });
            }
        }
        removed
    }

    fn refresh_summary(&self, stores: &Stores) {
        let next = StoreSummary {
            cart: stores.cart.summary(),
            wishlist_count: stores.wishlist.len(),
        };
        self.inner.summary.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn publish(&self, event: CartEvent) {
        debug!(event = event.name(), "Publishing cart event");
        if !matches!(event, CartEvent::Recalculated { .. } | CartEvent::SavedToStorage) {
            add_breadcrumb("cart", event.name(), None);
        }
        self.inner.ctx.events().publish(event);
    }

    async fn autosave_tick(&self) {
        let mut stores = self.inner.stores.lock().await;
        if stores.dirty {
            debug!("Autosaving unsaved cart changes");
            self.persist(&mut stores).await;
        }
    }

    // =========================================================================
    // Remote push
    // =========================================================================

    fn should_sync(&self) -> bool {
        self.config().sync_with_server && self.inner.ctx.session().is_logged_in()
    }

    /// Push the cart once no further mutation happened for the debounce delay.
    fn schedule_push(&self) {
        if !self.should_sync() {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        self.inner.push.schedule(self.config().sync_debounce, async move {
            if let Some(inner) = weak.upgrade() {
                Self { inner }.push_cart().await;
            }
        });
    }

    async fn push_cart(&self) {
        let snapshot = {
            let stores = self.inner.stores.lock().await;
            remote_cart(&stores.cart)
        };

        match self.inner.ctx.backend().push_cart(&snapshot).await {
            Ok(stored) => {
                debug!(items = snapshot.items.len(), "Cart pushed");
                if stored.id.is_some() && stored.id != snapshot.id {
                    let mut stores = self.inner.stores.lock().await;
                    stores.cart.set_id(stored.id);
                    stores.dirty = true;
                }
            }
            Err(e) => {
                warn!(error = %e, "Cart push failed");
                self.publish(CartEvent::SyncFailed {
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn push_wishlist(&self, wishlist: &Wishlist) {
        if !self.should_sync() {
            return;
        }

        let snapshot = RemoteWishlist {
            items: wishlist.items().to_vec(),
        };
        if let Err(e) = self.inner.ctx.backend().push_wishlist(&snapshot).await {
            warn!(error = %e, "Wishlist push failed");
            self.publish(CartEvent::SyncFailed {
                reason: e.to_string(),
            });
        }
    }
}

fn remote_cart(cart: &Cart) -> RemoteCart {
    RemoteCart {
        id: cart.id().map(str::to_owned),
        items: cart.items().to_vec(),
        coupon: cart.coupon().cloned(),
    }
}

/// Resolve the selected variant, failing when it no longer exists.
fn find_variant<'a>(
    product: &'a Product,
    variant_id: Option<&VariantId>,
) -> Result<Option<&'a ProductVariant>, CartError> {
    variant_id.map_or(Ok(None), |id| {
        product
            .variant(id)
            .map(Some)
            .ok_or_else(|| CartError::ProductNotFound(product.id.clone()))
    })
}

fn line_available(product: &Product, item: &CartItem) -> bool {
    find_variant(product, item.variant_id.as_ref())
        .is_ok_and(|variant| product.is_available(variant, item.quantity))
}

/// Amount of a bounded quote, or `fallback` when it failed, timed out or
/// came back empty.
fn quoted_or(
    quote: Result<Result<Quote, ApiError>, tokio::time::error::Elapsed>,
    fallback: Decimal,
    kind: &'static str,
) -> Decimal {
    match quote {
        Ok(Ok(Quote {
            amount: Some(amount),
        })) => amount,
        Ok(Ok(Quote { amount: None })) => {
            warn!(kind, fallback = %fallback, "Empty quote, using fallback");
            fallback
        }
        Ok(Err(e)) => {
            warn!(kind, error = %e, fallback = %fallback, "Quote failed, using fallback");
            fallback
        }
        Err(_) => {
            warn!(kind, fallback = %fallback, "Quote timed out, using fallback");
            fallback
        }
    }
}
