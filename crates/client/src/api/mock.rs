//! Scriptable in-memory backend for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use basket_core::{Coupon, Product, ProductId};
use rust_decimal::Decimal;
use secrecy::SecretString;

use super::{
    ApiError, CartBackend, CouponRequest, Quote, QuoteRequest, RemoteCart, RemoteWishlist,
};

/// In-memory storefront. Clones share state.
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    products: HashMap<ProductId, Product>,
    coupons: HashMap<String, Coupon>,
    tax: Quote,
    shipping: Quote,
    quotes_fail: bool,
    quote_delay: Option<Duration>,
    offline: bool,
    authorized: bool,
    remote_cart: RemoteCart,
    remote_wishlist: RemoteWishlist,
    cart_pushes: Vec<RemoteCart>,
    wishlist_pushes: Vec<RemoteWishlist>,
    product_fetches: usize,
    quote_requests: Vec<QuoteRequest>,
}

impl MockBackend {
    /// Empty catalog, zero tax and zero shipping.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                tax: Quote::of(Decimal::ZERO),
                shipping: Quote::of(Decimal::ZERO),
                ..MockState::default()
            })),
        }
    }

    /// A simple in-stock product without variants.
    #[must_use]
    pub fn product(id: &str, price: Decimal, stock: u32) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            slug: Some(id.to_lowercase()),
            price,
            compare_price: None,
            images: vec![],
            weight: None,
            available: true,
            quantity: stock,
            variants: vec![],
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn with_product(self, product: Product) -> Self {
        self.add_product(product);
        self
    }

    #[must_use]
    pub fn with_coupon(self, coupon: Coupon) -> Self {
        self.add_coupon(coupon);
        self
    }

    pub fn add_coupon(&self, coupon: Coupon) {
        self.lock().coupons.insert(coupon.code.clone(), coupon);
    }

    pub fn add_product(&self, product: Product) {
        self.lock().products.insert(product.id.clone(), product);
    }

    pub fn remove_product(&self, id: &ProductId) {
        self.lock().products.remove(id);
    }

    /// Change the stock of a product (and all its variants).
    pub fn set_stock(&self, id: &ProductId, quantity: u32) {
        if let Some(product) = self.lock().products.get_mut(id) {
            product.quantity = quantity;
            for variant in &mut product.variants {
                variant.quantity = quantity;
            }
        }
    }

    pub fn set_tax(&self, quote: Quote) {
        self.lock().tax = quote;
    }

    pub fn set_shipping(&self, quote: Quote) {
        self.lock().shipping = quote;
    }

    /// Make tax and shipping quotes fail.
    pub fn fail_quotes(&self, fail: bool) {
        self.lock().quotes_fail = fail;
    }

    /// Delay tax and shipping quotes.
    pub fn set_quote_delay(&self, delay: Option<Duration>) {
        self.lock().quote_delay = delay;
    }

    /// Fail every call with [`ApiError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    pub fn set_remote_cart(&self, cart: RemoteCart) {
        self.lock().remote_cart = cart;
    }

    pub fn set_remote_wishlist(&self, wishlist: RemoteWishlist) {
        self.lock().remote_wishlist = wishlist;
    }

    #[must_use]
    pub fn remote_cart(&self) -> RemoteCart {
        self.lock().remote_cart.clone()
    }

    #[must_use]
    pub fn remote_wishlist(&self) -> RemoteWishlist {
        self.lock().remote_wishlist.clone()
    }

    /// Every cart received through `push_cart`, oldest first.
    #[must_use]
    pub fn cart_pushes(&self) -> Vec<RemoteCart> {
        self.lock().cart_pushes.clone()
    }

    #[must_use]
    pub fn wishlist_pushes(&self) -> Vec<RemoteWishlist> {
        self.lock().wishlist_pushes.clone()
    }

    #[must_use]
    pub fn product_fetches(&self) -> usize {
        self.lock().product_fetches
    }

    #[must_use]
    pub fn quote_requests(&self) -> Vec<QuoteRequest> {
        self.lock().quote_requests.clone()
    }

    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.lock().authorized
    }

    fn check_online(&self) -> Result<(), ApiError> {
        if self.lock().offline {
            return Err(ApiError::Unavailable("offline".to_string()));
        }
        Ok(())
    }

    async fn quote(
        &self,
        request: &QuoteRequest,
        pick: fn(&MockState) -> Quote,
    ) -> Result<Quote, ApiError> {
        self.check_online()?;
        let (delay, fail, quote) = {
            let mut state = self.lock();
            state.quote_requests.push(request.clone());
            (state.quote_delay, state.quotes_fail, pick(&state))
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if fail {
            return Err(ApiError::Status {
                status: 503,
                message: "pricing service down".to_string(),
            });
        }
        Ok(quote)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CartBackend for MockBackend {
    async fn fetch_product(&self, id: &ProductId) -> Result<Option<Product>, ApiError> {
        self.check_online()?;
        let mut state = self.lock();
        state.product_fetches += 1;
        Ok(state.products.get(id).cloned())
    }

    async fn validate_coupon(&self, request: &CouponRequest) -> Result<Coupon, ApiError> {
        self.check_online()?;
        self.lock()
            .coupons
            .get(&request.code)
            .cloned()
            .ok_or_else(|| ApiError::Rejected("Invalid coupon code".to_string()))
    }

    async fn quote_tax(&self, request: &QuoteRequest) -> Result<Quote, ApiError> {
        self.quote(request, |s| s.tax).await
    }

    async fn quote_shipping(&self, request: &QuoteRequest) -> Result<Quote, ApiError> {
        self.quote(request, |s| s.shipping).await
    }

    async fn fetch_cart(&self) -> Result<RemoteCart, ApiError> {
        self.check_online()?;
        Ok(self.lock().remote_cart.clone())
    }

    async fn push_cart(&self, cart: &RemoteCart) -> Result<RemoteCart, ApiError> {
        self.check_online()?;
        let mut state = self.lock();
        let mut stored = cart.clone();
        stored.id.get_or_insert_with(|| "remote-cart-1".to_string());
        state.cart_pushes.push(cart.clone());
        state.remote_cart = stored.clone();
        Ok(stored)
    }

    async fn fetch_wishlist(&self) -> Result<RemoteWishlist, ApiError> {
        self.check_online()?;
        Ok(self.lock().remote_wishlist.clone())
    }

    async fn push_wishlist(&self, wishlist: &RemoteWishlist) -> Result<(), ApiError> {
        self.check_online()?;
        let mut state = self.lock();
        state.wishlist_pushes.push(wishlist.clone());
        state.remote_wishlist = wishlist.clone();
        Ok(())
    }

    async fn authorize(&self, token: Option<SecretString>) {
        self.lock().authorized = token.is_some();
    }
}
