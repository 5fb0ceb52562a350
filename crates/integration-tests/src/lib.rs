//! End-to-end test support for the basket client.
//!
//! [`MockStorefront`] serves the storefront REST API from an in-process
//! `axum` server on an ephemeral port, so tests can drive the real
//! `HttpBackend`, `FileStorage` and `CartManager` together.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p basket-integration-tests
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let storefront = MockStorefront::start().await?;
//! storefront.add_product(MockStorefront::product("sku-1", "Tee", "25.00", 10));
//!
//! let dir = tempfile::tempdir()?;
//! let manager = CartManager::from_config(storefront.guest_config(dir.path()))?;
//! manager.init().await;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Path as UrlPath, Query, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use basket_client::ClientConfig;
use basket_client::api::{Quote, RemoteCart, RemoteWishlist};
use basket_core::{Coupon, DiscountType, Product, ProductId, ProductVariant, VariantId};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;
use url::Url;

/// Bearer token the mock storefront accepts for cart and wishlist calls.
pub const SESSION_TOKEN: &str = "it-session-4b7e91c2d5a8f036";

/// Query parameters of a tax or shipping quote, as received.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuoteParams {
    pub subtotal: Decimal,
    pub items: u32,
    pub weight: Decimal,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CouponBody {
    code: String,
    cart_total: Decimal,
}

/// A coupon the storefront accepts, with an optional minimum order.
#[derive(Debug, Clone)]
struct CouponRule {
    coupon: Coupon,
    min_total: Option<Decimal>,
}

#[derive(Debug, Default)]
struct StoreState {
    products: HashMap<ProductId, Product>,
    coupons: HashMap<String, CouponRule>,
    tax_rate: Option<Decimal>,
    shipping: Option<Decimal>,
    quote_delay: Option<Duration>,
    cart: Option<RemoteCart>,
    wishlist: Option<RemoteWishlist>,
    unavailable: bool,
    rate_limit: Option<u64>,
    product_hits: usize,
    cart_puts: usize,
    wishlist_puts: usize,
    last_quote: Option<QuoteParams>,
}

#[derive(Clone, Default)]
struct Shared(Arc<Mutex<StoreState>>);

impl Shared {
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process storefront API.
pub struct MockStorefront {
    addr: SocketAddr,
    state: Shared,
    server: JoinHandle<()>,
}

impl MockStorefront {
    /// Bind an ephemeral port and start serving.
    ///
    /// # Errors
    ///
    /// Returns error if the listener cannot be bound.
    pub async fn start() -> std::io::Result<Self> {
        let state = Shared::default();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let app = router(state.clone());
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            addr,
            state,
            server,
        })
    }

    /// Base URL of the API.
    ///
    /// # Panics
    ///
    /// Never in practice; a socket address always forms a valid URL.
    #[must_use]
    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}/", self.addr)).expect("socket address is a valid URL")
    }

    /// Client configuration for an anonymous shopper storing under `dir`.
    #[must_use]
    pub fn guest_config(&self, dir: &Path) -> ClientConfig {
        let mut config = ClientConfig::new(self.url());
        config.storage_dir = dir.to_path_buf();
        config.request_timeout = Duration::from_secs(5);
        config.quote_timeout = Duration::from_secs(1);
        config.sync_debounce = Duration::from_millis(50);
        config.autosave_interval = Duration::from_secs(3600);
        config
    }

    /// Client configuration for a logged-in customer storing under `dir`.
    #[must_use]
    pub fn customer_config(&self, dir: &Path) -> ClientConfig {
        let mut config = self.guest_config(dir);
        config.session_token = Some(SecretString::from(SESSION_TOKEN));
        config
    }

    /// A product with the given price and stock.
    ///
    /// # Panics
    ///
    /// Panics if `price` is not a decimal.
    #[must_use]
    pub fn product(id: &str, name: &str, price: &str, stock: u32) -> Product {
        Product {
            id: ProductId::from(id),
            name: name.to_string(),
            slug: Some(id.to_string()),
            price: dec(price),
            compare_price: None,
            images: Vec::new(),
            weight: Some(Decimal::new(5, 1)),
            available: stock > 0,
            quantity: stock,
            variants: Vec::new(),
        }
    }

    /// A variant with its own stock and the product's price.
    #[must_use]
    pub fn variant(id: &str, stock: u32, options: &[(&str, &str)]) -> ProductVariant {
        ProductVariant {
            id: VariantId::from(id),
            sku: Some(id.to_uppercase()),
            price: None,
            compare_price: None,
            quantity: stock,
            options: options
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    pub fn add_product(&self, product: Product) {
        self.state.lock().products.insert(product.id.clone(), product);
    }

    pub fn remove_product(&self, id: &str) {
        self.state.lock().products.remove(&ProductId::from(id));
    }

    pub fn set_stock(&self, id: &str, stock: u32) {
        if let Some(product) = self.state.lock().products.get_mut(&ProductId::from(id)) {
            product.quantity = stock;
            product.available = stock > 0;
        }
    }

    /// Accept a percentage coupon.
    pub fn add_percentage_coupon(&self, code: &str, percent: u32, min_total: Option<&str>) {
        self.add_coupon(
            Coupon {
                code: code.to_string(),
                discount_type: DiscountType::Percentage,
                value: Decimal::from(percent),
                max_discount: None,
            },
            min_total,
        );
    }

    /// Accept a fixed-amount coupon.
    pub fn add_fixed_coupon(&self, code: &str, amount: &str) {
        self.add_coupon(
            Coupon {
                code: code.to_string(),
                discount_type: DiscountType::Fixed,
                value: dec(amount),
                max_discount: None,
            },
            None,
        );
    }

    fn add_coupon(&self, coupon: Coupon, min_total: Option<&str>) {
        self.state.lock().coupons.insert(
            coupon.code.clone(),
            CouponRule {
                coupon,
                min_total: min_total.map(dec),
            },
        );
    }

    /// Tax as a fraction of the subtotal; `None` answers with an empty quote.
    pub fn set_tax_rate(&self, rate: Option<&str>) {
        self.state.lock().tax_rate = rate.map(dec);
    }

    /// Flat shipping amount; `None` answers with an empty quote.
    pub fn set_shipping(&self, amount: Option<&str>) {
        self.state.lock().shipping = amount.map(dec);
    }

    /// Delay every quote response.
    pub fn set_quote_delay(&self, delay: Option<Duration>) {
        self.state.lock().quote_delay = delay;
    }

    /// Answer every request with 503.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    /// Answer the next request with 429 and the given `Retry-After`.
    pub fn rate_limit_next(&self, retry_after: u64) {
        self.state.lock().rate_limit = Some(retry_after);
    }

    pub fn set_cart(&self, cart: RemoteCart) {
        self.state.lock().cart = Some(cart);
    }

    pub fn set_wishlist(&self, wishlist: RemoteWishlist) {
        self.state.lock().wishlist = Some(wishlist);
    }

    #[must_use]
    pub fn cart(&self) -> Option<RemoteCart> {
        self.state.lock().cart.clone()
    }

    #[must_use]
    pub fn wishlist(&self) -> Option<RemoteWishlist> {
        self.state.lock().wishlist.clone()
    }

    #[must_use]
    pub fn product_hits(&self) -> usize {
        self.state.lock().product_hits
    }

    #[must_use]
    pub fn cart_puts(&self) -> usize {
        self.state.lock().cart_puts
    }

    #[must_use]
    pub fn wishlist_puts(&self) -> usize {
        self.state.lock().wishlist_puts
    }

    #[must_use]
    pub fn last_quote(&self) -> Option<QuoteParams> {
        self.state.lock().last_quote.clone()
    }
}

impl Drop for MockStorefront {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Parse a decimal literal used in test fixtures.
///
/// # Panics
///
/// Panics if `s` is not a decimal.
#[must_use]
pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap_or_else(|e| panic!("invalid decimal {s:?}: {e}"))
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/products/{id}", get(get_product))
        .route("/cart", get(get_cart).put(put_cart))
        .route("/cart/coupon", post(validate_coupon))
        .route("/cart/tax", get(quote_tax))
        .route("/cart/shipping", get(quote_shipping))
        .route("/wishlist", get(get_wishlist).put(put_wishlist))
        .layer(middleware::from_fn_with_state(state.clone(), gate))
        .with_state(state)
}

/// Outage and rate-limit simulation.
async fn gate(State(state): State<Shared>, request: Request, next: Next) -> Response {
    let (unavailable, rate_limit) = {
        let mut s = state.lock();
        (s.unavailable, s.rate_limit.take())
    };

    if unavailable {
        return (StatusCode::SERVICE_UNAVAILABLE, "maintenance").into_response();
    }
    if let Some(retry_after) = rate_limit {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after.to_string())],
        )
            .into_response();
    }
    next.run(request).await
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        == Some(SESSION_TOKEN)
}

async fn get_product(State(state): State<Shared>, UrlPath(id): UrlPath<String>) -> Response {
    let mut s = state.lock();
    s.product_hits += 1;
    match s.products.get(&ProductId::from(id)) {
        Some(product) => Json(product.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "Product not found"}))).into_response(),
    }
}

async fn validate_coupon(State(state): State<Shared>, Json(body): Json<CouponBody>) -> Response {
    let rule = state.lock().coupons.get(&body.code).cloned();
    match rule {
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"message": "Coupon does not exist"})),
        )
            .into_response(),
        Some(CouponRule {
            min_total: Some(min),
            ..
        }) if body.cart_total < min => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"message": format!("Minimum order is {min}")})),
        )
            .into_response(),
        Some(rule) => Json(rule.coupon).into_response(),
    }
}

async fn quote_tax(State(state): State<Shared>, Query(params): Query<QuoteParams>) -> Json<Quote> {
    let (rate, delay) = record_quote(&state, params.clone());
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    Json(Quote {
        amount: rate.map(|r| (params.subtotal * r).round_dp(2)),
    })
}

async fn quote_shipping(
    State(state): State<Shared>,
    Query(params): Query<QuoteParams>,
) -> Json<Quote> {
    let delay = record_quote(&state, params).1;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    Json(Quote {
        amount: state.lock().shipping,
    })
}

fn record_quote(state: &Shared, params: QuoteParams) -> (Option<Decimal>, Option<Duration>) {
    let mut s = state.lock();
    s.last_quote = Some(params);
    (s.tax_rate, s.quote_delay)
}

async fn get_cart(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match state.lock().cart.clone() {
        Some(cart) => Json(cart).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn put_cart(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(mut cart): Json<RemoteCart>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut s = state.lock();
    s.cart_puts += 1;
    if cart.id.is_none() {
        cart.id = Some(format!("cart-{}", s.cart_puts));
    }
    s.cart = Some(cart.clone());
    Json(cart).into_response()
}

async fn get_wishlist(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match state.lock().wishlist.clone() {
        Some(wishlist) => Json(wishlist).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn put_wishlist(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(wishlist): Json<RemoteWishlist>,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    let mut s = state.lock();
    s.wishlist_puts += 1;
    s.wishlist = Some(wishlist);
    StatusCode::NO_CONTENT
}
