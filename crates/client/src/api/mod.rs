//! Storefront API surface consumed by the cart manager.
//!
//! [`CartBackend`] is the seam between the manager and the network. The
//! production implementation is [`HttpBackend`]; tests script a
//! [`MockBackend`] instead.

mod http;
#[cfg(any(test, feature = "test-util"))]
mod mock;

use std::time::Duration;

use async_trait::async_trait;
use basket_core::{CartItem, Coupon, Currency, Product, ProductId, VariantId, WishlistItem};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpBackend;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockBackend;

/// Errors that can occur when talking to the storefront API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Status { status: u16, message: String },

    /// Rate limited by the API.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The request was understood and refused (e.g., an unknown coupon).
    #[error("{0}")]
    Rejected(String),

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The call did not finish before its deadline.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// A customer session is required for this endpoint.
    #[error("Not authenticated")]
    Unauthenticated,

    /// The backend is unreachable.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// One cart line as sent to pricing and coupon endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteLine {
    pub product_id: ProductId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
    pub price: Decimal,
    pub weight: Decimal,
}

impl From<&CartItem> for QuoteLine {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.product_id.clone(),
            variant_id: item.variant_id.clone(),
            quantity: item.quantity,
            price: item.price,
            weight: item.product.weight,
        }
    }
}

/// Body of `POST /cart/coupon`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponRequest {
    pub code: String,
    pub cart_total: Decimal,
    pub items: Vec<QuoteLine>,
}

impl CouponRequest {
    #[must_use]
    pub fn new(code: &str, items: &[CartItem], cart_total: Decimal) -> Self {
        Self {
            code: code.trim().to_uppercase(),
            cart_total,
            items: items.iter().map(QuoteLine::from).collect(),
        }
    }
}

/// Parameters of `GET /cart/tax` and `GET /cart/shipping`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub subtotal: Decimal,
    pub items_count: u32,
    /// Total shipping weight in kilograms.
    pub weight: Decimal,
    pub currency: Currency,
}

impl QuoteRequest {
    #[must_use]
    pub fn new(items: &[CartItem], subtotal: Decimal, currency: Currency) -> Self {
        Self {
            subtotal,
            items_count: items.iter().map(|i| i.quantity).sum(),
            weight: items
                .iter()
                .map(|i| i.product.weight * Decimal::from(i.quantity))
                .sum(),
            currency,
        }
    }

    /// Query string pairs for the GET endpoints.
    #[must_use]
    pub fn query_pairs(&self) -> [(&'static str, String); 4] {
        [
            ("subtotal", self.subtotal.to_string()),
            ("items", self.items_count.to_string()),
            ("weight", self.weight.to_string()),
            ("currency", self.currency.code().to_string()),
        ]
    }
}

/// A tax or shipping quote.
///
/// A missing amount means the service could not quote; callers fall back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    #[serde(default)]
    pub amount: Option<Decimal>,
}

impl Quote {
    #[must_use]
    pub const fn of(amount: Decimal) -> Self {
        Self {
            amount: Some(amount),
        }
    }
}

/// Server copy of the cart (`GET|PUT /cart`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCart {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub coupon: Option<Coupon>,
}

/// Server copy of the wishlist (`GET|PUT /wishlist`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteWishlist {
    #[serde(default)]
    pub items: Vec<WishlistItem>,
}

/// Remote operations the cart manager depends on.
#[async_trait]
pub trait CartBackend: Send + Sync {
    /// Look up a catalog product. `Ok(None)` when it does not exist.
    async fn fetch_product(&self, id: &ProductId) -> Result<Option<Product>, ApiError>;

    /// Validate a coupon code against the current cart.
    async fn validate_coupon(&self, request: &CouponRequest) -> Result<Coupon, ApiError>;

    async fn quote_tax(&self, request: &QuoteRequest) -> Result<Quote, ApiError>;

    async fn quote_shipping(&self, request: &QuoteRequest) -> Result<Quote, ApiError>;

    async fn fetch_cart(&self) -> Result<RemoteCart, ApiError>;

    /// Replace the server copy of the cart. Returns the stored cart.
    async fn push_cart(&self, cart: &RemoteCart) -> Result<RemoteCart, ApiError>;

    async fn fetch_wishlist(&self) -> Result<RemoteWishlist, ApiError>;

    async fn push_wishlist(&self, wishlist: &RemoteWishlist) -> Result<(), ApiError>;

    /// Install or drop the customer session token.
    async fn authorize(&self, _token: Option<SecretString>) {}
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn line(price: i64, quantity: u32, weight: i64) -> CartItem {
        let product = Product {
            id: ProductId::new("sku-1"),
            name: "Lace Front".into(),
            slug: None,
            price: Decimal::from(price),
            compare_price: None,
            images: vec![],
            weight: Some(Decimal::new(weight, 1)),
            available: true,
            quantity: 10,
            variants: vec![],
        };
        CartItem::from_product(&product, None, quantity, BTreeMap::new())
    }

    #[test]
    fn test_quote_request_aggregates_weight() {
        let items = [line(10, 2, 5), line(20, 1, 3)];
        let request = QuoteRequest::new(&items, Decimal::from(40), Currency::EUR);
        assert_eq!(request.items_count, 3);
        assert_eq!(request.weight, Decimal::new(13, 1));

        let pairs = request.query_pairs();
        assert!(pairs.contains(&("currency", "EUR".to_string())));
        assert!(pairs.contains(&("weight", "1.3".to_string())));
    }

    #[test]
    fn test_coupon_request_normalizes_code() {
        let request = CouponRequest::new("  save10 ", &[line(10, 1, 0)], Decimal::TEN);
        assert_eq!(request.code, "SAVE10");
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("cartTotal").is_some());
        assert!(json["items"][0].get("variantId").is_none());
    }

    #[test]
    fn test_quote_without_amount() {
        let quote: Quote = serde_json::from_str("{}").unwrap();
        assert_eq!(quote.amount, None);
        let quote: Quote = serde_json::from_str(r#"{"amount":"0"}"#).unwrap();
        assert_eq!(quote, Quote::of(Decimal::ZERO));
    }
}
