//! HTTP implementation of [`CartBackend`] over `reqwest`.
//!
//! Caches product lookups using `moka` (5-minute TTL). Cart, wishlist and
//! pricing calls always go to the network.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use basket_core::{Coupon, Product, ProductId};
use moka::future::Cache;
use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use url::Url;

use super::{
    ApiError, CartBackend, CouponRequest, Quote, QuoteRequest, RemoteCart, RemoteWishlist,
};
use crate::config::ClientConfig;

const PRODUCT_CACHE_CAPACITY: u64 = 1000;
const LOG_SNIPPET_CHARS: usize = 500;

/// Client for the storefront REST API.
#[derive(Clone)]
pub struct HttpBackend {
    inner: Arc<HttpBackendInner>,
}

struct HttpBackendInner {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    session_token: RwLock<Option<SecretString>>,
    products: Cache<ProductId, Product>,
}

/// Status and body of a completed request.
struct RawResponse {
    status: StatusCode,
    body: String,
}

/// Error payload returned by the storefront on 4xx responses.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpBackend {
    /// Create a new storefront API client.
    ///
    /// # Errors
    ///
    /// Returns error if the base URL cannot carry paths or the HTTP client
    /// fails to build.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        if config.api_url.cannot_be_a_base() {
            return Err(ApiError::Unavailable(format!(
                "invalid API base URL: {}",
                config.api_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let products = Cache::builder()
            .max_capacity(PRODUCT_CACHE_CAPACITY)
            .time_to_live(config.product_cache_ttl)
            .build();

        Ok(Self {
            inner: Arc::new(HttpBackendInner {
                client,
                base_url: config.api_url.clone(),
                timeout: config.request_timeout,
                session_token: RwLock::new(config.session_token.clone()),
                products,
            }),
        })
    }

    /// Build an endpoint URL from path segments below the base URL.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.inner.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send a request with the session token attached.
    async fn execute(&self, request: RequestBuilder) -> Result<RawResponse, ApiError> {
        let request = match self.inner.session_token.read().await.as_ref() {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout(self.inner.timeout)
            } else {
                ApiError::Http(e)
            }
        })?;

        let status = response.status();

        // Check for rate limiting
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ApiError::RateLimited(retry_after));
        }

        let body = response.text().await?;
        Ok(RawResponse { status, body })
    }

    /// Turn a non-success response into an error.
    fn ensure_success(raw: RawResponse) -> Result<RawResponse, ApiError> {
        if raw.status.is_success() {
            return Ok(raw);
        }

        if raw.status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthenticated);
        }

        tracing::error!(
            status = %raw.status,
            body = %snippet(&raw.body),
            "Storefront API returned non-success status"
        );
        Err(ApiError::Status {
            status: raw.status.as_u16(),
            message: raw.body.chars().take(200).collect(),
        })
    }

    fn parse<T: DeserializeOwned>(raw: &RawResponse) -> Result<T, ApiError> {
        serde_json::from_str(&raw.body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %snippet(&raw.body),
                "Failed to parse storefront API response"
            );
            ApiError::Parse(e)
        })
    }

    async fn get_json<T: DeserializeOwned + Default>(&self, segments: &[&str]) -> Result<T, ApiError> {
        let raw = self
            .execute(self.inner.client.get(self.endpoint(segments)))
            .await?;

        // No server copy yet
        if raw.status == StatusCode::NOT_FOUND || raw.status == StatusCode::NO_CONTENT {
            return Ok(T::default());
        }

        Self::parse(&Self::ensure_success(raw)?)
    }

    async fn quote(&self, segments: &[&str], request: &QuoteRequest) -> Result<Quote, ApiError> {
        let raw = self
            .execute(
                self.inner
                    .client
                    .get(self.endpoint(segments))
                    .query(&request.query_pairs()),
            )
            .await?;
        Self::parse(&Self::ensure_success(raw)?)
    }
}

#[async_trait]
impl CartBackend for HttpBackend {
    #[instrument(skip(self), fields(product_id = %id))]
    async fn fetch_product(&self, id: &ProductId) -> Result<Option<Product>, ApiError> {
        if let Some(product) = self.inner.products.get(id).await {
            debug!("Cache hit for product");
            return Ok(Some(product));
        }

        let raw = self
            .execute(self.inner.client.get(self.endpoint(&["products", id.as_str()])))
            .await?;

        if raw.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let product: Product = Self::parse(&Self::ensure_success(raw)?)?;
        self.inner.products.insert(id.clone(), product.clone()).await;

        Ok(Some(product))
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    async fn validate_coupon(&self, request: &CouponRequest) -> Result<Coupon, ApiError> {
        let raw = self
            .execute(
                self.inner
                    .client
                    .post(self.endpoint(&["cart", "coupon"]))
                    .json(request),
            )
            .await?;

        if raw.status.is_client_error() && raw.status != StatusCode::UNAUTHORIZED {
            return Err(ApiError::Rejected(rejection_message(&raw.body)));
        }

        Self::parse(&Self::ensure_success(raw)?)
    }

    #[instrument(skip(self))]
    async fn quote_tax(&self, request: &QuoteRequest) -> Result<Quote, ApiError> {
        self.quote(&["cart", "tax"], request).await
    }

    #[instrument(skip(self))]
    async fn quote_shipping(&self, request: &QuoteRequest) -> Result<Quote, ApiError> {
        self.quote(&["cart", "shipping"], request).await
    }

    #[instrument(skip(self))]
    async fn fetch_cart(&self) -> Result<RemoteCart, ApiError> {
        self.get_json(&["cart"]).await
    }

    #[instrument(skip(self, cart), fields(items = cart.items.len()))]
    async fn push_cart(&self, cart: &RemoteCart) -> Result<RemoteCart, ApiError> {
        let raw = self
            .execute(self.inner.client.put(self.endpoint(&["cart"])).json(cart))
            .await?;
        let raw = Self::ensure_success(raw)?;

        if raw.body.trim().is_empty() {
            return Ok(cart.clone());
        }
        Self::parse(&raw)
    }

    #[instrument(skip(self))]
    async fn fetch_wishlist(&self) -> Result<RemoteWishlist, ApiError> {
        self.get_json(&["wishlist"]).await
    }

    #[instrument(skip(self, wishlist), fields(items = wishlist.items.len()))]
    async fn push_wishlist(&self, wishlist: &RemoteWishlist) -> Result<(), ApiError> {
        let raw = self
            .execute(
                self.inner
                    .client
                    .put(self.endpoint(&["wishlist"]))
                    .json(wishlist),
            )
            .await?;
        Self::ensure_success(raw).map(|_| ())
    }

    async fn authorize(&self, token: Option<SecretString>) {
        *self.inner.session_token.write().await = token;
    }
}

/// First characters of a response body for logging.
fn snippet(body: &str) -> String {
    body.chars().take(LOG_SNIPPET_CHARS).collect()
}

/// Shopper-facing reason from a 4xx coupon response.
fn rejection_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| "Invalid coupon code".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn backend(base: &str) -> HttpBackend {
        HttpBackend::new(&ClientConfig::new(Url::parse(base).unwrap())).unwrap()
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let backend = backend("https://shop.example/api/");
        assert_eq!(
            backend.endpoint(&["products", "sku-1"]).as_str(),
            "https://shop.example/api/products/sku-1"
        );
        assert_eq!(
            backend.endpoint(&["cart", "coupon"]).as_str(),
            "https://shop.example/api/cart/coupon"
        );
    }

    #[test]
    fn test_endpoint_escapes_ids() {
        let backend = backend("http://localhost:8080/");
        assert_eq!(
            backend.endpoint(&["products", "a/b c"]).as_str(),
            "http://localhost:8080/products/a%2Fb%20c"
        );
    }

    #[test]
    fn test_rejection_message() {
        assert_eq!(
            rejection_message(r#"{"message":"Coupon expired"}"#),
            "Coupon expired"
        );
        assert_eq!(rejection_message(r#"{"error":"Unknown code"}"#), "Unknown code");
        assert_eq!(rejection_message("<html>"), "Invalid coupon code");
    }

    #[test]
    fn test_snippet_truncates() {
        let long = "x".repeat(2000);
        assert_eq!(snippet(&long).len(), LOG_SNIPPET_CHARS);
    }
}
