//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BASKET_API_URL` - Base URL of the storefront API (e.g., `https://shop.example/api/`)
//!
//! ## Optional
//! - `BASKET_SESSION_TOKEN` - Bearer token of an authenticated customer session
//! - `BASKET_STORAGE_DIR` - Directory for persisted cart/wishlist blobs (default: .basket)
//! - `BASKET_CART_KEY` - Storage key of the cart blob (default: `basket_cart`)
//! - `BASKET_WISHLIST_KEY` - Storage key of the wishlist blob (default: `basket_wishlist`)
//! - `BASKET_CURRENCY` - Cart currency (default: EUR)
//! - `BASKET_FREE_SHIPPING_THRESHOLD` - Subtotal from which shipping is free (default: 150)
//! - `BASKET_FALLBACK_SHIPPING` - Flat shipping when the quote fails (default: 5.99)
//! - `BASKET_MAX_ITEMS` - Maximum number of cart lines (default: 100)
//! - `BASKET_REQUEST_TIMEOUT_SECS` - HTTP request timeout (default: 10)
//! - `BASKET_QUOTE_TIMEOUT_MS` - Deadline for tax/shipping quotes (default: 3000)
//! - `BASKET_PRODUCT_CACHE_SECS` - Product lookup cache TTL (default: 300)
//! - `BASKET_SYNC_DEBOUNCE_MS` - Delay before pushing the cart (default: 2000)
//! - `BASKET_AUTOSAVE_SECS` - Autosave period (default: 30)
//! - `BASKET_SYNC_WITH_SERVER` - Push/pull when logged in (default: true)
//! - `BASKET_MERGE_ON_LOGIN` - Merge instead of replace on pull (default: true)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use basket_core::Currency;
use basket_core::pricing::{DEFAULT_FALLBACK_SHIPPING, DEFAULT_FREE_SHIPPING_THRESHOLD};
use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storage keys of the two persisted blobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub cart: String,
    pub wishlist: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            cart: "basket_cart".to_string(),
            wishlist: "basket_wishlist".to_string(),
        }
    }
}

/// Shipping rules applied by the recompute pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingConfig {
    pub free_shipping_threshold: Decimal,
    pub fallback_shipping: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            free_shipping_threshold: DEFAULT_FREE_SHIPPING_THRESHOLD,
            fallback_shipping: DEFAULT_FALLBACK_SHIPPING,
        }
    }
}

/// Cart client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the storefront API
    pub api_url: Url,
    /// Bearer token of a logged-in customer
    pub session_token: Option<SecretString>,
    /// Directory used by file storage
    pub storage_dir: PathBuf,
    pub storage_keys: StorageKeys,
    pub currency: Currency,
    pub pricing: PricingConfig,
    /// Maximum number of distinct cart lines
    pub max_items: usize,
    pub request_timeout: Duration,
    /// Deadline for a single tax or shipping quote
    pub quote_timeout: Duration,
    pub product_cache_ttl: Duration,
    pub sync_debounce: Duration,
    pub autosave_interval: Duration,
    pub sync_with_server: bool,
    pub merge_on_login: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

impl ClientConfig {
    /// Configuration with every optional setting at its default.
    #[must_use]
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            session_token: None,
            storage_dir: PathBuf::from(".basket"),
            storage_keys: StorageKeys::default(),
            currency: Currency::default(),
            pricing: PricingConfig::default(),
            max_items: 100,
            request_timeout: Duration::from_secs(10),
            quote_timeout: Duration::from_millis(3000),
            product_cache_ttl: Duration::from_secs(300),
            sync_debounce: Duration::from_millis(2000),
            autosave_interval: Duration::from_secs(30),
            sync_with_server: true,
            merge_on_login: true,
            sentry_dsn: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid, or
    /// if the session token looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_url = parse_api_url(&get_required_env("BASKET_API_URL")?)?;
        let defaults = Self::new(api_url);

        let session_token = get_optional_env("BASKET_SESSION_TOKEN")
            .map(|token| {
                validate_secret_strength(&token, "BASKET_SESSION_TOKEN")?;
                Ok::<_, ConfigError>(SecretString::from(token))
            })
            .transpose()?;

        let storage_keys = StorageKeys {
            cart: get_env_or_default("BASKET_CART_KEY", &defaults.storage_keys.cart),
            wishlist: get_env_or_default("BASKET_WISHLIST_KEY", &defaults.storage_keys.wishlist),
        };

        let pricing = PricingConfig {
            free_shipping_threshold: get_parsed(
                "BASKET_FREE_SHIPPING_THRESHOLD",
                defaults.pricing.free_shipping_threshold,
            )?,
            fallback_shipping: get_parsed(
                "BASKET_FALLBACK_SHIPPING",
                defaults.pricing.fallback_shipping,
            )?,
        };

        Ok(Self {
            session_token,
            storage_dir: get_optional_env("BASKET_STORAGE_DIR")
                .map_or(defaults.storage_dir.clone(), PathBuf::from),
            storage_keys,
            currency: get_parsed("BASKET_CURRENCY", defaults.currency)?,
            pricing,
            max_items: get_parsed("BASKET_MAX_ITEMS", defaults.max_items)?,
            request_timeout: Duration::from_secs(get_parsed("BASKET_REQUEST_TIMEOUT_SECS", 10)?),
            quote_timeout: Duration::from_millis(get_parsed("BASKET_QUOTE_TIMEOUT_MS", 3000)?),
            product_cache_ttl: Duration::from_secs(get_parsed("BASKET_PRODUCT_CACHE_SECS", 300)?),
            sync_debounce: Duration::from_millis(get_parsed("BASKET_SYNC_DEBOUNCE_MS", 2000)?),
            autosave_interval: Duration::from_secs(get_parsed("BASKET_AUTOSAVE_SECS", 30)?),
            sync_with_server: get_parsed("BASKET_SYNC_WITH_SERVER", true)?,
            merge_on_login: get_parsed("BASKET_MERGE_ON_LOGIN", true)?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            ..defaults
        })
    }

    /// Whether a session token was configured.
    #[must_use]
    pub const fn has_session(&self) -> bool {
        self.session_token.is_some()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse and normalize the API base URL so relative joins keep its path.
fn parse_api_url(raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidEnvVar("BASKET_API_URL".to_string(), e.to_string()))?;

    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidEnvVar(
            "BASKET_API_URL".to_string(),
            "must be a hierarchical http(s) URL".to_string(),
        ));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an optional environment variable, falling back to `default`.
fn get_parsed<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}
