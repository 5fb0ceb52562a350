//! Cart and wishlist manager for a storefront.
//!
//! The [`CartManager`] owns the cart and wishlist, recomputes totals after
//! every mutation, persists both stores through a [`storage::Storage`]
//! adapter and, for logged-in customers, keeps them in sync with the
//! storefront API through a [`api::CartBackend`].
//!
//! # Example
//!
//! ```rust,ignore
//! let manager = CartManager::from_config(ClientConfig::from_env()?)?;
//! manager.init().await;
//! manager.add_item(&ProductId::new("sku-1"), 2, AddItemOptions::default()).await?;
//! manager.shutdown().await;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod storage;

pub use config::{ClientConfig, ConfigError};
pub use error::CartError;
pub use events::{CartEvent, EventBus};
pub use manager::{AddItemOptions, CartManager, StoreSummary, SyncOutcome};
pub use state::AppContext;
