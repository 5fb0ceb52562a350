//! Basket Core - Cart and wishlist data model.
//!
//! This crate provides the types and pure rules shared by every Basket component:
//! - `client` - Cart manager, storefront API client and persistence
//! - `cli` - Command-line front end
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no storage,
//! no HTTP clients. Anything that needs the network (tax and shipping quotes,
//! stock checks) is supplied by the caller.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, prices, products, cart and wishlist state
//! - [`pricing`] - The recompute pipeline (subtotal, discount, total)
//! - [`merge`] - Local/remote reconciliation rules

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod merge;
pub mod pricing;
pub mod types;

pub use types::*;
