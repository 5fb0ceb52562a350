//! Core types for Basket.
//!
//! This module provides type-safe wrappers for the cart domain.

pub mod cart;
pub mod id;
pub mod price;
pub mod product;
pub mod wishlist;

pub use cart::{Cart, CartItem, CartSummary, CartTotals, Coupon, DiscountType, ProductSnapshot, VariantSnapshot};
pub use id::*;
pub use price::{Currency, Price, UnsupportedCurrency, round_money};
pub use product::{Product, ProductImage, ProductVariant};
pub use wishlist::{Wishlist, WishlistItem, WishlistProduct};
