//! Subcommand implementations.

pub mod cart;
pub mod sync;
pub mod wishlist;

use std::collections::BTreeMap;

use basket_client::CartError;
use basket_core::{Currency, Price};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by subcommands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid option '{0}', expected key=value")]
    InvalidOption(String),

    #[error(transparent)]
    Cart(#[from] CartError),
}

/// Parse repeated `key=value` customization arguments.
///
/// # Errors
///
/// Returns `InvalidOption` for an entry without `=` or with an empty key.
pub fn parse_options(raw: &[String]) -> Result<BTreeMap<String, String>, CommandError> {
    raw.iter()
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_owned(), value.trim().to_owned()))
            }
            _ => Err(CommandError::InvalidOption(entry.clone())),
        })
        .collect()
}

/// Format an amount in the cart currency.
#[must_use]
pub fn money(amount: Decimal, currency: Currency) -> String {
    Price::new(amount, currency).display()
}
