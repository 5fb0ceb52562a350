//! Catalog product as served by `GET /products/{id}`.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{ProductId, VariantId};

/// A catalog product with its stock information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub compare_price: Option<Decimal>,
    #[serde(default)]
    pub images: Vec<ProductImage>,
    /// Shipping weight in kilograms.
    #[serde(default)]
    pub weight: Option<Decimal>,
    #[serde(default)]
    pub available: bool,
    /// Units in stock for the base product.
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
}

/// A product image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductImage {
    pub url: String,
}

/// A purchasable variant of a product (size, color, length...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariant {
    pub id: VariantId,
    #[serde(default)]
    pub sku: Option<String>,
    /// Variant price; falls back to the product price when absent.
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub compare_price: Option<Decimal>,
    /// Units in stock for this variant.
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl Product {
    /// Look up a variant by ID.
    #[must_use]
    pub fn variant(&self, id: &VariantId) -> Option<&ProductVariant> {
        self.variants.iter().find(|v| &v.id == id)
    }

    /// URL of the first image, if any.
    #[must_use]
    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(|img| img.url.as_str())
    }

    /// Units in stock for the given selection.
    ///
    /// A selected variant is authoritative over the product-level stock.
    #[must_use]
    pub fn stock_for(&self, variant: Option<&ProductVariant>) -> u32 {
        variant.map_or(self.quantity, |v| v.quantity)
    }

    /// Whether `quantity` units of the selection can be ordered.
    #[must_use]
    pub fn is_available(&self, variant: Option<&ProductVariant>, quantity: u32) -> bool {
        self.available && self.stock_for(variant) >= quantity
    }

    /// Unit price for the selection.
    #[must_use]
    pub fn unit_price(&self, variant: Option<&ProductVariant>) -> Decimal {
        variant.and_then(|v| v.price).unwrap_or(self.price)
    }

    /// Compare-at price for the selection.
    #[must_use]
    pub fn unit_compare_price(&self, variant: Option<&ProductVariant>) -> Option<Decimal> {
        variant.and_then(|v| v.compare_price).or(self.compare_price)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product() -> Product {
        serde_json::from_value(serde_json::json!({
            "id": "sku-1",
            "name": "Mega Hair 60cm",
            "price": "25.00",
            "comparePrice": "30.00",
            "available": true,
            "quantity": 3,
            "images": [{ "url": "/img/1.jpg" }],
            "variants": [
                { "id": "v-blonde", "price": "27.50", "quantity": 1, "options": { "color": "613" } }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_deserializes_camel_case() {
        let p = product();
        assert_eq!(p.compare_price, Some(Decimal::from(30)));
        assert_eq!(p.primary_image(), Some("/img/1.jpg"));
        assert_eq!(p.weight, None);
    }

    #[test]
    fn test_variant_stock_is_authoritative() {
        let p = product();
        let v = p.variant(&VariantId::new("v-blonde"));
        assert!(v.is_some());
        assert!(p.is_available(None, 3));
        assert!(!p.is_available(v, 2));
        assert_eq!(p.unit_price(v), Decimal::new(2750, 2));
        assert_eq!(p.unit_compare_price(v), Some(Decimal::from(30)));
    }

    #[test]
    fn test_unavailable_flag_wins_over_stock() {
        let mut p = product();
        p.available = false;
        assert!(!p.is_available(None, 1));
    }
}
