//! Cart state: line items, coupon and derived totals.
//!
//! A [`Cart`] is only ever changed through its own methods. Totals are never
//! edited directly; they are replaced wholesale with the output of
//! [`crate::pricing::compute_totals`] after every mutation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{LineId, ProductId, VariantId};
use super::price::Currency;
use super::product::{Product, ProductVariant};

/// Denormalized product data captured when the line was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub weight: Decimal,
}

/// Variant data captured when the line was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSnapshot {
    pub id: VariantId,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// A single cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: LineId,
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    /// Always at least 1 while the line exists.
    pub quantity: u32,
    /// Unit price at the time the line was added.
    pub price: Decimal,
    #[serde(default)]
    pub compare_price: Option<Decimal>,
    pub product: ProductSnapshot,
    #[serde(default)]
    pub variant: Option<VariantSnapshot>,
    #[serde(default)]
    pub customization: BTreeMap<String, String>,
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    /// Build a new line from a catalog product.
    #[must_use]
    pub fn from_product(
        product: &Product,
        variant: Option<&ProductVariant>,
        quantity: u32,
        customization: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: LineId::generate(),
            product_id: product.id.clone(),
            variant_id: variant.map(|v| v.id.clone()),
            quantity,
            price: product.unit_price(variant),
            compare_price: product.unit_compare_price(variant),
            product: ProductSnapshot {
                id: product.id.clone(),
                name: product.name.clone(),
                slug: product.slug.clone(),
                image: product.primary_image().map(str::to_owned),
                weight: product.weight.unwrap_or_default(),
            },
            variant: variant.map(|v| VariantSnapshot {
                id: v.id.clone(),
                sku: v.sku.clone(),
                options: v.options.clone(),
            }),
            customization,
            added_at: Utc::now(),
        }
    }

    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }

    /// Whether this line has the same product, variant and customization.
    #[must_use]
    pub fn matches(
        &self,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
        customization: &BTreeMap<String, String>,
    ) -> bool {
        self.same_product(product_id, variant_id) && &self.customization == customization
    }

    /// Whether this line has the same product and variant, ignoring customization.
    #[must_use]
    pub fn same_product(&self, product_id: &ProductId, variant_id: Option<&VariantId>) -> bool {
        &self.product_id == product_id && self.variant_id.as_ref() == variant_id
    }
}

/// Coupon discount kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    /// `value` is a percentage of the subtotal.
    Percentage,
    /// `value` is an absolute amount.
    Fixed,
}

/// A validated coupon, applied to the whole cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub code: String,
    pub discount_type: DiscountType,
    pub value: Decimal,
    /// Upper bound on a percentage discount.
    #[serde(default)]
    pub max_discount: Option<Decimal>,
}

impl Coupon {
    /// Human readable description of the discount (e.g., "10%" or "€5.00").
    #[must_use]
    pub fn describe(&self, currency: Currency) -> String {
        match self.discount_type {
            DiscountType::Percentage => format!("{}%", self.value.normalize()),
            DiscountType::Fixed => format!("{}{:.2}", currency.symbol(), self.value),
        }
    }
}

/// Derived monetary totals of a cart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

/// Read-only overview of a cart for badges and order summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    pub items_count: u32,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub currency: Currency,
    pub has_items: bool,
    pub has_coupon: bool,
}

/// The shopping cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    items: Vec<CartItem>,
    #[serde(default)]
    coupon: Option<Coupon>,
    #[serde(default)]
    currency: Currency,
    #[serde(default)]
    totals: CartTotals,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

impl Default for Cart {
    fn default() -> Self {
        Self::new(Currency::default())
    }
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub const fn new(currency: Currency) -> Self {
        Self {
            id: None,
            items: Vec::new(),
            coupon: None,
            currency,
            totals: CartTotals {
                subtotal: Decimal::ZERO,
                discount: Decimal::ZERO,
                tax: Decimal::ZERO,
                shipping: Decimal::ZERO,
                total: Decimal::ZERO,
            },
            last_updated: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Line at `index`, if any.
    #[must_use]
    pub fn item(&self, index: usize) -> Option<&CartItem> {
        self.items.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub const fn coupon(&self) -> Option<&Coupon> {
        self.coupon.as_ref()
    }

    #[must_use]
    pub const fn currency(&self) -> Currency {
        self.currency
    }

    #[must_use]
    pub const fn totals(&self) -> &CartTotals {
        &self.totals
    }

    #[must_use]
    pub const fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn items_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Index of the line with the same product, variant and customization.
    #[must_use]
    pub fn find_line(
        &self,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
        customization: &BTreeMap<String, String>,
    ) -> Option<usize> {
        self.items
            .iter()
            .position(|i| i.matches(product_id, variant_id, customization))
    }

    /// Whether any line holds the product/variant pair.
    #[must_use]
    pub fn contains(&self, product_id: &ProductId, variant_id: Option<&VariantId>) -> bool {
        self.items
            .iter()
            .any(|i| i.same_product(product_id, variant_id))
    }

    /// Append a line.
    pub fn push_item(&mut self, item: CartItem) {
        self.items.push(item);
    }

    /// Remove and return the line at `index`.
    pub fn remove_at(&mut self, index: usize) -> Option<CartItem> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    /// Replace a line's quantity, returning the previous one.
    ///
    /// A quantity of zero removes the line.
    pub fn set_quantity(&mut self, index: usize, quantity: u32) -> Option<u32> {
        if quantity == 0 {
            return self.remove_at(index).map(|removed| removed.quantity);
        }
        let item = self.items.get_mut(index)?;
        Some(std::mem::replace(&mut item.quantity, quantity))
    }

    /// Swap in a new item list (used after merging with a remote copy).
    pub fn replace_items(&mut self, items: Vec<CartItem>) {
        self.items = items;
    }

    /// Set or clear the coupon, returning the previous one.
    pub fn set_coupon(&mut self, coupon: Option<Coupon>) -> Option<Coupon> {
        std::mem::replace(&mut self.coupon, coupon)
    }

    /// Record the remote cart ID once the server has assigned one.
    pub fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    /// Empty the cart and drop the coupon.
    ///
    /// Returns the removed lines.
    pub fn clear(&mut self) -> Vec<CartItem> {
        self.coupon = None;
        std::mem::take(&mut self.items)
    }

    /// Store freshly computed totals.
    pub fn set_totals(&mut self, totals: CartTotals) {
        self.totals = totals;
        self.last_updated = Some(Utc::now());
    }

    /// Build a summary of the current state.
    #[must_use]
    pub fn summary(&self) -> CartSummary {
        CartSummary {
            items_count: self.items_count(),
            subtotal: self.totals.subtotal,
            discount: self.totals.discount,
            tax: self.totals.tax,
            shipping: self.totals.shipping,
            total: self.totals.total,
            currency: self.currency,
            has_items: !self.items.is_empty(),
            has_coupon: self.coupon.is_some(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product(id: &str, price: i64) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            slug: None,
            price: Decimal::from(price),
            compare_price: None,
            images: vec![],
            weight: None,
            available: true,
            quantity: 10,
            variants: vec![],
        }
    }

    #[test]
    fn test_set_quantity_zero_removes_line() {
        let mut cart = Cart::default();
        cart.push_item(CartItem::from_product(&product("a", 5), None, 2, BTreeMap::new()));
        assert_eq!(cart.set_quantity(0, 0), Some(2));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_remove_at_out_of_range() {
        let mut cart = Cart::default();
        assert!(cart.remove_at(0).is_none());
        assert!(cart.set_quantity(3, 1).is_none());
    }

    #[test]
    fn test_find_line_respects_customization() {
        let mut cart = Cart::default();
        let mut custom = BTreeMap::new();
        custom.insert("engraving".to_owned(), "JC".to_owned());
        cart.push_item(CartItem::from_product(&product("a", 5), None, 1, custom.clone()));

        let id = ProductId::new("a");
        assert_eq!(cart.find_line(&id, None, &custom), Some(0));
        assert_eq!(cart.find_line(&id, None, &BTreeMap::new()), None);
        assert!(cart.contains(&id, None));
    }

    #[test]
    fn test_clear_drops_coupon() {
        let mut cart = Cart::default();
        cart.push_item(CartItem::from_product(&product("a", 5), None, 1, BTreeMap::new()));
        cart.set_coupon(Some(Coupon {
            code: "TEN".into(),
            discount_type: DiscountType::Fixed,
            value: Decimal::TEN,
            max_discount: None,
        }));
        let removed = cart.clear();
        assert_eq!(removed.len(), 1);
        assert!(cart.coupon().is_none());
        assert!(!cart.summary().has_items);
    }

    #[test]
    fn test_coupon_describe() {
        let pct = Coupon {
            code: "P".into(),
            discount_type: DiscountType::Percentage,
            value: Decimal::new(1000, 2),
            max_discount: None,
        };
        assert_eq!(pct.describe(Currency::EUR), "10%");

        let fixed = Coupon {
            discount_type: DiscountType::Fixed,
            value: Decimal::from(5),
            ..pct
        };
        assert_eq!(fixed.describe(Currency::EUR), "€5.00");
    }

    #[test]
    fn test_cart_json_uses_camel_case() {
        let cart = Cart::default();
        let json = serde_json::to_value(&cart).unwrap();
        assert!(json.get("lastUpdated").is_some());
        let back: Cart = serde_json::from_value(json).unwrap();
        assert_eq!(back, cart);
    }
}
