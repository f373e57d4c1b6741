//! Canonical product model produced by the upstream normalizer and consumed
//! by pricing, the image linker, and the platform commit.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The e-commerce platform accepts at most three options per product.
pub const MAX_PRODUCT_OPTIONS: usize = 3;

/// A named product option (e.g. `Color`) with its values in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductOption {
    pub name: String,
    pub values: Vec<String>,
}

impl ProductOption {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    /// Appends `value` unless it is already present.
    pub fn push_value(&mut self, value: &str) {
        if !self.values.iter().any(|v| v == value) {
            self.values.push(value.to_owned());
        }
    }
}

/// One sellable option combination under a parent product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub asin: String,
    /// Option name to value. Keys match [`ProductOption::name`] exactly.
    pub options: BTreeMap<String, String>,
    pub price: Option<Decimal>,
    pub image: Option<String>,
    pub available: bool,
}

impl ProductVariant {
    /// Looks up an option value by name, ignoring ASCII case.
    #[must_use]
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The value of the `Color` or `Colour` option, if any.
    #[must_use]
    pub fn color(&self) -> Option<&str> {
        self.option("color").or_else(|| self.option("colour"))
    }
}

/// Output of the variant normalizer.
///
/// An empty value is valid and means the product is a single SKU.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedVariants {
    pub options: Vec<ProductOption>,
    pub variants: Vec<ProductVariant>,
    /// Color value to representative image URL.
    pub variant_image_index: BTreeMap<String, String>,
}

impl NormalizedVariants {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalProduct {
    pub asin: String,
    pub title: String,
    pub description: String,
    pub base_price: Decimal,
    pub currency: String,
    pub images: Vec<String>,
    pub options: Vec<ProductOption>,
    pub variants: Vec<ProductVariant>,
    pub variant_image_index: BTreeMap<String, String>,
    pub bullet_points: Vec<String>,
    pub rating: Option<Decimal>,
    pub ratings_total: Option<i64>,
    pub categories: Vec<String>,
    pub specifications: BTreeMap<String, String>,
    pub product_url: Option<String>,
    pub availability: Option<String>,
    pub is_prime: bool,
    pub is_amazon_choice: bool,
}

impl CanonicalProduct {
    /// Truncates options to [`MAX_PRODUCT_OPTIONS`] and strips the dropped
    /// option keys from every variant.
    pub fn enforce_option_limit(&mut self) {
        if self.options.len() <= MAX_PRODUCT_OPTIONS {
            return;
        }

        let dropped: Vec<String> = self
            .options
            .drain(MAX_PRODUCT_OPTIONS..)
            .map(|o| o.name)
            .collect();

        tracing::debug!(
            asin = %self.asin,
            dropped = ?dropped,
            "truncating product options to platform maximum"
        );

        for variant in &mut self.variants {
            for name in &dropped {
                variant.options.remove(name);
            }
        }
    }

    #[must_use]
    pub fn main_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }

    /// Groups of variant ASINs that share an identical option combination.
    ///
    /// The normalizer does not deduplicate these; callers can surface them
    /// as a validation problem before committing.
    #[must_use]
    pub fn duplicate_option_combinations(&self) -> Vec<Vec<String>> {
        let mut groups: HashMap<&BTreeMap<String, String>, Vec<String>> = HashMap::new();
        let mut order: Vec<&BTreeMap<String, String>> = Vec::new();

        for variant in &self.variants {
            let entry = groups.entry(&variant.options).or_default();
            if entry.is_empty() {
                order.push(&variant.options);
            }
            entry.push(variant.asin.clone());
        }

        order
            .into_iter()
            .filter_map(|key| groups.remove(key))
            .filter(|asins| asins.len() > 1)
            .collect()
    }
}
