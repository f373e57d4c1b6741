//! Raw upstream product records to [`CanonicalProduct`].
//!
//! Variation data arrives in one of three shapes, tried in order. The first
//! shape present wins and shapes are never merged:
//!
//! 1. `all_product_variations.data[]`: one row per ASIN with `dimensions`,
//!    optional `images`, `price` and `availability`.
//! 2. `all_product_variations` keyed by ASIN with inline dimensions, plus a
//!    parallel `product_variations` object of option arrays carrying photos
//!    and availability.
//! 3. `product_variations` alone, either as an array of per-ASIN rows or as
//!    option arrays that are regrouped by ASIN.
//!
//! Anything else yields no variants, which is a valid single-SKU product.
//!
//! In every shape a variant missing a value for one of the product's options
//! is dropped, since it cannot be expressed as a platform variant.

use std::collections::{BTreeMap, HashSet};

use ambridge_core::{CanonicalProduct, NormalizedVariants, ProductOption, ProductVariant};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::parse::{capitalize, parse_price};
use crate::types::{is_truthy, RawProductRecord};

const NO_DESCRIPTION: &str = "No description available";
const UNTITLED: &str = "Untitled Product";

/// Canonical option names in first-seen order, matched case-insensitively.
#[derive(Default)]
struct OptionNames(Vec<String>);

impl OptionNames {
    fn resolve(&mut self, raw: &str) -> String {
        let display = capitalize(raw.trim());
        if let Some(existing) = self.0.iter().find(|n| n.eq_ignore_ascii_case(&display)) {
            return existing.clone();
        }
        self.0.push(display.clone());
        display
    }
}

fn is_color_key(key: &str) -> bool {
    key.eq_ignore_ascii_case("color") || key.eq_ignore_ascii_case("colour")
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn first_image_link(value: Option<&Value>) -> Option<String> {
    value?
        .as_array()?
        .first()?
        .get("link")?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn is_marked_unavailable(row: &Value) -> bool {
    row.get("availability")
        .and_then(|a| a.get("status"))
        .and_then(Value::as_str)
        .is_some_and(|s| s.eq_ignore_ascii_case("unavailable"))
}

fn row_price(row: &Value) -> Option<Decimal> {
    let raw = row.get("price")?.get("current_price")?;
    if !is_truthy(raw) {
        return None;
    }
    Some(parse_price(Some(raw))).filter(|p| *p > Decimal::ZERO)
}

/// Builds the option list from kept variants only, so a value contributed
/// solely by an excluded variant never appears.
fn collect_options(names: &OptionNames, variants: &[ProductVariant]) -> Vec<ProductOption> {
    names
        .0
        .iter()
        .filter_map(|name| {
            let mut option = ProductOption::new(name.clone());
            for variant in variants {
                if let Some(value) = variant.options.get(name) {
                    option.push_value(value);
                }
            }
            (!option.values.is_empty()).then_some(option)
        })
        .collect()
}

/// Drops variants lacking a value for any option the kept variants declare,
/// then derives the option list from what remains.
fn assemble(
    names: &OptionNames,
    variants: Vec<ProductVariant>,
    variant_image_index: BTreeMap<String, String>,
) -> NormalizedVariants {
    let declared: Vec<&String> = names
        .0
        .iter()
        .filter(|name| variants.iter().any(|v| v.options.contains_key(*name)))
        .collect();
    let variants: Vec<ProductVariant> = variants
        .into_iter()
        .filter(|v| {
            let complete = declared.iter().all(|name| v.options.contains_key(*name));
            if !complete {
                tracing::warn!(asin = %v.asin, "variant lacks a value for a declared option, dropped");
            }
            complete
        })
        .collect();

    NormalizedVariants {
        options: collect_options(names, &variants),
        variants,
        variant_image_index,
    }
}

/// Selects the variation shape present on `record` and normalizes it.
#[must_use]
pub fn normalize_variants(record: &RawProductRecord) -> NormalizedVariants {
    let partial = record.path("product_variations");

    if let Some(Value::Object(table)) = record.path("all_product_variations") {
        if let Some(Value::Array(rows)) = table.get("data") {
            return from_variation_rows(rows);
        }
        if !table.is_empty() && !table.contains_key("data") {
            return from_asin_keyed_table(table, partial);
        }
    }

    match partial {
        Some(Value::Array(rows)) => from_partial_rows(rows),
        Some(Value::Object(by_option)) => from_option_arrays(by_option),
        _ => NormalizedVariants::default(),
    }
}

/// Shape 1: rows with `dimensions`.
fn from_variation_rows(rows: &[Value]) -> NormalizedVariants {
    let kept: Vec<&Value> = rows.iter().filter(|r| !is_marked_unavailable(r)).collect();

    let mut color_images = BTreeMap::new();
    for row in &kept {
        let Some(dimensions) = row.get("dimensions").and_then(Value::as_object) else {
            continue;
        };
        let color = dimensions
            .iter()
            .find(|(k, _)| is_color_key(k))
            .and_then(|(_, v)| value_text(v));
        if let (Some(color), Some(link)) = (color, first_image_link(row.get("images"))) {
            color_images.insert(color, link);
        }
    }

    let mut names = OptionNames::default();
    let mut variants = Vec::with_capacity(kept.len());
    for row in kept {
        let Some(asin) = row.get("asin").and_then(Value::as_str) else {
            continue;
        };
        let mut options = BTreeMap::new();
        if let Some(dimensions) = row.get("dimensions").and_then(Value::as_object) {
            for (key, value) in dimensions {
                if let Some(text) = value_text(value) {
                    options.insert(names.resolve(key), text);
                }
            }
        }

        let mut variant = ProductVariant {
            asin: asin.to_owned(),
            options,
            price: row_price(row),
            image: first_image_link(row.get("images")),
            available: true,
        };
        if variant.image.is_none() {
            variant.image = variant
                .color()
                .and_then(|c| color_images.get(c))
                .cloned();
        }
        variants.push(variant);
    }

    assemble(&names, variants, color_images)
}

/// Shape 2: `{ "<ASIN>": { "color": "Red", "size": "L" }, ... }` with a
/// parallel `product_variations` object.
fn from_asin_keyed_table(table: &Map<String, Value>, partial: Option<&Value>) -> NormalizedVariants {
    let mut color_images = BTreeMap::new();
    let mut unavailable = HashSet::new();

    if let Some(Value::Object(by_option)) = partial {
        for (option_name, entries) in by_option {
            let Some(entries) = entries.as_array() else {
                continue;
            };
            for entry in entries {
                if let Some(asin) = entry.get("asin").and_then(Value::as_str) {
                    if entry.get("is_available") == Some(&Value::Bool(false)) {
                        unavailable.insert(asin.to_owned());
                    }
                }
                if is_color_key(option_name) {
                    let value = entry.get("value").and_then(value_text);
                    let photo = entry.get("photo").and_then(Value::as_str);
                    if let (Some(value), Some(photo)) = (value, photo.filter(|p| !p.is_empty())) {
                        color_images.insert(value, photo.to_owned());
                    }
                }
            }
        }
    }

    let mut names = OptionNames::default();
    let mut variants = Vec::new();
    for (asin, dimensions) in table {
        if unavailable.contains(asin) {
            continue;
        }
        let Some(dimensions) = dimensions.as_object() else {
            continue;
        };
        let mut options = BTreeMap::new();
        for (key, value) in dimensions {
            if let Some(text) = value_text(value) {
                options.insert(names.resolve(key), text);
            }
        }
        let mut variant = ProductVariant {
            asin: asin.clone(),
            options,
            price: None,
            image: None,
            available: true,
        };
        variant.image = variant.color().and_then(|c| color_images.get(c)).cloned();
        variants.push(variant);
    }

    assemble(&names, variants, color_images)
}

/// Groups partial entries by ASIN, preserving first-seen order.
#[derive(Default)]
struct VariantsByAsin(Vec<ProductVariant>);

impl VariantsByAsin {
    fn entry(&mut self, asin: &str) -> &mut ProductVariant {
        let idx = match self.0.iter().position(|v| v.asin == asin) {
            Some(idx) => idx,
            None => {
                self.0.push(ProductVariant {
                    asin: asin.to_owned(),
                    options: BTreeMap::new(),
                    price: None,
                    image: None,
                    available: true,
                });
                self.0.len() - 1
            }
        };
        &mut self.0[idx]
    }

    fn into_available(self) -> Vec<ProductVariant> {
        self.0.into_iter().filter(|v| v.available).collect()
    }
}

/// Shape 3a: `product_variations` as per-ASIN rows titled by variation.
fn from_partial_rows(rows: &[Value]) -> NormalizedVariants {
    let mut names = OptionNames::default();
    let mut grouped = VariantsByAsin::default();
    let mut title_images = BTreeMap::new();

    for row in rows {
        let Some(asin) = row.get("asin").and_then(Value::as_str) else {
            continue;
        };
        let title = row.get("title").and_then(value_text);
        let image = first_image_link(row.get("images"));
        let price = row_price(row);
        let unavailable = is_marked_unavailable(row);

        let option_name = title.as_ref().map(|_| names.resolve("title"));
        let variant = grouped.entry(asin);
        if let (Some(name), Some(title)) = (option_name, title.clone()) {
            variant.options.insert(name, title);
        }
        if unavailable {
            variant.available = false;
        }
        if let Some(link) = image {
            if let Some(title) = title {
                title_images.insert(title, link.clone());
            }
            variant.image = Some(link);
        }
        if price.is_some() {
            variant.price = price;
        }
    }

    assemble(&names, grouped.into_available(), title_images)
}

/// Shape 3b: `{ "color": [{value, asin, photo, is_available}], "size": [...] }`.
/// A variant is unavailable if any of its entries says so.
fn from_option_arrays(by_option: &Map<String, Value>) -> NormalizedVariants {
    let mut names = OptionNames::default();
    let mut grouped = VariantsByAsin::default();
    let mut color_images = BTreeMap::new();

    for (option_name, entries) in by_option {
        let Some(entries) = entries.as_array() else {
            continue;
        };
        let display = names.resolve(option_name);
        for entry in entries {
            let Some(asin) = entry.get("asin").and_then(Value::as_str) else {
                continue;
            };
            let value = entry.get("value").and_then(value_text);
            let photo = entry
                .get("photo")
                .and_then(Value::as_str)
                .filter(|p| !p.is_empty());
            let price = row_price(entry);

            let variant = grouped.entry(asin);
            if let Some(value) = value.clone() {
                variant.options.insert(display.clone(), value);
            }
            if entry.get("is_available") == Some(&Value::Bool(false)) {
                variant.available = false;
            }
            if is_color_key(option_name) {
                if let Some(photo) = photo {
                    variant.image = Some(photo.to_owned());
                    if let Some(value) = value {
                        color_images.insert(value, photo.to_owned());
                    }
                }
            }
            if price.is_some() {
                variant.price = price;
            }
        }
    }

    assemble(&names, grouped.into_available(), color_images)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn images(record: &RawProductRecord) -> Vec<String> {
    if let Some(Value::Array(items)) = record.first(&["images"]) {
        return items
            .iter()
            .filter_map(|i| i.get("link").and_then(Value::as_str))
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
    }
    if let Some(photos) = record.first(&["product_photos"]) {
        return string_list(Some(photos));
    }
    record
        .first_str(&["product_photo", "main_image/link"])
        .map(|s| vec![s.to_owned()])
        .unwrap_or_default()
}

fn bullet_points(record: &RawProductRecord) -> Vec<String> {
    string_list(record.first(&["feature_bullets", "about_product"]))
}

fn description(record: &RawProductRecord, bullets: &[String]) -> String {
    let mut text = record
        .first_str(&["description", "product_description"])
        .map(str::to_owned)
        .unwrap_or_default();
    if text.is_empty() && !bullets.is_empty() {
        text = bullets.join("\n");
    }
    if let Some(say) = record.first_str(&["customers_say"]) {
        text.push_str("\n\n");
        text.push_str(say);
    }
    if text.trim().is_empty() {
        NO_DESCRIPTION.to_owned()
    } else {
        text
    }
}

fn categories(record: &RawProductRecord) -> Vec<String> {
    if let Some(Value::Array(items)) = record.first(&["categories"]) {
        return items
            .iter()
            .filter_map(|c| c.get("name").and_then(Value::as_str).or_else(|| c.as_str()))
            .map(str::to_owned)
            .collect();
    }
    match record.first(&["category"]) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Object(obj)) => obj
            .get("name")
            .and_then(Value::as_str)
            .map(|s| vec![s.to_owned()])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn ratings_total(record: &RawProductRecord) -> Option<i64> {
    match record.first(&["ratings_total", "product_num_ratings"])? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s
            .chars()
            .filter(char::is_ascii_digit)
            .collect::<String>()
            .parse()
            .ok(),
        _ => None,
    }
}

fn specifications(record: &RawProductRecord) -> BTreeMap<String, String> {
    record
        .path("product_information")
        .and_then(Value::as_object)
        .map(|info| {
            info.iter()
                .filter_map(|(k, v)| value_text(v).map(|text| (k.clone(), text)))
                .collect()
        })
        .unwrap_or_default()
}

/// Current price of a record, from either schema generation.
#[must_use]
pub fn record_price(record: &RawProductRecord) -> Decimal {
    parse_price(record.first(&["price/current_price", "product_price"]))
}

#[must_use]
pub fn record_title(record: &RawProductRecord) -> Option<&str> {
    record.first_str(&["title", "product_title"])
}

/// Normalizes a full product record.
///
/// `asin` is used only when the record names neither a parent ASIN nor its
/// own. Variants without their own price take the base price.
#[must_use]
pub fn normalize_product(record: &RawProductRecord, asin: &str) -> CanonicalProduct {
    let base_price = record_price(record);
    let normalized = normalize_variants(record);
    let bullets = bullet_points(record);

    let variants = normalized
        .variants
        .into_iter()
        .map(|mut v| {
            if v.price.is_none() {
                v.price = Some(base_price);
            }
            v
        })
        .collect();

    let rating = Some(parse_price(record.first(&["rating", "product_star_rating"])))
        .filter(|r| *r > Decimal::ZERO);

    let mut product = CanonicalProduct {
        asin: record
            .parent_asin()
            .or_else(|| record.first_str(&["asin"]))
            .unwrap_or(asin)
            .to_owned(),
        title: record_title(record).unwrap_or(UNTITLED).to_owned(),
        description: description(record, &bullets),
        base_price,
        currency: record
            .first_str(&["price/currency", "currency"])
            .unwrap_or("USD")
            .to_owned(),
        images: images(record),
        options: normalized.options,
        variants,
        variant_image_index: normalized.variant_image_index,
        bullet_points: bullets,
        rating,
        ratings_total: ratings_total(record),
        categories: categories(record),
        specifications: specifications(record),
        product_url: record
            .first_str(&["link", "product_url"])
            .map(str::to_owned),
        availability: record
            .first_str(&["availability/status", "product_availability"])
            .map(str::to_owned),
        is_prime: record.flag("is_prime"),
        is_amazon_choice: record.flag("is_amazon_choice"),
    };

    product.enforce_option_limit();
    product
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
