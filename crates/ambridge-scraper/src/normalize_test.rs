use rust_decimal::Decimal;
use serde_json::{json, Value};

use super::*;

fn record(value: Value) -> RawProductRecord {
    RawProductRecord::from_value(value).expect("test record must be a non-empty object")
}

fn option_values(n: &NormalizedVariants, name: &str) -> Vec<String> {
    n.options
        .iter()
        .find(|o| o.name == name)
        .map(|o| o.values.clone())
        .unwrap_or_default()
}

// -----------------------------------------------------------------------
// Shape 1: all_product_variations.data[]
// -----------------------------------------------------------------------

#[test]
fn variation_rows_build_options_and_variants() {
    let r = record(json!({
        "all_product_variations": { "data": [
            { "asin": "B0RED00001", "dimensions": { "color": "Red", "size": "S" },
              "images": [{ "link": "https://img.example/red.jpg" }],
              "price": { "current_price": "$21.99" } },
            { "asin": "B0RED00002", "dimensions": { "color": "Red", "size": "M" } },
            { "asin": "B0BLU00001", "dimensions": { "color": "Blue", "size": "S" },
              "images": [{ "link": "https://img.example/blue.jpg" }] }
        ]}
    }));

    let n = normalize_variants(&r);
    assert_eq!(n.variants.len(), 3);
    assert_eq!(n.options[0].name, "Color");
    assert_eq!(option_values(&n, "Color"), vec!["Red", "Blue"]);
    assert_eq!(option_values(&n, "Size"), vec!["S", "M"]);
    assert_eq!(n.variants[0].price, Some("21.99".parse().unwrap()));
    assert_eq!(n.variants[1].price, None);
    // No own image: falls back to the color image.
    assert_eq!(
        n.variants[1].image.as_deref(),
        Some("https://img.example/red.jpg")
    );
    assert_eq!(
        n.variant_image_index.get("Blue").map(String::as_str),
        Some("https://img.example/blue.jpg")
    );
}

#[test]
fn unavailable_rows_are_skipped_with_their_values() {
    let r = record(json!({
        "all_product_variations": { "data": [
            { "asin": "B0A0000001", "dimensions": { "color": "Green" } },
            { "asin": "B0A0000002", "dimensions": { "color": "Purple" },
              "availability": { "status": "Unavailable" } }
        ]}
    }));

    let n = normalize_variants(&r);
    assert_eq!(n.variants.len(), 1);
    assert_eq!(option_values(&n, "Color"), vec!["Green"]);
}

#[test]
fn option_names_are_merged_case_insensitively() {
    let r = record(json!({
        "all_product_variations": { "data": [
            { "asin": "B0C0000001", "dimensions": { "color": "Red" } },
            { "asin": "B0C0000002", "dimensions": { "Color": "Blue" } }
        ]}
    }));

    let n = normalize_variants(&r);
    assert_eq!(n.options.len(), 1);
    assert_eq!(option_values(&n, "Color"), vec!["Red", "Blue"]);
    assert_eq!(n.variants[1].options.get("Color").map(String::as_str), Some("Blue"));
}

#[test]
fn variation_row_missing_a_declared_option_is_dropped() {
    let r = record(json!({
        "all_product_variations": { "data": [
            { "asin": "B0D0000001", "dimensions": { "color": "Red", "size": "L" } },
            { "asin": "B0D0000002", "dimensions": { "color": "Blue" } }
        ]}
    }));

    let n = normalize_variants(&r);
    assert_eq!(n.variants.len(), 1);
    assert_eq!(n.variants[0].asin, "B0D0000001");
    assert_eq!(option_values(&n, "Color"), vec!["Red"]);
    assert_eq!(option_values(&n, "Size"), vec!["L"]);
}

// -----------------------------------------------------------------------
// Shape 2: ASIN-keyed table with parallel product_variations
// -----------------------------------------------------------------------

#[test]
fn asin_keyed_table_uses_parallel_photos() {
    let r = record(json!({
        "all_product_variations": { "B001": { "color": "Red", "size": "L" } },
        "product_variations": {
            "color": [{ "value": "Red", "asin": "B001", "photo": "url1", "is_available": true }]
        }
    }));

    let n = normalize_variants(&r);
    assert_eq!(option_values(&n, "Color"), vec!["Red"]);
    assert_eq!(option_values(&n, "Size"), vec!["L"]);
    assert_eq!(n.variants.len(), 1);
    let v = &n.variants[0];
    assert_eq!(v.asin, "B001");
    assert_eq!(v.options.get("Color").map(String::as_str), Some("Red"));
    assert_eq!(v.options.get("Size").map(String::as_str), Some("L"));
    assert_eq!(v.image.as_deref(), Some("url1"));
    assert!(v.available);
}

#[test]
fn asin_keyed_table_skips_unavailable_asins() {
    let r = record(json!({
        "all_product_variations": {
            "B001": { "color": "Red" },
            "B002": { "color": "Black" }
        },
        "product_variations": {
            "color": [
                { "value": "Red", "asin": "B001" },
                { "value": "Black", "asin": "B002", "is_available": false }
            ]
        }
    }));

    let n = normalize_variants(&r);
    assert_eq!(n.variants.len(), 1);
    assert_eq!(option_values(&n, "Color"), vec!["Red"]);
}

// -----------------------------------------------------------------------
// Shape 3: partial product_variations only
// -----------------------------------------------------------------------

#[test]
fn option_arrays_are_grouped_by_asin() {
    let r = record(json!({
        "product_variations": {
            "color": [
                { "value": "Red", "asin": "B01", "photo": "red.jpg" },
                { "value": "Blue", "asin": "B02", "photo": "blue.jpg" }
            ],
            "size": [
                { "value": "S", "asin": "B01" },
                { "value": "M", "asin": "B02", "is_available": false }
            ]
        }
    }));

    let n = normalize_variants(&r);
    assert_eq!(n.variants.len(), 1);
    let v = &n.variants[0];
    assert_eq!(v.asin, "B01");
    assert_eq!(v.options.len(), 2);
    assert_eq!(v.image.as_deref(), Some("red.jpg"));
    assert_eq!(option_values(&n, "Color"), vec!["Red"]);
    assert_eq!(option_values(&n, "Size"), vec!["S"]);
    // The index still records every color photo seen.
    assert_eq!(n.variant_image_index.len(), 2);
}

#[test]
fn option_array_variant_missing_a_size_is_dropped() {
    let r = record(json!({
        "product_variations": {
            "color": [
                { "value": "Red", "asin": "B1" },
                { "value": "Blue", "asin": "B2" }
            ],
            "size": [{ "value": "L", "asin": "B1" }]
        }
    }));

    let n = normalize_variants(&r);
    assert_eq!(n.variants.len(), 1);
    assert_eq!(n.variants[0].asin, "B1");
    assert_eq!(n.variants[0].options.len(), 2);
    assert_eq!(option_values(&n, "Color"), vec!["Red"]);
    assert_eq!(option_values(&n, "Size"), vec!["L"]);
}

#[test]
fn partial_rows_use_title_as_option() {
    let r = record(json!({
        "product_variations": [
            { "asin": "B0T1", "title": "Pack of 2",
              "images": [{ "link": "https://img.example/p2.jpg" }],
              "price": { "current_price": 12.5 } },
            { "asin": "B0T2", "title": "Pack of 4",
              "availability": { "status": "unavailable" } }
        ]
    }));

    let n = normalize_variants(&r);
    assert_eq!(n.variants.len(), 1);
    assert_eq!(option_values(&n, "Title"), vec!["Pack of 2"]);
    assert_eq!(n.variants[0].price, Some("12.5".parse().unwrap()));
    assert_eq!(
        n.variant_image_index.get("Pack of 2").map(String::as_str),
        Some("https://img.example/p2.jpg")
    );
}

#[test]
fn first_present_shape_wins_without_merging() {
    let r = record(json!({
        "all_product_variations": { "data": [] },
        "product_variations": {
            "color": [{ "value": "Red", "asin": "B01" }]
        }
    }));
    assert!(normalize_variants(&r).is_empty());
}

#[test]
fn missing_variation_data_is_single_sku() {
    let r = record(json!({ "title": "Desk Lamp" }));
    let n = normalize_variants(&r);
    assert!(n.is_empty());
    assert!(n.options.is_empty());
    assert!(n.variant_image_index.is_empty());
}

// -----------------------------------------------------------------------
// normalize_product
// -----------------------------------------------------------------------

#[test]
fn new_schema_fields_are_read() {
    let r = record(json!({
        "asin": "B0NEW00001",
        "product_title": "Insulated Bottle",
        "product_price": "$24.95",
        "product_photos": ["https://img.example/1.jpg", "https://img.example/2.jpg"],
        "about_product": ["Keeps drinks cold", "Leak proof"],
        "product_star_rating": "4.6",
        "product_num_ratings": 1532,
        "product_url": "https://www.amazon.com/dp/B0NEW00001",
        "product_availability": "In Stock",
        "category": "Kitchen",
        "is_prime": true
    }));

    let p = normalize_product(&r, "B0NEW00001");
    assert_eq!(p.title, "Insulated Bottle");
    assert_eq!(p.base_price, "24.95".parse::<Decimal>().unwrap());
    assert_eq!(p.currency, "USD");
    assert_eq!(p.images.len(), 2);
    assert_eq!(p.description, "Keeps drinks cold\nLeak proof");
    assert_eq!(p.rating, Some("4.6".parse().unwrap()));
    assert_eq!(p.ratings_total, Some(1532));
    assert_eq!(p.categories, vec!["Kitchen"]);
    assert_eq!(p.availability.as_deref(), Some("In Stock"));
    assert!(p.is_prime);
    assert!(!p.is_amazon_choice);
}

#[test]
fn old_schema_fields_are_read() {
    let r = record(json!({
        "asin": "B0OLD00001",
        "parent_asin": "B0PARENT01",
        "title": "Trail Shirt",
        "description": "Breathable shirt.",
        "customers_say": "Fits true to size.",
        "price": { "current_price": 19.99, "currency": "EUR" },
        "images": [{ "link": "https://img.example/a.jpg" }],
        "main_image": { "link": "https://img.example/main.jpg" },
        "categories": [{ "name": "Clothing" }, { "name": "Shirts" }],
        "ratings_total": "2,041",
        "product_information": { "Material": "Cotton", "Weight": 200 }
    }));

    let p = normalize_product(&r, "B0OLD00001");
    assert_eq!(p.asin, "B0PARENT01");
    assert_eq!(p.currency, "EUR");
    assert_eq!(p.images, vec!["https://img.example/a.jpg"]);
    assert_eq!(p.description, "Breathable shirt.\n\nFits true to size.");
    assert_eq!(p.categories, vec!["Clothing", "Shirts"]);
    assert_eq!(p.ratings_total, Some(2041));
    assert_eq!(p.specifications.get("Weight").map(String::as_str), Some("200"));
}

#[test]
fn empty_description_gets_placeholder() {
    let r = record(json!({ "title": "Bare", "product_price": "5.00" }));
    let p = normalize_product(&r, "B0BARE0001");
    assert_eq!(p.description, "No description available");
    assert_eq!(p.asin, "B0BARE0001");
    assert!(p.images.is_empty());
}

#[test]
fn variants_inherit_base_price_and_options_are_capped() {
    let r = record(json!({
        "title": "Sneaker",
        "product_price": "59.99",
        "all_product_variations": { "data": [
            { "asin": "B0S1", "dimensions": {
                "color": "White", "size": "9", "width": "Wide", "style": "Low" } },
            { "asin": "B0S2", "dimensions": {
                "color": "Black", "size": "10", "width": "Regular", "style": "High" },
              "price": { "current_price": "64.99" } }
        ]}
    }));

    let p = normalize_product(&r, "B0S1");
    assert_eq!(p.options.len(), 3);
    let names: Vec<&str> = p.options.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["Color", "Size", "Width"]);
    assert!(p.variants.iter().all(|v| !v.options.contains_key("Style")));
    assert_eq!(p.variants[0].price, Some("59.99".parse().unwrap()));
    assert_eq!(p.variants[1].price, Some("64.99".parse().unwrap()));
}
