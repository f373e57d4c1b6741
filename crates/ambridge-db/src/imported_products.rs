//! Database operations for the append-only `imported_products` log.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `imported_products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ImportedProductRow {
    pub id: i64,
    pub shop: String,
    pub shopify_product_id: String,
    pub shopify_handle: Option<String>,
    pub shopify_variant_id: Option<String>,
    pub amazon_url: String,
    pub asin: String,
    pub title: String,
    pub price: Decimal,
    pub original_price: Decimal,
    pub markup_value: Decimal,
    pub pricing_mode: String,
    pub import_mode: String,
    pub main_image: Option<String>,
    /// JSON array of image URLs.
    pub images: serde_json::Value,
    pub variant_count: i32,
    /// `DRAFT` or `ACTIVE`.
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewImportedProduct<'a> {
    pub shop: &'a str,
    pub shopify_product_id: &'a str,
    pub shopify_handle: Option<&'a str>,
    pub shopify_variant_id: Option<&'a str>,
    pub amazon_url: &'a str,
    pub asin: &'a str,
    pub title: &'a str,
    pub price: Decimal,
    pub original_price: Decimal,
    pub markup_value: Decimal,
    pub pricing_mode: &'a str,
    pub import_mode: &'a str,
    pub main_image: Option<&'a str>,
    pub images: &'a [String],
    pub variant_count: i32,
    pub status: &'a str,
}

/// Appends one import to the log and returns its `id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_imported_product(
    pool: &PgPool,
    product: &NewImportedProduct<'_>,
) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO imported_products \
             (shop, shopify_product_id, shopify_handle, shopify_variant_id, amazon_url, asin, \
              title, price, original_price, markup_value, pricing_mode, import_mode, \
              main_image, images, variant_count, status) \
         VALUES ($1, $2, $3, $4, $5, $6, \
                 $7, $8, $9, $10, $11, $12, \
                 $13, $14::jsonb, $15, $16) \
         RETURNING id",
    )
    .bind(product.shop)
    .bind(product.shopify_product_id)
    .bind(product.shopify_handle)
    .bind(product.shopify_variant_id)
    .bind(product.amazon_url)
    .bind(product.asin)
    .bind(product.title)
    .bind(product.price)
    .bind(product.original_price)
    .bind(product.markup_value)
    .bind(product.pricing_mode)
    .bind(product.import_mode)
    .bind(product.main_image)
    .bind(serde_json::json!(product.images))
    .bind(product.variant_count)
    .bind(product.status)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Number of products imported by `shop`; the Entitlement Gate counts these.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_imported_products(pool: &PgPool, shop: &str) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM imported_products WHERE shop = $1",
    )
    .bind(shop)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_imported_products_by_status(
    pool: &PgPool,
    shop: &str,
    status: &str,
) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM imported_products WHERE shop = $1 AND status = $2",
    )
    .bind(shop)
    .bind(status)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Most recent imports first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_imported_products(
    pool: &PgPool,
    shop: &str,
    limit: i64,
) -> Result<Vec<ImportedProductRow>, DbError> {
    let rows = sqlx::query_as::<_, ImportedProductRow>(
        "SELECT id, shop, shopify_product_id, shopify_handle, shopify_variant_id, amazon_url, \
                asin, title, price, original_price, markup_value, pricing_mode, import_mode, \
                main_image, images, variant_count, status, created_at \
         FROM imported_products \
         WHERE shop = $1 \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2",
    )
    .bind(shop)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Removes the whole log for `shop` and returns the number of rows deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_imported_products(pool: &PgPool, shop: &str) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM imported_products WHERE shop = $1")
        .bind(shop)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
