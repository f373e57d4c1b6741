use ambridge_core::{
    check_product_limit, price_for_import, resolve_import_mode, validate_product_pricing,
    CanonicalProduct, ImportMode, ImportModeDecision, PricingConfig, PricingResult,
    ProductLimitCheck,
};
use ambridge_db::NewImportedProduct;
use ambridge_shopify::{commit_product, CommitOutcome, CommitRequest};
use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{
    current_usage, load_account, map_db_error, map_scraper_error, map_shopify_error,
    normalize_limit, plan_limit_error, ApiError, ApiResponse, AppState, ShopContext,
};

#[derive(Debug, Deserialize)]
pub(super) struct PreviewRequest {
    url: String,
    pricing: Option<PricingConfig>,
    import_mode: Option<ImportMode>,
}

#[derive(Debug, Serialize)]
pub(super) struct PreviewData {
    product: CanonicalProduct,
    pricing: PricingResult,
    pricing_config: PricingConfig,
    import_mode: ImportModeDecision,
    usage: ProductLimitCheck,
    /// Option combinations shared by more than one variant.
    duplicate_variants: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ImportRequest {
    url: String,
    import_mode: ImportMode,
    pricing: Option<PricingConfig>,
    #[serde(default)]
    publish: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct ImportData {
    product: CommitOutcome,
    asin: String,
    title: String,
    pricing: PricingResult,
    import_mode: ImportModeDecision,
    usage: ProductLimitCheck,
}

#[derive(Debug, Deserialize)]
pub(super) struct ImportedQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct ImportedItem {
    id: i64,
    shopify_product_id: String,
    shopify_handle: Option<String>,
    amazon_url: String,
    asin: String,
    title: String,
    price: Decimal,
    original_price: Decimal,
    markup_value: Decimal,
    pricing_mode: String,
    import_mode: String,
    main_image: Option<String>,
    variant_count: i32,
    status: String,
    created_at: DateTime<Utc>,
}

fn check_pricing(
    request_id: &str,
    mode: ImportMode,
    product: &CanonicalProduct,
    config: PricingConfig,
) -> Result<(), ApiError> {
    if mode == ImportMode::Affiliate {
        return Ok(());
    }
    validate_product_pricing(product, config)
        .map_err(|e| ApiError::new(request_id, "validation_error", e.to_string()))
}

pub(super) async fn preview_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ctx: ShopContext,
    Json(body): Json<PreviewRequest>,
) -> Result<Json<ApiResponse<PreviewData>>, ApiError> {
    let account = load_account(&state, &req_id.0, &ctx.shop).await?;

    let product = state
        .amazon
        .scrape_url(body.url.trim())
        .await
        .map_err(|e| map_scraper_error(req_id.0.clone(), &e))?;

    let requested = match body.import_mode {
        Some(mode) => mode,
        None => account
            .row
            .import_mode()
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?,
    };
    let config = match body.pricing {
        Some(config) => config,
        None => account
            .row
            .pricing_config()
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?,
    };

    let decision = resolve_import_mode(&account.plan, requested);
    check_pricing(&req_id.0, decision.mode, &product, config)?;
    let usage = current_usage(&state, &req_id.0, &ctx.shop, &account.plan).await?;

    let duplicate_variants = product.duplicate_option_combinations();
    let priced = price_for_import(&product, decision.mode, config);

    Ok(ApiResponse::new(
        req_id.0,
        PreviewData {
            product: priced.product,
            pricing: priced.pricing,
            pricing_config: config,
            import_mode: decision,
            usage,
            duplicate_variants,
        },
    ))
}

/// Scrape, price, gate, commit and log one product.
///
/// Nothing is written to the shop until the gate passes. After the commit
/// succeeds, a failed log write is reported as a warning so the caller does
/// not retry into a duplicate product.
pub(super) async fn import_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ctx: ShopContext,
    Json(body): Json<ImportRequest>,
) -> Result<Json<ApiResponse<ImportData>>, ApiError> {
    let client = ctx.admin_client(&state, &req_id.0)?;
    let account = load_account(&state, &req_id.0, &ctx.shop).await?;
    let amazon_url = body.url.trim();

    let product = state
        .amazon
        .scrape_url(amazon_url)
        .await
        .map_err(|e| map_scraper_error(req_id.0.clone(), &e))?;

    let decision = resolve_import_mode(&account.plan, body.import_mode);
    if let Some(notice) = &decision.notice {
        tracing::info!(shop = %ctx.shop, notice = %notice, "import mode forced");
    }

    let config = match body.pricing {
        Some(config) => config,
        None => account
            .row
            .pricing_config()
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?,
    };
    check_pricing(&req_id.0, decision.mode, &product, config)?;
    let priced = price_for_import(&product, decision.mode, config);

    let usage = current_usage(&state, &req_id.0, &ctx.shop, &account.plan).await?;
    if !usage.allowed {
        tracing::info!(
            shop = %ctx.shop,
            count = usage.current_count,
            limit = usage.limit,
            "import denied by product limit"
        );
        return Err(plan_limit_error(req_id.0, &usage));
    }

    let affiliate_tag = match decision.mode {
        ImportMode::Affiliate => account
            .row
            .affiliate_id
            .as_deref()
            .map(str::trim)
            .filter(|tag| !tag.is_empty()),
        ImportMode::Dropshipping => None,
    };

    let mut outcome = commit_product(
        &client,
        CommitRequest {
            product: &priced.product,
            amazon_url,
            import_mode: decision.mode,
            publish: body.publish,
            affiliate_tag,
        },
    )
    .await
    .map_err(|e| map_shopify_error(req_id.0.clone(), &e))?;

    let log_entry = NewImportedProduct {
        shop: &ctx.shop,
        shopify_product_id: &outcome.product_id,
        shopify_handle: Some(outcome.handle.as_str()).filter(|h| !h.is_empty()),
        shopify_variant_id: outcome.first_variant_id.as_deref(),
        amazon_url,
        asin: &priced.product.asin,
        title: &priced.product.title,
        price: priced.pricing.final_price,
        original_price: priced.pricing.original_price,
        markup_value: config.value,
        pricing_mode: config.mode.as_str(),
        import_mode: decision.mode.as_str(),
        main_image: priced.product.main_image(),
        images: &priced.product.images,
        variant_count: i32::try_from(outcome.variant_count).unwrap_or(i32::MAX),
        status: if body.publish { "ACTIVE" } else { "DRAFT" },
    };
    let logged = ambridge_db::insert_imported_product(&state.pool, &log_entry).await;
    let usage = match logged {
        Ok(id) => {
            tracing::info!(
                shop = %ctx.shop,
                log_id = id,
                product_id = %outcome.product_id,
                asin = %priced.product.asin,
                mode = %decision.mode.as_str(),
                "product imported"
            );
            check_product_limit(&account.plan, usage.current_count + 1)
        }
        Err(e) => {
            tracing::error!(
                shop = %ctx.shop,
                product_id = %outcome.product_id,
                error = %e,
                "import log write failed"
            );
            outcome
                .warnings
                .push(format!("import log: {e}; product will not count toward usage"));
            usage
        }
    };

    Ok(ApiResponse::new(
        req_id.0,
        ImportData {
            asin: priced.product.asin.clone(),
            title: priced.product.title.clone(),
            product: outcome,
            pricing: priced.pricing,
            import_mode: decision,
            usage,
        },
    ))
}

pub(super) async fn list_imported(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ctx: ShopContext,
    Query(query): Query<ImportedQuery>,
) -> Result<Json<ApiResponse<Vec<ImportedItem>>>, ApiError> {
    let rows =
        ambridge_db::list_imported_products(&state.pool, &ctx.shop, normalize_limit(query.limit))
            .await
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| ImportedItem {
            id: row.id,
            shopify_product_id: row.shopify_product_id,
            shopify_handle: row.shopify_handle,
            amazon_url: row.amazon_url,
            asin: row.asin,
            title: row.title,
            price: row.price,
            original_price: row.original_price,
            markup_value: row.markup_value,
            pricing_mode: row.pricing_mode,
            import_mode: row.import_mode,
            main_image: row.main_image,
            variant_count: row.variant_count,
            status: row.status,
            created_at: row.created_at,
        })
        .collect();

    Ok(ApiResponse::new(req_id.0, data))
}
