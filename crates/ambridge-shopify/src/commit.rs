//! Turns a priced canonical product into a live product on the shop.
//!
//! Only `productCreate` failures abort the commit. Everything after the
//! product exists is best-effort: failures are logged and returned as
//! warnings, and nothing is rolled back.

use ambridge_core::{
    link_variant_media, plan_media, CanonicalProduct, ImportMode, MediaPlan, UploadedMedia,
};
use ambridge_scraper::add_affiliate_tag;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::client::AdminClient;
use crate::error::ShopifyError;
use crate::types::{
    join_user_errors, CreateMediaInput, CreatedProduct, MetafieldInput, OptionCreateInput,
    OptionValueInput, ProductCreateInput, VariantCreateInput, VariantNode,
    VariantOptionValueInput, VariantUpdateInput,
};

pub const PRODUCT_VENDOR: &str = "Amazon Import";
pub const PRODUCT_TYPE: &str = "Imported";
pub const METAFIELD_NAMESPACE: &str = "amazon_importer";

const INVENTORY_POLICY: &str = "CONTINUE";
const EMPTY_DESCRIPTION: &str = "<p>No description available</p>";

#[derive(Debug, Clone)]
pub struct CommitRequest<'a> {
    /// Product with import prices already applied.
    pub product: &'a CanonicalProduct,
    pub amazon_url: &'a str,
    pub import_mode: ImportMode,
    pub publish: bool,
    /// Tag appended to the stored Amazon URL; `None` leaves it untouched.
    pub affiliate_tag: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitOutcome {
    pub product_id: String,
    pub handle: String,
    pub status: String,
    pub first_variant_id: Option<String>,
    pub variant_count: usize,
    pub image_count: usize,
    pub warnings: Vec<String>,
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Renders the product body: description paragraph, key features list and
/// specifications table, each only when present.
#[must_use]
pub fn description_html(product: &CanonicalProduct) -> String {
    let mut html = String::new();

    let description = product.description.trim();
    if !description.is_empty() {
        let body = escape_html(description).replace('\n', "<br/>");
        html.push_str(&format!("<p>{body}</p>"));
    }

    if !product.bullet_points.is_empty() {
        html.push_str("<h3>Key Features:</h3><ul>");
        for point in &product.bullet_points {
            html.push_str(&format!("<li>{}</li>", escape_html(point)));
        }
        html.push_str("</ul>");
    }

    if !product.specifications.is_empty() {
        html.push_str("<h3>Specifications:</h3><table>");
        for (key, value) in &product.specifications {
            html.push_str(&format!(
                "<tr><td><strong>{}</strong></td><td>{}</td></tr>",
                escape_html(key),
                escape_html(value)
            ));
        }
        html.push_str("</table>");
    }

    if html.is_empty() {
        EMPTY_DESCRIPTION.to_owned()
    } else {
        html
    }
}

fn format_price(price: Decimal) -> String {
    format!("{:.2}", price.round_dp(2))
}

#[must_use]
pub fn product_input(product: &CanonicalProduct, publish: bool) -> ProductCreateInput {
    ProductCreateInput {
        title: product.title.clone(),
        description_html: description_html(product),
        vendor: PRODUCT_VENDOR.to_owned(),
        product_type: PRODUCT_TYPE.to_owned(),
        tags: vec!["amazon-import".to_owned(), format!("asin:{}", product.asin)],
        status: if publish { "ACTIVE" } else { "DRAFT" }.to_owned(),
        product_options: product
            .options
            .iter()
            .take(ambridge_core::MAX_PRODUCT_OPTIONS)
            .map(|option| OptionCreateInput {
                name: option.name.clone(),
                values: option
                    .values
                    .iter()
                    .map(|v| OptionValueInput { name: v.clone() })
                    .collect(),
            })
            .collect(),
    }
}

#[must_use]
pub fn media_inputs(plan: &MediaPlan) -> Vec<CreateMediaInput> {
    plan.items
        .iter()
        .map(|item| CreateMediaInput {
            media_content_type: "IMAGE",
            alt: item.alt.clone(),
            original_source: item.source_url.clone(),
        })
        .collect()
}

/// One create input per canonical variant, in canonical order.
#[must_use]
pub fn variant_inputs(product: &CanonicalProduct) -> Vec<VariantCreateInput> {
    product
        .variants
        .iter()
        .map(|variant| VariantCreateInput {
            price: format_price(
                variant
                    .price
                    .filter(|p| *p > Decimal::ZERO)
                    .unwrap_or(product.base_price),
            ),
            inventory_policy: INVENTORY_POLICY,
            option_values: product
                .options
                .iter()
                .filter_map(|option| {
                    variant.option(&option.name).map(|value| VariantOptionValueInput {
                        option_name: option.name.clone(),
                        name: value.to_owned(),
                    })
                })
                .collect(),
        })
        .collect()
}

fn uploaded_media(created: &CreatedProduct) -> Vec<UploadedMedia> {
    created
        .media
        .iter()
        .enumerate()
        .filter_map(|(position, node)| {
            node.id.as_ref().map(|id| UploadedMedia {
                id: id.clone(),
                alt: node.alt.clone(),
                position,
            })
        })
        .collect()
}

/// Media assignments for created variants, matched to canonical variants by
/// position.
fn image_updates(
    product: &CanonicalProduct,
    created: &[VariantNode],
    plan: &MediaPlan,
    uploaded: &[UploadedMedia],
) -> Vec<VariantUpdateInput> {
    product
        .variants
        .iter()
        .zip(created)
        .filter_map(|(variant, node)| {
            let matched = link_variant_media(variant, node.color(), plan, uploaded);
            match &matched {
                Some(m) => tracing::debug!(
                    variant = %node.id,
                    asin = %variant.asin,
                    method = ?m.method,
                    "matched variant image"
                ),
                None => tracing::debug!(
                    variant = %node.id,
                    asin = %variant.asin,
                    "no variant image, using product default"
                ),
            }
            matched.map(|m| VariantUpdateInput {
                id: node.id.clone(),
                media_id: Some(m.media_id),
                ..VariantUpdateInput::default()
            })
        })
        .collect()
}

fn metafields(product_id: &str, request: &CommitRequest<'_>) -> Vec<MetafieldInput> {
    let amazon_url = match request.affiliate_tag.filter(|t| !t.trim().is_empty()) {
        Some(tag) => add_affiliate_tag(request.amazon_url, tag),
        None => request.amazon_url.to_owned(),
    };
    vec![
        MetafieldInput {
            owner_id: product_id.to_owned(),
            namespace: METAFIELD_NAMESPACE.to_owned(),
            key: "amazon_url".to_owned(),
            kind: "url".to_owned(),
            value: amazon_url,
        },
        MetafieldInput {
            owner_id: product_id.to_owned(),
            namespace: METAFIELD_NAMESPACE.to_owned(),
            key: "import_mode".to_owned(),
            kind: "single_line_text_field".to_owned(),
            value: request.import_mode.as_str().to_owned(),
        },
    ]
}

fn record_warning(warnings: &mut Vec<String>, product_id: &str, step: &str, message: String) {
    tracing::error!(product_id = %product_id, step, error = %message, "partial product commit");
    warnings.push(format!("{step}: {message}"));
}

/// Creates the product, its variants, variant images and metafields.
///
/// # Errors
///
/// Returns an error only when `productCreate` fails; later failures are
/// reported in [`CommitOutcome::warnings`].
pub async fn commit_product(
    client: &AdminClient,
    request: CommitRequest<'_>,
) -> Result<CommitOutcome, ShopifyError> {
    let product = request.product;
    let plan = plan_media(product);

    let created = client
        .create_product(&product_input(product, request.publish), &media_inputs(&plan))
        .await?;
    tracing::info!(
        shop = %client.shop(),
        product_id = %created.id,
        asin = %product.asin,
        "product created"
    );

    let uploaded = uploaded_media(&created);
    let mut warnings = Vec::new();
    let mut first_variant_id = created.default_variant_id.clone();
    let mut variant_count = 1;

    if product.variants.is_empty() {
        if let Some(id) = &created.default_variant_id {
            let update = VariantUpdateInput {
                id: id.clone(),
                price: Some(format_price(product.base_price)),
                media_id: None,
                inventory_policy: Some(INVENTORY_POLICY),
            };
            match client.update_variants(&created.id, &[update]).await {
                Ok(result) if !result.user_errors.is_empty() => record_warning(
                    &mut warnings,
                    &created.id,
                    "default variant price",
                    join_user_errors(&result.user_errors),
                ),
                Ok(_) => {}
                Err(e) => {
                    record_warning(&mut warnings, &created.id, "default variant price", e.to_string());
                }
            }
        }
    } else {
        match client
            .create_variants(&created.id, &variant_inputs(product))
            .await
        {
            Ok(result) => {
                if !result.user_errors.is_empty() {
                    record_warning(
                        &mut warnings,
                        &created.id,
                        "variants",
                        join_user_errors(&result.user_errors),
                    );
                }
                variant_count = result.variants.len();
                if let Some(first) = result.variants.first() {
                    first_variant_id = Some(first.id.clone());
                }

                let updates = image_updates(product, &result.variants, &plan, &uploaded);
                if !updates.is_empty() {
                    match client.update_variants(&created.id, &updates).await {
                        Ok(r) if !r.user_errors.is_empty() => record_warning(
                            &mut warnings,
                            &created.id,
                            "variant images",
                            join_user_errors(&r.user_errors),
                        ),
                        Ok(_) => {}
                        Err(e) => {
                            record_warning(&mut warnings, &created.id, "variant images", e.to_string());
                        }
                    }
                }
            }
            Err(e) => {
                variant_count = 0;
                record_warning(&mut warnings, &created.id, "variants", e.to_string());
            }
        }
    }

    match client
        .set_metafields(&metafields(&created.id, &request))
        .await
    {
        Ok(errors) if !errors.is_empty() => {
            record_warning(&mut warnings, &created.id, "metafields", join_user_errors(&errors));
        }
        Ok(_) => {}
        Err(e) => record_warning(&mut warnings, &created.id, "metafields", e.to_string()),
    }

    Ok(CommitOutcome {
        product_id: created.id,
        handle: created.handle,
        status: created.status,
        first_variant_id,
        variant_count,
        image_count: uploaded.len(),
        warnings,
    })
}

#[cfg(test)]
#[path = "commit_test.rs"]
mod tests;
