//! Admin GraphQL request inputs and response payloads.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlErrorMessage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlErrorMessage {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserError {
    #[serde(default)]
    pub field: Option<Vec<String>>,
    pub message: String,
}

/// Joins user-error messages the way they are shown to merchants.
#[must_use]
pub fn join_user_errors(errors: &[UserError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Product inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCreateInput {
    pub title: String,
    pub description_html: String,
    pub vendor: String,
    pub product_type: String,
    pub tags: Vec<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub product_options: Vec<OptionCreateInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionCreateInput {
    pub name: String,
    pub values: Vec<OptionValueInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionValueInput {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMediaInput {
    pub media_content_type: &'static str,
    pub alt: String,
    pub original_source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantCreateInput {
    pub price: String,
    pub inventory_policy: &'static str,
    pub option_values: Vec<VariantOptionValueInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantOptionValueInput {
    pub option_name: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantUpdateInput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory_policy: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetafieldInput {
    pub owner_id: String,
    pub namespace: String,
    pub key: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Product payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SelectedOption {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantNode {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub selected_options: Vec<SelectedOption>,
}

impl VariantNode {
    /// Value of the `Color`/`Colour` selected option.
    #[must_use]
    pub fn color(&self) -> Option<&str> {
        self.selected_options
            .iter()
            .find(|o| o.name == "Color" || o.name == "Colour")
            .map(|o| o.value.as_str())
    }
}

/// A media node; non-image media come back as empty objects.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MediaNode {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub alt: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Edge<T> {
    pub node: T,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Edges<T> {
    #[serde(default = "Vec::new")]
    pub edges: Vec<Edge<T>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Nodes<T> {
    #[serde(default = "Vec::new")]
    pub nodes: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ProductNode {
    pub id: String,
    pub title: String,
    pub handle: String,
    pub status: String,
    pub variants: Edges<VariantNode>,
    pub media: Nodes<MediaNode>,
}

/// A product returned by `productCreate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedProduct {
    pub id: String,
    pub title: String,
    pub handle: String,
    pub status: String,
    pub default_variant_id: Option<String>,
    pub media: Vec<MediaNode>,
}

impl From<ProductNode> for CreatedProduct {
    fn from(node: ProductNode) -> Self {
        Self {
            id: node.id,
            title: node.title,
            handle: node.handle,
            status: node.status,
            default_variant_id: node.variants.edges.into_iter().next().map(|e| e.node.id),
            media: node.media.nodes,
        }
    }
}

/// Variants plus non-fatal user errors from a bulk variant mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkVariantsResult {
    pub variants: Vec<VariantNode>,
    pub user_errors: Vec<UserError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProductCreateData {
    pub product_create: ProductCreatePayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProductCreatePayload {
    pub product: Option<ProductNode>,
    #[serde(default)]
    pub user_errors: Vec<UserError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BulkVariantsPayload {
    #[serde(default)]
    pub product_variants: Option<Vec<VariantNode>>,
    #[serde(default)]
    pub user_errors: Vec<UserError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VariantsBulkCreateData {
    pub product_variants_bulk_create: BulkVariantsPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VariantsBulkUpdateData {
    pub product_variants_bulk_update: BulkVariantsPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MetafieldsSetData {
    pub metafields_set: UserErrorsPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserErrorsPayload {
    #[serde(default)]
    pub user_errors: Vec<UserError>,
}

// ---------------------------------------------------------------------------
// Billing
// ---------------------------------------------------------------------------

/// Request for a recurring app subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub name: String,
    pub price: Decimal,
    pub currency_code: String,
    pub interval: String,
    pub return_url: String,
    /// Test charges are never billed; set outside production.
    pub test: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSubscription {
    pub id: String,
    pub confirmation_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubscriptionCreateData {
    pub app_subscription_create: SubscriptionCreatePayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubscriptionCreatePayload {
    pub app_subscription: Option<SubscriptionNode>,
    pub confirmation_url: Option<String>,
    #[serde(default)]
    pub user_errors: Vec<UserError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionNode {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubscriptionCancelData {
    pub app_subscription_cancel: UserErrorsPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Money {
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    #[serde(rename = "currencyCode", default)]
    pub currency_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PricingDetails {
    #[serde(default)]
    pub price: Option<Money>,
    #[serde(default)]
    pub interval: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemPlan {
    #[serde(default)]
    pub pricing_details: Option<PricingDetails>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub plan: Option<LineItemPlan>,
}

/// An active app subscription as reported by the billing platform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSubscription {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub current_period_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

impl ActiveSubscription {
    /// Recurring price of the first line item.
    #[must_use]
    pub fn amount(&self) -> Option<Decimal> {
        self.line_items
            .first()?
            .plan
            .as_ref()?
            .pricing_details
            .as_ref()?
            .price
            .as_ref()
            .map(|m| m.amount)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActiveSubscriptionsData {
    pub app: AppNode,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AppNode {
    pub installation: InstallationNode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InstallationNode {
    #[serde(default)]
    pub active_subscriptions: Vec<ActiveSubscription>,
}
