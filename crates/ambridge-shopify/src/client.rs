//! Admin GraphQL client for a single shop.

use std::time::Duration;

use ambridge_core::AppConfig;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::ShopifyError;
use crate::queries;
use crate::types::{
    join_user_errors, ActiveSubscription, ActiveSubscriptionsData, BulkVariantsPayload,
    BulkVariantsResult, CreateMediaInput, CreatedProduct, CreatedSubscription, GraphQlResponse,
    MetafieldInput, MetafieldsSetData, ProductCreateData, ProductCreateInput,
    SubscriptionCancelData, SubscriptionCreateData, SubscriptionRequest, UserError,
    VariantCreateInput, VariantUpdateInput, VariantsBulkCreateData, VariantsBulkUpdateData,
};

const USER_AGENT: &str = "ambridge/0.1 (admin-api)";
const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";
const SHOP_DOMAIN_SUFFIX: &str = ".myshopify.com";

/// Shared HTTP stack used to build per-shop [`AdminClient`]s.
///
/// Cloning is cheap; the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct AdminConnector {
    http: Client,
    api_version: String,
    base_url: Option<Url>,
}

impl AdminConnector {
    /// # Errors
    ///
    /// Returns [`ShopifyError::Http`] if the `reqwest::Client` cannot be built.
    pub fn new(api_version: &str, timeout_secs: u64) -> Result<Self, ShopifyError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            api_version: api_version.to_owned(),
            base_url: None,
        })
    }

    /// # Errors
    ///
    /// Returns [`ShopifyError::Http`] if the `reqwest::Client` cannot be built.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ShopifyError> {
        Self::new(
            &config.shopify_api_version,
            config.shopify_request_timeout_secs,
        )
    }

    /// Sends every shop's requests to `base_url` instead of the shop domain
    /// (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ShopifyError::Http`] if the `reqwest::Client` cannot be
    /// built, or [`ShopifyError::InvalidShop`] if `base_url` does not parse.
    pub fn with_base_url(
        api_version: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, ShopifyError> {
        let mut connector = Self::new(api_version, timeout_secs)?;
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        connector.base_url = Some(
            Url::parse(&normalised).map_err(|_| ShopifyError::InvalidShop(base_url.to_owned()))?,
        );
        Ok(connector)
    }

    #[must_use]
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Builds a client for one shop's Admin API.
    ///
    /// # Errors
    ///
    /// Returns [`ShopifyError::InvalidShop`] when `shop` is not a
    /// `*.myshopify.com` domain.
    pub fn client_for(&self, shop: &str, access_token: &str) -> Result<AdminClient, ShopifyError> {
        let shop = normalize_shop_domain(shop)?;
        let base = match &self.base_url {
            Some(url) => url.clone(),
            None => Url::parse(&format!("https://{shop}/"))
                .map_err(|_| ShopifyError::InvalidShop(shop.clone()))?,
        };
        let endpoint = base
            .join(&format!("admin/api/{}/graphql.json", self.api_version))
            .map_err(|_| ShopifyError::InvalidShop(shop.clone()))?;

        Ok(AdminClient {
            http: self.http.clone(),
            endpoint,
            access_token: access_token.to_owned(),
            shop,
        })
    }
}

/// Lowercases and validates a shop domain.
///
/// # Errors
///
/// Returns [`ShopifyError::InvalidShop`] for anything other than a bare
/// `<name>.myshopify.com` host.
pub fn normalize_shop_domain(shop: &str) -> Result<String, ShopifyError> {
    let shop = shop.trim().to_ascii_lowercase();
    let name = shop.strip_suffix(SHOP_DOMAIN_SUFFIX).unwrap_or_default();
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(shop)
    } else {
        Err(ShopifyError::InvalidShop(shop))
    }
}

/// Admin GraphQL client bound to one shop and access token.
#[derive(Debug, Clone)]
pub struct AdminClient {
    http: Client,
    endpoint: Url,
    access_token: String,
    shop: String,
}

impl AdminClient {
    #[must_use]
    pub fn shop(&self) -> &str {
        &self.shop
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        variables: Value,
    ) -> Result<T, ShopifyError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ShopifyError::UnexpectedStatus {
                status: status.as_u16(),
                operation: operation.to_owned(),
            });
        }

        let body = response.text().await?;
        let envelope: GraphQlResponse<T> =
            serde_json::from_str(&body).map_err(|e| ShopifyError::Deserialize {
                context: operation.to_owned(),
                source: e,
            })?;

        if !envelope.errors.is_empty() {
            let message = envelope
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ShopifyError::GraphQl {
                operation: operation.to_owned(),
                message,
            });
        }

        envelope.data.ok_or_else(|| ShopifyError::MissingField {
            operation: operation.to_owned(),
            field: "data".to_owned(),
        })
    }

    /// Creates a product with its options and media.
    ///
    /// # Errors
    ///
    /// Any user error is fatal and returned as [`ShopifyError::UserErrors`].
    pub async fn create_product(
        &self,
        product: &ProductCreateInput,
        media: &[CreateMediaInput],
    ) -> Result<CreatedProduct, ShopifyError> {
        let data: ProductCreateData = self
            .execute(
                "productCreate",
                queries::PRODUCT_CREATE,
                json!({ "product": product, "media": media }),
            )
            .await?;
        let payload = data.product_create;

        if !payload.user_errors.is_empty() {
            return Err(user_errors("productCreate", &payload.user_errors));
        }
        payload
            .product
            .map(CreatedProduct::from)
            .ok_or_else(|| ShopifyError::MissingField {
                operation: "productCreate".to_owned(),
                field: "product".to_owned(),
            })
    }

    /// Creates variants, replacing the standalone default variant.
    ///
    /// # Errors
    ///
    /// Transport and GraphQL failures only; user errors are returned in the
    /// result for the caller to report.
    pub async fn create_variants(
        &self,
        product_id: &str,
        variants: &[VariantCreateInput],
    ) -> Result<BulkVariantsResult, ShopifyError> {
        let data: VariantsBulkCreateData = self
            .execute(
                "productVariantsBulkCreate",
                queries::VARIANTS_BULK_CREATE,
                json!({
                    "productId": product_id,
                    "variants": variants,
                    "strategy": "REMOVE_STANDALONE_VARIANT",
                }),
            )
            .await?;
        Ok(bulk_result(data.product_variants_bulk_create))
    }

    /// # Errors
    ///
    /// Transport and GraphQL failures only; user errors are returned in the
    /// result.
    pub async fn update_variants(
        &self,
        product_id: &str,
        variants: &[VariantUpdateInput],
    ) -> Result<BulkVariantsResult, ShopifyError> {
        let data: VariantsBulkUpdateData = self
            .execute(
                "productVariantsBulkUpdate",
                queries::VARIANTS_BULK_UPDATE,
                json!({ "productId": product_id, "variants": variants }),
            )
            .await?;
        Ok(bulk_result(data.product_variants_bulk_update))
    }

    /// # Errors
    ///
    /// Transport and GraphQL failures only; user errors are returned.
    pub async fn set_metafields(
        &self,
        metafields: &[MetafieldInput],
    ) -> Result<Vec<UserError>, ShopifyError> {
        let data: MetafieldsSetData = self
            .execute(
                "metafieldsSet",
                queries::METAFIELDS_SET,
                json!({ "metafields": metafields }),
            )
            .await?;
        Ok(data.metafields_set.user_errors)
    }

    /// Requests a recurring app subscription the merchant must confirm.
    ///
    /// # Errors
    ///
    /// [`ShopifyError::UserErrors`] with the joined messages when the
    /// platform rejects the request.
    pub async fn create_subscription(
        &self,
        request: &SubscriptionRequest,
    ) -> Result<CreatedSubscription, ShopifyError> {
        let operation = "appSubscriptionCreate";
        let data: SubscriptionCreateData = self
            .execute(
                operation,
                queries::APP_SUBSCRIPTION_CREATE,
                json!({
                    "name": request.name,
                    "returnUrl": request.return_url,
                    "test": request.test,
                    "lineItems": [{
                        "plan": {
                            "appRecurringPricingDetails": {
                                "price": {
                                    "amount": request.price.to_string(),
                                    "currencyCode": request.currency_code,
                                },
                                "interval": request.interval,
                            }
                        }
                    }],
                }),
            )
            .await?;
        let payload = data.app_subscription_create;

        if !payload.user_errors.is_empty() {
            return Err(user_errors(operation, &payload.user_errors));
        }

        let id = payload
            .app_subscription
            .map(|s| s.id)
            .ok_or_else(|| missing(operation, "appSubscription"))?;
        let confirmation_url = payload
            .confirmation_url
            .ok_or_else(|| missing(operation, "confirmationUrl"))?;

        Ok(CreatedSubscription {
            id,
            confirmation_url,
        })
    }

    /// # Errors
    ///
    /// [`ShopifyError::UserErrors`] when the platform rejects the cancel.
    pub async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), ShopifyError> {
        let data: SubscriptionCancelData = self
            .execute(
                "appSubscriptionCancel",
                queries::APP_SUBSCRIPTION_CANCEL,
                json!({ "id": subscription_id }),
            )
            .await?;
        let errors = data.app_subscription_cancel.user_errors;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(user_errors("appSubscriptionCancel", &errors))
        }
    }

    /// # Errors
    ///
    /// Transport, status, or GraphQL failures.
    pub async fn active_subscriptions(&self) -> Result<Vec<ActiveSubscription>, ShopifyError> {
        let data: ActiveSubscriptionsData = self
            .execute(
                "activeSubscriptions",
                queries::ACTIVE_SUBSCRIPTIONS,
                json!({}),
            )
            .await?;
        Ok(data.app.installation.active_subscriptions)
    }
}

fn bulk_result(payload: BulkVariantsPayload) -> BulkVariantsResult {
    BulkVariantsResult {
        variants: payload.product_variants.unwrap_or_default(),
        user_errors: payload.user_errors,
    }
}

fn user_errors(operation: &str, errors: &[UserError]) -> ShopifyError {
    ShopifyError::UserErrors {
        operation: operation.to_owned(),
        messages: join_user_errors(errors),
    }
}

fn missing(operation: &str, field: &str) -> ShopifyError {
    ShopifyError::MissingField {
        operation: operation.to_owned(),
        field: field.to_owned(),
    }
}
