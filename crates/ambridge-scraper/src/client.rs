//! HTTP client for the real-time Amazon data API on `RapidAPI`.

use std::time::Duration;

use ambridge_core::{AppConfig, CanonicalProduct};
use reqwest::{Client, Url};

use crate::error::ScraperError;
use crate::normalize::{normalize_product, record_price, record_title};
use crate::parse::{country_from_url, extract_asin};
use crate::rate_limit::retry_with_backoff;
use crate::types::{ProductDetailsEnvelope, RawProductRecord};

pub const DEFAULT_RAPIDAPI_HOST: &str = "real-time-amazon-data.p.rapidapi.com";

const USER_AGENT: &str = "ambridge/0.1 (product-import)";

/// Client for the `product-details` endpoint.
///
/// Use [`AmazonClient::new`] for production or [`AmazonClient::with_base_url`]
/// to point at a mock server in tests. A missing API key is not an error
/// until a fetch is attempted.
pub struct AmazonClient {
    client: Client,
    api_key: Option<String>,
    host: String,
    base_url: Url,
    max_retries: u32,
    backoff_base_secs: u64,
}

impl AmazonClient {
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        api_key: Option<&str>,
        host: &str,
        timeout_secs: u64,
        max_retries: u32,
        backoff_base_secs: u64,
    ) -> Result<Self, ScraperError> {
        let base_url = format!("https://{host}/");
        Self::with_base_url(
            api_key,
            host,
            timeout_secs,
            max_retries,
            backoff_base_secs,
            &base_url,
        )
    }

    /// Builds a client from the application config.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ScraperError> {
        Self::new(
            config.rapidapi_key.as_deref(),
            &config.rapidapi_host,
            config.scraper_request_timeout_secs,
            config.scraper_max_retries,
            config.scraper_retry_backoff_base_secs,
        )
    }

    /// Creates a client against a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the `reqwest::Client` cannot be
    /// constructed, or [`ScraperError::Api`] if `base_url` is not a valid URL.
    pub fn with_base_url(
        api_key: Option<&str>,
        host: &str,
        timeout_secs: u64,
        max_retries: u32,
        backoff_base_secs: u64,
        base_url: &str,
    ) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()?;

        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised)
            .map_err(|e| ScraperError::Api(format!("invalid base URL '{base_url}': {e}")))?;

        Ok(Self {
            client,
            api_key: api_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_owned),
            host: host.to_owned(),
            base_url,
            max_retries,
            backoff_base_secs,
        })
    }

    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn product_details_url(&self, asin: &str, country: &str) -> Result<Url, ScraperError> {
        let mut url = self
            .base_url
            .join("product-details")
            .map_err(|e| ScraperError::Api(format!("invalid product-details URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("asin", asin)
            .append_pair("country", country);
        Ok(url)
    }

    /// Fetches one raw product record, retrying transient failures.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::MissingApiKey`] when no key is configured.
    /// - [`ScraperError::Api`] when the envelope status is not `OK`.
    /// - [`ScraperError::EmptyProduct`] when the envelope carries no data.
    /// - [`ScraperError::RateLimited`], [`ScraperError::UnexpectedStatus`]
    ///   or [`ScraperError::Http`] after retries are exhausted.
    /// - [`ScraperError::Deserialize`] when the body is not JSON.
    pub async fn fetch_product_details(
        &self,
        asin: &str,
        country: &str,
    ) -> Result<RawProductRecord, ScraperError> {
        let api_key = self.api_key.as_deref().ok_or(ScraperError::MissingApiKey)?;
        let url = self.product_details_url(asin, country)?;

        retry_with_backoff(self.max_retries, self.backoff_base_secs, || {
            let url = url.clone();
            async move {
                let response = self
                    .client
                    .get(url.clone())
                    .header("X-RapidAPI-Key", api_key)
                    .header("X-RapidAPI-Host", &self.host)
                    .send()
                    .await?;
                let status = response.status();

                if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    let retry_after_secs = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(60);
                    return Err(ScraperError::RateLimited { retry_after_secs });
                }

                if !status.is_success() {
                    return Err(ScraperError::UnexpectedStatus {
                        status: status.as_u16(),
                        url: url.to_string(),
                    });
                }

                let body = response.text().await?;
                let envelope: ProductDetailsEnvelope =
                    serde_json::from_str(&body).map_err(|e| ScraperError::Deserialize {
                        context: format!("product-details(asin={asin}, country={country})"),
                        source: e,
                    })?;

                if envelope.status != "OK" {
                    return Err(ScraperError::Api(envelope.message.unwrap_or_else(|| {
                        "Failed to fetch product data from Amazon".to_owned()
                    })));
                }

                RawProductRecord::from_value(envelope.data).ok_or_else(|| {
                    ScraperError::EmptyProduct {
                        asin: asin.to_owned(),
                        country: country.to_owned(),
                    }
                })
            }
        })
        .await
    }

    /// Validates an Amazon URL, fetches its product and normalizes it.
    ///
    /// When the record names a different parent ASIN, the parent is fetched
    /// for the full variation table. A failed or incomplete parent fetch
    /// falls back to the child record.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::InvalidUrl`] when the URL is not an Amazon product URL.
    /// - [`ScraperError::IncompleteProduct`] when the child record lacks a
    ///   title or a positive price.
    /// - Any error from [`AmazonClient::fetch_product_details`] for the child.
    pub async fn scrape_url(&self, url: &str) -> Result<CanonicalProduct, ScraperError> {
        if !url.to_ascii_lowercase().contains("amazon.") {
            return Err(ScraperError::InvalidUrl {
                url: url.to_owned(),
                reason: "not an Amazon URL".to_owned(),
            });
        }
        let asin = extract_asin(url).ok_or_else(|| ScraperError::InvalidUrl {
            url: url.to_owned(),
            reason: "could not extract ASIN from URL".to_owned(),
        })?;
        let country = country_from_url(url);

        let child = self.fetch_product_details(&asin, country).await?;
        ensure_complete(&child, &asin)?;

        let parent_asin = child
            .parent_asin()
            .filter(|p| !p.eq_ignore_ascii_case(&asin))
            .map(str::to_owned);

        let source = match parent_asin {
            Some(parent) => {
                tracing::info!(asin = %asin, parent = %parent, "fetching parent listing for variations");
                match self.fetch_product_details(&parent, country).await {
                    Ok(record) if ensure_complete(&record, &parent).is_ok() => record,
                    Ok(_) => {
                        tracing::warn!(asin = %asin, parent = %parent, "parent listing incomplete, using child data");
                        child
                    }
                    Err(e) => {
                        tracing::warn!(asin = %asin, parent = %parent, error = %e, "parent fetch failed, using child data");
                        child
                    }
                }
            }
            None => child,
        };

        let product = normalize_product(&source, &asin);
        tracing::debug!(
            asin = %product.asin,
            options = product.options.len(),
            variants = product.variants.len(),
            images = product.images.len(),
            "normalized product"
        );
        Ok(product)
    }
}

fn ensure_complete(record: &RawProductRecord, asin: &str) -> Result<(), ScraperError> {
    let has_title = record_title(record).is_some();
    let has_price = record_price(record) > rust_decimal::Decimal::ZERO;
    let missing = match (has_title, has_price) {
        (true, true) => return Ok(()),
        (false, true) => "title",
        (true, false) => "price",
        (false, false) => "title and price",
    };
    Err(ScraperError::IncompleteProduct {
        asin: asin.to_owned(),
        missing: missing.to_owned(),
    })
}
