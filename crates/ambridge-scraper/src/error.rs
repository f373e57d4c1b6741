use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("invalid Amazon URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("RapidAPI key is required. Set RAPIDAPI_KEY in the environment.")]
    MissingApiKey,

    #[error("product API error: {0}")]
    Api(String),

    #[error(
        "Product {asin} not found. This could mean: 1) the ASIN doesn't exist or is no longer \
         available on Amazon, 2) the RapidAPI key has reached its request limit, or 3) the \
         product is restricted in {country}. Check the RapidAPI dashboard and verify the \
         subscription status."
    )]
    EmptyProduct { asin: String, country: String },

    #[error(
        "Incomplete product data received for {asin}: missing {missing}. The product may not be \
         available for sale or may be restricted. Try a different product URL."
    )]
    IncompleteProduct { asin: String, missing: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rate limited by product API (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
}

impl ScraperError {
    /// Stable code surfaced to API callers.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            ScraperError::InvalidUrl { .. } => "INVALID_URL",
            ScraperError::MissingApiKey => "API_KEY_MISSING",
            ScraperError::Api(_)
            | ScraperError::EmptyProduct { .. }
            | ScraperError::IncompleteProduct { .. }
            | ScraperError::RateLimited { .. }
            | ScraperError::UnexpectedStatus { .. } => "API_ERROR",
            ScraperError::Deserialize { .. } => "PARSE_ERROR",
            ScraperError::Http(_) => "NETWORK_ERROR",
        }
    }

    /// Whether the failure was caused by the caller's input rather than
    /// the upstream service.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(self, ScraperError::InvalidUrl { .. })
    }
}
