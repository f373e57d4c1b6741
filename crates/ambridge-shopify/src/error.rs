use thiserror::Error;

/// Errors returned by the Shopify Admin GraphQL client.
#[derive(Debug, Error)]
pub enum ShopifyError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected HTTP status {status} from Shopify {operation}")]
    UnexpectedStatus { status: u16, operation: String },

    /// Top-level GraphQL `errors` (query or auth problems).
    #[error("Shopify {operation} failed: {message}")]
    GraphQl { operation: String, message: String },

    /// Field-level `userErrors`, joined with `", "`.
    #[error("{operation} rejected: {messages}")]
    UserErrors { operation: String, messages: String },

    #[error("Shopify {operation} response missing {field}")]
    MissingField { operation: String, field: String },

    #[error("invalid shop domain \"{0}\"")]
    InvalidShop(String),
}
