pub mod client;
pub mod error;
pub mod normalize;
pub mod parse;
mod rate_limit;
pub mod types;

pub use client::{AmazonClient, DEFAULT_RAPIDAPI_HOST};
pub use error::ScraperError;
pub use normalize::{normalize_product, normalize_variants};
pub use parse::{add_affiliate_tag, country_from_url, extract_asin, parse_price, parse_price_str};
pub use types::RawProductRecord;
