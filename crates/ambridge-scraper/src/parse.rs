//! Price parsing and Amazon URL helpers.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use rust_decimal::Decimal;
use serde_json::Value;

static THOUSANDS_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\d{3})").expect("valid thousands regex"));

static ASIN_IN_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)/dp/([A-Z0-9]{10})|/gp/product/([A-Z0-9]{10})").expect("valid ASIN regex")
});

/// Marketplace domain to country code. Longer domains come first so that
/// `amazon.com.mx` is not claimed by `amazon.com`.
const MARKETPLACES: &[(&str, &str)] = &[
    ("amazon.com.mx", "MX"),
    ("amazon.com.br", "BR"),
    ("amazon.com.au", "AU"),
    ("amazon.co.uk", "GB"),
    ("amazon.co.jp", "JP"),
    ("amazon.de", "DE"),
    ("amazon.fr", "FR"),
    ("amazon.it", "IT"),
    ("amazon.es", "ES"),
    ("amazon.ca", "CA"),
    ("amazon.in", "IN"),
    ("amazon.com", "US"),
];

/// Parses an upstream price that may be a JSON number, a formatted string,
/// or missing. Never fails; unusable input yields zero.
#[must_use]
pub fn parse_price(raw: Option<&Value>) -> Decimal {
    match raw {
        Some(Value::Number(n)) => parse_price_str(&n.to_string()),
        Some(Value::String(s)) => parse_price_str(s),
        _ => Decimal::ZERO,
    }
}

/// Best-effort price string parsing.
///
/// 1. Drop everything except digits, `.` and `,`.
/// 2. A comma followed by three digits is a thousands separator and is removed.
/// 3. The first remaining comma becomes the decimal point.
/// 4. The longest leading numeric prefix is parsed.
///
/// `"$1,234.56"` gives 1234.56 and `"15,90"` gives 15.90. Mixed European
/// grouping such as `"1.234,56"` parses as 1.234.
#[must_use]
pub fn parse_price_str(raw: &str) -> Decimal {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let ungrouped = THOUSANDS_GROUP.replace_all(&kept, "$1");
    let normalized = ungrouped.replacen(',', ".", 1);

    let mut prefix = String::with_capacity(normalized.len());
    let mut seen_dot = false;
    for c in normalized.chars() {
        match c {
            '0'..='9' => prefix.push(c),
            '.' if !seen_dot => {
                seen_dot = true;
                prefix.push(c);
            }
            _ => break,
        }
    }

    let trimmed = prefix.trim_end_matches('.');
    if trimmed.is_empty() {
        return Decimal::ZERO;
    }
    let candidate = if trimmed.starts_with('.') {
        format!("0{trimmed}")
    } else {
        trimmed.to_owned()
    };
    Decimal::from_str(&candidate).unwrap_or(Decimal::ZERO)
}

/// Extracts the uppercase 10-character ASIN from a `/dp/` or `/gp/product/`
/// URL path.
#[must_use]
pub fn extract_asin(url: &str) -> Option<String> {
    let caps = ASIN_IN_PATH.captures(url)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_ascii_uppercase())
}

/// Marketplace country code for an Amazon URL, defaulting to `US`.
#[must_use]
pub fn country_from_url(url: &str) -> &'static str {
    let lower = url.to_ascii_lowercase();
    MARKETPLACES
        .iter()
        .find(|(domain, _)| lower.contains(domain))
        .map_or("US", |(_, code)| code)
}

/// Sets (or replaces) the `tag` query parameter on an Amazon URL.
#[must_use]
pub fn add_affiliate_tag(url: &str, tag: &str) -> String {
    let tag = tag.trim();
    if tag.is_empty() {
        return url.to_owned();
    }

    let Ok(mut parsed) = Url::parse(url) else {
        let separator = if url.contains('?') { '&' } else { '?' };
        return format!("{url}{separator}tag={tag}");
    };

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != "tag")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("tag", tag);
    parsed.to_string()
}

/// Upper-cases the first character, leaving the rest untouched.
pub(crate) fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
#[path = "parse_test.rs"]
mod tests;
