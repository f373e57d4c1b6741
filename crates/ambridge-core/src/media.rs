//! Image selection for product creation and per-variant image assignment.
//!
//! [`plan_media`] picks which images are uploaded with the product.
//! [`link_variant_media`] assigns one of the uploaded media to each created
//! variant:
//!
//! 1. the variant's own image file name appears in an uploaded media's alt text;
//! 2. else the variant's color maps to an uploaded media through the
//!    variant image index;
//! 3. else the variant gets no image and shows the product default.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::products::{CanonicalProduct, ProductVariant};

/// Platform ceiling on media uploaded with a single product.
pub const MAX_PRODUCT_MEDIA: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedMedia {
    pub source_url: String,
    pub alt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MediaPlan {
    pub items: Vec<PlannedMedia>,
    /// Color value to position in `items`.
    pub color_index: BTreeMap<String, usize>,
}

impl MediaPlan {
    fn position(&self, url: &str) -> Option<usize> {
        self.items.iter().position(|m| m.source_url == url)
    }

    fn push(&mut self, source_url: &str, alt: String) -> bool {
        if self.items.len() >= MAX_PRODUCT_MEDIA || self.position(source_url).is_some() {
            return false;
        }
        self.items.push(PlannedMedia {
            source_url: source_url.to_owned(),
            alt,
        });
        true
    }
}

/// A media record returned by the platform after upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    pub id: String,
    pub alt: Option<String>,
    /// Index of the [`PlannedMedia`] this record was uploaded from.
    pub position: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaMatchMethod {
    ImageFilename,
    ColorName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaMatch {
    pub media_id: String,
    pub method: MediaMatchMethod,
}

/// Last path segment of `url` without query or fragment.
fn file_name(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().filter(|name| !name.is_empty())
}

fn variant_alt(title: &str, variant: &ProductVariant, url: &str) -> String {
    let labels: Vec<&str> = ["color", "colour", "size", "style"]
        .iter()
        .filter_map(|name| variant.option(name))
        .collect();

    let mut alt = if labels.is_empty() {
        title.to_owned()
    } else {
        format!("{title} - {}", labels.join(" - "))
    };
    if let Some(name) = file_name(url) {
        alt.push_str(" (");
        alt.push_str(name);
        alt.push(')');
    }
    alt
}

/// Chooses up to [`MAX_PRODUCT_MEDIA`] distinct images.
///
/// Variant images come first, then color-index images, then the gallery.
/// Duplicate URLs are skipped and anything past the cap is dropped.
#[must_use]
pub fn plan_media(product: &CanonicalProduct) -> MediaPlan {
    let mut plan = MediaPlan::default();

    for variant in &product.variants {
        if let Some(url) = variant.image.as_deref() {
            plan.push(url, variant_alt(&product.title, variant, url));
        }
    }

    for (color, url) in &product.variant_image_index {
        let mut alt = format!("{} - {color}", product.title);
        if let Some(name) = file_name(url) {
            alt = format!("{alt} ({name})");
        }
        plan.push(url, alt);
    }

    for url in &product.images {
        plan.push(url, product.title.clone());
    }

    for (color, url) in &product.variant_image_index {
        if let Some(idx) = plan.position(url) {
            plan.color_index.insert(color.clone(), idx);
        }
    }
    for variant in &product.variants {
        if let (Some(color), Some(url)) = (variant.color(), variant.image.as_deref()) {
            if let Some(idx) = plan.position(url) {
                plan.color_index.entry(color.to_owned()).or_insert(idx);
            }
        }
    }

    plan
}

/// Picks the uploaded media for one created variant.
///
/// `selected_color` is the `Color`/`Colour` value the platform reports for
/// the created variant; when absent the canonical variant's color is used.
#[must_use]
pub fn link_variant_media(
    variant: &ProductVariant,
    selected_color: Option<&str>,
    plan: &MediaPlan,
    uploaded: &[UploadedMedia],
) -> Option<MediaMatch> {
    if let Some(name) = variant.image.as_deref().and_then(file_name) {
        let hit = uploaded
            .iter()
            .find(|m| m.alt.as_deref().is_some_and(|alt| alt.contains(name)));
        if let Some(media) = hit {
            return Some(MediaMatch {
                media_id: media.id.clone(),
                method: MediaMatchMethod::ImageFilename,
            });
        }
    }

    let color = selected_color.or_else(|| variant.color())?;
    let idx = *plan.color_index.get(color)?;
    uploaded.iter().find(|m| m.position == idx).map(|media| MediaMatch {
        media_id: media.id.clone(),
        method: MediaMatchMethod::ColorName,
    })
}

#[cfg(test)]
#[path = "media_test.rs"]
mod tests;
