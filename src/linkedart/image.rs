//! The image discovery chain (object → visual item → digital object →
//! IIIF info.json).
//!
//! Every hop is cached under the image TTL class. A missing link anywhere
//! yields `None`; upstream failures on this optional path degrade the
//! result instead of failing the whole call.

use super::http::{CacheClass, Fetcher};
use super::json::{get, list, ref_id};
use super::parser::shows_uri;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;

/// Structured IIIF image descriptor with derived URL templates.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub iiif_id: String,
    pub iiif_info_url: String,
    pub thumbnail_url: String,
    pub full_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
}

fn iiif_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"iiif\.micr\.io/([^/]+)").expect("static pattern"))
}

/// Extract the IIIF identifier from a raw access-point URL.
pub fn extract_iiif_id(url: &str) -> Option<&str> {
    iiif_id_pattern()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Walk the 4-hop image chain for an already-fetched object document.
pub async fn image_info(fetcher: &Fetcher, object_doc: &Value) -> Option<ImageInfo> {
    let visual_item_uri = shows_uri(object_doc)?;
    let visual_item = fetch_optional(fetcher, &visual_item_uri).await?;

    let digital_uri = list(&visual_item, "digitally_shown_by")
        .first()
        .and_then(|d| ref_id(d))
        .map(str::to_string)?;
    let digital = fetch_optional(fetcher, &digital_uri).await?;

    let access_point = list(&digital, "access_point")
        .first()
        .and_then(|a| ref_id(a))
        .map(str::to_string)?;

    let iiif_id = extract_iiif_id(&access_point)?.to_string();
    let iiif_info_url = format!("https://iiif.micr.io/{iiif_id}/info.json");

    // Dimensions come from info.json; the descriptor is still useful when
    // that last fetch fails.
    let info = fetch_optional(fetcher, &iiif_info_url).await;
    let width = info
        .as_ref()
        .and_then(|i| get(i, "width"))
        .and_then(Value::as_u64);
    let height = info
        .as_ref()
        .and_then(|i| get(i, "height"))
        .and_then(Value::as_u64);

    Some(ImageInfo {
        thumbnail_url: format!("https://iiif.micr.io/{iiif_id}/full/!400,400/0/default.jpg"),
        full_url: format!("https://iiif.micr.io/{iiif_id}/full/max/0/default.jpg"),
        iiif_id,
        iiif_info_url,
        width,
        height,
    })
}

async fn fetch_optional(fetcher: &Fetcher, uri: &str) -> Option<std::sync::Arc<Value>> {
    match fetcher.fetch_json(uri, CacheClass::Image).await {
        Ok(doc) => Some(doc),
        Err(e) => {
            tracing::debug!(target: "linkedart", "image chain hop failed for {uri}: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iiif_id_extraction() {
        assert_eq!(
            extract_iiif_id("https://iiif.micr.io/QaBcD/full/max/0/default.jpg"),
            Some("QaBcD")
        );
        assert_eq!(extract_iiif_id("https://iiif.micr.io/xyz"), Some("xyz"));
        assert_eq!(extract_iiif_id("https://images.example.org/a.jpg"), None);
    }
}
