//! Linked Art resolver and parser (C3).
//!
//! Resolves external JSON-LD records over HTTP, walks related graph nodes
//! (vocabulary terms, visual items, the image chain, publications) in
//! bounded parallel through the response cache, and surfaces a stable
//! domain object. Parsing itself is deterministic and lives in
//! [`parser`]; this module owns orchestration and the collection search.

pub mod bibliography;
pub mod http;
pub mod image;
pub mod json;
pub mod parser;
pub mod terms;

use crate::config::{ApiConfig, HttpConfig};
use crate::error::{RetrievalError, RetrievalResult};
use bibliography::BibliographyEntry;
use http::{CacheClass, Fetcher};
use image::ImageInfo;
use json::{aat, get, id_of, list, ref_id};
use parser::{Narrative, RelatedObject, TitleEntry};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use terms::{ProductionPart, VocabTerm, label_for};

/// Filter fields the upstream collection search accepts.
#[derive(Debug, Clone, Default)]
pub struct ApiSearchParams {
    /// Free-text query, mapped to the title filter.
    pub query: Option<String>,
    /// Explicit title filter; wins over `query`.
    pub title: Option<String>,
    pub creator: Option<String>,
    pub object_number: Option<String>,
    pub object_type: Option<String>,
    pub material: Option<String>,
    pub technique: Option<String>,
    pub creation_date: Option<String>,
    pub description: Option<String>,
    pub image_available: Option<bool>,
    pub page_token: Option<String>,
}

impl ApiSearchParams {
    /// Whether any filter field is present. A bare page token does not
    /// count: continuation is only meaningful for an already-filtered query.
    pub fn has_filters(&self) -> bool {
        self.query.is_some()
            || self.title.is_some()
            || self.creator.is_some()
            || self.object_number.is_some()
            || self.object_type.is_some()
            || self.material.is_some()
            || self.technique.is_some()
            || self.creation_date.is_some()
            || self.description.is_some()
            || self.image_available.is_some()
    }

    fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        let title = self.title.as_ref().or(self.query.as_ref());
        let mut push = |key: &'static str, value: Option<&String>| {
            if let Some(value) = value {
                query.push((key, value.clone()));
            }
        };
        push("title", title);
        push("creator", self.creator.as_ref());
        push("objectNumber", self.object_number.as_ref());
        push("type", self.object_type.as_ref());
        push("material", self.material.as_ref());
        push("technique", self.technique.as_ref());
        push("creationDate", self.creation_date.as_ref());
        push("description", self.description.as_ref());
        if let Some(image_available) = self.image_available {
            query.push(("imageAvailable", image_available.to_string()));
        }
        query
    }
}

/// One page of upstream search results.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSearchPage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Object URIs in page order.
    pub uris: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// A structured dimension with its resolved type label.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimension {
    pub value: f64,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub dimension_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// The enriched artwork record surfaced to callers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtworkDetail {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_number: Option<String>,
    pub title: String,
    pub titles: Vec<TitleEntry>,
    pub creator: String,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inscriptions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material_statement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension_statement: Option<String>,
    pub dimensions: Vec<Dimension>,
    pub object_types: Vec<String>,
    pub materials: Vec<String>,
    pub production: Vec<ProductionPart>,
    pub collections: Vec<String>,
    pub subjects: Vec<VocabTerm>,
    pub narratives: Vec<Narrative>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_page: Option<String>,
    pub related_objects: Vec<RelatedObject>,
    pub bibliography_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageInfo>,
}

/// Bibliography operation result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BibliographyOutcome {
    pub object_number: Option<String>,
    pub total: usize,
    pub entries: Vec<BibliographyEntry>,
}

pub struct LinkedArtClient {
    fetcher: Arc<Fetcher>,
    search_url: String,
    resolve_concurrency: usize,
}

impl LinkedArtClient {
    pub fn new(fetcher: Arc<Fetcher>, api: &ApiConfig, http: &HttpConfig) -> Self {
        Self {
            fetcher,
            search_url: format!(
                "{}{}",
                api.base_url.trim_end_matches('/'),
                api.search_path
            ),
            resolve_concurrency: http.resolve_concurrency,
        }
    }

    pub fn fetcher(&self) -> &Arc<Fetcher> {
        &self.fetcher
    }

    /// Collection search. Rejected outright when no filter is present: the
    /// upstream API would answer with the entire ~837K-item collection.
    pub async fn search(&self, params: &ApiSearchParams) -> RetrievalResult<ApiSearchPage> {
        if !params.has_filters() {
            return Err(RetrievalError::validation(
                "collection search requires at least one filter: \
                 title|creator|type|material|technique|creationDate|description",
            ));
        }
        let page = if let Some(token) = params.page_token.as_deref() {
            // Tokens are the opaque `next` URI of the previous page.
            self.fetcher.fetch_json_query(token, &[]).await?
        } else {
            let query = params.to_query();
            let query_refs: Vec<(&str, &str)> =
                query.iter().map(|(k, v)| (*k, v.as_str())).collect();
            self.fetcher
                .fetch_json_query(&self.search_url, &query_refs)
                .await?
        };
        Ok(parse_search_page(&page))
    }

    /// Resolve an object number to its LOD URI through the search endpoint.
    pub async fn resolve_object_uri(&self, object_number: &str) -> RetrievalResult<String> {
        let page = self
            .search(&ApiSearchParams {
                object_number: Some(object_number.to_string()),
                ..Default::default()
            })
            .await?;
        page.uris
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::not_found("artwork", object_number))
    }

    /// Full detail record for a LOD URI.
    pub async fn detail(&self, uri: &str) -> RetrievalResult<ArtworkDetail> {
        let doc = self.fetcher.fetch_json(uri, CacheClass::Object).await?;

        // Subjects hang off the visual item; fetch it before the term batch
        // so its URIs resolve in the same pass.
        let subject_uris = match parser::shows_uri(&doc) {
            Some(visual_uri) => match self.fetcher.fetch_json(&visual_uri, CacheClass::Image).await
            {
                Ok(visual) => parser::visual_item_subject_uris(&visual),
                Err(e) => {
                    tracing::debug!(target: "linkedart", "visual item fetch failed: {e}");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let production_raw = parser::production_parts(&doc);
        let raw_dimensions = parser::dimensions(&doc);

        let mut wanted: Vec<String> = Vec::new();
        wanted.extend(parser::object_type_uris(&doc));
        wanted.extend(parser::material_uris(&doc));
        wanted.extend(parser::member_of_uris(&doc));
        wanted.extend(subject_uris.iter().cloned());
        wanted.extend(raw_dimensions.iter().filter_map(|d| d.type_uri.clone()));
        for part in &production_raw {
            wanted.extend(part.actor_uri.iter().cloned());
            wanted.extend(part.technique_uris.iter().cloned());
            wanted.extend(part.place_uris.iter().cloned());
        }
        let resolved = terms::resolve_terms(&self.fetcher, wanted, self.resolve_concurrency).await;

        let subjects = subject_uris
            .iter()
            .map(|uri| {
                resolved.get(uri).cloned().unwrap_or_else(|| VocabTerm {
                    uri: uri.clone(),
                    label: json::uri_tail(uri).to_string(),
                    equivalents: Default::default(),
                })
            })
            .collect();

        Ok(ArtworkDetail {
            uri: uri.to_string(),
            object_number: parser::object_number(&doc),
            title: parser::preferred_title(&doc),
            titles: parser::all_titles(&doc),
            creator: parser::creator_statement(&doc),
            date: parser::production_date(&doc),
            description: parser::statement(&doc, aat::DESCRIPTION),
            provenance: parser::statement(&doc, aat::PROVENANCE),
            credit_line: parser::statement(&doc, aat::CREDIT_LINE),
            inscriptions: parser::statement(&doc, aat::INSCRIPTIONS),
            material_statement: parser::statement(&doc, aat::MATERIAL_STATEMENT),
            dimension_statement: parser::statement(&doc, aat::DIMENSION_STATEMENT),
            dimensions: raw_dimensions
                .into_iter()
                .map(|d| Dimension {
                    value: d.value,
                    dimension_type: d.type_uri.as_deref().map(|u| label_for(&resolved, u)),
                    unit: d.unit,
                })
                .collect(),
            object_types: parser::object_type_uris(&doc)
                .iter()
                .map(|u| label_for(&resolved, u))
                .collect(),
            materials: parser::material_uris(&doc)
                .iter()
                .map(|u| label_for(&resolved, u))
                .collect(),
            production: terms::assemble_production(&production_raw, &resolved),
            collections: parser::member_of_uris(&doc)
                .iter()
                .map(|u| label_for(&resolved, u))
                .collect(),
            subjects,
            narratives: parser::narratives(&doc),
            license: parser::license_uri(&doc),
            web_page: parser::web_page(&doc),
            related_objects: parser::related_objects(&doc),
            bibliography_count: parser::bibliography_count(&doc),
            image: image::image_info(&self.fetcher, &doc).await,
        })
    }

    /// Bibliography for a LOD URI. `full = false` returns the count only;
    /// `limit = 0` means all entries.
    pub async fn bibliography(
        &self,
        uri: &str,
        full: bool,
        limit: usize,
    ) -> RetrievalResult<BibliographyOutcome> {
        let doc = self.fetcher.fetch_json(uri, CacheClass::Object).await?;
        let mut citations = bibliography::parse_citations(&doc);
        let total = citations.len();
        let entries = if full {
            if limit > 0 {
                bibliography::sort_citations(&mut citations);
                citations.truncate(limit);
            }
            bibliography::resolve_entries(&self.fetcher, citations, self.resolve_concurrency).await
        } else {
            Vec::new()
        };
        Ok(BibliographyOutcome {
            object_number: parser::object_number(&doc),
            total,
            entries,
        })
    }

    /// IIIF image info for a LOD URI, `None` when the chain breaks.
    pub async fn image_info(&self, uri: &str) -> RetrievalResult<Option<ImageInfo>> {
        let doc = self.fetcher.fetch_json(uri, CacheClass::Object).await?;
        Ok(image::image_info(&self.fetcher, &doc).await)
    }
}

/// Parse an ActivityStreams OrderedCollectionPage.
fn parse_search_page(page: &Value) -> ApiSearchPage {
    let total = get(page, "partOf")
        .and_then(|p| get(p, "totalItems"))
        .or_else(|| get(page, "totalItems"))
        .and_then(Value::as_u64);
    let uris = list(page, "orderedItems")
        .iter()
        .filter_map(|item| ref_id(item))
        .map(str::to_string)
        .collect();
    let next_page_token = get(page, "next")
        .and_then(id_of)
        .map(str::to_string);
    ApiSearchPage {
        total,
        uris,
        next_page_token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use serde_json::json;

    fn client() -> LinkedArtClient {
        let settings = Settings::default();
        let fetcher = Arc::new(Fetcher::new(&settings).unwrap());
        LinkedArtClient::new(fetcher, &settings.api, &settings.http)
    }

    #[tokio::test]
    async fn unfiltered_search_is_rejected() {
        let err = client().search(&ApiSearchParams::default()).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Validation { .. }));
        let message = err.to_string();
        for field in ["title", "creator", "type", "material", "technique", "creationDate", "description"] {
            assert!(message.contains(field), "message should name '{field}'");
        }
    }

    #[tokio::test]
    async fn page_token_alone_is_rejected() {
        let params = ApiSearchParams {
            page_token: Some("https://example.org/page2".to_string()),
            ..Default::default()
        };
        assert!(client().search(&params).await.is_err());
    }

    #[test]
    fn explicit_title_wins_over_query() {
        let params = ApiSearchParams {
            query: Some("rampjaar".to_string()),
            title: Some("Nachtwacht".to_string()),
            ..Default::default()
        };
        let query = params.to_query();
        assert_eq!(query.len(), 1);
        assert_eq!(query[0], ("title", "Nachtwacht".to_string()));
    }

    #[test]
    fn search_page_parsing() {
        let page = json!({
            "type": "OrderedCollectionPage",
            "partOf": {"totalItems": 1234},
            "orderedItems": [
                {"id": "https://id.example.org/1", "type": "HumanMadeObject"},
                {"id": "https://id.example.org/2", "type": "HumanMadeObject"}
            ],
            "next": {"id": "https://example.org/search?pageToken=abc"}
        });
        let parsed = parse_search_page(&page);
        assert_eq!(parsed.total, Some(1234));
        assert_eq!(parsed.uris.len(), 2);
        assert_eq!(
            parsed.next_page_token.as_deref(),
            Some("https://example.org/search?pageToken=abc")
        );
    }

    #[tokio::test]
    async fn detail_assembles_from_cached_documents() {
        let client = client();
        let object_uri = "https://id.example.org/200108369";
        client.fetcher.prime_cache(
            object_uri,
            json!({
                "id": object_uri,
                "classified_as": [{"id": "http://vocab.getty.edu/aat/300033618"}],
                "identified_by": [
                    {"type": "Identifier", "content": "SK-C-5",
                     "classified_as": [{"id": aat::OBJECT_NUMBER}]},
                    {"type": "Name", "content": "The Night Watch",
                     "language": [{"id": aat::ENGLISH}],
                     "classified_as": [{"id": aat::BRIEF_TEXT}]}
                ],
                "shows": [{"id": "https://id.example.org/visual/1"}]
            }),
            CacheClass::Object,
        );
        client.fetcher.prime_cache(
            "https://id.example.org/visual/1",
            json!({
                "about": [{"id": "https://id.example.org/term/amsterdam"}]
            }),
            CacheClass::Image,
        );
        client.fetcher.prime_cache(
            "https://id.example.org/term/amsterdam",
            json!({
                "identified_by": [
                    {"type": "Name", "content": "Amsterdam",
                     "language": [{"id": aat::ENGLISH}]}
                ],
                "equivalent": [{"id": "https://www.wikidata.org/entity/Q727"}]
            }),
            CacheClass::Term,
        );
        client.fetcher.prime_cache(
            "http://vocab.getty.edu/aat/300033618",
            json!({"_label": "painting"}),
            CacheClass::Term,
        );

        let detail = client.detail(object_uri).await.unwrap();
        assert_eq!(detail.object_number.as_deref(), Some("SK-C-5"));
        assert_eq!(detail.title, "The Night Watch");
        assert_eq!(detail.creator, "Unknown");
        assert_eq!(detail.object_types, vec!["painting".to_string()]);
        assert_eq!(detail.subjects.len(), 1);
        assert_eq!(detail.subjects[0].label, "Amsterdam");
        assert!(detail.subjects[0].equivalents.contains_key("wikidata"));
        // No digital object in the fixture: the image chain stops cleanly
        assert!(detail.image.is_none());
        assert_eq!(detail.bibliography_count, 0);
    }

    #[tokio::test]
    async fn bibliography_summary_and_full() {
        let client = client();
        let object_uri = "https://id.example.org/200108370";
        client.fetcher.prime_cache(
            object_uri,
            json!({
                "assigned_by": [
                    {"classified_as": [{"id": aat::CITATION}],
                     "content": "Catalogue 1969, no. 12", "sequence": 2},
                    {"classified_as": [{"id": aat::CITATION}],
                     "content": "Bulletin 2001, pp. 4-9", "sequence": 1}
                ]
            }),
            CacheClass::Object,
        );

        let summary = client.bibliography(object_uri, false, 0).await.unwrap();
        assert_eq!(summary.total, 2);
        assert!(summary.entries.is_empty());

        let full = client.bibliography(object_uri, true, 0).await.unwrap();
        assert_eq!(full.entries.len(), 2);
        assert_eq!(full.entries[0].citation, "Bulletin 2001, pp. 4-9");
        assert_eq!(full.entries[1].citation, "Catalogue 1969, no. 12");

        let limited = client.bibliography(object_uri, true, 1).await.unwrap();
        assert_eq!(limited.total, 2);
        assert_eq!(limited.entries.len(), 1);
        assert_eq!(limited.entries[0].citation, "Bulletin 2001, pp. 4-9");
    }
}
