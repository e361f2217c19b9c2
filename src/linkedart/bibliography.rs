//! Bibliography normalisation.
//!
//! `assigned_by` citation entries come in three shapes: a structured
//! reference to a publication URI with optional pages, an inline free-text
//! citation string, or a BIBFRAME Instance URI to dereference. Referenced
//! publications are resolved in parallel and formatted as
//! `Author, Title (Location, Year), Pages`. Entries are ordered by their
//! `sequence` when present; missing sequences sort last, stably.

use super::http::{CacheClass, Fetcher};
use super::json::{aat, content, get, has_classification, id_of, list, ref_id, str_of, type_of, uri_tail};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinSet;

/// The three citation variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Citation {
    /// Structured reference to a publication document.
    Reference {
        publication_uri: String,
        pages: Option<String>,
        sequence: Option<i64>,
    },
    /// Free-text citation kept verbatim.
    Inline { text: String, sequence: Option<i64> },
    /// BIBFRAME Instance URI to dereference.
    Bibframe {
        instance_uri: String,
        sequence: Option<i64>,
    },
}

impl Citation {
    pub fn sequence(&self) -> Option<i64> {
        match self {
            Self::Reference { sequence, .. }
            | Self::Inline { sequence, .. }
            | Self::Bibframe { sequence, .. } => *sequence,
        }
    }
}

/// A normalised bibliography entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BibliographyEntry {
    pub citation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worldcat_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_url: Option<String>,
}

/// Extract citation entries from an object document.
pub fn parse_citations(doc: &Value) -> Vec<Citation> {
    list(doc, "assigned_by")
        .into_iter()
        .filter(|entry| has_classification(entry, aat::CITATION))
        .filter_map(parse_citation)
        .collect()
}

fn parse_citation(entry: &Value) -> Option<Citation> {
    let sequence = get(entry, "sequence").and_then(Value::as_i64);

    if let Some(text) = content(entry) {
        return Some(Citation::Inline {
            text: text.to_string(),
            sequence,
        });
    }

    if let Some(publication_uri) = list(entry, "refers_to").first().and_then(|r| ref_id(r)) {
        return Some(Citation::Reference {
            publication_uri: publication_uri.to_string(),
            pages: str_of(entry, "pages").map(str::to_string),
            sequence,
        });
    }

    // A bare Instance reference is a BIBFRAME record
    if type_of(entry) == Some("Instance")
        || id_of(entry).is_some_and(|id| id.contains("bibframe"))
    {
        return Some(Citation::Bibframe {
            instance_uri: id_of(entry)?.to_string(),
            sequence,
        });
    }

    None
}

/// Stable sequence ordering: present values ascending, absent values last.
pub fn sort_citations(citations: &mut [Citation]) {
    citations.sort_by_key(|c| match c.sequence() {
        Some(sequence) => (false, sequence),
        None => (true, 0),
    });
}

/// Resolve and format a citation list. Referenced publications are
/// dereferenced in parallel; individual failures degrade to a URI-derived
/// entry rather than failing the whole list.
pub async fn resolve_entries(
    fetcher: &Arc<Fetcher>,
    mut citations: Vec<Citation>,
    concurrency: usize,
) -> Vec<BibliographyEntry> {
    sort_citations(&mut citations);

    let concurrency = concurrency.max(1);
    let mut set: JoinSet<(usize, BibliographyEntry)> = JoinSet::new();
    let mut queue: Vec<(usize, Citation)> = citations.into_iter().enumerate().collect();
    queue.reverse();
    let mut entries: Vec<(usize, BibliographyEntry)> = Vec::new();

    loop {
        while set.len() < concurrency
            && let Some((index, citation)) = queue.pop()
        {
            let fetcher = Arc::clone(fetcher);
            set.spawn(async move { (index, resolve_entry(&fetcher, citation).await) });
        }
        match set.join_next().await {
            Some(Ok(indexed)) => entries.push(indexed),
            Some(Err(e)) => {
                tracing::warn!(target: "linkedart", "bibliography task panicked: {e}")
            }
            None => break,
        }
    }

    entries.sort_by_key(|(index, _)| *index);
    entries.into_iter().map(|(_, entry)| entry).collect()
}

async fn resolve_entry(fetcher: &Arc<Fetcher>, citation: Citation) -> BibliographyEntry {
    match citation {
        Citation::Inline { text, sequence } => BibliographyEntry {
            citation: text,
            sequence,
            isbn: None,
            worldcat_uri: None,
            library_url: None,
        },
        Citation::Reference {
            publication_uri,
            pages,
            sequence,
        } => match fetcher.fetch_json(&publication_uri, CacheClass::Term).await {
            Ok(doc) => publication_entry(&doc, pages.as_deref(), sequence),
            Err(e) => {
                tracing::debug!(
                    target: "linkedart",
                    "publication dereference failed for {publication_uri}: {e}"
                );
                BibliographyEntry {
                    citation: uri_tail(&publication_uri).to_string(),
                    sequence,
                    isbn: None,
                    worldcat_uri: None,
                    library_url: None,
                }
            }
        },
        Citation::Bibframe {
            instance_uri,
            sequence,
        } => match fetcher.fetch_json(&instance_uri, CacheClass::Term).await {
            Ok(doc) => publication_entry(&doc, None, sequence),
            Err(e) => {
                tracing::debug!(
                    target: "linkedart",
                    "BIBFRAME dereference failed for {instance_uri}: {e}"
                );
                BibliographyEntry {
                    citation: uri_tail(&instance_uri).to_string(),
                    sequence,
                    isbn: None,
                    worldcat_uri: None,
                    library_url: None,
                }
            }
        },
    }
}

/// Build the formatted entry from a resolved schema.org publication.
fn publication_entry(doc: &Value, pages: Option<&str>, sequence: Option<i64>) -> BibliographyEntry {
    BibliographyEntry {
        citation: format_publication(doc, pages),
        sequence,
        isbn: str_of(doc, "isbn").map(str::to_string),
        worldcat_uri: list(doc, "sameAs")
            .iter()
            .filter_map(|s| ref_id(s))
            .find(|uri| uri.contains("worldcat.org"))
            .map(str::to_string),
        library_url: str_of(doc, "url").map(str::to_string),
    }
}

/// `Author, Title (Location, Year), Pages` with missing parts elided.
pub fn format_publication(doc: &Value, pages: Option<&str>) -> String {
    let author = list(doc, "author")
        .first()
        .and_then(|a| str_of(a, "name").or_else(|| a.as_str()));
    let title = str_of(doc, "name")
        .or_else(|| str_of(doc, "_label"))
        .unwrap_or("Untitled publication");
    let location = get(doc, "locationCreated")
        .and_then(|l| str_of(l, "name").or_else(|| l.as_str()));
    let year = str_of(doc, "datePublished").map(|d| d.chars().take(4).collect::<String>());

    let mut out = String::new();
    if let Some(author) = author {
        out.push_str(author);
        out.push_str(", ");
    }
    out.push_str(title);

    let imprint: Vec<String> = [location.map(str::to_string), year]
        .into_iter()
        .flatten()
        .collect();
    if !imprint.is_empty() {
        out.push_str(&format!(" ({})", imprint.join(", ")));
    }
    if let Some(pages) = pages {
        out.push_str(&format!(", {pages}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn citation_doc() -> Value {
        json!({
            "assigned_by": [
                {
                    "classified_as": [{"id": aat::CITATION}],
                    "refers_to": [{"id": "https://id.example.org/publication/1"}],
                    "pages": "pp. 12-34",
                    "sequence": 2
                },
                {
                    "classified_as": [{"id": aat::CITATION}],
                    "content": "Exhibition catalogue 1969, cat. no. 12",
                    "sequence": 1
                },
                {
                    "classified_as": [{"id": aat::CITATION}],
                    "id": "https://id.example.org/bibframe/instance/9",
                    "type": "Instance"
                },
                {
                    "classified_as": [{"id": "http://other"}],
                    "content": "not a citation"
                }
            ]
        })
    }

    #[test]
    fn parses_all_three_variants() {
        let citations = parse_citations(&citation_doc());
        assert_eq!(citations.len(), 3);
        assert!(matches!(citations[0], Citation::Reference { .. }));
        assert!(matches!(citations[1], Citation::Inline { .. }));
        assert!(matches!(citations[2], Citation::Bibframe { .. }));
    }

    #[test]
    fn sequence_sort_puts_missing_last_stably() {
        let mut citations = parse_citations(&citation_doc());
        sort_citations(&mut citations);
        assert_eq!(citations[0].sequence(), Some(1));
        assert_eq!(citations[1].sequence(), Some(2));
        assert_eq!(citations[2].sequence(), None);
    }

    #[test]
    fn formats_full_publication() {
        let publication = json!({
            "author": [{"name": "S. A. C. Dudok van Heel"}],
            "name": "The Night Watch and the Amsterdam militia",
            "locationCreated": {"name": "Amsterdam"},
            "datePublished": "2009-01-01",
            "isbn": "9789086890682"
        });
        assert_eq!(
            format_publication(&publication, Some("pp. 12-34")),
            "S. A. C. Dudok van Heel, The Night Watch and the Amsterdam militia (Amsterdam, 2009), pp. 12-34"
        );
    }

    #[test]
    fn formats_sparse_publication() {
        assert_eq!(
            format_publication(&json!({"name": "Catalogue"}), None),
            "Catalogue"
        );
        assert_eq!(
            format_publication(&json!({}), None),
            "Untitled publication"
        );
    }

    #[test]
    fn publication_entry_copies_enrichment() {
        let doc = json!({
            "name": "Catalogue",
            "isbn": "978-90-00",
            "sameAs": [{"id": "https://worldcat.org/oclc/123"}],
            "url": "https://library.example.org/record/1"
        });
        let entry = publication_entry(&doc, None, Some(3));
        assert_eq!(entry.isbn.as_deref(), Some("978-90-00"));
        assert_eq!(
            entry.worldcat_uri.as_deref(),
            Some("https://worldcat.org/oclc/123")
        );
        assert_eq!(
            entry.library_url.as_deref(),
            Some("https://library.example.org/record/1")
        );
        assert_eq!(entry.sequence, Some(3));
    }
}
