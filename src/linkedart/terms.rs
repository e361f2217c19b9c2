//! Parallel vocabulary-term resolution.
//!
//! The detail parser collects every URI that needs a human label (object
//! types, materials, production actors/techniques/places, dimension types,
//! collection sets, visual-item subjects), deduplicates them, and resolves
//! the whole batch here in bounded parallel through the term cache. The
//! domain object is then assembled from the `URI → term` index, mirroring
//! the entity-map pattern of the OAI parser.

use super::http::{CacheClass, Fetcher};
use super::json::{aat, content, has_language, label, list, ref_id, type_of, uri_tail};
use super::parser::ProductionRaw;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;

/// A resolved vocabulary term with its authority equivalents.
#[derive(Debug, Clone, Serialize)]
pub struct VocabTerm {
    pub uri: String,
    pub label: String,
    /// External equivalents keyed by authority: aat, wikidata, iconclass.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub equivalents: HashMap<&'static str, String>,
}

/// One production event combining actor, technique-as-role, and places.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub places: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
}

/// Parse a fetched term document. Label fallback: English name → Dutch name
/// → `_label` → trailing URI path segment.
pub fn parse_term(uri: &str, doc: &Value) -> VocabTerm {
    let names: Vec<&Value> = list(doc, "identified_by")
        .into_iter()
        .filter(|n| type_of(n) == Some("Name"))
        .collect();
    let term_label = names
        .iter()
        .find(|n| has_language(n, aat::ENGLISH))
        .or_else(|| names.iter().find(|n| has_language(n, aat::DUTCH)))
        .and_then(|n| content(n))
        .or_else(|| label(doc))
        .unwrap_or_else(|| uri_tail(uri))
        .to_string();

    let mut equivalents = HashMap::new();
    for equivalent in list(doc, "equivalent") {
        let Some(target) = ref_id(equivalent) else {
            continue;
        };
        let authority = if target.contains("vocab.getty.edu/aat") {
            Some("aat")
        } else if target.contains("wikidata.org") {
            Some("wikidata")
        } else if target.contains("iconclass.org") {
            Some("iconclass")
        } else {
            None
        };
        if let Some(authority) = authority {
            equivalents
                .entry(authority)
                .or_insert_with(|| target.to_string());
        }
    }

    VocabTerm {
        uri: uri.to_string(),
        label: term_label,
        equivalents,
    }
}

/// Resolve a deduplicated URI batch in bounded parallel. Individual
/// failures are logged and skipped; the caller labels those by URI tail.
pub async fn resolve_terms(
    fetcher: &Arc<Fetcher>,
    uris: impl IntoIterator<Item = String>,
    concurrency: usize,
) -> HashMap<String, VocabTerm> {
    let mut pending: Vec<String> = {
        let mut seen = std::collections::HashSet::new();
        uris.into_iter().filter(|u| seen.insert(u.clone())).collect()
    };
    pending.reverse();

    let concurrency = concurrency.max(1);
    let mut set: JoinSet<(String, Option<VocabTerm>)> = JoinSet::new();
    let mut resolved = HashMap::new();

    loop {
        while set.len() < concurrency
            && let Some(uri) = pending.pop()
        {
            let fetcher = Arc::clone(fetcher);
            set.spawn(async move {
                match fetcher.fetch_json(&uri, CacheClass::Term).await {
                    Ok(doc) => {
                        let term = parse_term(&uri, &doc);
                        (uri, Some(term))
                    }
                    Err(e) => {
                        tracing::debug!(target: "linkedart", "term resolution failed for {uri}: {e}");
                        (uri, None)
                    }
                }
            });
        }
        match set.join_next().await {
            Some(Ok((uri, Some(term)))) => {
                resolved.insert(uri, term);
            }
            Some(Ok((_, None))) => {}
            Some(Err(e)) => {
                tracing::warn!(target: "linkedart", "term resolution task panicked: {e}");
            }
            None => break,
        }
    }
    resolved
}

/// Label for a URI through the resolved index, URI tail as fallback.
pub fn label_for(terms: &HashMap<String, VocabTerm>, uri: &str) -> String {
    terms
        .get(uri)
        .map(|t| t.label.clone())
        .unwrap_or_else(|| uri_tail(uri).to_string())
}

/// Combine raw production parts with the resolved term index. The first
/// technique acts as the actor's role label.
pub fn assemble_production(
    parts: &[ProductionRaw],
    terms: &HashMap<String, VocabTerm>,
) -> Vec<ProductionPart> {
    parts
        .iter()
        .map(|part| ProductionPart {
            actor: part.actor_uri.as_deref().map(|u| label_for(terms, u)),
            role: part
                .technique_uris
                .first()
                .map(|u| label_for(terms, u)),
            places: part
                .place_uris
                .iter()
                .map(|u| label_for(terms, u))
                .collect(),
            statement: part.statement.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn term_label_fallback_chain() {
        let with_english = json!({
            "identified_by": [
                {"type": "Name", "content": "schilderij", "language": [{"id": aat::DUTCH}]},
                {"type": "Name", "content": "painting", "language": [{"id": aat::ENGLISH}]}
            ]
        });
        assert_eq!(parse_term("http://x/1", &with_english).label, "painting");

        let dutch_only = json!({
            "identified_by": [
                {"type": "Name", "content": "schilderij", "language": [{"id": aat::DUTCH}]}
            ]
        });
        assert_eq!(parse_term("http://x/1", &dutch_only).label, "schilderij");

        let label_only = json!({"_label": "oil paint"});
        assert_eq!(parse_term("http://x/1", &label_only).label, "oil paint");

        assert_eq!(
            parse_term("http://vocab.getty.edu/aat/300033618", &json!({})).label,
            "300033618"
        );
    }

    #[test]
    fn equivalents_keyed_by_authority() {
        let doc = json!({
            "equivalent": [
                {"id": "http://vocab.getty.edu/aat/300033618"},
                {"id": "https://www.wikidata.org/entity/Q3305213"},
                {"id": "https://iconclass.org/48C5"},
                {"id": "https://unknown.example.org/1"}
            ]
        });
        let term = parse_term("http://x/1", &doc);
        assert_eq!(term.equivalents.len(), 3);
        assert!(term.equivalents.contains_key("aat"));
        assert!(term.equivalents.contains_key("wikidata"));
        assert!(term.equivalents.contains_key("iconclass"));
    }

    #[test]
    fn production_assembly_uses_technique_as_role() {
        let parts = vec![ProductionRaw {
            actor_uri: Some("http://x/rembrandt".to_string()),
            technique_uris: vec!["http://x/painting-technique".to_string()],
            place_uris: vec!["http://x/amsterdam".to_string()],
            statement: Some("Rembrandt van Rijn".to_string()),
        }];
        let mut terms = HashMap::new();
        terms.insert(
            "http://x/rembrandt".to_string(),
            VocabTerm {
                uri: "http://x/rembrandt".to_string(),
                label: "Rembrandt van Rijn".to_string(),
                equivalents: HashMap::new(),
            },
        );
        terms.insert(
            "http://x/painting-technique".to_string(),
            VocabTerm {
                uri: "http://x/painting-technique".to_string(),
                label: "painting".to_string(),
                equivalents: HashMap::new(),
            },
        );
        let assembled = assemble_production(&parts, &terms);
        assert_eq!(assembled.len(), 1);
        assert_eq!(assembled[0].actor.as_deref(), Some("Rembrandt van Rijn"));
        assert_eq!(assembled[0].role.as_deref(), Some("painting"));
        // Unresolved place falls back to the URI tail
        assert_eq!(assembled[0].places, vec!["amsterdam".to_string()]);
    }
}
