//! Deterministic extraction from Linked Art object documents.
//!
//! Every extractor operates on an already-fetched document and follows a
//! fixed selection rule; parsing never touches the network. Unresolvable
//! sub-references degrade to `None`, not errors.

use super::json::{
    aat, classification_ids, content, get, has_classification, has_language, id_of, label,
    language_code, list, ref_id, str_of, type_of, uri_tail,
};
use serde_json::Value;
use serde::Serialize;

/// A title with its language and qualifier tags.
#[derive(Debug, Clone, Serialize)]
pub struct TitleEntry {
    pub text: String,
    /// `en`, `nl`, or `other`
    pub language: &'static str,
    /// `brief`, `full`, or `other`
    pub qualifier: &'static str,
}

/// A curatorial narrative block.
#[derive(Debug, Clone, Serialize)]
pub struct Narrative {
    pub language: &'static str,
    pub text: String,
}

/// A structured dimension with its resolved unit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionValue {
    pub value: f64,
    /// AAT URI of the dimension type (height, width, …); label resolved
    /// through the vocabulary batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// A related object reference.
#[derive(Debug, Clone, Serialize)]
pub struct RelatedObject {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Raw URIs of one production part, resolved later in a single batch.
#[derive(Debug, Clone, Default)]
pub struct ProductionRaw {
    pub actor_uri: Option<String>,
    pub technique_uris: Vec<String>,
    pub place_uris: Vec<String>,
    pub statement: Option<String>,
}

/// Preferred title: English brief text, else any English name, else Dutch
/// brief, else the first name, else `"Untitled"`.
pub fn preferred_title(doc: &Value) -> String {
    let names: Vec<&Value> = list(doc, "identified_by")
        .into_iter()
        .filter(|n| type_of(n) == Some("Name"))
        .collect();

    let english_brief = names
        .iter()
        .find(|n| has_language(n, aat::ENGLISH) && has_classification(n, aat::BRIEF_TEXT));
    let english = names.iter().find(|n| has_language(n, aat::ENGLISH));
    let dutch_brief = names
        .iter()
        .find(|n| has_language(n, aat::DUTCH) && has_classification(n, aat::BRIEF_TEXT));

    english_brief
        .or(english)
        .or(dutch_brief)
        .or(names.first())
        .and_then(|n| content(n))
        .unwrap_or("Untitled")
        .to_string()
}

/// Object number: the `Identifier` classified as an object number.
pub fn object_number(doc: &Value) -> Option<String> {
    list(doc, "identified_by")
        .into_iter()
        .filter(|n| type_of(n) == Some("Identifier"))
        .find(|n| has_classification(n, aat::OBJECT_NUMBER))
        .and_then(content)
        .map(str::to_string)
}

/// Every name on the object, tagged with language and qualifier.
pub fn all_titles(doc: &Value) -> Vec<TitleEntry> {
    list(doc, "identified_by")
        .into_iter()
        .filter(|n| type_of(n) == Some("Name"))
        .filter_map(|n| {
            let text = content(n)?.to_string();
            let qualifier = if has_classification(n, aat::BRIEF_TEXT) {
                "brief"
            } else if classification_ids(n).is_empty() {
                "other"
            } else {
                "full"
            };
            Some(TitleEntry {
                text,
                language: language_code(n),
                qualifier,
            })
        })
        .collect()
}

/// Creator label, in tiers: English creator description, else English
/// creator statement, else any statement from the production graph, else
/// `"Unknown"`. The classification filter keeps unrelated production notes
/// (technique remarks and the like) from shadowing the maker.
pub fn creator_statement(doc: &Value) -> String {
    let statements = production_statements(doc);
    let english_classified = |classification: &str| {
        statements
            .iter()
            .find(|s| has_classification(s, classification) && language_code(s) == "en")
    };
    english_classified(aat::CREATOR_DESCRIPTION)
        .or_else(|| english_classified(aat::CREATOR_STATEMENT))
        .or_else(|| statements.first())
        .and_then(|s| content(s))
        .unwrap_or("Unknown")
        .to_string()
}

/// All free-text statements on `produced_by` and its parts.
fn production_statements(doc: &Value) -> Vec<&Value> {
    let Some(production) = get(doc, "produced_by") else {
        return Vec::new();
    };
    let mut statements: Vec<&Value> = list(production, "referred_to_by");
    for part in list(production, "part") {
        statements.extend(list(part, "referred_to_by"));
    }
    statements
}

/// The creator-classified statement of one production part, else its first
/// statement.
fn part_statement<'a>(part: &'a Value) -> Option<&'a Value> {
    let statements: Vec<&Value> = list(part, "referred_to_by");
    statements
        .iter()
        .find(|s| {
            has_classification(s, aat::CREATOR_DESCRIPTION)
                || has_classification(s, aat::CREATOR_STATEMENT)
        })
        .or_else(|| statements.first())
        .copied()
}

/// Production date: English date label on the timespan, else any label,
/// else the 4-digit prefix of `begin_of_the_begin`, else `"Unknown"`.
pub fn production_date(doc: &Value) -> String {
    let timespan = get(doc, "produced_by").and_then(|p| get(p, "timespan"));
    let Some(timespan) = timespan else {
        return "Unknown".to_string();
    };

    let labels: Vec<&Value> = list(timespan, "identified_by")
        .into_iter()
        .filter(|n| type_of(n) == Some("Name"))
        .collect();
    if let Some(text) = labels
        .iter()
        .find(|n| has_language(n, aat::ENGLISH))
        .or_else(|| labels.first())
        .and_then(|n| content(n))
    {
        return text.to_string();
    }

    if let Some(begin) = str_of(timespan, "begin_of_the_begin")
        && begin.len() >= 4
    {
        return begin[..4].to_string();
    }
    "Unknown".to_string()
}

/// A descriptive statement from `referred_to_by`, selected by AAT
/// classification, English preferred.
pub fn statement(doc: &Value, classification: &str) -> Option<String> {
    let matching: Vec<&Value> = list(doc, "referred_to_by")
        .into_iter()
        .filter(|s| has_classification(s, classification))
        .collect();
    matching
        .iter()
        .find(|s| language_code(s) == "en")
        .or_else(|| matching.first())
        .and_then(|s| content(s))
        .map(str::to_string)
}

/// Curatorial narratives: `subject_of` parts classified as narrative, one
/// entry per language block.
pub fn narratives(doc: &Value) -> Vec<Narrative> {
    let mut out = Vec::new();
    for subject in list(doc, "subject_of") {
        let mut blocks: Vec<&Value> = list(subject, "part");
        blocks.push(subject);
        for block in blocks {
            if !has_classification(block, aat::NARRATIVE) {
                continue;
            }
            if let Some(text) = content(block) {
                out.push(Narrative {
                    language: language_code(block),
                    text: text.to_string(),
                });
            }
        }
    }
    out
}

/// License: first classification URI under `subject_of.subject_to`.
pub fn license_uri(doc: &Value) -> Option<String> {
    for subject in list(doc, "subject_of") {
        for subject_to in list(subject, "subject_to") {
            if let Some(uri) = classification_ids(subject_to).first() {
                return Some((*uri).to_string());
            }
        }
    }
    None
}

/// Web page: `subject_of.digitally_carried_by` with `format = text/html`.
pub fn web_page(doc: &Value) -> Option<String> {
    for subject in list(doc, "subject_of") {
        for carrier in list(subject, "digitally_carried_by") {
            if str_of(carrier, "format") != Some("text/html") {
                continue;
            }
            if let Some(uri) = list(carrier, "access_point")
                .first()
                .and_then(|a| ref_id(a))
                .or_else(|| id_of(carrier))
            {
                return Some(uri.to_string());
            }
        }
    }
    None
}

/// AAT unit URI → conventional abbreviation.
fn unit_abbreviation(uri: &str) -> Option<&'static str> {
    match uri {
        "http://vocab.getty.edu/aat/300379098" => Some("cm"),
        "http://vocab.getty.edu/aat/300379097" => Some("mm"),
        "http://vocab.getty.edu/aat/300379226" => Some("kg"),
        "http://vocab.getty.edu/aat/300379225" => Some("g"),
        _ => None,
    }
}

/// Structured dimensions: entries with a numeric value, their type URI and
/// resolved unit label.
pub fn dimensions(doc: &Value) -> Vec<DimensionValue> {
    list(doc, "dimension")
        .into_iter()
        .filter_map(|d| {
            let value = get(d, "value")?.as_f64()?;
            let type_uri = classification_ids(d).first().map(|u| (*u).to_string());
            let unit = get(d, "unit").and_then(|u| {
                ref_id(u)
                    .and_then(unit_abbreviation)
                    .map(str::to_string)
                    .or_else(|| label(u).map(str::to_string))
                    .or_else(|| ref_id(u).map(|uri| uri_tail(uri).to_string()))
            });
            Some(DimensionValue {
                value,
                type_uri,
                unit,
            })
        })
        .collect()
}

/// Related objects from `attributed_by`, deduplicated by URI.
pub fn related_objects(doc: &Value) -> Vec<RelatedObject> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for assignment in list(doc, "attributed_by") {
        let mut targets: Vec<&Value> = list(assignment, "assigned");
        if targets.is_empty() {
            targets.push(assignment);
        }
        for target in targets {
            let Some(uri) = id_of(target) else { continue };
            if !seen.insert(uri.to_string()) {
                continue;
            }
            out.push(RelatedObject {
                uri: uri.to_string(),
                label: label(target).map(str::to_string),
            });
        }
    }
    out
}

/// Count of citation entries in `assigned_by`.
pub fn bibliography_count(doc: &Value) -> usize {
    list(doc, "assigned_by")
        .into_iter()
        .filter(|entry| has_classification(entry, aat::CITATION))
        .count()
}

/// The Visual Item URI behind `shows`.
pub fn shows_uri(doc: &Value) -> Option<String> {
    list(doc, "shows").first().and_then(|s| ref_id(s)).map(str::to_string)
}

/// Production parts with their unresolved actor/technique/place URIs.
pub fn production_parts(doc: &Value) -> Vec<ProductionRaw> {
    let Some(production) = get(doc, "produced_by") else {
        return Vec::new();
    };
    let mut parts: Vec<&Value> = list(production, "part");
    if parts.is_empty() {
        parts.push(production);
    }
    parts
        .into_iter()
        .map(|part| ProductionRaw {
            actor_uri: list(part, "carried_out_by")
                .first()
                .and_then(|a| ref_id(a))
                .map(str::to_string),
            technique_uris: list(part, "technique")
                .iter()
                .filter_map(|t| ref_id(t))
                .map(str::to_string)
                .collect(),
            place_uris: list(part, "took_place_at")
                .iter()
                .filter_map(|p| ref_id(p))
                .map(str::to_string)
                .collect(),
            statement: part_statement(part).and_then(content).map(str::to_string),
        })
        .collect()
}

/// Object type classification URIs on the document itself.
pub fn object_type_uris(doc: &Value) -> Vec<String> {
    classification_ids(doc).iter().map(|u| (*u).to_string()).collect()
}

/// Material URIs from `made_of`.
pub fn material_uris(doc: &Value) -> Vec<String> {
    list(doc, "made_of")
        .iter()
        .filter_map(|m| ref_id(m))
        .map(str::to_string)
        .collect()
}

/// Collection set URIs from `member_of`.
pub fn member_of_uris(doc: &Value) -> Vec<String> {
    list(doc, "member_of")
        .iter()
        .filter_map(|m| ref_id(m))
        .map(str::to_string)
        .collect()
}

/// Subject URIs on a Visual Item (`about`).
pub fn visual_item_subject_uris(doc: &Value) -> Vec<String> {
    list(doc, "about")
        .iter()
        .filter_map(|s| ref_id(s))
        .map(str::to_string)
        .collect()
}
