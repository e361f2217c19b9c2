//! serde_json::Value accessors for Linked Art documents.
//!
//! JSON-LD is structurally loose: most list-valued keys may also appear as
//! a single object, references may be bare strings or `{id}` nodes, and
//! classification is by AAT URI. These helpers normalise all of that so the
//! extractors in `parser.rs` stay declarative.

use serde_json::Value;

/// AAT and related classification URIs used across the parser family.
pub mod aat {
    /// Brief text (preferred short titles)
    pub const BRIEF_TEXT: &str = "http://vocab.getty.edu/aat/300418049";
    /// Accession/object numbers
    pub const OBJECT_NUMBER: &str = "http://vocab.getty.edu/aat/300312355";
    /// Description statement
    pub const DESCRIPTION: &str = "http://vocab.getty.edu/aat/300435416";
    /// Provenance statement
    pub const PROVENANCE: &str = "http://vocab.getty.edu/aat/300435438";
    /// Credit line / acknowledgments
    pub const CREDIT_LINE: &str = "http://vocab.getty.edu/aat/300026687";
    /// Inscription statement
    pub const INSCRIPTIONS: &str = "http://vocab.getty.edu/aat/300435414";
    /// Material / technique statement
    pub const MATERIAL_STATEMENT: &str = "http://vocab.getty.edu/aat/300435429";
    /// Creator description (attributed-maker statement on a production part)
    pub const CREATOR_DESCRIPTION: &str = "http://vocab.getty.edu/aat/300435446";
    /// Creation/production statement
    pub const CREATOR_STATEMENT: &str = "http://vocab.getty.edu/aat/300435436";
    /// Dimension statement
    pub const DIMENSION_STATEMENT: &str = "http://vocab.getty.edu/aat/300435430";
    /// Curatorial narrative blocks under `subject_of`
    pub const NARRATIVE: &str = "http://vocab.getty.edu/aat/300048722";
    /// Citation entries in `assigned_by`
    pub const CITATION: &str = "http://vocab.getty.edu/aat/300311705";
    /// English language tag
    pub const ENGLISH: &str = "http://vocab.getty.edu/aat/300388277";
    /// Dutch language tag
    pub const DUTCH: &str = "http://vocab.getty.edu/aat/300388256";
}

/// `v[key]` when present.
pub fn get<'a>(v: &'a Value, key: &str) -> Option<&'a Value> {
    v.as_object().and_then(|o| o.get(key))
}

/// `v[key]` normalised to a list: arrays yield their items, a single
/// object/string yields itself, anything else is empty.
pub fn list<'a>(v: &'a Value, key: &str) -> Vec<&'a Value> {
    match get(v, key) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other],
    }
}

/// String at `v[key]`.
pub fn str_of<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    get(v, key).and_then(Value::as_str)
}

/// The node's `id` (or `@id`).
pub fn id_of(v: &Value) -> Option<&str> {
    str_of(v, "id").or_else(|| str_of(v, "@id"))
}

/// The node's `type` (or `@type`), first entry when list-valued.
pub fn type_of(v: &Value) -> Option<&str> {
    match get(v, "type").or_else(|| get(v, "@type")) {
        Some(Value::String(s)) => Some(s),
        Some(Value::Array(items)) => items.first().and_then(Value::as_str),
        _ => None,
    }
}

/// A reference target: a bare string, or the `id` of a node.
pub fn ref_id(v: &Value) -> Option<&str> {
    v.as_str().or_else(|| id_of(v))
}

/// URIs in the node's `classified_as` list.
pub fn classification_ids<'a>(v: &'a Value) -> Vec<&'a str> {
    list(v, "classified_as").iter().filter_map(|c| ref_id(c)).collect()
}

/// Whether the node carries the given classification URI.
pub fn has_classification(v: &Value, uri: &str) -> bool {
    classification_ids(v).contains(&uri)
}

/// Whether the node is language-tagged with the given AAT language URI.
pub fn has_language(v: &Value, uri: &str) -> bool {
    list(v, "language").iter().any(|l| ref_id(l) == Some(uri))
}

/// ISO-ish code for the node's first language tag: `en`, `nl`, or `other`.
pub fn language_code(v: &Value) -> &'static str {
    if has_language(v, aat::ENGLISH) {
        "en"
    } else if has_language(v, aat::DUTCH) {
        "nl"
    } else {
        "other"
    }
}

/// The node's `content` string.
pub fn content(v: &Value) -> Option<&str> {
    str_of(v, "content")
}

/// The node's `_label`.
pub fn label(v: &Value) -> Option<&str> {
    str_of(v, "_label")
}

/// Last non-empty path segment of a URI, the label fallback of last resort.
pub fn uri_tail(uri: &str) -> &str {
    uri.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(uri)
}
