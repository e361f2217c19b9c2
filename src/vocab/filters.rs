//! Filter taxonomy for the structured vocabulary search.
//!
//! A [`SearchFilters`] value is the composite filter object of a single
//! query. Every active filter contributes one AND-combined predicate; there
//! is no OR semantics across filters. `None` fields are ignored; text fields
//! that sanitise to an empty FTS query short-circuit to zero results.

use serde::{Deserialize, Serialize};

/// Mapping-table field names. A single artwork may carry several mappings
/// per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappingField {
    Subject,
    Spatial,
    Material,
    Technique,
    Type,
    Creator,
    BirthPlace,
    DeathPlace,
    Profession,
    CollectionSet,
    ProductionRole,
}

impl MappingField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Spatial => "spatial",
            Self::Material => "material",
            Self::Technique => "technique",
            Self::Type => "type",
            Self::Creator => "creator",
            Self::BirthPlace => "birth_place",
            Self::DeathPlace => "death_place",
            Self::Profession => "profession",
            Self::CollectionSet => "collection_set",
            Self::ProductionRole => "production_role",
        }
    }
}

/// Vocabulary term types a filter may resolve against. `Any` places no
/// restriction on the `vocabulary.type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermType {
    Person,
    Place,
    Classification,
    Set,
    Any,
}

impl TermType {
    pub fn as_sql(&self) -> Option<&'static str> {
        match self {
            Self::Person => Some("person"),
            Self::Place => Some("place"),
            Self::Classification => Some("classification"),
            Self::Set => Some("set"),
            Self::Any => None,
        }
    }
}

/// One vocabulary-class filter: the user's term, the mapping fields it joins
/// on, and the term types it may resolve to.
#[derive(Debug, Clone)]
pub struct VocabFilter {
    /// Filter name as the caller knows it, for warnings.
    pub name: &'static str,
    pub term: String,
    pub fields: Vec<MappingField>,
    pub term_type: TermType,
    /// Place filters get the multi-word resolver as a last resort.
    pub place_fallback: bool,
}

/// Composite filter object for a structured search.
///
/// The `credit_line` and `provenance` columns are plain-text and
/// language-mixed; FTS matches may cross languages. No disambiguation is
/// applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchFilters {
    // Vocabulary lookups
    pub subject: Option<String>,
    pub depicted_person: Option<String>,
    pub depicted_place: Option<String>,
    pub production_place: Option<String>,
    pub birth_place: Option<String>,
    pub death_place: Option<String>,
    pub profession: Option<String>,
    pub material: Option<String>,
    pub technique: Option<String>,
    #[serde(rename = "type")]
    pub object_type: Option<String>,
    pub creator: Option<String>,
    pub collection_set: Option<String>,
    pub production_role: Option<String>,

    // Iconclass notation shortcut
    pub iconclass: Option<String>,

    // Direct columns
    pub license: Option<String>,

    // Full-text
    pub inscription: Option<String>,
    pub provenance: Option<String>,
    pub credit_line: Option<String>,
    pub narrative: Option<String>,
    pub title: Option<String>,

    // Numeric / range
    pub min_height: Option<f64>,
    pub max_height: Option<f64>,
    pub min_width: Option<f64>,
    pub max_width: Option<f64>,
    pub creation_date: Option<String>,

    // Geospatial
    pub near_place: Option<String>,
    pub near_lat: Option<f64>,
    pub near_lon: Option<f64>,
    pub near_place_radius: Option<f64>,

    pub max_results: Option<usize>,
}

/// Allowed `maxResults` window.
pub const MAX_RESULTS_CAP: usize = 100;
pub const DEFAULT_MAX_RESULTS: usize = 25;

impl SearchFilters {
    /// Effective result limit: default 25, silently capped at 100, floor 1.
    pub fn effective_limit(&self) -> usize {
        self.max_results
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, MAX_RESULTS_CAP)
    }

    /// True when no filter at all is active.
    pub fn is_empty(&self) -> bool {
        self.vocab_filters().is_empty()
            && self.iconclass.is_none()
            && self.license.is_none()
            && self.text_filters().is_empty()
            && self.min_height.is_none()
            && self.max_height.is_none()
            && self.min_width.is_none()
            && self.max_width.is_none()
            && self.creation_date.is_none()
            && !self.has_geo()
    }

    pub fn has_geo(&self) -> bool {
        self.near_place.is_some() || (self.near_lat.is_some() && self.near_lon.is_some())
    }

    /// Expand the active vocabulary-class filters into their join recipes.
    ///
    /// Place-valued filters join on both `subject` and `spatial`: the index
    /// conflates depicted and production places for some geocoded terms.
    pub fn vocab_filters(&self) -> Vec<VocabFilter> {
        let mut out = Vec::new();
        let mut push = |name: &'static str,
                        term: &Option<String>,
                        fields: Vec<MappingField>,
                        term_type: TermType,
                        place_fallback: bool| {
            if let Some(term) = term
                && !term.trim().is_empty()
            {
                out.push(VocabFilter {
                    name,
                    term: term.trim().to_string(),
                    fields,
                    term_type,
                    place_fallback,
                });
            }
        };

        push(
            "subject",
            &self.subject,
            vec![MappingField::Subject],
            TermType::Any,
            false,
        );
        push(
            "depictedPerson",
            &self.depicted_person,
            vec![MappingField::Subject],
            TermType::Person,
            false,
        );
        push(
            "depictedPlace",
            &self.depicted_place,
            vec![MappingField::Subject, MappingField::Spatial],
            TermType::Place,
            true,
        );
        push(
            "productionPlace",
            &self.production_place,
            vec![MappingField::Subject, MappingField::Spatial],
            TermType::Place,
            true,
        );
        push(
            "birthPlace",
            &self.birth_place,
            vec![MappingField::BirthPlace],
            TermType::Place,
            true,
        );
        push(
            "deathPlace",
            &self.death_place,
            vec![MappingField::DeathPlace],
            TermType::Place,
            true,
        );
        push(
            "profession",
            &self.profession,
            vec![MappingField::Profession],
            TermType::Any,
            false,
        );
        push(
            "material",
            &self.material,
            vec![MappingField::Material],
            TermType::Classification,
            false,
        );
        push(
            "technique",
            &self.technique,
            vec![MappingField::Technique],
            TermType::Classification,
            false,
        );
        push(
            "type",
            &self.object_type,
            vec![MappingField::Type],
            TermType::Classification,
            false,
        );
        push(
            "creator",
            &self.creator,
            vec![MappingField::Creator],
            TermType::Person,
            false,
        );
        push(
            "collectionSet",
            &self.collection_set,
            vec![MappingField::CollectionSet],
            TermType::Set,
            false,
        );
        push(
            "productionRole",
            &self.production_role,
            vec![MappingField::ProductionRole],
            TermType::Any,
            false,
        );
        out
    }

    /// Active full-text filters as `(filter name, FTS column, raw query)`.
    pub fn text_filters(&self) -> Vec<(&'static str, &'static str, &str)> {
        [
            ("inscription", "inscription_text", self.inscription.as_deref()),
            ("provenance", "provenance_text", self.provenance.as_deref()),
            ("creditLine", "credit_line", self.credit_line.as_deref()),
            ("narrative", "narrative_text", self.narrative.as_deref()),
            ("title", "title_all_text", self.title.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, column, value)| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (name, column, v))
        })
        .collect()
    }
}

/// An inclusive year range produced by the date wildcard grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub earliest: i32,
    pub latest: i32,
}

/// Parse the date wildcard grammar.
///
/// `"1642"` → `[1642, 1642]`; `"164*"` → `[1640, 1649]`; `"16*"` →
/// `[1600, 1699]`; `"-5*"` → `[-5999, -5000]`. Years use the 4-digit
/// convention, negative for BCE. Returns `None` on malformed input.
pub fn parse_date_query(input: &str) -> Option<DateRange> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    let (negative, body) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };
    let (digits, wildcard) = match body.strip_suffix('*') {
        Some(prefix) => (prefix, true),
        None => (body, false),
    };
    if digits.is_empty() || digits.len() > 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let value: i32 = digits.parse().ok()?;
    let (lo, hi) = if wildcard {
        let span = 10i32.pow((4 - digits.len()) as u32);
        (value * span, value * span + span - 1)
    } else {
        (value, value)
    };
    Some(if negative {
        DateRange {
            earliest: -hi,
            latest: -lo,
        }
    } else {
        DateRange {
            earliest: lo,
            latest: hi,
        }
    })
}

/// Sanitise free text into a safe FTS5 MATCH expression.
///
/// Tokens are stripped of FTS syntax characters and double-quoted, then
/// joined with implicit AND. An empty result is the guaranteed-safe
/// zero-result short circuit.
pub fn sanitize_fts_query(input: &str) -> Option<String> {
    let tokens: Vec<String> = input
        .split_whitespace()
        .map(|token| {
            token
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_year() {
        assert_eq!(
            parse_date_query("1642"),
            Some(DateRange {
                earliest: 1642,
                latest: 1642
            })
        );
    }

    #[test]
    fn decade_wildcard() {
        assert_eq!(
            parse_date_query("164*"),
            Some(DateRange {
                earliest: 1640,
                latest: 1649
            })
        );
    }

    #[test]
    fn century_wildcard() {
        assert_eq!(
            parse_date_query("16*"),
            Some(DateRange {
                earliest: 1600,
                latest: 1699
            })
        );
    }

    #[test]
    fn bce_wildcard() {
        assert_eq!(
            parse_date_query("-5*"),
            Some(DateRange {
                earliest: -5999,
                latest: -5000
            })
        );
    }

    #[test]
    fn malformed_dates_rejected() {
        assert_eq!(parse_date_query(""), None);
        assert_eq!(parse_date_query("*"), None);
        assert_eq!(parse_date_query("abc"), None);
        assert_eq!(parse_date_query("16*4"), None);
        assert_eq!(parse_date_query("16425"), None);
        assert_eq!(parse_date_query("-"), None);
    }

    #[test]
    fn fts_sanitisation_strips_operators() {
        assert_eq!(
            sanitize_fts_query("Rembrandt's \"best\" (work)"),
            Some("\"Rembrandts\" \"best\" \"work\"".to_string())
        );
    }

    #[test]
    fn fts_sanitisation_empty_query() {
        assert_eq!(sanitize_fts_query("()*:\"-"), None);
        assert_eq!(sanitize_fts_query("   "), None);
    }

    #[test]
    fn limit_defaults_and_caps() {
        let mut f = SearchFilters::default();
        assert_eq!(f.effective_limit(), 25);
        f.max_results = Some(1000);
        assert_eq!(f.effective_limit(), 100);
        f.max_results = Some(0);
        assert_eq!(f.effective_limit(), 1);
        f.max_results = Some(1);
        assert_eq!(f.effective_limit(), 1);
    }

    #[test]
    fn place_filters_join_subject_and_spatial() {
        let filters = SearchFilters {
            depicted_place: Some("Amsterdam".to_string()),
            ..Default::default()
        };
        let v = filters.vocab_filters();
        assert_eq!(v.len(), 1);
        assert_eq!(
            v[0].fields,
            vec![MappingField::Subject, MappingField::Spatial]
        );
        assert!(v[0].place_fallback);
    }

    #[test]
    fn empty_detection() {
        assert!(SearchFilters::default().is_empty());
        let f = SearchFilters {
            near_lat: Some(52.0),
            near_lon: Some(4.8),
            ..Default::default()
        };
        assert!(!f.is_empty());
        // Latitude alone is not a geo filter
        let f = SearchFilters {
            near_lat: Some(52.0),
            ..Default::default()
        };
        assert!(f.is_empty());
    }
}
