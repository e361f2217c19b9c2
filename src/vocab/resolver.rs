//! Vocabulary term resolution.
//!
//! Matches a user-supplied term against the vocabulary table in tiers:
//! FTS5 over labels where available, then case-insensitive LIKE, then the
//! space-stripped normalised label variants. Place terms that resolve to
//! nothing get one more chance through the multi-word resolver, which
//! splits queries like "Oude Kerk Amsterdam" into a name and a geographic
//! context.

use super::VocabFeatures;
use super::filters::{TermType, sanitize_fts_query};
use super::geo::GeoPoint;
use rusqlite::Connection;

/// A vocabulary row a filter term resolved to.
#[derive(Debug, Clone)]
pub struct ResolvedTerm {
    pub vocab_id: String,
    pub label: String,
    pub point: Option<GeoPoint>,
}

/// Context places within this distance of a name candidate keep it.
const CONTEXT_RADIUS_KM: f64 = 100.0;

fn row_to_term(row: &rusqlite::Row<'_>) -> rusqlite::Result<ResolvedTerm> {
    let lat: Option<f64> = row.get(2)?;
    let lon: Option<f64> = row.get(3)?;
    Ok(ResolvedTerm {
        vocab_id: row.get(0)?,
        label: row
            .get::<_, Option<String>>(1)?
            .unwrap_or_else(|| "(unlabelled)".to_string()),
        point: match (lat, lon) {
            (Some(lat), Some(lon)) => Some(GeoPoint { lat, lon }),
            _ => None,
        },
    })
}

/// Resolve `term` against the vocabulary, restricted to `term_type`.
///
/// Returns an empty set when the term sanitises to an empty FTS query; the
/// caller treats that as a guaranteed zero-result short circuit.
pub fn resolve_terms(
    conn: &Connection,
    features: &VocabFeatures,
    term: &str,
    term_type: TermType,
) -> rusqlite::Result<Vec<ResolvedTerm>> {
    if features.vocab_fts {
        let Some(fts_query) = sanitize_fts_query(term) else {
            return Ok(Vec::new());
        };
        let type_clause = match term_type.as_sql() {
            Some(_) => "AND v.type = ?2",
            None => "",
        };
        let sql = format!(
            "SELECT v.vocab_id, COALESCE(v.label_en, v.label_nl), v.lat, v.lon
             FROM vocabulary_fts f
             JOIN vocabulary v ON v.id = f.rowid
             WHERE vocabulary_fts MATCH ?1 {type_clause}"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = match term_type.as_sql() {
            Some(t) => stmt.query_map(rusqlite::params![fts_query, t], row_to_term)?,
            None => stmt.query_map(rusqlite::params![fts_query], row_to_term)?,
        };
        return rows.collect();
    }
    resolve_terms_like(conn, features, term, term_type)
}

/// LIKE-tier resolution: case-insensitive label match, widened to the
/// normalised (space-stripped) variants when the index carries them. The
/// normalised pass equates "printmaker" with "print maker".
pub fn resolve_terms_like(
    conn: &Connection,
    features: &VocabFeatures,
    term: &str,
    term_type: TermType,
) -> rusqlite::Result<Vec<ResolvedTerm>> {
    let mut params: Vec<String> = vec![format!("%{}%", term.trim())];
    let mut label_clause = String::from("(v.label_en LIKE ?1 OR v.label_nl LIKE ?1");
    if features.norm_labels {
        params.push(format!("%{}%", normalize_label(term)));
        label_clause.push_str(" OR v.label_en_norm LIKE ?2 OR v.label_nl_norm LIKE ?2");
    }
    label_clause.push(')');
    let type_clause = match term_type.as_sql() {
        Some(t) => {
            params.push(t.to_string());
            format!("AND v.type = ?{}", params.len())
        }
        None => String::new(),
    };
    let sql = format!(
        "SELECT v.vocab_id, COALESCE(v.label_en, v.label_nl), v.lat, v.lon
         FROM vocabulary v
         WHERE {label_clause} {type_clause}"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), row_to_term)?;
    rows.collect()
}

/// Space-stripped, lowercased label form matching the `*_norm` columns.
pub fn normalize_label(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Resolve an Iconclass notation directly against `vocabulary.notation`.
pub fn resolve_notation(conn: &Connection, notation: &str) -> rusqlite::Result<Vec<ResolvedTerm>> {
    let mut stmt = conn.prepare_cached(
        "SELECT vocab_id, COALESCE(label_en, label_nl), lat, lon
         FROM vocabulary WHERE notation = ?1",
    )?;
    stmt.query_map([notation], row_to_term)?.collect()
}

/// Outcome of the multi-word place resolver: the surviving candidates and a
/// human-readable description of how the query was interpreted.
#[derive(Debug)]
pub struct PlaceResolution {
    pub candidates: Vec<ResolvedTerm>,
    pub interpretation: String,
}

/// Resolve a multi-word place query that had no direct vocabulary match.
///
/// Tries a comma split first ("Oude Kerk, Amsterdam"), then progressive
/// right-token dropping. When the context part geocodes, candidates are
/// ranked by distance to it and culled to 100 km (or the single closest).
pub fn resolve_place_multiword(
    conn: &Connection,
    features: &VocabFeatures,
    query: &str,
) -> rusqlite::Result<Option<PlaceResolution>> {
    if let Some((name, context)) = query.split_once(',') {
        let name = name.trim();
        let context = context.trim();
        if !name.is_empty() && !context.is_empty() {
            let candidates = resolve_terms(conn, features, name, TermType::Place)?;
            if !candidates.is_empty() {
                return Ok(Some(rank_by_context(
                    conn, features, candidates, name, context,
                )?));
            }
        }
    }

    let tokens: Vec<&str> = query.split_whitespace().collect();
    if tokens.len() < 2 {
        return Ok(None);
    }
    for split in (1..tokens.len()).rev() {
        let name = tokens[..split].join(" ");
        let context = tokens[split..].join(" ");
        let candidates = resolve_terms(conn, features, &name, TermType::Place)?;
        if !candidates.is_empty() {
            return Ok(Some(rank_by_context(
                conn, features, candidates, &name, &context,
            )?));
        }
    }
    Ok(None)
}

fn rank_by_context(
    conn: &Connection,
    features: &VocabFeatures,
    mut candidates: Vec<ResolvedTerm>,
    name: &str,
    context: &str,
) -> rusqlite::Result<PlaceResolution> {
    let Some(context_point) = resolve_context_point(conn, features, context)? else {
        return Ok(PlaceResolution {
            interpretation: format!(
                "Interpreted '{name} {context}' as place '{name}'; context '{context}' \
                 did not geocode, returning all {} candidate(s) unranked",
                candidates.len()
            ),
            candidates,
        });
    };

    let mut ranked: Vec<(f64, ResolvedTerm)> = candidates
        .drain(..)
        .filter_map(|c| c.point.map(|p| (p.distance_km(&context_point), c)))
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

    let within: Vec<ResolvedTerm> = ranked
        .iter()
        .filter(|(d, _)| *d <= CONTEXT_RADIUS_KM)
        .map(|(_, c)| c.clone())
        .collect();
    let kept = if !within.is_empty() {
        within
    } else {
        ranked.into_iter().take(1).map(|(_, c)| c).collect()
    };

    Ok(PlaceResolution {
        interpretation: format!(
            "Interpreted '{name} {context}' as place '{name}' near '{context}', \
             keeping {} candidate(s) ranked by distance",
            kept.len()
        ),
        candidates: kept,
    })
}

/// Geocode the context token. Exact case-insensitive label matches win;
/// otherwise the shortest-labelled FTS match is taken.
fn resolve_context_point(
    conn: &Connection,
    features: &VocabFeatures,
    context: &str,
) -> rusqlite::Result<Option<GeoPoint>> {
    let mut stmt = conn.prepare_cached(
        "SELECT lat, lon FROM vocabulary
         WHERE type = 'place' AND lat IS NOT NULL AND lon IS NOT NULL
           AND (LOWER(label_en) = LOWER(?1) OR LOWER(label_nl) = LOWER(?1))
         LIMIT 1",
    )?;
    let exact = stmt
        .query_row([context], |row| {
            Ok(GeoPoint {
                lat: row.get(0)?,
                lon: row.get(1)?,
            })
        })
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    if exact.is_some() {
        return Ok(exact);
    }

    let mut best: Option<(usize, GeoPoint)> = None;
    for term in resolve_terms(conn, features, context, TermType::Place)? {
        let Some(point) = term.point else { continue };
        let len = term.label.len();
        if best.as_ref().is_none_or(|(l, _)| len < *l) {
            best = Some((len, point));
        }
    }
    Ok(best.map(|(_, p)| p))
}
