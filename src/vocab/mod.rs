//! Structured vocabulary search over the denormalised artwork index (C1).
//!
//! Every active filter contributes one `object_number IN (…)` predicate;
//! predicates are AND-combined. Filters that resolve to zero vocabulary
//! terms short-circuit the whole query to an empty result rather than
//! letting the remaining filters produce misleading matches.

pub mod filters;
pub mod geo;
pub mod resolver;

use crate::config::IndexConfig;
use crate::error::{ErrorContext, RetrievalResult, Warnings};
use crate::storage::{self, SQL_VAR_LIMIT, placeholders};
use filters::{MappingField, SearchFilters, parse_date_query, sanitize_fts_query};
use geo::{GeoPoint, effective_radius, round_km};
use parking_lot::Mutex;
use resolver::{ResolvedTerm, resolve_notation, resolve_place_multiword, resolve_terms};
use rusqlite::Connection;
use rusqlite::types::Value as SqlValue;
use serde::Serialize;
use std::collections::HashMap;

const INDEX: &str = "vocabulary";

/// Optional features of the vocabulary index, discovered by probing at open.
#[derive(Debug, Clone, Default)]
pub struct VocabFeatures {
    pub vocab_fts: bool,
    pub text_fts: bool,
    pub norm_labels: bool,
    pub coordinates: bool,
    pub dimensions: bool,
    pub dates: bool,
}

/// One row of a structured search response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtworkSummary {
    pub object_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nearest_place: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

/// Result of a structured search.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    /// Only present when cheap to compute (single-predicate queries).
    pub total_results: Option<u64>,
    pub results: Vec<ArtworkSummary>,
    pub warnings: Warnings,
}

/// Geo context carried from planning into result annotation.
struct GeoContext {
    /// Matched geocoded places within the radius, by vocab id.
    places: HashMap<String, (String, GeoPoint)>,
    reference: GeoPoint,
}

struct Predicate {
    sql: String,
    params: Vec<SqlValue>,
}

#[derive(Default)]
struct QueryPlan {
    predicates: Vec<Predicate>,
    geo: Option<GeoContext>,
    warnings: Warnings,
    /// A filter is guaranteed to match nothing; skip execution entirely.
    short_circuit: bool,
}

/// Structured search engine over `vocabulary.db`.
#[derive(Debug)]
pub struct VocabularyEngine {
    conn: Mutex<Connection>,
    features: VocabFeatures,
}

impl VocabularyEngine {
    /// Open the index read-only and probe its optional features.
    pub fn open(config: &IndexConfig) -> RetrievalResult<Self> {
        let conn = storage::open_index(&config.vocabulary_path, INDEX, config.mmap_size)?;
        storage::register_functions(&conn).on_index(INDEX)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        let features = VocabFeatures {
            vocab_fts: storage::table_exists(&conn, "vocabulary_fts"),
            text_fts: storage::table_exists(&conn, "artwork_texts_fts"),
            norm_labels: storage::column_exists(&conn, "vocabulary", "label_en_norm"),
            coordinates: storage::column_exists(&conn, "vocabulary", "lat"),
            dimensions: storage::column_exists(&conn, "artworks", "height_cm"),
            dates: storage::column_exists(&conn, "artworks", "date_earliest"),
        };
        tracing::info!(target: "vocab", "vocabulary index open: {features:?}");
        Self {
            conn: Mutex::new(conn),
            features,
        }
    }

    pub fn features(&self) -> &VocabFeatures {
        &self.features
    }

    /// Run a structured search: plan, execute, annotate.
    pub fn search(&self, filters: &SearchFilters) -> RetrievalResult<SearchOutcome> {
        let limit = filters.effective_limit();
        let conn = self.conn.lock();
        let plan = self.plan(&conn, filters)?;
        if plan.short_circuit || plan.predicates.is_empty() {
            let mut warnings = plan.warnings;
            if plan.predicates.is_empty() && !plan.short_circuit {
                warnings.push("no executable filter predicates remained after planning");
            }
            return Ok(SearchOutcome {
                total_results: Some(0),
                results: Vec::new(),
                warnings,
            });
        }

        let mut warnings = plan.warnings;
        let where_clause = plan
            .predicates
            .iter()
            .map(|p| format!("({})", p.sql))
            .collect::<Vec<_>>()
            .join(" AND ");
        let params: Vec<&SqlValue> = plan.predicates.iter().flat_map(|p| &p.params).collect();

        let date_cols = if self.features.dates {
            "a.date_earliest, a.date_latest"
        } else {
            "NULL, NULL"
        };
        let sql = format!(
            "SELECT a.object_number, a.title, a.creator_label, {date_cols}, a.url
             FROM artworks a WHERE {where_clause} LIMIT {limit}"
        );
        let mut stmt = conn.prepare(&sql).on_index(INDEX)?;
        let mut results: Vec<ArtworkSummary> = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                let earliest: Option<i64> = row.get(3)?;
                let latest: Option<i64> = row.get(4)?;
                Ok(ArtworkSummary {
                    object_number: row.get(0)?,
                    title: row.get(1)?,
                    creator: row.get(2)?,
                    date: render_date(earliest, latest),
                    object_type: None,
                    url: row.get(5)?,
                    nearest_place: None,
                    distance_km: None,
                })
            })
            .on_index(INDEX)?
            .collect::<Result<_, _>>()
            .on_index(INDEX)?;

        // Total count is only cheap for single-predicate queries; multi-filter
        // intersections would pay the full query cost again.
        let total_results = if plan.predicates.len() == 1 {
            let count_sql = format!("SELECT COUNT(*) FROM artworks a WHERE {where_clause}");
            let count: u64 = conn
                .query_row(
                    &count_sql,
                    rusqlite::params_from_iter(params.iter()),
                    |row| row.get(0),
                )
                .on_index(INDEX)?;
            Some(count)
        } else {
            None
        };

        self.annotate_types(&conn, &mut results)?;
        if let Some(geo) = &plan.geo {
            self.annotate_nearest_place(&conn, &mut results, geo)?;
        }
        if results.is_empty() && warnings.is_empty() {
            warnings.push("query executed successfully but matched no artworks");
        }

        Ok(SearchOutcome {
            total_results,
            results,
            warnings,
        })
    }

    /// Candidate object numbers for the semantic bridge: same planning, no
    /// limit, no annotation.
    pub fn candidate_object_numbers(
        &self,
        filters: &SearchFilters,
    ) -> RetrievalResult<(Vec<String>, Warnings)> {
        let conn = self.conn.lock();
        let plan = self.plan(&conn, filters)?;
        if plan.short_circuit || plan.predicates.is_empty() {
            return Ok((Vec::new(), plan.warnings));
        }
        let where_clause = plan
            .predicates
            .iter()
            .map(|p| format!("({})", p.sql))
            .collect::<Vec<_>>()
            .join(" AND ");
        let params: Vec<&SqlValue> = plan.predicates.iter().flat_map(|p| &p.params).collect();
        let sql = format!("SELECT a.object_number FROM artworks a WHERE {where_clause}");
        let mut stmt = conn.prepare(&sql).on_index(INDEX)?;
        let ids = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| row.get(0))
            .on_index(INDEX)?
            .collect::<Result<Vec<String>, _>>()
            .on_index(INDEX)?;
        Ok((ids, plan.warnings))
    }

    /// Batched summaries for known object numbers, keyed by object number.
    /// Used to decorate semantic hits; unknown numbers are simply absent.
    pub fn summaries_for(
        &self,
        object_numbers: &[String],
    ) -> RetrievalResult<HashMap<String, ArtworkSummary>> {
        let conn = self.conn.lock();
        let date_cols = if self.features.dates {
            "a.date_earliest, a.date_latest"
        } else {
            "NULL, NULL"
        };
        let mut out = HashMap::new();
        let mut rows_buf: Vec<ArtworkSummary> = Vec::new();
        for chunk in object_numbers.chunks(SQL_VAR_LIMIT) {
            let sql = format!(
                "SELECT a.object_number, a.title, a.creator_label, {date_cols}, a.url
                 FROM artworks a WHERE a.object_number IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare_cached(&sql).on_index(INDEX)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                    let earliest: Option<i64> = row.get(3)?;
                    let latest: Option<i64> = row.get(4)?;
                    Ok(ArtworkSummary {
                        object_number: row.get(0)?,
                        title: row.get(1)?,
                        creator: row.get(2)?,
                        date: render_date(earliest, latest),
                        object_type: None,
                        url: row.get(5)?,
                        nearest_place: None,
                        distance_km: None,
                    })
                })
                .on_index(INDEX)?;
            for row in rows {
                rows_buf.push(row.on_index(INDEX)?);
            }
        }
        self.annotate_types(&conn, &mut rows_buf)?;
        for summary in rows_buf {
            out.insert(summary.object_number.clone(), summary);
        }
        Ok(out)
    }

    /// Reconstruct the embedding source text for an artwork from the
    /// structured index: title, creator, subject labels, and the narrative
    /// and inscription texts where the text FTS table carries them.
    pub fn source_text(&self, object_number: &str) -> RetrievalResult<Option<String>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT rowid, title, creator_label FROM artworks WHERE object_number = ?1",
                [object_number],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .on_index(INDEX)?;
        let Some((rowid, title, creator)) = row else {
            return Ok(None);
        };

        let mut parts = Vec::new();
        if let Some(title) = title.filter(|t| !t.is_empty()) {
            parts.push(format!("title: {title}"));
        }
        if let Some(creator) = creator.filter(|c| !c.is_empty()) {
            parts.push(format!("creator: {creator}"));
        }

        let mut stmt = conn
            .prepare_cached(
                "SELECT COALESCE(v.label_en, v.label_nl) FROM mappings m
                 JOIN vocabulary v ON v.vocab_id = m.vocab_id
                 WHERE m.object_number = ?1 AND m.field = 'subject'",
            )
            .on_index(INDEX)?;
        let subjects: Vec<String> = stmt
            .query_map([object_number], |row| row.get::<_, Option<String>>(0))
            .on_index(INDEX)?
            .filter_map(|r| r.ok().flatten())
            .collect();
        if !subjects.is_empty() {
            parts.push(format!("subjects: {}", subjects.join(", ")));
        }

        if self.features.text_fts {
            let texts = conn
                .query_row(
                    "SELECT narrative_text, inscription_text FROM artwork_texts_fts
                     WHERE rowid = ?1",
                    [rowid],
                    |row| {
                        Ok((
                            row.get::<_, Option<String>>(0)?,
                            row.get::<_, Option<String>>(1)?,
                        ))
                    },
                )
                .unwrap_or((None, None));
            if let Some(narrative) = texts.0.filter(|t| !t.is_empty()) {
                parts.push(format!("narrative: {narrative}"));
            }
            if let Some(inscriptions) = texts.1.filter(|t| !t.is_empty()) {
                parts.push(format!("inscriptions: {inscriptions}"));
            }
        }

        if parts.is_empty() {
            Ok(None)
        } else {
            Ok(Some(parts.join("\n")))
        }
    }

    // ---- planning -------------------------------------------------------

    fn plan(&self, conn: &Connection, filters: &SearchFilters) -> RetrievalResult<QueryPlan> {
        let mut plan = QueryPlan::default();
        let mut filters = filters.clone();

        // Geo exclusivity rules are applied before anything else so dropped
        // filters never resolve terms.
        if filters.has_geo() {
            if filters.near_lat.is_some() && filters.near_lon.is_some() && filters.near_place.is_some()
            {
                plan.warnings.push(
                    "both nearPlace and coordinates were given; coordinates take precedence",
                );
                filters.near_place = None;
            }
            if filters.depicted_place.is_some() || filters.production_place.is_some() {
                plan.warnings.push(
                    "nearPlace is mutually exclusive with depictedPlace/productionPlace; \
                     the place filters were dropped",
                );
                filters.depicted_place = None;
                filters.production_place = None;
            }
        }

        for vocab_filter in filters.vocab_filters() {
            self.plan_vocab_filter(conn, &mut plan, &vocab_filter)?;
            if plan.short_circuit {
                return Ok(plan);
            }
        }

        if let Some(notation) = filters.iconclass.as_deref().map(str::trim).filter(|n| !n.is_empty())
        {
            let terms = resolve_notation(conn, notation).on_index(INDEX)?;
            if terms.is_empty() {
                plan.warnings
                    .push(format!("iconclass notation '{notation}' matched zero vocabulary terms"));
                plan.short_circuit = true;
                return Ok(plan);
            }
            plan.predicates.push(mapping_predicate(
                &[MappingField::Subject],
                terms.iter().map(|t| t.vocab_id.clone()),
            ));
        }

        if let Some(license) = filters.license.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            plan.predicates.push(Predicate {
                sql: "a.rights_uri LIKE ?".to_string(),
                params: vec![SqlValue::Text(format!("%{license}%"))],
            });
        }

        for (name, column, raw) in filters.text_filters() {
            if !self.features.text_fts {
                plan.warnings.push(format!(
                    "text filter '{name}' requires the artwork text FTS table, which this \
                     index does not carry"
                ));
                plan.short_circuit = true;
                return Ok(plan);
            }
            let Some(query) = sanitize_fts_query(raw) else {
                plan.warnings.push(format!(
                    "text filter '{name}' was empty after sanitisation; it cannot match"
                ));
                plan.short_circuit = true;
                return Ok(plan);
            };
            plan.predicates.push(Predicate {
                sql: "a.rowid IN (SELECT rowid FROM artwork_texts_fts WHERE artwork_texts_fts MATCH ?)"
                    .to_string(),
                params: vec![SqlValue::Text(format!("{column}: ({query})"))],
            });
        }

        self.plan_dimensions(&mut plan, &filters)?;
        if plan.short_circuit {
            return Ok(plan);
        }

        if let Some(date_query) = filters.creation_date.as_deref().map(str::trim).filter(|d| !d.is_empty())
        {
            if !self.features.dates {
                plan.warnings
                    .push("creationDate filter requires date columns, which this index does not carry");
                plan.short_circuit = true;
                return Ok(plan);
            }
            match parse_date_query(date_query) {
                Some(range) => plan.predicates.push(Predicate {
                    sql: "a.date_earliest <= ? AND a.date_latest >= ?".to_string(),
                    params: vec![
                        SqlValue::Integer(range.latest as i64),
                        SqlValue::Integer(range.earliest as i64),
                    ],
                }),
                None => plan.warnings.push(format!(
                    "creationDate '{date_query}' is not a year or wildcard pattern; filter ignored"
                )),
            }
        }

        if filters.has_geo() {
            self.plan_geo(conn, &mut plan, &filters)?;
        }

        Ok(plan)
    }

    fn plan_vocab_filter(
        &self,
        conn: &Connection,
        plan: &mut QueryPlan,
        filter: &filters::VocabFilter,
    ) -> RetrievalResult<()> {
        let mut terms = resolve_terms(conn, &self.features, &filter.term, filter.term_type)
            .on_index(INDEX)?;

        if terms.is_empty() && filter.place_fallback {
            if let Some(resolution) =
                resolve_place_multiword(conn, &self.features, &filter.term).on_index(INDEX)?
            {
                plan.warnings.push(resolution.interpretation);
                terms = resolution.candidates;
            }
        }

        if terms.is_empty() {
            plan.warnings.push(format!(
                "filter '{}' ('{}') matched zero vocabulary terms",
                filter.name, filter.term
            ));
            plan.short_circuit = true;
            return Ok(());
        }

        plan.predicates.push(mapping_predicate(
            &filter.fields,
            terms.into_iter().map(|t| t.vocab_id),
        ));
        Ok(())
    }

    fn plan_dimensions(&self, plan: &mut QueryPlan, filters: &SearchFilters) -> RetrievalResult<()> {
        let bounds = [
            ("minHeight", "a.height_cm >= ?", filters.min_height),
            ("maxHeight", "a.height_cm <= ?", filters.max_height),
            ("minWidth", "a.width_cm >= ?", filters.min_width),
            ("maxWidth", "a.width_cm <= ?", filters.max_width),
        ];
        for (name, sql, value) in bounds {
            let Some(value) = value else { continue };
            if !self.features.dimensions {
                plan.warnings.push(format!(
                    "dimension filter '{name}' requires dimension columns, which this index \
                     does not carry"
                ));
                plan.short_circuit = true;
                return Ok(());
            }
            plan.predicates.push(Predicate {
                sql: sql.to_string(),
                params: vec![SqlValue::Real(value)],
            });
        }
        Ok(())
    }

    fn plan_geo(
        &self,
        conn: &Connection,
        plan: &mut QueryPlan,
        filters: &SearchFilters,
    ) -> RetrievalResult<()> {
        if !self.features.coordinates {
            plan.warnings
                .push("proximity search requires geocoded vocabulary, which this index does not carry");
            plan.short_circuit = true;
            return Ok(());
        }

        let radius = effective_radius(filters.near_place_radius);
        let reference = match (filters.near_lat, filters.near_lon) {
            (Some(lat), Some(lon)) => GeoPoint { lat, lon },
            _ => {
                let name = filters.near_place.as_deref().unwrap_or_default();
                match self.resolve_reference_point(conn, plan, name)? {
                    Some(point) => point,
                    None => {
                        plan.warnings
                            .push(format!("nearPlace '{name}' could not be resolved to coordinates"));
                        plan.short_circuit = true;
                        return Ok(());
                    }
                }
            }
        };

        let bbox = reference.bounding_box(radius);
        let mut stmt = conn
            .prepare_cached(
                "SELECT vocab_id, COALESCE(label_en, label_nl), lat, lon FROM vocabulary
                 WHERE lat BETWEEN ?1 AND ?2 AND lon BETWEEN ?3 AND ?4
                   AND lat IS NOT NULL AND lon IS NOT NULL",
            )
            .on_index(INDEX)?;
        let boxed: Vec<(String, String, GeoPoint)> = stmt
            .query_map(
                rusqlite::params![bbox.min_lat, bbox.max_lat, bbox.min_lon, bbox.max_lon],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        GeoPoint {
                            lat: row.get(2)?,
                            lon: row.get(3)?,
                        },
                    ))
                },
            )
            .on_index(INDEX)?
            .collect::<Result<_, _>>()
            .on_index(INDEX)?;

        // Precise pass: the bounding box is a superset of the radius.
        let places: HashMap<String, (String, GeoPoint)> = boxed
            .into_iter()
            .filter(|(_, _, p)| reference.distance_km(p) <= radius)
            .map(|(id, label, p)| (id, (label, p)))
            .collect();

        if places.is_empty() {
            plan.warnings.push(format!(
                "no geocoded places within {radius} km of the reference point"
            ));
            plan.short_circuit = true;
            return Ok(());
        }

        plan.predicates.push(mapping_predicate(
            &[MappingField::Subject, MappingField::Spatial],
            places.keys().cloned(),
        ));
        plan.geo = Some(GeoContext { places, reference });
        Ok(())
    }

    /// Geocode the `nearPlace` reference: direct resolution first, then the
    /// multi-word resolver (with its interpretation surfaced as a warning).
    fn resolve_reference_point(
        &self,
        conn: &Connection,
        plan: &mut QueryPlan,
        name: &str,
    ) -> RetrievalResult<Option<GeoPoint>> {
        let direct = resolve_terms(conn, &self.features, name, filters::TermType::Place)
            .on_index(INDEX)?;
        if let Some(point) = pick_reference(&direct) {
            return Ok(Some(point));
        }
        if let Some(resolution) =
            resolve_place_multiword(conn, &self.features, name).on_index(INDEX)?
        {
            let point = pick_reference(&resolution.candidates);
            plan.warnings.push(resolution.interpretation);
            return Ok(point);
        }
        Ok(None)
    }

    // ---- annotation -----------------------------------------------------

    /// Batched object-type labels for the result page.
    fn annotate_types(
        &self,
        conn: &Connection,
        results: &mut [ArtworkSummary],
    ) -> RetrievalResult<()> {
        if results.is_empty() {
            return Ok(());
        }
        let ids: Vec<&str> = results.iter().map(|r| r.object_number.as_str()).collect();
        let mut labels: HashMap<String, String> = HashMap::new();
        for chunk in ids.chunks(SQL_VAR_LIMIT) {
            let sql = format!(
                "SELECT m.object_number, COALESCE(v.label_en, v.label_nl)
                 FROM mappings m JOIN vocabulary v ON v.vocab_id = m.vocab_id
                 WHERE m.field = 'type' AND m.object_number IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare_cached(&sql).on_index(INDEX)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
                })
                .on_index(INDEX)?;
            for row in rows {
                let (object_number, label) = row.on_index(INDEX)?;
                if let Some(label) = label {
                    labels.entry(object_number).or_insert(label);
                }
            }
        }
        for result in results {
            result.object_type = labels.get(&result.object_number).cloned();
        }
        Ok(())
    }

    /// Annotate each result with its nearest matched geocoded place.
    fn annotate_nearest_place(
        &self,
        conn: &Connection,
        results: &mut [ArtworkSummary],
        geo: &GeoContext,
    ) -> RetrievalResult<()> {
        if results.is_empty() {
            return Ok(());
        }
        let ids: Vec<&str> = results.iter().map(|r| r.object_number.as_str()).collect();
        let mut nearest: HashMap<String, (String, f64)> = HashMap::new();
        for chunk in ids.chunks(SQL_VAR_LIMIT) {
            let sql = format!(
                "SELECT m.object_number, m.vocab_id FROM mappings m
                 WHERE m.field IN ('subject', 'spatial') AND m.object_number IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare_cached(&sql).on_index(INDEX)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .on_index(INDEX)?;
            for row in rows {
                let (object_number, vocab_id) = row.on_index(INDEX)?;
                let Some((label, point)) = geo.places.get(&vocab_id) else {
                    continue;
                };
                let distance = round_km(geo.reference.distance_km(point));
                match nearest.get(&object_number) {
                    Some((_, best)) if *best <= distance => {}
                    _ => {
                        nearest.insert(object_number, (label.clone(), distance));
                    }
                }
            }
        }
        for result in results {
            if let Some((label, distance)) = nearest.get(&result.object_number) {
                result.nearest_place = Some(label.clone());
                result.distance_km = Some(*distance);
            }
        }
        Ok(())
    }
}

/// Render `date_earliest`/`date_latest` as a single year or a range.
fn render_date(earliest: Option<i64>, latest: Option<i64>) -> Option<String> {
    match (earliest, latest) {
        (Some(e), Some(l)) if e == l => Some(e.to_string()),
        (Some(e), Some(l)) => Some(format!("{e}\u{2013}{l}")),
        (Some(e), None) => Some(e.to_string()),
        (None, Some(l)) => Some(l.to_string()),
        (None, None) => None,
    }
}

/// Predicate joining the mapping table on the given fields and vocab ids.
/// Id lists above the statement variable limit are split into OR-grouped
/// chunks within the same subquery.
fn mapping_predicate(
    fields: &[MappingField],
    vocab_ids: impl Iterator<Item = String>,
) -> Predicate {
    let field_list = fields
        .iter()
        .map(|f| format!("'{}'", f.as_str()))
        .collect::<Vec<_>>()
        .join(",");
    let ids: Vec<String> = vocab_ids.collect();
    let id_clause = ids
        .chunks(SQL_VAR_LIMIT)
        .map(|chunk| format!("m.vocab_id IN ({})", placeholders(chunk.len())))
        .collect::<Vec<_>>()
        .join(" OR ");
    Predicate {
        sql: format!(
            "a.object_number IN (SELECT m.object_number FROM mappings m
              WHERE m.field IN ({field_list}) AND ({id_clause}))"
        ),
        params: ids.into_iter().map(SqlValue::Text).collect(),
    }
}

/// Pick the reference coordinate from resolved candidates: the first
/// geocoded one.
fn pick_reference(terms: &[ResolvedTerm]) -> Option<GeoPoint> {
    terms.iter().find_map(|t| t.point)
}
