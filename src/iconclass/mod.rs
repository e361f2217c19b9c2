//! Iconclass notation browser (C4).
//!
//! Lookup, hierarchical browse, and search over the `iconclass.db` index:
//! FTS5 over bilingual texts and keywords, and semantic similarity over
//! notation embeddings that share the artwork model's 384-dim space. Text
//! lookups follow the `[requested, en, nl, any]` language fallback.

use crate::config::IndexConfig;
use crate::error::{ErrorContext, RetrievalError, RetrievalResult, Warnings};
use crate::semantic::embedding::{blob_to_int8, cosine_distance_int8, int8_to_blob};
use crate::storage::{self, SQL_VAR_LIMIT, placeholders};
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

const INDEX: &str = "iconclass";
const MAX_KEYWORDS: usize = 20;

/// One step of a notation's root-to-leaf path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathStep {
    pub notation: String,
    #[serde(default)]
    pub label: String,
}

/// A fully resolved Iconclass entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IconclassEntry {
    pub notation: String,
    /// Preferred-language text for the notation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Ordered path from a root notation down to this one.
    pub path: Vec<PathStep>,
    /// Direct child notation codes.
    pub children: Vec<String>,
    /// Cross-references to related notations.
    pub refs: Vec<String>,
    /// Number of catalogued artworks bearing this notation.
    pub rijks_count: i64,
    pub keywords: Vec<String>,
    /// Present on semantic hits only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}

/// Browse result: the notation itself plus its resolved children.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseOutcome {
    pub entry: IconclassEntry,
    pub children: Vec<IconclassEntry>,
}

pub struct IconclassEngine {
    conn: Mutex<Connection>,
    /// FTS tables present.
    text_fts: bool,
    /// Embeddings sub-table present (semantic mode).
    embeddings: bool,
    /// Vector virtual table usable for pure KNN.
    vec_table: bool,
}

impl IconclassEngine {
    pub fn open(config: &IndexConfig) -> RetrievalResult<Self> {
        let conn = storage::open_index(&config.iconclass_path, INDEX, config.mmap_size)?;
        let extension_loaded =
            storage::load_vector_extension(&conn, config.vector_extension.as_deref())?;
        Self::from_connection(conn, extension_loaded)
    }

    fn from_connection(conn: Connection, extension_loaded: bool) -> RetrievalResult<Self> {
        if !storage::table_exists(&conn, "notations") {
            return Err(RetrievalError::index_unavailable(
                INDEX,
                "missing notations table",
            ));
        }
        let text_fts =
            storage::table_exists(&conn, "texts_fts") && storage::table_exists(&conn, "keywords_fts");
        let embeddings = storage::table_exists(&conn, "iconclass_embeddings");
        let vec_table = extension_loaded
            && conn
                .prepare("SELECT rowid FROM vec_iconclass LIMIT 0")
                .is_ok();
        if !embeddings {
            tracing::info!(target: "iconclass", "no embeddings sub-table; semantic mode disabled");
        }
        Ok(Self {
            conn: Mutex::new(conn),
            text_fts,
            embeddings,
            vec_table,
        })
    }

    /// Semantic search availability (text search is always available).
    pub fn semantic_available(&self) -> bool {
        self.embeddings
    }

    /// Full-text search over notation texts and keywords.
    ///
    /// Matches from both FTS indexes are unioned, deduplicated, and ordered
    /// by `rijks_count` descending then notation ascending.
    pub fn search(
        &self,
        query: &str,
        lang: &str,
        max_results: usize,
        only_with_artworks: bool,
    ) -> RetrievalResult<(Vec<IconclassEntry>, Warnings)> {
        let mut warnings = Warnings::new();
        let conn = self.conn.lock();

        let Some(fts_query) = crate::vocab::filters::sanitize_fts_query(query) else {
            warnings.push("query was empty after sanitisation; it cannot match");
            return Ok((Vec::new(), warnings));
        };

        let notations: Vec<String> = if self.text_fts {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT DISTINCT notation FROM (
                         SELECT notation FROM texts_fts WHERE texts_fts MATCH ?1
                         UNION
                         SELECT notation FROM keywords_fts WHERE keywords_fts MATCH ?1
                     )",
                )
                .on_index(INDEX)?;
            stmt.query_map([&fts_query], |row| row.get(0))
                .on_index(INDEX)?
                .collect::<Result<_, _>>()
                .on_index(INDEX)?
        } else {
            warnings.push("iconclass FTS tables missing; falling back to LIKE over texts");
            let pattern = format!("%{}%", query.trim());
            let mut stmt = conn
                .prepare_cached(
                    "SELECT DISTINCT notation FROM texts WHERE text LIKE ?1
                     UNION
                     SELECT DISTINCT notation FROM keywords WHERE keyword LIKE ?1",
                )
                .on_index(INDEX)?;
            stmt.query_map([&pattern], |row| row.get(0))
                .on_index(INDEX)?
                .collect::<Result<_, _>>()
                .on_index(INDEX)?
        };

        if notations.is_empty() {
            warnings.push(format!("no iconclass notation matched '{query}'"));
            return Ok((Vec::new(), warnings));
        }

        let ordered = self.order_notations(&conn, &notations, max_results, only_with_artworks)?;
        let entries = ordered
            .into_iter()
            .map(|n| self.resolve_entry(&conn, &n, lang))
            .collect::<RetrievalResult<Vec<_>>>()?;
        Ok((entries, warnings))
    }

    /// Resolve a notation and its direct children.
    pub fn browse(&self, notation: &str, lang: &str) -> RetrievalResult<BrowseOutcome> {
        let conn = self.conn.lock();
        if !self.notation_exists(&conn, notation)? {
            return Err(RetrievalError::not_found("iconclass notation", notation));
        }
        let entry = self.resolve_entry(&conn, notation, lang)?;
        let children = entry
            .children
            .iter()
            .filter(|c| self.notation_exists(&conn, c).unwrap_or(false))
            .map(|c| self.resolve_entry(&conn, c, lang))
            .collect::<RetrievalResult<Vec<_>>>()?;
        Ok(BrowseOutcome { entry, children })
    }

    /// Semantic similarity over the notation embeddings. The query vector
    /// comes from the same model as the artwork embeddings.
    ///
    /// With `only_with_artworks`, candidates are restricted to notations
    /// with `rijks_count > 0` through a plain table scan with a join:
    /// pre-filtering inside the vector virtual table is pathological for
    /// this index.
    pub fn search_semantic(
        &self,
        query: &[i8],
        lang: &str,
        max_results: usize,
        only_with_artworks: bool,
    ) -> RetrievalResult<(Vec<IconclassEntry>, Warnings)> {
        let mut warnings = Warnings::new();
        if !self.embeddings {
            warnings.push("iconclass embeddings are not present in this index; semantic search unavailable");
            return Ok((Vec::new(), warnings));
        }
        let conn = self.conn.lock();

        let ranked: Vec<(String, f32)> = if self.vec_table && !only_with_artworks {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT e.notation, v.distance
                     FROM vec_iconclass v
                     JOIN iconclass_embeddings e ON e.rowid = v.rowid
                     WHERE v.embedding MATCH ?1 AND k = ?2
                     ORDER BY v.distance",
                )
                .on_index(INDEX)?;
            stmt.query_map(
                rusqlite::params![int8_to_blob(query), max_results as i64],
                |row| {
                    let distance: f64 = row.get(1)?;
                    Ok((row.get::<_, String>(0)?, distance as f32))
                },
            )
            .on_index(INDEX)?
            .collect::<Result<_, _>>()
            .on_index(INDEX)?
        } else {
            let sql = if only_with_artworks {
                "SELECT e.notation, e.embedding FROM iconclass_embeddings e
                 JOIN notations n ON n.notation = e.notation WHERE n.rijks_count > 0"
            } else {
                "SELECT e.notation, e.embedding FROM iconclass_embeddings e"
            };
            let mut stmt = conn.prepare_cached(sql).on_index(INDEX)?;
            let mut scored: Vec<(String, f32)> = stmt
                .query_map([], |row| {
                    let notation: String = row.get(0)?;
                    let blob: Vec<u8> = row.get(1)?;
                    Ok((notation, blob))
                })
                .on_index(INDEX)?
                .filter_map(|r| r.ok())
                .map(|(notation, blob)| {
                    (notation, cosine_distance_int8(query, &blob_to_int8(&blob)))
                })
                .collect();
            scored.sort_by(|a, b| a.1.total_cmp(&b.1));
            scored.truncate(max_results);
            scored
        };

        let entries = ranked
            .into_iter()
            .map(|(notation, distance)| {
                let mut entry = self.resolve_entry(&conn, &notation, lang)?;
                entry.similarity = Some(1.0 - distance);
                Ok(entry)
            })
            .collect::<RetrievalResult<Vec<_>>>()?;
        Ok((entries, warnings))
    }

    // ---- internals ------------------------------------------------------

    fn notation_exists(&self, conn: &Connection, notation: &str) -> RetrievalResult<bool> {
        conn.query_row(
            "SELECT 1 FROM notations WHERE notation = ?1",
            [notation],
            |_| Ok(()),
        )
        .map(|_| true)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(false),
            other => Err(other),
        })
        .on_index(INDEX)
    }

    /// Apply popularity ordering and the artwork filter to a matched set.
    fn order_notations(
        &self,
        conn: &Connection,
        notations: &[String],
        max_results: usize,
        only_with_artworks: bool,
    ) -> RetrievalResult<Vec<String>> {
        let mut ordered: Vec<(String, i64)> = Vec::new();
        for chunk in notations.chunks(SQL_VAR_LIMIT) {
            let artwork_clause = if only_with_artworks {
                "AND rijks_count > 0"
            } else {
                ""
            };
            let sql = format!(
                "SELECT notation, rijks_count FROM notations
                 WHERE notation IN ({}) {artwork_clause}",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare_cached(&sql).on_index(INDEX)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })
                .on_index(INDEX)?;
            for row in rows {
                ordered.push(row.on_index(INDEX)?);
            }
        }
        ordered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ordered.truncate(max_results);
        Ok(ordered.into_iter().map(|(n, _)| n).collect())
    }

    fn resolve_entry(
        &self,
        conn: &Connection,
        notation: &str,
        lang: &str,
    ) -> RetrievalResult<IconclassEntry> {
        let (path_json, children_json, refs_json, rijks_count) = conn
            .query_row(
                "SELECT path, children, refs, rijks_count FROM notations WHERE notation = ?1",
                [notation],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .on_index(INDEX)?;

        Ok(IconclassEntry {
            notation: notation.to_string(),
            text: self.preferred_text(conn, notation, lang)?,
            path: path_json
                .and_then(|j| serde_json::from_str(&j).ok())
                .unwrap_or_default(),
            children: children_json
                .and_then(|j| serde_json::from_str(&j).ok())
                .unwrap_or_default(),
            refs: refs_json
                .and_then(|j| serde_json::from_str(&j).ok())
                .unwrap_or_default(),
            rijks_count,
            keywords: self.keywords(conn, notation, lang)?,
            similarity: None,
        })
    }

    /// Language fallback chain: requested, English, Dutch, then anything.
    fn preferred_text(
        &self,
        conn: &Connection,
        notation: &str,
        lang: &str,
    ) -> RetrievalResult<Option<String>> {
        for candidate in [Some(lang), Some("en"), Some("nl"), None] {
            let found: Option<String> = match candidate {
                Some(l) => conn
                    .query_row(
                        "SELECT text FROM texts WHERE notation = ?1 AND lang = ?2 LIMIT 1",
                        rusqlite::params![notation, l],
                        |row| row.get(0),
                    )
                    .map(Some)
                    .or_else(no_rows_to_none)
                    .on_index(INDEX)?,
                None => conn
                    .query_row(
                        "SELECT text FROM texts WHERE notation = ?1 LIMIT 1",
                        [notation],
                        |row| row.get(0),
                    )
                    .map(Some)
                    .or_else(no_rows_to_none)
                    .on_index(INDEX)?,
            };
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    /// Up to 20 keywords in the preferred language.
    fn keywords(
        &self,
        conn: &Connection,
        notation: &str,
        lang: &str,
    ) -> RetrievalResult<Vec<String>> {
        for candidate in [Some(lang), Some("en"), Some("nl"), None] {
            let keywords: Vec<String> = match candidate {
                Some(l) => {
                    let mut stmt = conn
                        .prepare_cached(
                            "SELECT keyword FROM keywords WHERE notation = ?1 AND lang = ?2
                             LIMIT ?3",
                        )
                        .on_index(INDEX)?;
                    stmt.query_map(
                        rusqlite::params![notation, l, MAX_KEYWORDS as i64],
                        |row| row.get(0),
                    )
                    .on_index(INDEX)?
                    .collect::<Result<_, _>>()
                    .on_index(INDEX)?
                }
                None => {
                    let mut stmt = conn
                        .prepare_cached(
                            "SELECT keyword FROM keywords WHERE notation = ?1 LIMIT ?2",
                        )
                        .on_index(INDEX)?;
                    stmt.query_map(rusqlite::params![notation, MAX_KEYWORDS as i64], |row| {
                        row.get(0)
                    })
                    .on_index(INDEX)?
                    .collect::<Result<_, _>>()
                    .on_index(INDEX)?
                }
            };
            if !keywords.is_empty() {
                return Ok(keywords);
            }
        }
        Ok(Vec::new())
    }
}

fn no_rows_to_none<T>(e: rusqlite::Error) -> Result<Option<T>, rusqlite::Error> {
    match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other),
    }
}

/// Derive the ancestor chain of a notation from its syntax: textual
/// prefixes of the part before any `(…)` qualifier, then the full form.
/// `"25F41(LION)"` → `["2", "25", "25F", "25F4", "25F41", "25F41(LION)"]`.
pub fn notation_ancestors(notation: &str) -> Vec<String> {
    let base_end = notation.find('(').unwrap_or(notation.len());
    let base = &notation[..base_end];
    let mut out: Vec<String> = Vec::new();
    let mut prefix = String::new();
    for c in base.chars() {
        prefix.push(c);
        out.push(prefix.clone());
    }
    if base_end < notation.len() {
        out.push(notation.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::embedding::{normalize, quantize_int8};

    fn fixture_engine() -> IconclassEngine {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE notations (
                notation TEXT PRIMARY KEY, path TEXT, children TEXT, refs TEXT,
                rijks_count INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE texts (notation TEXT, lang TEXT, text TEXT);
            CREATE TABLE keywords (notation TEXT, lang TEXT, keyword TEXT);
            CREATE VIRTUAL TABLE texts_fts USING fts5(text, notation UNINDEXED);
            CREATE VIRTUAL TABLE keywords_fts USING fts5(keyword, notation UNINDEXED);
            CREATE TABLE iconclass_embeddings (
                id INTEGER PRIMARY KEY, notation TEXT UNIQUE, embedding BLOB
            );

            INSERT INTO notations VALUES
              ('7', '[{"notation":"7","label":"Bible"}]', '["73"]', '[]', 5000),
              ('73', '[{"notation":"7","label":"Bible"},{"notation":"73","label":"New Testament"}]',
               '["73D"]', '[]', 3000),
              ('73D',
               '[{"notation":"7","label":"Bible"},{"notation":"73","label":"New Testament"},{"notation":"73D","label":"passion of Christ"}]',
               '["73D8"]', '[]', 800),
              ('73D8',
               '[{"notation":"7","label":"Bible"},{"notation":"73","label":"New Testament"},{"notation":"73D","label":"passion of Christ"},{"notation":"73D8","label":"Calvary"}]',
               '["73D82"]', '[]', 400),
              ('73D82',
               '[{"notation":"7","label":"Bible"},{"notation":"73","label":"New Testament"},{"notation":"73D","label":"passion of Christ"},{"notation":"73D8","label":"Calvary"},{"notation":"73D82","label":"Crucifixion"}]',
               '["73D82(+0)"]', '["73D81"]', 123),
              ('25F41(LION)', '[{"notation":"2","label":"nature"}]', '[]', '[]', 0);

            INSERT INTO texts VALUES
              ('73D82', 'en', 'Christ crucified: the Crucifixion'),
              ('73D82', 'nl', 'de gekruisigde Christus'),
              ('73D8', 'en', 'Calvary, Golgotha'),
              ('25F41(LION)', 'nl', 'leeuw');
            INSERT INTO keywords VALUES
              ('73D82', 'en', 'cross'),
              ('73D82', 'en', 'crucifixion'),
              ('73D82', 'nl', 'kruis'),
              ('25F41(LION)', 'en', 'lion');
            INSERT INTO texts_fts(text, notation) VALUES
              ('Christ crucified: the Crucifixion', '73D82'),
              ('de gekruisigde Christus', '73D82'),
              ('Calvary, Golgotha', '73D8'),
              ('leeuw', '25F41(LION)');
            INSERT INTO keywords_fts(keyword, notation) VALUES
              ('cross', '73D82'),
              ('crucifixion', '73D82'),
              ('kruis', '73D82'),
              ('lion', '25F41(LION)');
            "#,
        )
        .unwrap();

        let vectors: [(&str, [f32; 4]); 3] = [
            ("73D82", [1.0, 0.0, 0.0, 0.0]),
            ("73D8", [0.9, 0.3, 0.0, 0.0]),
            ("25F41(LION)", [0.0, 0.0, 1.0, 0.0]),
        ];
        for (i, (notation, v)) in vectors.iter().enumerate() {
            let mut v = v.to_vec();
            normalize(&mut v);
            conn.execute(
                "INSERT INTO iconclass_embeddings VALUES (?1, ?2, ?3)",
                rusqlite::params![i as i64 + 1, notation, int8_to_blob(&quantize_int8(&v))],
            )
            .unwrap();
        }
        IconclassEngine::from_connection(conn, false).unwrap()
    }

    fn query(v: [f32; 4]) -> Vec<i8> {
        let mut v = v.to_vec();
        normalize(&mut v);
        quantize_int8(&v)
    }

    #[test]
    fn text_search_orders_by_popularity() {
        let engine = fixture_engine();
        let (entries, _) = engine.search("crucifixion calvary", "en", 10, false).unwrap();
        // No single notation matches both tokens; tokens AND within one
        // document, so this matches nothing.
        assert!(entries.is_empty());

        let (entries, warnings) = engine.search("crucifixion", "en", 10, false).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].notation, "73D82");
        assert_eq!(entries[0].rijks_count, 123);
        assert!(entries[0].text.as_deref().unwrap().contains("Crucifixion"));
        assert!(entries[0].keywords.contains(&"cross".to_string()));
    }

    #[test]
    fn search_unions_texts_and_keywords() {
        let engine = fixture_engine();
        // "lion" appears only as a keyword
        let (entries, _) = engine.search("lion", "en", 10, false).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].notation, "25F41(LION)");
    }

    #[test]
    fn only_with_artworks_filters_empty_counts() {
        let engine = fixture_engine();
        let (entries, _) = engine.search("lion", "en", 10, true).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn browse_resolves_entry_and_children() {
        let engine = fixture_engine();
        let outcome = engine.browse("73D8", "en").unwrap();
        assert_eq!(outcome.entry.notation, "73D8");
        assert_eq!(outcome.children.len(), 1);
        assert_eq!(outcome.children[0].notation, "73D82");
        // Path starts at a root notation and is prefix-ordered
        let path = &outcome.entry.path;
        assert_eq!(path[0].notation, "7");
        for pair in path.windows(2) {
            assert!(pair[1].notation.starts_with(&pair[0].notation));
        }
    }

    #[test]
    fn browse_unknown_notation_is_not_found() {
        let engine = fixture_engine();
        let err = engine.browse("99Z99", "en").unwrap_err();
        assert!(matches!(err, RetrievalError::NotFound { .. }));
    }

    #[test]
    fn language_fallback_reaches_any() {
        let engine = fixture_engine();
        // Only a Dutch text exists; requesting German falls back through
        // en → nl
        let outcome = engine.browse("25F41(LION)", "de").unwrap();
        assert_eq!(outcome.entry.text.as_deref(), Some("leeuw"));
    }

    #[test]
    fn semantic_search_ranks_by_distance() {
        let engine = fixture_engine();
        let (entries, _) = engine
            .search_semantic(&query([1.0, 0.1, 0.0, 0.0]), "en", 2, false)
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].notation, "73D82");
        assert_eq!(entries[1].notation, "73D8");
        assert!(entries[0].similarity.unwrap() >= entries[1].similarity.unwrap());
    }

    #[test]
    fn semantic_with_artwork_filter_uses_scan() {
        let engine = fixture_engine();
        let (entries, _) = engine
            .search_semantic(&query([0.0, 0.0, 1.0, 0.0]), "en", 5, true)
            .unwrap();
        // The lion notation is the nearest but has rijks_count = 0
        assert!(entries.iter().all(|e| e.notation != "25F41(LION)"));
        assert!(entries.iter().all(|e| e.rijks_count > 0));
    }

    #[test]
    fn ancestors_follow_notation_syntax() {
        assert_eq!(
            notation_ancestors("25F41(LION)"),
            vec!["2", "25", "25F", "25F4", "25F41", "25F41(LION)"]
        );
        assert_eq!(notation_ancestors("73D82"), vec!["7", "73", "73D", "73D8", "73D82"]);
    }
}
