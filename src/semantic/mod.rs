//! Dense-vector KNN over the artwork embeddings index (C2).
//!
//! Two search paths: pure KNN through the vector virtual table (or a plain
//! scan when the extension is absent), and filtered KNN that ranks a
//! candidate set supplied by the vocabulary engine. Candidate sets beyond
//! the configured threshold degrade to post-filtered pure KNN with an
//! approximation warning: pre-filtering a vector-first scan is super-linear
//! in candidate count, while post-filtering only costs recall at the margin.

pub mod embedding;

use crate::config::{IndexConfig, SemanticConfig};
use crate::error::{ErrorContext, RetrievalError, RetrievalResult};
use crate::storage::{self, SQL_VAR_LIMIT, placeholders};
use embedding::{blob_to_int8, cosine_distance_int8, int8_to_blob};
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashSet;

const INDEX: &str = "embeddings";

/// One ranked artwork from a semantic query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticHit {
    pub object_number: String,
    /// Cosine distance in [0, 2], ascending over the result list.
    pub distance: f32,
    /// `1 − distance`, the caller-facing score.
    pub similarity: f32,
}

/// Result of a filtered KNN: the hits plus whether ranking was approximate.
#[derive(Debug)]
pub struct FilteredKnn {
    pub hits: Vec<SemanticHit>,
    pub approximate: bool,
}

/// Vector store over `embeddings.db`. Embedding inference lives in
/// [`embedding::QueryEmbedder`]; this type only speaks int8 vectors.
#[derive(Debug)]
pub struct SemanticEngine {
    conn: Mutex<Connection>,
    /// The vector virtual table is usable (extension loaded and table present).
    vec_table: bool,
    filter_threshold: usize,
    max_k: usize,
}

impl SemanticEngine {
    /// Open the index read-only, load the vector extension when configured,
    /// and assert the stored dimensionality against the model's.
    pub fn open(
        config: &IndexConfig,
        semantic: &SemanticConfig,
        expected_dims: usize,
    ) -> RetrievalResult<Self> {
        let conn = storage::open_index(&config.embeddings_path, INDEX, config.mmap_size)?;
        let extension_loaded =
            storage::load_vector_extension(&conn, config.vector_extension.as_deref())?;
        Self::from_connection(conn, semantic, expected_dims, extension_loaded)
    }

    fn from_connection(
        conn: Connection,
        semantic: &SemanticConfig,
        expected_dims: usize,
        extension_loaded: bool,
    ) -> RetrievalResult<Self> {
        if !storage::table_exists(&conn, "artwork_embeddings") {
            return Err(RetrievalError::index_unavailable(
                INDEX,
                "missing artwork_embeddings table",
            ));
        }

        // The artwork and Iconclass embeddings share one model space; drift
        // between the stored width and the live model must fail loudly.
        if let Some(stored) = metadata_value(&conn, "dimensions")? {
            let stored: usize = stored.parse().map_err(|_| {
                RetrievalError::index_unavailable(INDEX, format!("bad dimensions metadata '{stored}'"))
            })?;
            if stored != expected_dims {
                return Err(RetrievalError::index_unavailable(
                    INDEX,
                    format!(
                        "stored embeddings are {stored}-dimensional but the model produces \
                         {expected_dims}; the index must be rebuilt with the current model"
                    ),
                ));
            }
        }

        // The virtual table only works once the extension is in; probing by
        // preparing a statement catches both absence and a missing module.
        let vec_table = extension_loaded
            && conn
                .prepare("SELECT rowid FROM vec_artworks LIMIT 0")
                .is_ok();
        if !vec_table {
            tracing::info!(
                target: "semantic",
                "vector virtual table unavailable; pure KNN will scan artwork_embeddings"
            );
        }

        Ok(Self {
            conn: Mutex::new(conn),
            vec_table,
            filter_threshold: semantic.filter_threshold,
            max_k: semantic.max_k,
        })
    }

    /// Number of stored embeddings, from metadata when materialised.
    pub fn artwork_count(&self) -> RetrievalResult<u64> {
        let conn = self.conn.lock();
        if let Some(count) = metadata_value(&conn, "artwork_count")? {
            if let Ok(count) = count.parse() {
                return Ok(count);
            }
        }
        conn.query_row("SELECT COUNT(*) FROM artwork_embeddings", [], |row| row.get(0))
            .on_index(INDEX)
    }

    /// Candidate-set size at which filtered KNN switches to the approximate
    /// post-filter strategy.
    pub fn filter_threshold(&self) -> usize {
        self.filter_threshold
    }

    /// Pure KNN: the `min(k, max_k)` nearest stored vectors, ascending by
    /// cosine distance.
    pub fn knn(&self, query: &[i8], k: usize) -> RetrievalResult<Vec<SemanticHit>> {
        let k = k.min(self.max_k).max(1);
        let conn = self.conn.lock();
        if self.vec_table {
            self.knn_virtual(&conn, query, k)
        } else {
            self.knn_scan(&conn, query, k)
        }
    }

    fn knn_virtual(
        &self,
        conn: &Connection,
        query: &[i8],
        k: usize,
    ) -> RetrievalResult<Vec<SemanticHit>> {
        let mut stmt = conn
            .prepare_cached(
                "SELECT e.object_number, v.distance
                 FROM vec_artworks v
                 JOIN artwork_embeddings e ON e.art_id = v.rowid
                 WHERE v.embedding MATCH ?1 AND k = ?2
                 ORDER BY v.distance",
            )
            .on_index(INDEX)?;
        let hits = stmt
            .query_map(
                rusqlite::params![int8_to_blob(query), k as i64],
                |row| {
                    let distance: f64 = row.get(1)?;
                    Ok(SemanticHit {
                        object_number: row.get(0)?,
                        distance: distance as f32,
                        similarity: 1.0 - distance as f32,
                    })
                },
            )
            .on_index(INDEX)?
            .collect::<Result<_, _>>()
            .on_index(INDEX)?;
        Ok(hits)
    }

    /// Fallback scan when the vector extension is absent: rank every stored
    /// vector in Rust. Same ordering as the virtual table, linear time.
    fn knn_scan(&self, conn: &Connection, query: &[i8], k: usize) -> RetrievalResult<Vec<SemanticHit>> {
        let mut stmt = conn
            .prepare_cached("SELECT object_number, embedding FROM artwork_embeddings")
            .on_index(INDEX)?;
        let mut hits: Vec<SemanticHit> = stmt
            .query_map([], |row| {
                let object_number: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((object_number, blob))
            })
            .on_index(INDEX)?
            .filter_map(|row| row.ok())
            .map(|(object_number, blob)| {
                let distance = cosine_distance_int8(query, &blob_to_int8(&blob));
                SemanticHit {
                    object_number,
                    distance,
                    similarity: 1.0 - distance,
                }
            })
            .collect();
        sort_and_truncate(&mut hits, k);
        Ok(hits)
    }

    /// Filtered KNN over a candidate set from the vocabulary engine.
    ///
    /// Small candidate sets are ranked exactly in SQL batches; sets beyond
    /// the threshold are ranked approximately by post-filtering a widened
    /// pure KNN.
    pub fn filtered_knn(
        &self,
        query: &[i8],
        candidates: &[String],
        k: usize,
    ) -> RetrievalResult<FilteredKnn> {
        let k = k.min(self.max_k).max(1);
        if candidates.is_empty() {
            return Ok(FilteredKnn {
                hits: Vec::new(),
                approximate: false,
            });
        }

        if candidates.len() > self.filter_threshold {
            let widened = (k * 10).min(self.max_k);
            let members: HashSet<&str> = candidates.iter().map(String::as_str).collect();
            let mut hits = self.knn(query, widened)?;
            hits.retain(|h| members.contains(h.object_number.as_str()));
            hits.truncate(k);
            return Ok(FilteredKnn {
                hits,
                approximate: true,
            });
        }

        let conn = self.conn.lock();
        let mut hits: Vec<SemanticHit> = Vec::new();
        for chunk in candidates.chunks(SQL_VAR_LIMIT) {
            let sql = format!(
                "SELECT object_number, embedding FROM artwork_embeddings
                 WHERE object_number IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare_cached(&sql).on_index(INDEX)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                    let object_number: String = row.get(0)?;
                    let blob: Vec<u8> = row.get(1)?;
                    Ok((object_number, blob))
                })
                .on_index(INDEX)?;
            for row in rows {
                let (object_number, blob) = row.on_index(INDEX)?;
                let distance = cosine_distance_int8(query, &blob_to_int8(&blob));
                hits.push(SemanticHit {
                    object_number,
                    distance,
                    similarity: 1.0 - distance,
                });
            }
        }
        sort_and_truncate(&mut hits, k);
        Ok(FilteredKnn {
            hits,
            approximate: false,
        })
    }
}

fn sort_and_truncate(hits: &mut Vec<SemanticHit>, k: usize) {
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    hits.truncate(k);
}

fn metadata_value(conn: &Connection, key: &str) -> RetrievalResult<Option<String>> {
    if !storage::table_exists(conn, "metadata") {
        return Ok(None);
    }
    conn.query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
        row.get(0)
    })
    .map(Some)
    .or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other),
    })
    .on_index(INDEX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedding::{normalize, quantize_int8};

    /// Fixture with four axis-aligned embeddings in a tiny 4-dim space.
    /// (The engine never assumes 384 anywhere below the open-time check.)
    fn fixture_engine() -> SemanticEngine {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE artwork_embeddings (
                 art_id INTEGER PRIMARY KEY, object_number TEXT UNIQUE, embedding BLOB
             );
             CREATE TABLE metadata (key TEXT PRIMARY KEY, value TEXT);
             INSERT INTO metadata VALUES ('dimensions', '4'), ('artwork_count', '4');",
        )
        .unwrap();
        let vectors: [(&str, [f32; 4]); 4] = [
            ("SK-C-5", [1.0, 0.0, 0.0, 0.0]),
            ("SK-A-1", [0.8, 0.6, 0.0, 0.0]),
            ("RP-P-1", [0.0, 1.0, 0.0, 0.0]),
            ("BK-1", [0.0, 0.0, 1.0, 0.0]),
        ];
        for (i, (object_number, v)) in vectors.iter().enumerate() {
            let mut v = v.to_vec();
            normalize(&mut v);
            conn.execute(
                "INSERT INTO artwork_embeddings VALUES (?1, ?2, ?3)",
                rusqlite::params![i as i64 + 1, object_number, int8_to_blob(&quantize_int8(&v))],
            )
            .unwrap();
        }
        SemanticEngine::from_connection(conn, &SemanticConfig::default(), 4, false).unwrap()
    }

    fn query(v: [f32; 4]) -> Vec<i8> {
        let mut v = v.to_vec();
        normalize(&mut v);
        quantize_int8(&v)
    }

    #[test]
    fn pure_knn_orders_by_distance() {
        let engine = fixture_engine();
        let hits = engine.knn(&query([1.0, 0.1, 0.0, 0.0]), 4).unwrap();
        assert_eq!(hits.len(), 4);
        assert_eq!(hits[0].object_number, "SK-C-5");
        assert_eq!(hits[1].object_number, "SK-A-1");
        // Monotone distances
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
        // Similarity mirrors distance
        assert!((hits[0].similarity - (1.0 - hits[0].distance)).abs() < 1e-6);
    }

    #[test]
    fn knn_truncates_to_k() {
        let engine = fixture_engine();
        let hits = engine.knn(&query([1.0, 0.0, 0.0, 0.0]), 2).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn filtered_knn_exact_path() {
        let engine = fixture_engine();
        let candidates = vec!["RP-P-1".to_string(), "BK-1".to_string()];
        let result = engine
            .filtered_knn(&query([1.0, 0.1, 0.0, 0.0]), &candidates, 10)
            .unwrap();
        assert!(!result.approximate);
        assert_eq!(result.hits.len(), 2);
        // SK-C-5 is closest overall but not a candidate
        assert_eq!(result.hits[0].object_number, "RP-P-1");
    }

    #[test]
    fn filtered_knn_empty_candidates() {
        let engine = fixture_engine();
        let result = engine
            .filtered_knn(&query([1.0, 0.0, 0.0, 0.0]), &[], 10)
            .unwrap();
        assert!(result.hits.is_empty());
        assert!(!result.approximate);
    }

    #[test]
    fn filtered_knn_threshold_switches_to_approximate() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE artwork_embeddings (
                 art_id INTEGER PRIMARY KEY, object_number TEXT UNIQUE, embedding BLOB
             );",
        )
        .unwrap();
        for i in 0..4 {
            let mut v = vec![0.0_f32; 4];
            v[i] = 1.0;
            conn.execute(
                "INSERT INTO artwork_embeddings VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    i as i64 + 1,
                    format!("OBJ-{i}"),
                    int8_to_blob(&quantize_int8(&v))
                ],
            )
            .unwrap();
        }
        let config = SemanticConfig {
            filter_threshold: 2,
            ..Default::default()
        };
        let engine = SemanticEngine::from_connection(conn, &config, 4, false).unwrap();

        // At the threshold: exact path
        let at = engine
            .filtered_knn(
                &query([1.0, 0.0, 0.0, 0.0]),
                &["OBJ-0".to_string(), "OBJ-1".to_string()],
                2,
            )
            .unwrap();
        assert!(!at.approximate);

        // One above: approximate path
        let above = engine
            .filtered_knn(
                &query([1.0, 0.0, 0.0, 0.0]),
                &[
                    "OBJ-0".to_string(),
                    "OBJ-1".to_string(),
                    "OBJ-2".to_string(),
                ],
                2,
            )
            .unwrap();
        assert!(above.approximate);
        assert_eq!(above.hits[0].object_number, "OBJ-0");
        assert!(above.hits.iter().all(|h| h.object_number != "OBJ-3"));
    }

    #[test]
    fn dimension_mismatch_fails_open() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE artwork_embeddings (
                 art_id INTEGER PRIMARY KEY, object_number TEXT UNIQUE, embedding BLOB
             );
             CREATE TABLE metadata (key TEXT PRIMARY KEY, value TEXT);
             INSERT INTO metadata VALUES ('dimensions', '768');",
        )
        .unwrap();
        let err = SemanticEngine::from_connection(conn, &SemanticConfig::default(), 384, false)
            .unwrap_err();
        assert!(err.to_string().contains("768"));
    }

    #[test]
    fn artwork_count_prefers_metadata() {
        let engine = fixture_engine();
        assert_eq!(engine.artwork_count().unwrap(), 4);
    }
}
