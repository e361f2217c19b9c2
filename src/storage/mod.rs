//! Read-only SQLite access shared by the local index engines.
//!
//! All three indexes (`vocabulary.db`, `embeddings.db`, `iconclass.db`) are
//! opened read-only and memory-mapped. Optional tables and columns are
//! feature-off signals discovered by probing, never errors. No code path in
//! this crate writes to the indexes; schema evolution is offline.

use crate::error::{RetrievalError, RetrievalResult};
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

/// SQLite's default host-parameter ceiling. Statements that bind an id set
/// are chunked to at most this many variables; a query therefore has at most
/// two prepared shapes (full chunk + final remainder).
pub const SQL_VAR_LIMIT: usize = 999;

/// Open an index read-only with the shared pragmas applied.
pub fn open_index(path: &Path, index: &'static str, mmap_size: u64) -> RetrievalResult<Connection> {
    if !path.exists() {
        return Err(RetrievalError::index_unavailable(
            index,
            format!("file not found: {}", path.display()),
        ));
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| RetrievalError::index_unavailable(index, e.to_string()))?;

    conn.pragma_update(None, "mmap_size", mmap_size as i64)
        .map_err(|e| RetrievalError::index_unavailable(index, format!("mmap pragma: {e}")))?;

    Ok(conn)
}

/// Load the vector extension into a connection, if configured.
///
/// Returns false (not an error) when no extension path is configured; the
/// caller downgrades virtual-table KNN to a plain scan in that case.
pub fn load_vector_extension(conn: &Connection, path: Option<&Path>) -> RetrievalResult<bool> {
    let Some(path) = path else {
        return Ok(false);
    };
    unsafe {
        let _guard = rusqlite::LoadExtensionGuard::new(conn).map_err(|e| {
            RetrievalError::index_unavailable("embeddings", format!("extension loading: {e}"))
        })?;
        conn.load_extension(path, None::<&str>).map_err(|e| {
            RetrievalError::index_unavailable(
                "embeddings",
                format!("vector extension '{}': {e}", path.display()),
            )
        })?;
    }
    Ok(true)
}

/// Probe for a table (or virtual table) by name.
pub fn table_exists(conn: &Connection, name: &str) -> bool {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
        [name],
        |_| Ok(()),
    )
    .is_ok()
}

/// Probe for a column on a table.
pub fn column_exists(conn: &Connection, table: &str, column: &str) -> bool {
    let Ok(mut stmt) = conn.prepare(&format!("PRAGMA table_info({table})")) else {
        return false;
    };
    let Ok(mut rows) = stmt.query([]) else {
        return false;
    };
    while let Ok(Some(row)) = rows.next() {
        if let Ok(name) = row.get::<_, String>(1)
            && name.eq_ignore_ascii_case(column)
        {
            return true;
        }
    }
    false
}

/// Register the user-defined SQL functions the vocabulary index relies on:
/// `haversine_km(lat1, lon1, lat2, lon2)` and `regexp_word(pattern, value)`.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "haversine_km",
        4,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let lat1: f64 = ctx.get(0)?;
            let lon1: f64 = ctx.get(1)?;
            let lat2: f64 = ctx.get(2)?;
            let lon2: f64 = ctx.get(3)?;
            Ok(crate::vocab::geo::haversine_km(lat1, lon1, lat2, lon2))
        },
    )?;

    conn.create_scalar_function(
        "regexp_word",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let regex: std::sync::Arc<Regex> = ctx.get_or_create_aux(
                0,
                |vr| -> Result<_, Box<dyn std::error::Error + Send + Sync>> {
                    let pattern = vr.as_str()?;
                    Ok(Regex::new(&format!(
                        r"(?iu)\b{}\b",
                        regex::escape(pattern)
                    ))?)
                },
            )?;
            let value = match ctx.get_raw(1).as_str_or_null() {
                Ok(Some(v)) => v,
                _ => return Ok(0i64),
            };
            Ok(i64::from(regex.is_match(value)))
        },
    )?;

    Ok(())
}

/// Render `n` SQL placeholders: `?,?,?`.
pub fn placeholders(n: usize) -> String {
    let mut out = String::with_capacity(n * 2);
    for i in 0..n {
        if i > 0 {
            out.push(',');
        }
        out.push('?');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE artworks (object_number TEXT PRIMARY KEY, title TEXT);
             CREATE TABLE vocabulary (id INTEGER PRIMARY KEY, label_en TEXT);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn probes_detect_tables_and_columns() {
        let conn = memory_db();
        assert!(table_exists(&conn, "artworks"));
        assert!(!table_exists(&conn, "artwork_texts_fts"));
        assert!(column_exists(&conn, "artworks", "title"));
        assert!(!column_exists(&conn, "artworks", "height_cm"));
    }

    #[test]
    fn regexp_word_matches_on_word_boundaries() {
        let conn = memory_db();
        register_functions(&conn).unwrap();
        let hit: i64 = conn
            .query_row(
                "SELECT regexp_word('kerk', 'De Oude Kerk te Amsterdam')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hit, 1);
        let miss: i64 = conn
            .query_row("SELECT regexp_word('kerk', 'kerkhof')", [], |r| r.get(0))
            .unwrap();
        assert_eq!(miss, 0);
        // Case-insensitive
        let ci: i64 = conn
            .query_row("SELECT regexp_word('KERK', 'de kerk')", [], |r| r.get(0))
            .unwrap();
        assert_eq!(ci, 1);
    }

    #[test]
    fn haversine_function_is_registered() {
        let conn = memory_db();
        register_functions(&conn).unwrap();
        // Amsterdam to Haarlem is roughly 18 km
        let km: f64 = conn
            .query_row(
                "SELECT haversine_km(52.3731, 4.8922, 52.3874, 4.6462)",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert!((15.0..20.0).contains(&km), "got {km}");
    }

    #[test]
    fn placeholder_rendering() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?,?,?");
        assert_eq!(placeholders(0), "");
    }
}
