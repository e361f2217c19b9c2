//! Iconclass browse over an on-disk fixture index.

use musea::config::IndexConfig;
use musea::iconclass::{IconclassEngine, notation_ancestors};
use tempfile::TempDir;

fn build_fixture_index(dir: &TempDir) -> IndexConfig {
    let path = dir.path().join("iconclass.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
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

        INSERT INTO notations VALUES
          ('73D82',
           '[{"notation":"7","label":"Bible"},
             {"notation":"73","label":"New Testament"},
             {"notation":"73D","label":"passion of Christ"},
             {"notation":"73D8","label":"Calvary"},
             {"notation":"73D82","label":"Crucifixion"}]',
           '["73D82(+0)"]', '["73D81"]', 123),
          ('73D82(+0)', '[]', '[]', '[]', 4);

        INSERT INTO texts VALUES
          ('73D82', 'en', 'Christ crucified: the Crucifixion'),
          ('73D82(+0)', 'en', 'the Crucifixion (with angels)');
        INSERT INTO texts_fts(text, notation) VALUES
          ('Christ crucified: the Crucifixion', '73D82'),
          ('the Crucifixion (with angels)', '73D82(+0)');
        "#,
    )
    .unwrap();
    IndexConfig {
        iconclass_path: path,
        ..Default::default()
    }
}

#[test]
fn browse_crucifixion() {
    let dir = TempDir::new().unwrap();
    let engine = IconclassEngine::open(&build_fixture_index(&dir)).unwrap();

    let outcome = engine.browse("73D82", "en").unwrap();
    assert!(outcome.entry.text.as_deref().unwrap().contains("Crucifixion"));
    assert!(outcome.entry.rijks_count > 0);
    assert_eq!(outcome.children.len(), 1);

    // The path starts at a top-level digit-only notation and every step is
    // a prefix of the next
    let path = &outcome.entry.path;
    assert!(path[0].notation.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(path[0].notation.len(), 1);
    for pair in path.windows(2) {
        assert!(pair[1].notation.starts_with(&pair[0].notation));
    }
    // The syntax-derived ancestor chain agrees with the stored path
    let ancestors = notation_ancestors("73D82");
    let stored: Vec<&str> = path.iter().map(|p| p.notation.as_str()).collect();
    assert_eq!(ancestors, stored);
}

#[test]
fn unknown_notation_is_not_found() {
    let dir = TempDir::new().unwrap();
    let engine = IconclassEngine::open(&build_fixture_index(&dir)).unwrap();
    assert!(matches!(
        engine.browse("99Z", "en").unwrap_err(),
        musea::RetrievalError::NotFound { .. }
    ));
}

#[test]
fn semantic_mode_degrades_without_embeddings() {
    let dir = TempDir::new().unwrap();
    let engine = IconclassEngine::open(&build_fixture_index(&dir)).unwrap();
    assert!(!engine.semantic_available());
    let (entries, warnings) = engine
        .search_semantic(&[0i8; 8], "en", 5, false)
        .unwrap();
    assert!(entries.is_empty());
    assert!(warnings.as_slice().iter().any(|w| w.contains("unavailable")));
    // Text search is intact
    let (entries, _) = engine.search("crucifixion", "en", 10, false).unwrap();
    assert_eq!(entries.len(), 2);
}
