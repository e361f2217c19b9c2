//! Integration tests for the vocabulary engine against a fixture index
//! built on disk, exercising the read-only open path.

use musea::config::IndexConfig;
use musea::vocab::VocabularyEngine;
use musea::vocab::filters::SearchFilters;
use tempfile::TempDir;

fn build_fixture_index(dir: &TempDir) -> IndexConfig {
    let path = dir.path().join("vocabulary.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE artworks (
            object_number TEXT PRIMARY KEY,
            title TEXT, creator_label TEXT, rights_uri TEXT,
            date_earliest INTEGER, date_latest INTEGER,
            height_cm REAL, width_cm REAL, url TEXT
        );
        CREATE TABLE vocabulary (
            id INTEGER PRIMARY KEY, vocab_id TEXT UNIQUE, type TEXT,
            label_en TEXT, label_nl TEXT,
            label_en_norm TEXT, label_nl_norm TEXT,
            notation TEXT, lat REAL, lon REAL
        );
        CREATE TABLE mappings (object_number TEXT, field TEXT, vocab_id TEXT);
        CREATE VIRTUAL TABLE vocabulary_fts USING fts5(label_en, label_nl);

        INSERT INTO vocabulary VALUES
          (1, 'v:rembrandt', 'person', 'Rembrandt van Rijn', NULL, 'rembrandtvanrijn', NULL, NULL, NULL, NULL),
          (2, 'v:painting', 'classification', 'painting', 'schilderij', 'painting', 'schilderij', NULL, NULL, NULL),
          (3, 'v:print', 'classification', 'print', 'prent', 'print', 'prent', NULL, NULL, NULL),
          (4, 'v:drawing', 'classification', 'drawing', 'tekening', 'drawing', 'tekening', NULL, NULL, NULL),
          (5, 'v:haarlem', 'place', 'Haarlem', 'Haarlem', 'haarlem', 'haarlem', NULL, 52.3874, 4.6462);
        INSERT INTO vocabulary_fts(rowid, label_en, label_nl) VALUES
          (1, 'Rembrandt van Rijn', NULL),
          (2, 'painting', 'schilderij'),
          (3, 'print', 'prent'),
          (4, 'drawing', 'tekening'),
          (5, 'Haarlem', 'Haarlem');
        "#,
    )
    .unwrap();

    // One painting, many prints, a few drawings; real collections skew the
    // same way.
    let mut insert_work = |object_number: &str, kind: &str, year: i64| {
        conn.execute(
            "INSERT INTO artworks VALUES (?1, ?2, 'Rembrandt van Rijn', NULL, ?3, ?3, NULL, NULL, NULL)",
            rusqlite::params![object_number, format!("Work {object_number}"), year],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO mappings VALUES (?1, 'creator', 'v:rembrandt')",
            [object_number],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO mappings VALUES (?1, 'type', ?2)",
            rusqlite::params![object_number, kind],
        )
        .unwrap();
    };
    insert_work("SK-C-5", "v:painting", 1642);
    for i in 0..30 {
        insert_work(&format!("RP-P-{i}"), "v:print", 1630 + (i % 10));
    }
    for i in 0..3 {
        insert_work(&format!("RP-T-{i}"), "v:drawing", 1635);
    }
    // A Haarlem-subject painting for the geo scenario
    conn.execute(
        "INSERT INTO artworks VALUES ('SK-A-1', 'View of Haarlem', 'Jacob van Ruisdael',
         NULL, 1670, 1675, NULL, NULL, NULL)",
        [],
    )
    .unwrap();
    conn.execute("INSERT INTO mappings VALUES ('SK-A-1', 'subject', 'v:haarlem')", [])
        .unwrap();
    conn.execute("INSERT INTO mappings VALUES ('SK-A-1', 'type', 'v:painting')", [])
        .unwrap();

    IndexConfig {
        vocabulary_path: path,
        ..Default::default()
    }
}

fn compact_count(engine: &VocabularyEngine, filters: SearchFilters) -> usize {
    let (candidates, _) = engine.candidate_object_numbers(&filters).unwrap();
    candidates.len()
}

#[test]
fn medium_split_counts_reflect_collection_shape() {
    let dir = TempDir::new().unwrap();
    let engine = VocabularyEngine::open(&build_fixture_index(&dir)).unwrap();

    let rembrandt = |object_type: Option<&str>| SearchFilters {
        creator: Some("Rembrandt".to_string()),
        object_type: object_type.map(str::to_string),
        ..Default::default()
    };

    let total = compact_count(&engine, rembrandt(None));
    let paintings = compact_count(&engine, rembrandt(Some("painting")));
    let prints = compact_count(&engine, rembrandt(Some("print")));
    let drawings = compact_count(&engine, rembrandt(Some("drawing")));

    assert!(paintings > 0 && prints > 0 && drawings > 0);
    assert!(paintings + prints + drawings <= total);
    // Prints dominate paintings by an order of magnitude
    assert!(prints >= paintings * 10);
}

#[test]
fn every_result_satisfies_its_mapping() {
    let dir = TempDir::new().unwrap();
    let engine = VocabularyEngine::open(&build_fixture_index(&dir)).unwrap();

    let filters = SearchFilters {
        creator: Some("Rembrandt".to_string()),
        object_type: Some("print".to_string()),
        max_results: Some(100),
        ..Default::default()
    };
    let outcome = engine.search(&filters).unwrap();
    assert!(!outcome.results.is_empty());
    // Intersection semantics: the multi-filter result set equals the
    // intersection of the per-filter candidate sets.
    let (creator_only, _) = engine
        .candidate_object_numbers(&SearchFilters {
            creator: Some("Rembrandt".to_string()),
            ..Default::default()
        })
        .unwrap();
    let (type_only, _) = engine
        .candidate_object_numbers(&SearchFilters {
            object_type: Some("print".to_string()),
            ..Default::default()
        })
        .unwrap();
    for result in &outcome.results {
        assert!(creator_only.contains(&result.object_number));
        assert!(type_only.contains(&result.object_number));
    }
}

#[test]
fn geo_proximity_with_date_wildcard() {
    let dir = TempDir::new().unwrap();
    let engine = VocabularyEngine::open(&build_fixture_index(&dir)).unwrap();

    let filters = SearchFilters {
        near_place: Some("Haarlem".to_string()),
        near_place_radius: Some(15.0),
        creation_date: Some("16*".to_string()),
        ..Default::default()
    };
    let outcome = engine.search(&filters).unwrap();
    assert_eq!(outcome.results.len(), 1);
    let hit = &outcome.results[0];
    assert_eq!(hit.object_number, "SK-A-1");
    assert_eq!(hit.nearest_place.as_deref(), Some("Haarlem"));
    assert!(hit.distance_km.unwrap() <= 15.0);
}

#[test]
fn date_wildcard_excludes_out_of_range() {
    let dir = TempDir::new().unwrap();
    let engine = VocabularyEngine::open(&build_fixture_index(&dir)).unwrap();

    // 17* means 1700-1799; nothing in the fixture reaches it
    let filters = SearchFilters {
        creation_date: Some("17*".to_string()),
        ..Default::default()
    };
    let outcome = engine.search(&filters).unwrap();
    assert!(outcome.results.is_empty());

    let filters = SearchFilters {
        creation_date: Some("167*".to_string()),
        ..Default::default()
    };
    let outcome = engine.search(&filters).unwrap();
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].object_number, "SK-A-1");
}

#[test]
fn missing_index_is_unavailable() {
    let config = IndexConfig {
        vocabulary_path: std::path::PathBuf::from("/definitely/not/there.db"),
        ..Default::default()
    };
    let err = VocabularyEngine::open(&config).unwrap_err();
    assert!(matches!(
        err,
        musea::RetrievalError::IndexUnavailable { .. }
    ));
}
