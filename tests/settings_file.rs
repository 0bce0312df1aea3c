use std::fs;

use comicdb::construct::PersistenceMode;
use comicdb::error::ComicdbError;
use comicdb::settings::{DEFAULT_LOG_FILTER, Settings};

#[test]
fn missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let name = dir.path().join("comicdb").to_string_lossy().to_string();
    let settings = Settings::load_from(&name).unwrap();
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.log_filter, DEFAULT_LOG_FILTER);
    assert_eq!(settings.persistence_mode(), PersistenceMode::InMemory);
}

#[test]
fn json_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("comicdb.json");
    fs::write(
        &file,
        r#"{ "persistence_file": "comics.db", "log_filter": "comicdb=debug" }"#,
    )
    .unwrap();
    let settings = Settings::load_from(&file.to_string_lossy()).unwrap();
    assert_eq!(settings.log_filter, "comicdb=debug");
    assert_eq!(
        settings.persistence_mode(),
        PersistenceMode::File("comics.db".to_string())
    );
    assert!(settings.schema_path.is_none());
}

#[test]
fn replacement_fixtures_are_used() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data.json");
    fs::write(
        &data,
        r#"[
            {"e": "c", "a": "comic/name", "v": "Bone"},
            {"e": "i", "a": "issue/name", "v": "The Great Cow Race"},
            {"e": "i", "a": "issue/number", "v": 7},
            {"e": "i", "a": "issue/comic", "v": "c"}
        ]"#,
    )
    .unwrap();
    let settings = Settings {
        data_path: Some(data),
        ..Settings::default()
    };
    let mut out = Vec::new();
    comicdb::run(&settings, &mut out).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "\nTitle: Bone\n\tIssue #7 - The Great Cow Race\n"
    );
}

#[test]
fn unreadable_fixture_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        schema_path: Some(dir.path().join("nope.json")),
        ..Settings::default()
    };
    let mut out = Vec::new();
    match comicdb::run(&settings, &mut out) {
        Err(ComicdbError::Load { message }) => assert!(message.contains("Could not read schema")),
        other => panic!("expected a load error, got {:?}", other),
    }
    assert!(out.is_empty(), "nothing is printed on failure");
}

#[test]
fn malformed_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("comicdb.json");
    fs::write(&file, r#"{ "persistence_file": "comics.db", "#).unwrap();
    match Settings::load_from(&file.to_string_lossy()) {
        Err(ComicdbError::Config(_)) => (),
        other => panic!("expected a config error, got {:?}", other),
    }
}
