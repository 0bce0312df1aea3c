use std::collections::HashSet;
use std::io::{self, Write};

use comicdb::construct::{Database, PersistenceMode};
use comicdb::error::ComicdbError;
use comicdb::fixture::{self, EMBEDDED_SCHEMA};
use comicdb::settings::Settings;
use comicdb::transact::Assertion;

fn setup() -> Database {
    let mut db = Database::new(PersistenceMode::InMemory).unwrap();
    let schema = fixture::parse(EMBEDDED_SCHEMA, "schema").unwrap();
    db.transact(&schema).unwrap();
    db
}

fn comic(tempid: &str, name: &str) -> Assertion {
    Assertion::new(tempid, "comic/name", name)
}

fn issue(tempid: &str, comic: &str, name: &str, number: i64) -> Vec<Assertion> {
    vec![
        Assertion::new(tempid, "issue/name", name),
        Assertion::new(tempid, "issue/number", number),
        Assertion::new(tempid, "issue/comic", comic),
    ]
}

#[test]
fn sandman_and_watchmen_are_kept_apart() {
    let mut db = setup();
    let mut data = vec![comic("sandman", "Sandman"), comic("watchmen", "Watchmen")];
    data.extend(issue("s9", "sandman", "The Doll's House", 9));
    data.extend(issue("w1", "watchmen", "At Midnight, All the Agents...", 1));
    data.extend(issue("s1", "sandman", "Preludes & Nocturnes", 1));
    db.transact(&data).unwrap();

    let report = comicdb::report(&db).unwrap();
    assert_eq!(report.titles().len(), 2, "one block per comic");
    let sandman = report.title("Sandman").expect("sandman block");
    let numbers: Vec<i64> = sandman.issues.iter().map(|i| i.number).collect();
    assert_eq!(numbers, vec![1, 9]);
    assert_eq!(sandman.issues[0].name, "Preludes & Nocturnes");
    assert_eq!(sandman.issues[1].name, "The Doll's House");
    let watchmen = report.title("Watchmen").expect("watchmen block");
    assert_eq!(watchmen.issues.len(), 1);
    assert_eq!(watchmen.issues[0].name, "At Midnight, All the Agents...");

    let text = report.to_string();
    assert!(text.contains(
        "\nTitle: Sandman\n\tIssue #1 - Preludes & Nocturnes\n\tIssue #9 - The Doll's House\n"
    ));
    assert!(text.contains("\nTitle: Watchmen\n\tIssue #1 - At Midnight, All the Agents...\n"));
}

#[test]
fn comic_without_issues_prints_only_its_header() {
    let mut db = setup();
    db.transact(&[comic("saga", "Saga")]).unwrap();
    let report = comicdb::report(&db).unwrap();
    assert_eq!(report.to_string(), "\nTitle: Saga\n");
    assert!(report.title("Saga").unwrap().issues.is_empty());
}

#[test]
fn shared_issue_numbers_are_both_listed() {
    let mut db = setup();
    let mut data = vec![comic("c", "Hellblazer")];
    data.extend(issue("a", "c", "Hunger", 5));
    data.extend(issue("b", "c", "A Feast of Friends", 5));
    data.extend(issue("d", "c", "Going for It", 1));
    db.transact(&data).unwrap();

    let report = comicdb::report(&db).unwrap();
    let issues = &report.title("Hellblazer").unwrap().issues;
    assert_eq!(issues.len(), 3);
    assert_eq!(issues[0].number, 1);
    let fives: HashSet<&str> = issues[1..].iter().map(|i| i.name.as_str()).collect();
    assert_eq!(fives, HashSet::from(["Hunger", "A Feast of Friends"]));
}

#[test]
fn issues_are_in_non_decreasing_order() {
    let mut db = setup();
    let mut data = vec![comic("c", "Bone")];
    for (i, number) in [7, 3, 10, 1, 3, 2, 42, 0].iter().enumerate() {
        data.extend(issue(&format!("i{i}"), "c", &format!("Issue {i}"), *number));
    }
    db.transact(&data).unwrap();

    let report = comicdb::report(&db).unwrap();
    let issues = &report.title("Bone").unwrap().issues;
    assert_eq!(issues.len(), 8);
    assert!(issues.windows(2).all(|w| w[0].number <= w[1].number));
}

#[test]
fn every_comic_appears_once_with_exactly_its_issues() {
    let mut db = setup();
    let mut data = Vec::new();
    for c in 0..5 {
        data.push(comic(&format!("c{c}"), &format!("Comic {c}")));
        for i in 0..c {
            data.extend(issue(
                &format!("c{c}-i{i}"),
                &format!("c{c}"),
                &format!("Comic {c} issue {i}"),
                i as i64,
            ));
        }
    }
    let tx = db.transact(&data).unwrap();

    let catalog = comicdb::catalog::Catalog::build(&db).unwrap();
    assert_eq!(catalog.len(), 5);
    let names: HashSet<&str> = catalog.comics().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names.len(), 5, "no comic is listed twice");
    for c in 0..5 {
        let thing = tx.tempid(&format!("c{c}")).unwrap();
        let listed: HashSet<u64> = catalog.issues(thing).iter().map(|i| i.issue).collect();
        let expected: HashSet<u64> = (0..c)
            .map(|i| tx.tempid(&format!("c{c}-i{i}")).unwrap())
            .collect();
        assert_eq!(listed, expected, "issues of comic {c}");
    }
}

#[test]
fn issues_without_a_number_are_skipped() {
    let mut db = setup();
    let mut data = vec![comic("c", "Hellboy")];
    data.extend(issue("i1", "c", "Seed of Destruction", 1));
    data.push(Assertion::new("draft", "issue/name", "Untitled"));
    data.push(Assertion::new("draft", "issue/comic", "c"));
    db.transact(&data).unwrap();

    let report = comicdb::report(&db).unwrap();
    assert_eq!(
        report.to_string(),
        "\nTitle: Hellboy\n\tIssue #1 - Seed of Destruction\n"
    );
}

#[test]
fn embedded_fixtures_render_the_catalog() {
    let mut out = Vec::new();
    comicdb::run(&Settings::default(), &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(
        text,
        "\nTitle: The Sandman\n\
         \tIssue #1 - Sleep of the Just\n\
         \tIssue #2 - Imperfect Hosts\n\
         \tIssue #3 - Dream a Little Dream of Me\n\
         \tIssue #8 - The Sound of Her Wings\n\
         \nTitle: Watchmen\n\
         \tIssue #1 - At Midnight, All the Agents...\n\
         \tIssue #2 - Absent Friends\n\
         \tIssue #3 - The Judge of All the Earth\n\
         \tIssue #4 - Watchmaker\n\
         \nTitle: Saga\n"
    );
}

#[test]
fn running_twice_gives_the_same_report() {
    let blocks = |text: String| {
        let mut blocks: Vec<String> = text.split("\nTitle: ").map(String::from).collect();
        blocks.sort();
        blocks
    };
    let mut first = Vec::new();
    let mut second = Vec::new();
    comicdb::run(&Settings::default(), &mut first).unwrap();
    comicdb::run(&Settings::default(), &mut second).unwrap();
    assert_eq!(
        blocks(String::from_utf8(first).unwrap()),
        blocks(String::from_utf8(second).unwrap())
    );
}

// a sink that refuses every write
struct ClosedPipe;

impl Write for ClosedPipe {
    fn write(&mut self, _: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }
    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }
}

#[test]
fn failed_write_is_an_output_error_and_still_shuts_down() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("comics.db").to_string_lossy().to_string();
    let settings = Settings {
        persistence_file: Some(path.clone()),
        ..Settings::default()
    };
    match comicdb::run(&settings, &mut ClosedPipe) {
        Err(ComicdbError::Output(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
        other => panic!("expected an output error, got {:?}", other),
    }
    // the mirror was closed, so it can be opened and read again
    let conn = rusqlite::Connection::open(&path).unwrap();
    let txs: i64 = conn
        .query_row("select count(*) from Tx", [], |r| r.get(0))
        .unwrap();
    assert_eq!(txs, 3, "bootstrap, schema and data");
}
