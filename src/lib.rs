//! comicdb – prints a catalog of comic titles and their issues.
//!
//! The catalog lives in a small in-memory datom store:
//! * A [`construct::Thing`] is an opaque identity (a simple `u64`).
//! * An [`construct::Attribute`] names a property with a value type and a
//!   cardinality. Attributes are things too, described by datoms.
//! * A [`construct::Datom`] is one fact: `(entity, attribute, value, tx)`.
//!
//! Datoms are owned and deduplicated by "keeper" structures, and lookups
//! between entities, attributes and referenced things play the role of
//! database indexes.
//!
//! ## Modules
//! * [`construct`] – Things, attributes, datoms, their keepers and the [`construct::Database`].
//! * [`datatype`] – Value types, cardinalities and [`datatype::Value`].
//! * [`transact`] – Turning assertion records into datoms, atomically.
//! * [`persist`] – The optional SQLite mirror of committed transactions.
//! * [`fixture`] – The bundled schema and dataset.
//! * [`catalog`] – The two fixed lookups: all comics, and the issues of a comic.
//! * [`report`] – Rendering the catalog as text.
//! * [`settings`] – Optional settings file.
//!
//! ## Quick Start
//! ```
//! use comicdb::{construct::{Database, PersistenceMode}, transact::Assertion};
//! let mut db = Database::new(PersistenceMode::InMemory).unwrap();
//! db.transact(&comicdb::fixture::parse(comicdb::fixture::EMBEDDED_SCHEMA, "schema").unwrap()).unwrap();
//! db.transact(&[
//!     Assertion::new("sandman", "comic/name", "Sandman"),
//!     Assertion::new("i1", "issue/name", "Sleep of the Just"),
//!     Assertion::new("i1", "issue/number", 1),
//!     Assertion::new("i1", "issue/comic", "sandman"),
//! ]).unwrap();
//! let report = comicdb::report(&db).unwrap();
//! assert_eq!(report.to_string(), "\nTitle: Sandman\n\tIssue #1 - Sleep of the Just\n");
//! ```

pub mod catalog;
pub mod construct;
pub mod datatype;
pub mod error;
pub mod fixture;
pub mod persist;
pub mod report;
pub mod settings;
pub mod transact;

use std::io::Write;

use tracing::info;

use crate::catalog::Catalog;
use crate::construct::Database;
use crate::error::Result;
use crate::fixture::{EMBEDDED_DATA, EMBEDDED_SCHEMA};
use crate::report::Report;
use crate::settings::Settings;

/// Builds the report from whatever the store currently holds.
pub fn report(database: &Database) -> Result<Report> {
    let catalog = Catalog::build(database)?;
    Ok(Report::from_catalog(&catalog))
}

/// Loads the schema and then the dataset into the store.
pub fn load(database: &mut Database, settings: &Settings) -> Result<()> {
    let schema = fixture::read(settings.schema_path.as_deref(), EMBEDDED_SCHEMA, "schema")?;
    database.transact(&schema)?;
    let data = fixture::read(settings.data_path.as_deref(), EMBEDDED_DATA, "data")?;
    database.transact(&data)?;
    Ok(())
}

/// One full run: open a store, load it, print the report, shut it down.
///
/// The store is shut down on failure too; the first error is the one returned.
pub fn run<W: Write>(settings: &Settings, out: &mut W) -> Result<()> {
    let mut database = Database::new(settings.persistence_mode())?;
    let outcome = load(&mut database, settings)
        .and_then(|_| report(&database))
        .and_then(|report| {
            info!(titles = report.titles().len(), "writing report");
            report.write_to(out).map_err(Into::into)
        });
    let closed = database.shutdown();
    outcome.and(closed)
}
