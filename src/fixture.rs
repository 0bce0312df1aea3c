use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{ComicdbError, Result};
use crate::transact::Assertion;

pub const EMBEDDED_SCHEMA: &str = include_str!("../resources/comic-schema.json");
pub const EMBEDDED_DATA: &str = include_str!("../resources/comic-data.json");

/// Parses a fixture, a JSON array of assertions forming one transaction.
pub fn parse(source: &str, name: &str) -> Result<Vec<Assertion>> {
    serde_json::from_str(source)
        .map_err(|e| ComicdbError::load(format!("Could not parse {}: {}", name, e)))
}

/// Reads the fixture from `path` when one is given, otherwise uses the
/// embedded one.
pub fn read(path: Option<&Path>, embedded: &str, name: &str) -> Result<Vec<Assertion>> {
    let assertions = match path {
        Some(path) => {
            let source = fs::read_to_string(path).map_err(|e| {
                ComicdbError::load(format!("Could not read {} '{}': {}", name, path.display(), e))
            })?;
            parse(&source, name)?
        }
        None => parse(embedded, name)?,
    };
    debug!(fixture = name, assertions = assertions.len(), "fixture read");
    Ok(assertions)
}
