// issues are grouped per comic
use std::collections::HashMap;

use tracing::debug;

// our own stuff that we need
use crate::construct::{Database, Thing, ThingHasher};
use crate::datatype::ValueType;
use crate::error::{ComicdbError, Result};

// ------------- Catalog -------------
// All comics are found through comic/name, then the issues of each comic
// through the reverse index on issue/comic. Issues are kept per comic in
// ascending number order.
pub const COMIC_NAME: &str = "comic/name";
pub const ISSUE_NAME: &str = "issue/name";
pub const ISSUE_NUMBER: &str = "issue/number";
pub const ISSUE_COMIC: &str = "issue/comic";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comic {
    pub comic: Thing,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub issue: Thing,
    pub name: String,
    pub number: i64,
}

#[derive(Debug)]
pub struct Catalog {
    comics: Vec<Comic>,
    issues: HashMap<Thing, Vec<Issue>, ThingHasher>,
}

// the lookups below rely on these types
fn require_type(database: &Database, ident: &str, value_type: ValueType) -> Result<()> {
    let attribute = database
        .attribute(ident)
        .ok_or_else(|| ComicdbError::Query(format!("Unable to resolve attribute :{}", ident)))?;
    if attribute.value_type() != value_type {
        return Err(ComicdbError::Query(format!(
            "Attribute :{} has value type {}, expected {}",
            ident,
            attribute.value_type(),
            value_type
        )));
    }
    Ok(())
}

impl Catalog {
    pub fn build(database: &Database) -> Result<Catalog> {
        require_type(database, COMIC_NAME, ValueType::String)?;
        require_type(database, ISSUE_NAME, ValueType::String)?;
        require_type(database, ISSUE_NUMBER, ValueType::Long)?;
        require_type(database, ISSUE_COMIC, ValueType::Ref)?;

        let mut comics = Vec::new();
        let mut issues = HashMap::<Thing, Vec<Issue>, ThingHasher>::default();
        for comic in database.entities_with(COMIC_NAME)?.iter() {
            for name in database.values(comic, COMIC_NAME)? {
                if let Some(name) = name.as_str() {
                    comics.push(Comic {
                        comic,
                        name: name.to_string(),
                    });
                }
            }
            if issues.contains_key(&comic) {
                continue;
            }
            let mut found = Vec::new();
            for issue in database.referencing(ISSUE_COMIC, comic)?.iter() {
                let names = database.values(issue, ISSUE_NAME)?;
                let numbers = database.values(issue, ISSUE_NUMBER)?;
                if names.is_empty() || numbers.is_empty() {
                    debug!(issue, comic, "skipping issue without name or number");
                    continue;
                }
                for name in names.iter().filter_map(|n| n.as_str()) {
                    for number in numbers.iter().filter_map(|n| n.as_long()) {
                        found.push(Issue {
                            issue,
                            name: name.to_string(),
                            number,
                        });
                    }
                }
            }
            // stable, so equal numbers keep their identity order
            found.sort_by_key(|issue| issue.number);
            issues.insert(comic, found);
        }
        debug!(comics = comics.len(), "catalog built");
        Ok(Catalog { comics, issues })
    }
    pub fn comics(&self) -> &[Comic] {
        &self.comics
    }
    pub fn issues(&self, comic: Thing) -> &[Issue] {
        self.issues.get(&comic).map(Vec::as_slice).unwrap_or(&[])
    }
    pub fn len(&self) -> usize {
        self.comics.len()
    }
    pub fn is_empty(&self) -> bool {
        self.comics.is_empty()
    }
}
