use std::fmt;
use std::io::{self, Write};

use crate::catalog::{Catalog, Issue};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Title {
    pub name: String,
    pub issues: Vec<Issue>,
}

/// The printed catalog, one block per comic title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    titles: Vec<Title>,
}

impl Report {
    pub fn from_catalog(catalog: &Catalog) -> Report {
        let titles = catalog
            .comics()
            .iter()
            .map(|comic| Title {
                name: comic.name.clone(),
                issues: catalog.issues(comic.comic).to_vec(),
            })
            .collect();
        Report { titles }
    }
    pub fn titles(&self) -> &[Title] {
        &self.titles
    }
    pub fn title(&self, name: &str) -> Option<&Title> {
        self.titles.iter().find(|t| t.name == name)
    }
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "{}", self)?;
        out.flush()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for title in &self.titles {
            writeln!(f)?;
            writeln!(f, "Title: {}", title.name)?;
            for issue in &title.issues {
                writeln!(f, "\tIssue #{} - {}", issue.number, issue.name)?;
            }
        }
        Ok(())
    }
}
