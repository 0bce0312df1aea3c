use std::path::PathBuf;

// config lets the fixtures and the mirror be swapped without touching code
use config::{Config, File};
use serde::Deserialize;

use crate::construct::PersistenceMode;
use crate::error::Result;

pub const DEFAULT_LOG_FILTER: &str = "comicdb=warn";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub schema_path: Option<PathBuf>,
    #[serde(default)]
    pub data_path: Option<PathBuf>,
    #[serde(default)]
    pub persistence_file: Option<String>,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_path: None,
            data_path: None,
            persistence_file: None,
            log_filter: default_log_filter(),
        }
    }
}

impl Settings {
    /// Reads `comicdb.json` (or any other format `config` knows) from the
    /// working directory. A missing file gives the defaults.
    pub fn load() -> Result<Settings> {
        Self::load_from("comicdb")
    }
    pub fn load_from(name: &str) -> Result<Settings> {
        let settings = Config::builder()
            .add_source(File::with_name(name).required(false))
            .build()?
            .try_deserialize::<Settings>()?;
        Ok(settings)
    }
    pub fn persistence_mode(&self) -> PersistenceMode {
        match &self.persistence_file {
            Some(path) => PersistenceMode::File(path.clone()),
            None => PersistenceMode::InMemory,
        }
    }
}
