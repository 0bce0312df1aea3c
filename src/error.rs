
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComicdbError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Store initialization error: {0}")]
    StoreInit(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Load error: {message}")]
    Load { message: String },
    #[error("Query error: {0}")]
    Query(String),
    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),
}

impl ComicdbError {
    pub fn load(message: impl Into<String>) -> Self {
        Self::Load { message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, ComicdbError>;

// Helper conversions
impl From<rusqlite::Error> for ComicdbError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<serde_json::Error> for ComicdbError {
    fn from(e: serde_json::Error) -> Self { Self::load(e.to_string()) }
}
impl From<config::ConfigError> for ComicdbError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
