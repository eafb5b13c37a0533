use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} while fetching {url}")]
    Status { url: String, status: u16 },

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Invalid page data: {0}")]
    InvalidPageData(String),

    #[error("Category mapping is empty; run the `categories` command first")]
    EmptyCategoryMapping,

    #[error("Record {slug} failed: {message}")]
    Record { slug: String, message: String },
}

pub type Result<T> = std::result::Result<T, ScraperError>;

/// Failure to read a single field out of a loosely-typed JSON record.
///
/// These never abort a record: the record loader skips the field and keeps
/// the error as a [`crate::domain::FieldIssue`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("field #{index} is not a JSON object (found {found})")]
    NotAnObject { index: usize, found: &'static str },
}

/// Short name of a JSON value's type, used in error and log messages.
pub fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
