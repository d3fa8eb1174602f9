use thiserror::Error;

#[derive(Error, Debug)]
pub enum CovtrackError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("XML write error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed hunk header: {0}")]
    MalformedHunk(String),

    #[error("{tool} failed: {detail}")]
    ExternalTool { tool: String, detail: String },

    #[error("Snapshot store error: {0}")]
    Store(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CovtrackError>;
