//! Error types for chit

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("Backend returned HTTP {status}: {body}")]
    BackendError { status: u16, body: String },

    #[error("Backend protocol error: {0}")]
    BackendProtocol(String),

    #[error("No JSON object found in model reply:\n{0}")]
    NoJsonFound(String),

    #[error("Model reply contained malformed JSON ({reason}):\n{raw}")]
    MalformedJson { reason: String, raw: String },

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Record corrupt: {id}: {reason}")]
    RecordCorrupt { id: String, reason: String },

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl Error {
    /// Map a reqwest transport failure onto the backend error taxonomy.
    /// Decode failures mean the service answered with a body we could not
    /// digest; everything else means it never answered properly.
    pub(crate) fn transport(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Error::BackendProtocol(err.to_string())
        } else {
            Error::BackendUnreachable(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
