// crates/podflux-core/src/error.rs

use podflux_parser::ParserError;
use thiserror::Error;

use crate::schema::ValidationError;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No source directories found on remote '{remote}'; cannot process and send any data")]
    NoSources { remote: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Parsing failed: {0}")]
    Parser(#[from] ParserError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("File '{name}' is not valid UTF-8")]
    Encoding { name: String },
}

impl PipelineError {
    /// Errors that make a whole run unusable, as opposed to a single POD.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Config(_) | PipelineError::NoSources { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
