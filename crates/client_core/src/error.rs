use shared::domain::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid firmware url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{path} returned HTTP {status}")]
    HttpStatus { path: String, status: u16 },
    #[error("malformed response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{command} reported unexpected status '{status}'")]
    UnexpectedStatus { command: Command, status: String },
}

pub type Result<T> = std::result::Result<T, ClientError>;
