use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected response status {0}")]
    Status(reqwest::StatusCode),
    #[error("event stream error: {0}")]
    Stream(String),
    #[error("connection refused: {0}")]
    Refused(String),
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("invalid backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
