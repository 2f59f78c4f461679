use thiserror::Error;

/// Errors returned by [`crate::RelayClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("not connected")]
    NotConnected,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The relay answered with `{"status": "error", ...}`.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("unexpected status: {0}")]
    UnexpectedStatus(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
