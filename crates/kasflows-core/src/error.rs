use thiserror::Error;

/// Errors produced by the relay core.
///
/// `AlreadyConnected`, `NotConnected` and "no message" are normal outcomes
/// and are modelled as return values, not errors.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Client not found")]
    ClientNotFound(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RelayResult<T> = Result<T, RelayError>;
