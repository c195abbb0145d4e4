use thiserror::Error;

/// Why a data request produced no rows. Never fatal: callers fold it into
/// `QueryState::error` and keep whatever data they already had.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    /// The API answered with an object carrying `message` or `error`.
    #[error("{0}")]
    Api(String),
    /// Connection, TLS or I/O failure before a body was read.
    #[error("{0}")]
    Transport(String),
    #[error("invalid JSON response: {0}")]
    Decode(String),
    #[error("Unexpected response shape")]
    UnexpectedShape,
}

impl From<ureq::Transport> for DataError {
    fn from(t: ureq::Transport) -> Self {
        DataError::Transport(t.to_string())
    }
}

impl From<std::io::Error> for DataError {
    fn from(e: std::io::Error) -> Self {
        DataError::Transport(e.to_string())
    }
}
