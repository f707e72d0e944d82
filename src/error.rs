/// Error types for the chat client core
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("not connected to the chat server")]
    NotConnected,

    #[error("timed out: {0}")]
    Timeout(String),

    /// Missing/expired token. Distinct from plain connectivity failures so
    /// callers can route the user to re-authentication instead of a retry.
    #[error("session expired, please log in again")]
    SessionExpired,

    #[error("server rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    /// An offer message with no parseable amount. Never downgraded to a
    /// silent zero.
    #[error("could not determine offer amount")]
    OfferAmount,

    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;
