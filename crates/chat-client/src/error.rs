use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Empty text, self-addressed message, bad input
    #[error("{0}")]
    Validation(String),

    /// Unknown peer or sender
    #[error("{0}")]
    NotFound(String),

    #[error("Not authenticated")]
    Unauthorized,

    #[error("No conversation is open")]
    NoConversation,

    #[error("History for this conversation is still loading")]
    NotLive,

    #[error("A message is already being sent")]
    SendInFlight,

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Live channel error: {0}")]
    Live(String),

    #[error("Join refused: {0}")]
    JoinRefused(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
