use thiserror::Error;

pub type Result<T> = std::result::Result<T, AlertError>;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("session store error: {0}")]
    Session(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("handshake rejected: {0}")]
    Handshake(String),

    #[error("invalid frame: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("connection closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for AlertError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => AlertError::Closed,
            WsError::Http(response) => {
                AlertError::Handshake(format!("server answered {}", response.status()))
            }
            other => AlertError::Transport(other.to_string()),
        }
    }
}

impl AlertError {
    /// Errors that count against the reconnect budget rather than ending the session outright
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AlertError::Transport(_) | AlertError::Handshake(_) | AlertError::Closed
        )
    }
}
