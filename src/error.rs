use thiserror::Error;

/// Failures a synchronization cycle can run into.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Credentials missing or empty. Detected before any network call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The listing endpoint answered with a non-success status.
    #[error("listing request failed with HTTP {status}: {message}")]
    Transport { status: u16, message: String },

    /// The request never completed (DNS, TLS, connection reset, ...).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The listing endpoint answered with a body we could not decode.
    #[error("malformed listing response: {0}")]
    Decode(String),
}

/// Coarse classification used by the engine and the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Transport,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Configuration(_) => ErrorKind::Configuration,
            SyncError::Transport { .. } | SyncError::Network(_) | SyncError::Decode(_) => {
                ErrorKind::Transport
            }
        }
    }
}

impl ErrorKind {
    /// Whether waiting for the next scheduled cycle can fix this.
    ///
    /// Configuration errors persist until the user changes the settings.
    pub fn retry_on_schedule(self) -> bool {
        self == ErrorKind::Transport
    }
}
