use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Connectivity Errors
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timed out while {0}")]
    Timeout(&'static str),

    #[error("No message received for {silent_ms}ms")]
    SilenceTimeout { silent_ms: u64 },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Upstream returned status {0}")]
    UpstreamStatus(u16),

    // Authentication Errors
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    // Data Errors
    #[error("Deserialization failed: {0}")]
    DeserializationError(String),

    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("Empty quote response for {0} symbols")]
    EmptyQuoteResponse(usize),

    #[error("Previous close lookup failed: {0}")]
    LookupFailed(String),

    // Configuration Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // System Errors
    #[error("Event channel closed")]
    ChannelClosed,

    #[error("Shutdown in progress")]
    ShuttingDown,

    #[error("Task {name} failed: {details}")]
    TaskFailed { name: String, details: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure classes that decide how an error is retried and at which level
/// it is logged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Socket errors, timeouts, HTTP failures. Retried with backoff.
    Transient,
    /// Rejected credentials. Retried on the next cycle, logged as error.
    Authentication,
    /// Bad configuration. Retried on the next cycle, logged as error.
    Configuration,
    /// Undecodable or invalid upstream data. Counted, never fatal.
    Data,
    /// Process-internal faults (closed channels, failed tasks).
    Internal,
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::ConnectionFailed(_)
            | Error::ConnectionClosed
            | Error::Timeout(_)
            | Error::SilenceTimeout { .. }
            | Error::Http(_)
            | Error::UpstreamStatus(_) => ErrorClass::Transient,
            Error::AuthenticationError(_) => ErrorClass::Authentication,
            Error::ConfigError(_) => ErrorClass::Configuration,
            Error::DeserializationError(_)
            | Error::InvalidSymbol(_)
            | Error::EmptyQuoteResponse(_)
            | Error::LookupFailed(_) => ErrorClass::Data,
            Error::ChannelClosed
            | Error::ShuttingDown
            | Error::TaskFailed { .. } => ErrorClass::Internal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Error::ConnectionClosed,
            WsError::Http(response) => {
                let status = response.status();
                if status.as_u16() == 401 || status.as_u16() == 403 {
                    Error::AuthenticationError(format!("handshake rejected with {}", status))
                } else {
                    Error::ConnectionFailed(format!("handshake rejected with {}", status))
                }
            }
            other => Error::ConnectionFailed(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout("fetching quotes")
        } else if e.is_decode() {
            Error::DeserializationError(e.to_string())
        } else if let Some(status) = e.status() {
            Error::UpstreamStatus(status.as_u16())
        } else {
            Error::Http(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::DeserializationError(e.to_string())
    }
}
