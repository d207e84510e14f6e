use thiserror::Error;

/// Main error type for Flair API operations
#[derive(Debug, Error)]
pub enum FlairError {
    /// Token exchange failed
    #[error("authentication failed: {reason}")]
    Auth { status: Option<u16>, reason: String },

    /// Root link discovery failed
    #[error("link discovery failed: {reason}")]
    Discovery { status: Option<u16>, reason: String },

    /// Entity type absent from the link table
    #[error("unknown entity type '{0}'")]
    UnknownEntityType(String),

    /// Non-2xx response on a data call
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// Response body is not valid JSON
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// Well-formed response missing an expected field
    #[error("unexpected response shape: {0}")]
    Schema(String),

    /// No resource of the type carries the requested name
    #[error("no {entity_type} resource named '{name}'")]
    NameNotFound { entity_type: String, name: String },

    /// More than one resource of the type carries the requested name
    #[error("{count} {entity_type} resources are named '{name}'")]
    AmbiguousName {
        entity_type: String,
        name: String,
        count: usize,
    },

    /// Name-based control attempted before the type was fetched
    #[error("no snapshot of '{0}' has been fetched")]
    StalePrecondition(String),

    /// Request building error
    #[error("failed to build request: {0}")]
    RequestBuild(String),

    /// HTTP client error, including timeouts
    #[error("HTTP client error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlairError {
    /// Create a new HTTP error
    pub fn http(status: u16, body: String) -> Self {
        FlairError::Http { status, body }
    }

    /// Create a new schema error
    pub fn schema(message: impl Into<String>) -> Self {
        FlairError::Schema(message.into())
    }

    /// Get the HTTP status code carried by this error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FlairError::Http { status, .. } => Some(*status),
            FlairError::Auth { status, .. } | FlairError::Discovery { status, .. } => *status,
            FlairError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if this error is a not found error (404)
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// Check if the request timed out before a response arrived
    pub fn is_timeout(&self) -> bool {
        matches!(self, FlairError::Transport(e) if e.is_timeout())
    }
}

/// Result type for Flair API operations
pub type Result<T> = std::result::Result<T, FlairError>;
