//! Error types shared across Blackbox crates.

/// Top-level error type for Blackbox operations.
#[derive(Debug, thiserror::Error)]
pub enum BlackboxError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Encode error: {message}")]
    Encode { message: String },

    #[error("Retention error: {message}")]
    Retention { message: String },

    #[error("Resource error: {message}")]
    Resource { message: String },

    #[error("Platform error: {message}")]
    Platform { message: String },

    #[error("Session error: {message}")]
    Session { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using BlackboxError.
pub type BlackboxResult<T> = Result<T, BlackboxError>;

impl BlackboxError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode {
            message: msg.into(),
        }
    }

    pub fn retention(msg: impl Into<String>) -> Self {
        Self::Retention {
            message: msg.into(),
        }
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource {
            message: msg.into(),
        }
    }

    pub fn platform(msg: impl Into<String>) -> Self {
        Self::Platform {
            message: msg.into(),
        }
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Wrap an encoder I/O failure, promoting a full disk to a fatal
    /// resource error.
    pub fn encode_io(context: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::StorageFull {
            Self::resource(format!("{context}: {err}"))
        } else {
            Self::encode(format!("{context}: {err}"))
        }
    }

    /// Whether this error ends the whole recording session rather than
    /// just the current segment.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Resource { .. } => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::StorageFull,
            _ => false,
        }
    }
}
