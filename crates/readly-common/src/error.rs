//! Common error types used throughout readly.
//!
//! The variants follow the failure classes of the conversion service:
//! invalid caller input, unknown jobs or missing artifacts, quota rejection,
//! conversion failures reported by the renderer, storage failures, and
//! administrative configuration or credential problems.

/// Common error type for readly.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested job or artifact was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input was provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The device exhausted its conversion quota.
    #[error("Rate limit exceeded. Maximum {max_per_day} conversions per day.")]
    RateLimited { max_per_day: u32 },

    /// The external conversion operation failed.
    #[error("{0}")]
    Conversion(String),

    /// A required setting is missing.
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// The supplied credentials were rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new NotFound error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new InvalidInput error.
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new Conversion error carrying the renderer's message verbatim.
    pub fn conversion<S: Into<String>>(msg: S) -> Self {
        Self::Conversion(msg.into())
    }

    /// Create a new NotConfigured error.
    pub fn not_configured<S: Into<String>>(msg: S) -> Self {
        Self::NotConfigured(msg.into())
    }

    /// Create a new Unauthorized error.
    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Create a new Database error.
    pub fn database<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }

    /// Create a new Internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// HTTP status code that best represents this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::InvalidInput(_) => 400,
            Self::RateLimited { .. } => 429,
            Self::Unauthorized(_) => 401,
            Self::Conversion(_)
            | Self::NotConfigured(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "validation_error",
            Self::RateLimited { .. } => "rate_limited",
            Self::Conversion(_) => "conversion_failed",
            Self::NotConfigured(_) => "not_configured",
            Self::Unauthorized(_) => "unauthorized",
            Self::Database(_) => "database_error",
            Self::Io(_) => "io_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
