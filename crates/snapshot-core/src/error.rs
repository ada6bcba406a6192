use thiserror::Error;

/// Application-wide error types.
///
/// This enum represents every error a snapshot run can produce, from reading
/// the endpoint list to talking to a single OAI-PMH provider. It uses the
/// `thiserror` crate for ergonomic error handling and automatic conversion
/// from underlying library errors.
///
/// # Error Conversion
///
/// Some errors convert from their source types using the `#[from]` attribute:
/// - `std::io::Error` → `AppError::Io`
/// - `serde_json::Error` → `AppError::SerializationError`
///
/// # Examples
///
/// ```no_run
/// use snapshot_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     Err(AppError::Generic("Something went wrong".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// The endpoint list file could not be read.
    ///
    /// This is the only error that aborts a run before any work starts.
    #[error("Cannot read endpoint list {path}: {source}")]
    EndpointList {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// An endpoint identifier is not a usable provider address.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// HTTP request failed in a way that asking again will not fix.
    ///
    /// Covers client-side HTTP statuses (4xx other than 429), unreadable
    /// response bodies and HTTP client construction errors.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// The provider answered with a 5xx status.
    #[error("Server error: HTTP {0}")]
    ServerError(u16),

    /// Network or connection error.
    ///
    /// This error occurs when a network request fails due to connectivity issues,
    /// DNS resolution failures, or the remote server being unreachable.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded. Please wait and try again.")]
    RateLimitExceeded,

    /// The provider answered with an OAI-PMH error element.
    #[error("OAI-PMH error {code}: {message}")]
    Protocol { code: String, message: String },

    /// The endpoint has no new data since the last harvest.
    ///
    /// Sessions return this from a selective run. It is a sentinel, not a
    /// failure: the worker pool never records or retries it.
    #[error("Endpoint is already synchronized")]
    AlreadySynced,

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic application error for cases not covered by specific variants.
    ///
    /// Use this sparingly - prefer creating specific error variants
    /// for better error handling and debugging.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::EndpointList { path, source } => {
                format!(
                    "Cannot read endpoint list {}: {}\n   Pass a readable file with -f, or omit it to use the built-in list.",
                    path, source
                )
            }
            AppError::InvalidEndpoint(endpoint) => {
                format!(
                    "Invalid endpoint: {}\n   Example: https://export.arxiv.org/oai2",
                    endpoint
                )
            }
            AppError::ClientError(msg) => format!("API error: {}", msg),
            AppError::ServerError(status) => {
                format!(
                    "The provider answered HTTP {}.\n   It may be down or overloaded.",
                    status
                )
            }
            AppError::NetworkError(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            AppError::Timeout(secs) => {
                format!(
                    "Request timed out after {} seconds.\n   The provider may be overloaded.",
                    secs
                )
            }
            AppError::RateLimitExceeded => {
                "Too many requests. The provider asked us to slow down.".to_string()
            }
            AppError::Protocol { code, message } if message.is_empty() => {
                format!("The provider reported OAI-PMH error '{}'.", code)
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if this error is a transient transport failure.
    ///
    /// The HTTP retry loop asks again only for these.
    ///
    /// # Examples
    ///
    /// ```
    /// use snapshot_core::error::AppError;
    ///
    /// let err = AppError::NetworkError("connection reset".to_string());
    /// assert!(err.is_retryable());
    ///
    /// let err = AppError::RateLimitExceeded;
    /// assert!(err.is_retryable());
    ///
    /// // Protocol errors come from a provider that answered; asking again won't help.
    /// let err = AppError::Protocol { code: "badArgument".into(), message: String::new() };
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::NetworkError(_)
                | AppError::Timeout(_)
                | AppError::RateLimitExceeded
                | AppError::ServerError(_)
        )
    }

    /// Returns true for the "already synchronized" sentinel.
    pub fn is_already_synced(&self) -> bool {
        matches!(self, AppError::AlreadySynced)
    }
}
