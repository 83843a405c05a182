use thiserror::Error;

/// Application-wide error types for vendex.
#[derive(Error, Debug)]
pub enum AppError {
    /// The upstream proxy answered instead of the target site.
    #[error("Proxy error: upstream proxy failure page returned")]
    ProxyError,

    /// The login page was expected but something else came back
    /// (already authenticated, or the page shape changed).
    #[error("Main page error: login page marker not found")]
    MainPageError,

    /// A required selector or pattern matched nothing.
    #[error("Field missing: {0}")]
    FieldMissing(String),

    /// A matched value could not be converted to its target type.
    #[error("Parse failure in {field}: {value:?}")]
    ParseFailure { field: String, value: String },

    /// HTTP request failed (fetching a page or image).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// OCR engine failed to recognize the captcha image.
    #[error("OCR error: {0}")]
    OcrError(String),

    /// Invalid or missing configuration.
    #[error("Config error: {0}")]
    ConfigError(String),
}

impl AppError {
    /// Shorthand for a [`AppError::ParseFailure`].
    pub fn parse_failure(field: impl Into<String>, value: impl Into<String>) -> Self {
        AppError::ParseFailure {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::ProxyError | AppError::NetworkError(_) | AppError::Timeout(_) => true,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }

    /// Returns true if the error means the login handshake cannot continue.
    ///
    /// Per-field extraction failures are not structural: the record they
    /// belong to degrades instead.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            AppError::ProxyError | AppError::MainPageError | AppError::FieldMissing(_)
        )
    }
}
