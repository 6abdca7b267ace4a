//! error handling stuff
use {std::path::PathBuf, thiserror::Error};

#[derive(Debug, Error)]
/// An error
pub enum SyncError {
    /// an IO error
    #[error("i/o error: {0}")]
    IO(#[from] std::io::Error),

    /// a reqwest error
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// a json error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// a config error
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    /// a url parse error
    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// an invalid header value
    #[error("invalid header value: {0}")]
    HeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    /// a transient transport failure (gateway timeout, service unavailable,
    /// too many requests), recoverable with backoff
    #[error("transient http {status}: {message}")]
    Transient { status: u16, message: String },

    /// a request conflict, never retried
    #[error("conflict: {0}")]
    Conflict(String),

    /// the server couldn't find the requested resource
    #[error("not found: {0}")]
    NotFound(String),

    /// the request body was rejected as too large
    #[error("content too large: {0}")]
    ContentTooLarge(String),

    /// the request was malformed or rejected by validation
    #[error("bad request: {0}")]
    BadRequest(String),

    /// a destination integrity failure, retried once with a fresh read
    #[error("integrity error: {0}")]
    Integrity(String),

    /// a post referenced a local file that does not exist
    #[error("missing file: {0}")]
    MissingFile(PathBuf),

    /// no plugin matched the requested domain/category/name
    #[error("no plugin found for {0}")]
    NoPlugin(String),

    /// a typed error envelope from the destination server
    #[error("server error {name}: {description}")]
    Server { name: String, description: String },

    /// the run was interrupted by a signal
    #[error("interrupted")]
    Interrupted,

    /// a custom error
    #[error("error: {0}")]
    Other(String),
}

impl From<String> for SyncError {
    fn from(value: String) -> Self {
        Self::Other(value)
    }
}

impl SyncError {
    /// classify an http status code plus response body into an error
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 | 503 | 504 => Self::Transient {
                status,
                message: body,
            },
            400 => Self::BadRequest(body),
            404 => Self::NotFound(body),
            409 => Self::Conflict(body),
            413 => Self::ContentTooLarge(body),
            _ => Self::Other(format!("http {status}: {body}")),
        }
    }

    /// map a `{name, description}` server envelope to a typed error
    pub fn from_envelope(status: u16, name: String, description: String) -> Self {
        if name.contains("AlreadyExists") {
            Self::Conflict(format!("{name}: {description}"))
        } else if name.contains("NotFound") {
            Self::NotFound(format!("{name}: {description}"))
        } else if name.contains("Integrity") {
            Self::Integrity(description)
        } else if name.contains("Validation") || name.contains("InvalidParameter") {
            Self::BadRequest(format!("{name}: {description}"))
        } else if matches!(status, 429 | 503 | 504) {
            Self::Transient {
                status,
                message: format!("{name}: {description}"),
            }
        } else {
            Self::Server { name, description }
        }
    }

    /// whether this error should be retried with backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// whether this error is a protocol conflict (never retried)
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// whether this error means the resource was absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// A result using [`SyncError`] as the `Err` variant
pub type Result<T, U = SyncError> = std::result::Result<T, U>;

/// bail
#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::error::SyncError::from(String::from($msg)))
    };

    ($err:expr $(,)?) => {
        return Err($crate::error::SyncError::from($err))
    };

    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::error::SyncError::from(format!($fmt, $($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses_classify_as_transient() {
        for status in [429, 503, 504] {
            let err = SyncError::from_status(status, String::new());
            assert!(err.is_transient(), "{status} should be transient");
        }
    }

    #[test]
    fn conflict_is_never_transient() {
        let err = SyncError::from_status(409, "conflict".into());
        assert!(err.is_conflict());
        assert!(!err.is_transient());
    }

    #[test]
    fn envelope_names_map_to_kinds() {
        let err = SyncError::from_envelope(400, "TagAlreadyExistsError".into(), "dup".into());
        assert!(err.is_conflict());

        let err = SyncError::from_envelope(404, "TagNotFoundError".into(), "gone".into());
        assert!(err.is_not_found());

        let err = SyncError::from_envelope(500, "IntegrityError".into(), "bad state".into());
        assert!(matches!(err, SyncError::Integrity(_)));
    }
}
