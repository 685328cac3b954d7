//! Error types for the analysis service client.

use thiserror::Error;

/// Failures surfaced by [`ServiceClient`](super::ServiceClient).
///
/// Every variant is `Clone` so a single de-duplicated sync outcome can be
/// handed to all of its waiters.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// Bad call arguments, caught before any network attempt.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Transport failure: no response was received.
    #[error("network error: {0}")]
    Network(String),

    /// Non-success response from the service.
    #[error("server error (status {status}): {body}")]
    Server { status: u16, body: String },

    /// Opening or changing a document failed.
    #[error("sync failed for {path}: {source}")]
    Sync {
        path: String,
        #[source]
        source: Box<ServiceError>,
    },

    /// The service answered with a body we could not interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A shared sync was abandoned before it produced an outcome.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl ServiceError {
    pub(crate) fn sync(path: &str, source: ServiceError) -> Self {
        Self::Sync {
            path: path.to_string(),
            source: Box::new(source),
        }
    }

    /// True when no response was received at all.
    pub fn is_network(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Sync { source, .. } => source.is_network(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ServiceError::Server {
            status: 500,
            body: "pyright crashed".into(),
        };
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("pyright crashed"));

        let err = ServiceError::Validation("filePath required".into());
        assert!(err.to_string().contains("filePath required"));
    }

    #[test]
    fn sync_wraps_cause() {
        let err = ServiceError::sync("/tmp/a.py", ServiceError::Network("refused".into()));
        assert!(err.to_string().contains("/tmp/a.py"));
        assert!(err.to_string().contains("refused"));
        assert!(err.is_network());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn server_error_is_not_network() {
        let err = ServiceError::sync(
            "a.py",
            ServiceError::Server {
                status: 400,
                body: String::new(),
            },
        );
        assert!(!err.is_network());
    }
}
