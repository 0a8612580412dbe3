use kubesift_types::CoordinateError;

/// Errors surfaced by cluster calls. None of them are retried.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error(transparent)]
    InvalidCoordinate(#[from] CoordinateError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{message} ({reason}, HTTP {code})")]
    Api {
        code: u16,
        reason: String,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(#[source] kube::Error),

    #[error("failed to convert object to JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("request cancelled")]
    Cancelled,
}

impl AccessError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Api { code: 409, .. })
    }

    /// Human readable status message from the API server, if this is a status error
    pub fn status_message(&self) -> Option<&str> {
        match self {
            Self::NotFound(message) | Self::Api { message, .. } => Some(message),
            _ => None,
        }
    }
}

impl From<kube::Error> for AccessError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => Self::NotFound(resp.message),
            kube::Error::Api(resp) => Self::Api {
                code: resp.code,
                reason: resp.reason,
                message: resp.message,
            },
            other => Self::Transport(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;
    use serde_json::json;

    fn api_error(code: u16, reason: &str, message: &str) -> kube::Error {
        let resp: ErrorResponse = serde_json::from_value(json!({
            "status": "Failure",
            "message": message,
            "reason": reason,
            "code": code,
        }))
        .unwrap();
        kube::Error::Api(resp)
    }

    #[test]
    fn test_404_maps_to_not_found() {
        let err = AccessError::from(api_error(404, "NotFound", "pods \"web\" not found"));
        assert!(err.is_not_found());
        assert_eq!(err.status_message(), Some("pods \"web\" not found"));
    }

    #[test]
    fn test_conflict_is_api_error() {
        let err = AccessError::from(api_error(409, "AlreadyExists", "already exists"));
        assert!(err.is_conflict());
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "already exists (AlreadyExists, HTTP 409)");
    }

    #[test]
    fn test_forbidden_keeps_message() {
        let err = AccessError::from(api_error(403, "Forbidden", "user cannot list pods"));
        assert!(matches!(err, AccessError::Api { code: 403, .. }));
        assert_eq!(err.status_message(), Some("user cannot list pods"));
    }
}
