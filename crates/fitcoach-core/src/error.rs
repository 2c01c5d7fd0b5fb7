use thiserror::Error;

/// Every failure a backend call can produce, normalized to a displayable message.
///
/// The type is `Clone` so a single in-flight request can hand the same result
/// to every subscriber that is waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request never produced a response (connection refused, DNS, reset).
    #[error("{0}")]
    Transport(String),

    /// The backend answered with a non-2xx status.
    #[error("{message}")]
    Status { status: u16, message: String },

    /// The response body was not the JSON shape we expected.
    #[error("invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Build a status error from the response body, falling back to the reason phrase.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = if body.is_empty() {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.as_u16().to_string())
        } else {
            body.to_string()
        };
        ApiError::Status {
            status: status.as_u16(),
            message,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_error_uses_body() {
        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "overloaded");
        assert_eq!(err.to_string(), "overloaded");
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn test_status_error_falls_back_to_reason() {
        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, "");
        assert_eq!(err.to_string(), "Bad Gateway");

        // only a truly empty body falls back
        let err = ApiError::from_status(StatusCode::NOT_FOUND, "  \n");
        assert_eq!(err.to_string(), "  \n");
    }

    #[test]
    fn test_status_error_without_reason() {
        let status = StatusCode::from_u16(599).unwrap();
        let err = ApiError::from_status(status, "");
        assert_eq!(err.to_string(), "599");
    }

    #[test]
    fn test_decode_error_message() {
        let err: ApiError = serde_json::from_str::<Vec<String>>("{").unwrap_err().into();
        assert!(err.to_string().starts_with("invalid response:"));
        assert_eq!(err.status(), None);
    }
}
