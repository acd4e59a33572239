use thiserror::Error;

/// Errors returned by the Jellyfin API client.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The server rejected the API token (HTTP 401).
    #[error("invalid jellyfin api token")]
    InvalidToken,

    /// Any other non-success status. The body is discarded.
    #[error("unexpected status {status} from {path}")]
    UnknownApi { status: u16, path: String },

    /// Transport failure: connect, timeout or reading the body.
    #[error("requesting {path}: {source}")]
    Technical {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    /// The body was not the JSON shape we expected.
    #[error("decoding response from {path}: {source}")]
    UnknownResponse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidToken => "invalid_token",
            Self::UnknownApi { .. } => "unknown_api_error",
            Self::Technical { .. } => "technical_error",
            Self::UnknownResponse { .. } => "unknown_response_format",
        }
    }

    pub fn is_invalid_token(&self) -> bool {
        matches!(self, Self::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(FetchError::InvalidToken.kind(), "invalid_token");
        assert_eq!(
            FetchError::UnknownApi {
                status: 500,
                path: "/Sessions".to_string(),
            }
            .kind(),
            "unknown_api_error"
        );

        let decode_err = serde_json::from_str::<u64>("nope").expect_err("should fail");
        assert_eq!(
            FetchError::UnknownResponse {
                path: "/Items/Counts".to_string(),
                source: decode_err,
            }
            .kind(),
            "unknown_response_format"
        );
    }

    #[test]
    fn test_display_includes_status_and_path() {
        let err = FetchError::UnknownApi {
            status: 503,
            path: "/Sessions".to_string(),
        };
        assert_eq!(err.to_string(), "unexpected status 503 from /Sessions");
        assert!(!err.is_invalid_token());
        assert!(FetchError::InvalidToken.is_invalid_token());
    }
}
