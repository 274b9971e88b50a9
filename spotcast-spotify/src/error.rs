use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("PREMIUM_REQUIRED: {0}")]
    PremiumRequired(String),

    #[error("NO_ACTIVE_DEVICE: {0}")]
    NoActiveDevice(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Spotify API error ({status}): {message}")]
    Api {
        status: u16,
        reason: Option<String>,
        message: String,
    },

    #[error("Authentication error: {0}")]
    Auth(String),
}

impl SpotifyError {
    pub fn is_premium_required(&self) -> bool {
        matches!(self, SpotifyError::PremiumRequired(_))
    }

    /// Classifies a non-success response from the Web API using its status and
    /// the `{"error": {...}}` body the player endpoints return.
    pub fn from_response(status: u16, body: &str) -> Self {
        let detail = serde_json::from_str::<ApiErrorEnvelope>(body)
            .ok()
            .and_then(|env| env.error.into_detail());

        let (message, reason) = match detail {
            Some(d) => (d.message, d.reason),
            None if body.trim().is_empty() => (format!("HTTP {status}"), None),
            None => (body.trim().to_string(), None),
        };

        match (status, reason.as_deref()) {
            (_, Some("PREMIUM_REQUIRED")) => SpotifyError::PremiumRequired(message),
            (_, Some("NO_ACTIVE_DEVICE")) => SpotifyError::NoActiveDevice(message),
            (401, _) => SpotifyError::Unauthorized(message),
            (404, _) => SpotifyError::NotFound(message),
            _ => SpotifyError::Api { status, reason, message },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

/// The accounts service answers `{"error": "invalid_grant", "error_description": ...}`
/// while the Web API answers `{"error": {"status", "message", "reason"}}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiErrorBody {
    Detailed(ApiErrorDetail),
    Code(String),
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    reason: Option<String>,
}

impl ApiErrorBody {
    fn into_detail(self) -> Option<ApiErrorDetail> {
        match self {
            ApiErrorBody::Detailed(d) => Some(d),
            ApiErrorBody::Code(code) => Some(ApiErrorDetail { message: code, reason: None }),
        }
    }
}

pub type Result<T> = std::result::Result<T, SpotifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn premium_reason_wins_over_status() {
        let body = r#"{"error":{"status":403,"message":"Player command failed: Premium required","reason":"PREMIUM_REQUIRED"}}"#;
        let err = SpotifyError::from_response(403, body);
        assert!(err.is_premium_required());
        assert!(err.to_string().contains("PREMIUM_REQUIRED"));
    }

    #[test]
    fn not_found_from_status() {
        let body = r#"{"error":{"status":404,"message":"Device not found"}}"#;
        match SpotifyError::from_response(404, body) {
            SpotifyError::NotFound(msg) => assert_eq!(msg, "Device not found"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn plain_text_body_is_kept() {
        match SpotifyError::from_response(502, "bad gateway") {
            SpotifyError::Api { status, message, reason } => {
                assert_eq!(status, 502);
                assert_eq!(message, "bad gateway");
                assert!(reason.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn accounts_error_code() {
        match SpotifyError::from_response(400, r#"{"error":"invalid_grant","error_description":"Invalid authorization code"}"#) {
            SpotifyError::Api { message, .. } => assert_eq!(message, "invalid_grant"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
