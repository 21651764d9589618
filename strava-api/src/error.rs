use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::transport::TransportError;

pub(crate) const UNPROCESSABLE_RESPONSE: &str = "could not process response";

#[derive(Debug, Clone, thiserror::Error)]
pub enum StravaError {
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Invalid HTTP status: {status}")]
    InvalidStatus { status: StatusCode, headers: HeaderMap },

    #[error("Authorization cancelled")]
    AuthorizationCancelled,

    #[error("Authorization failed ({stage}): {detail}")]
    AuthorizationFailed { stage: AuthStage, detail: String },

    #[error("Upload failed: {0}")]
    UploadFailed(String),
}

impl StravaError {
    pub fn authorization(stage: AuthStage, detail: impl Into<String>) -> Self {
        StravaError::AuthorizationFailed {
            stage,
            detail: detail.into(),
        }
    }

    pub fn unprocessable() -> Self {
        StravaError::UploadFailed(UNPROCESSABLE_RESPONSE.to_string())
    }

    /// HTTP status carried by the error, if the server answered at all
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            StravaError::InvalidStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, StravaError::TransportFailure(_))
    }
}

impl From<TransportError> for StravaError {
    fn from(err: TransportError) -> Self {
        StravaError::TransportFailure(err.to_string())
    }
}

/// Where in the authorization flow a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    /// Building the authorization URL
    Request,
    /// Presenting the consent surface
    Consent,
    /// Interpreting the callback URL
    Callback,
    /// Exchanging the code or refresh token
    TokenExchange,
    /// A newer authorize call replaced this one
    Superseded,
}

impl Display for AuthStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match self {
            AuthStage::Request => "request",
            AuthStage::Consent => "consent",
            AuthStage::Callback => "callback",
            AuthStage::TokenExchange => "token exchange",
            AuthStage::Superseded => "superseded",
        };
        f.write_str(stage)
    }
}

/// Error payload returned by the API on rejected requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub resource: String,
    pub field: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn decode(body: &[u8]) -> Option<Self> {
        serde_json::from_slice(body).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_error_payload() {
        let body = br#"{
            "message": "Bad Request",
            "errors": [{"resource": "Upload", "field": "file", "code": "content is missing"}]
        }"#;
        let payload = ErrorResponse::decode(body).unwrap();
        assert_eq!(payload.message, "Bad Request");
        assert_eq!(payload.errors.len(), 1);
        assert_eq!(payload.errors[0].code, "content is missing");
    }

    #[test]
    fn rejects_non_error_payload() {
        assert!(ErrorResponse::decode(b"<html>502</html>").is_none());
        assert!(ErrorResponse::decode(br#"{"id": 3}"#).is_none());
    }

    #[test]
    fn transport_errors_map_to_transport_failure() {
        let err: StravaError = TransportError::Timeout.into();
        assert!(err.is_transport());
        assert_eq!(err.status(), None);
    }
}
