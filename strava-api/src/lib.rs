pub mod compress;
mod config;
pub mod endpoints;
mod error;
mod macros;
pub mod observe;
pub mod transport;
pub mod uploader;

// Always expose testing module (downstream crates test against it)
pub mod testing;

pub use crate::compress::{Compressor, GzipCompressor, NoCompression};
pub use crate::config::{
    ApiConfig, DEFAULT_API_BASE, DEFAULT_APP_AUTHORIZE_URL, DEFAULT_SCOPE,
    DEFAULT_WEB_AUTHORIZE_URL,
};
pub use crate::endpoints::oauth::{ClientCredentials, Credential, ProfileSummary};
pub use crate::endpoints::uploads::{READY_STATUS, UploadJob, UploadRequest};
pub use crate::endpoints::{ActivityType, ContentKind};
pub use crate::error::{AuthStage, ErrorDetail, ErrorResponse, StravaError};
pub use crate::uploader::{UploadCoordinator, UploadEvent, UploadHandle, UploadState};

pub use reqwest::{Method, StatusCode};

use endpoints::{Request, RequestBody};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};

const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Builds requests against the configured API base and hands them to a transport.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    config: ApiConfig,
}

impl Client {
    pub fn new(config: ApiConfig) -> Result<Self, StravaError> {
        let transport = ReqwestTransport::new(config.request_timeout)?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    pub fn with_transport(transport: Arc<dyn Transport>, config: ApiConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn build<R: Request>(&self, request: &R) -> HttpRequest {
        let mut http = HttpRequest::new(request.method(), self.config.url(&request.endpoint()))
            .header("Accept", "application/json")
            .header("User-Agent", APP_USER_AGENT);

        if let Some(token) = request.access_token() {
            http = http.header("Authorization", format!("Bearer {}", token));
        }

        match request.body() {
            RequestBody::Empty => http,
            RequestBody::Json(bytes) => http.header("Content-Type", "application/json").body(bytes),
            RequestBody::Multipart { boundary, bytes } => http
                .header(
                    "Content-Type",
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(bytes),
        }
    }

    /// One attempt; any HTTP status counts as a response
    pub async fn execute<R: Request>(&self, request: &R) -> Result<HttpResponse, StravaError> {
        let http = self.build(request);
        tracing::debug!(method = %http.method, url = %http.url, "Sending request");
        let response = self.transport.send(http).await?;
        tracing::debug!(status = %response.status, "Received response");
        Ok(response)
    }

    /// Like `execute`, with exactly one extra attempt after a transport failure
    pub async fn execute_with_retry<R: Request>(
        &self,
        request: &R,
    ) -> Result<HttpResponse, StravaError> {
        match self.execute(request).await {
            Err(e) if e.is_transport() => {
                tracing::warn!("Transport failure on {}, retrying once: {}", request.endpoint(), e);
                self.execute(request).await
            }
            result => result,
        }
    }
}

/// Turn a non-2xx response into `InvalidStatus`
pub fn check_status(response: HttpResponse) -> Result<HttpResponse, StravaError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(StravaError::InvalidStatus {
            status: response.status,
            headers: response.headers,
        })
    }
}

pub fn decode_json<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, serde_json::Error> {
    serde_json::from_slice(&response.body)
}
