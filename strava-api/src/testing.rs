use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Scripted transport for tests (no network)
///
/// Responses are returned in the order they were pushed. Every request is
/// recorded so tests can assert on what was sent and how often. Once the
/// script runs out, requests fail with a transport error.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: HttpResponse) {
        lock(&self.script).push_back(Ok(response));
    }

    pub fn push_json(&self, status: StatusCode, body: serde_json::Value) {
        self.push_response(HttpResponse::new(status, body.to_string()));
    }

    pub fn push_body(&self, status: StatusCode, body: impl Into<Vec<u8>>) {
        self.push_response(HttpResponse::new(status, body));
    }

    pub fn push_status(&self, status: StatusCode) {
        self.push_response(HttpResponse::new(status, Vec::new()));
    }

    pub fn push_error(&self, error: TransportError) {
        lock(&self.script).push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Requests whose URL ends with `suffix`
    pub fn requests_to(&self, suffix: &str) -> Vec<HttpRequest> {
        lock(&self.requests)
            .iter()
            .filter(|r| r.url.ends_with(suffix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        lock(&self.requests).push(request);
        lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Other("no scripted response".to_string())))
    }
}

/// JSON body of a recorded request
pub fn json_body(request: &HttpRequest) -> serde_json::Value {
    serde_json::from_slice(&request.body).unwrap_or(serde_json::Value::Null)
}

/// Upload status payload the way the service reports it
pub fn upload_status_json(
    id: u64,
    status: &str,
    error: Option<&str>,
    activity_id: Option<u64>,
) -> serde_json::Value {
    serde_json::json!({
        "id_str": id.to_string(),
        "id": id,
        "external_id": "aeiou",
        "status": status,
        "error": error,
        "activity_id": activity_id,
    })
}
