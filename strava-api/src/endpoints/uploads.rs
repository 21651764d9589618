use super::{ActivityType, ContentKind, Request, RequestBody};
use crate::macros::option_setter;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use uuid::Uuid;

/// Status text the service reports once the activity has been created
pub const READY_STATUS: &str = "Your activity is ready.";

// Common

/// Server-side processing job for one uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadJob {
    pub id: u64,
    #[serde(default)]
    pub external_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub activity_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome<'a> {
    Pending,
    Ready,
    Failed(&'a str),
}

impl UploadJob {
    /// Classify the job. A reported error wins over everything else.
    pub fn outcome(&self) -> JobOutcome<'_> {
        if let Some(error) = self.error.as_deref() {
            return JobOutcome::Failed(error);
        }
        if self.status == READY_STATUS || self.activity_id.is_some() {
            return JobOutcome::Ready;
        }
        JobOutcome::Pending
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub activity_type: ActivityType,
    pub private: bool,
    pub name: Option<String>,
    pub description: Option<String>,
    pub commute: bool,
    pub trainer: bool,
    pub external_id: Option<String>,
}

/// What to upload. Built once by the caller, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    payload: Vec<u8>,
    kind: ContentKind,
    gzipped: bool,
    options: UploadOptions,
}

impl UploadRequest {
    pub fn new(payload: impl Into<Vec<u8>>, kind: ContentKind) -> Self {
        Self {
            payload: payload.into(),
            kind,
            gzipped: false,
            options: UploadOptions::default(),
        }
    }

    /// The payload is already gzip data and goes out as `<kind>.gz` untouched
    pub fn gzipped(mut self, gzipped: bool) -> Self {
        self.gzipped = gzipped;
        self
    }

    option_setter!(options.activity_type: ActivityType);
    option_setter!(options.private: bool);
    option_setter!(opt options.name: String);
    option_setter!(opt options.description: String);
    option_setter!(options.commute: bool);
    option_setter!(options.trainer: bool);
    option_setter!(opt options.external_id: String);

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn is_gzipped(&self) -> bool {
        self.gzipped
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }
}

/// The file part as it goes on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub bytes: Vec<u8>,
    /// `gpx`, `gpx.gz`, ...
    pub data_type: String,
    pub filename: String,
}

impl UploadFile {
    pub fn new(bytes: Vec<u8>, kind: ContentKind, compressed: bool) -> Self {
        let data_type = if compressed {
            format!("{}.gz", kind)
        } else {
            kind.to_string()
        };
        let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
        let filename = format!("workout_{}.{}", stamp, data_type);
        Self {
            bytes,
            data_type,
            filename,
        }
    }

    fn content_type(&self) -> &'static str {
        if self.data_type.ends_with(".gz") {
            "application/gzip"
        } else if self.data_type == "fit" {
            "application/octet-stream"
        } else {
            "application/xml"
        }
    }
}

// Requests

/// `POST /uploads` as a multipart form
#[derive(Debug, Clone)]
pub struct CreateUpload {
    access_token: String,
    boundary: String,
    bytes: Vec<u8>,
}

impl CreateUpload {
    pub fn new(upload: &UploadRequest, file: &UploadFile, access_token: impl Into<String>) -> Self {
        let boundary = format!("stravup-{}", Uuid::new_v4().simple());
        let options = upload.options();

        let mut form = MultipartForm::new(&boundary);
        form.text("data_type", &file.data_type);
        form.text("activity_type", options.activity_type.as_str());
        form.text("private", flag(options.private));
        if let Some(name) = &options.name {
            form.text("name", name);
        }
        if let Some(description) = &options.description {
            form.text("description", description);
        }
        form.text("commute", flag(options.commute));
        form.text("trainer", flag(options.trainer));
        if let Some(external_id) = &options.external_id {
            form.text("external_id", external_id);
        }
        form.file("file", &file.filename, file.content_type(), &file.bytes);

        Self {
            access_token: access_token.into(),
            bytes: form.finish(),
            boundary,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }
}

impl Request for CreateUpload {
    fn method(&self) -> Method {
        Method::POST
    }

    fn endpoint(&self) -> Cow<'_, str> {
        "/uploads".into()
    }

    fn body(&self) -> RequestBody {
        RequestBody::Multipart {
            boundary: self.boundary.clone(),
            bytes: self.bytes.clone(),
        }
    }

    fn access_token(&self) -> Option<&str> {
        Some(&self.access_token)
    }
}

/// `GET /uploads/{id}`
#[derive(Debug, Clone)]
pub struct GetUpload {
    id: u64,
    access_token: String,
}

impl GetUpload {
    pub fn new(id: u64, access_token: impl Into<String>) -> Self {
        Self {
            id,
            access_token: access_token.into(),
        }
    }
}

impl Request for GetUpload {
    fn method(&self) -> Method {
        Method::GET
    }

    fn endpoint(&self) -> Cow<'_, str> {
        format!("/uploads/{}", self.id).into()
    }

    fn access_token(&self) -> Option<&str> {
        Some(&self.access_token)
    }
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

struct MultipartForm<'a> {
    boundary: &'a str,
    buf: Vec<u8>,
}

impl<'a> MultipartForm<'a> {
    fn new(boundary: &'a str) -> Self {
        Self {
            boundary,
            buf: Vec::new(),
        }
    }

    fn text(&mut self, name: &str, value: &str) {
        self.open_part();
        self.buf.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.extend_from_slice(b"\r\n");
    }

    fn file(&mut self, name: &str, filename: &str, content_type: &str, bytes: &[u8]) {
        self.open_part();
        self.buf.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                name,
                escape_quoted(filename)
            )
            .as_bytes(),
        );
        self.buf
            .extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        self.buf.extend_from_slice(bytes);
        self.buf.extend_from_slice(b"\r\n");
    }

    fn open_part(&mut self) {
        self.buf
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
    }

    fn finish(mut self) -> Vec<u8> {
        self.buf
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        self.buf
    }
}

// Quoted-string rules for header parameters
fn escape_quoted(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .flat_map(|c| match c {
            '"' | '\\' => vec!['\\', c],
            c => vec![c],
        })
        .collect()
}
