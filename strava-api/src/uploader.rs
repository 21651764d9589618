use crate::compress::{Compressor, GzipCompressor};
use crate::endpoints::oauth::Credential;
use crate::endpoints::uploads::{
    CreateUpload, GetUpload, JobOutcome, UploadFile, UploadJob, UploadRequest,
};
use crate::error::{ErrorResponse, StravaError};
use crate::observe::{Broadcaster, Subscription};
use crate::transport::HttpResponse;
use crate::{Client, decode_json};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Submitting,
    Polling,
    Succeeded,
    Failed,
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Succeeded | UploadState::Failed)
    }
}

/// What observers of an upload see, in order
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// The service accepted the file and assigned a job id
    Submitted(UploadJob),
    /// A poll came back still processing
    Progress(UploadJob),
    Succeeded(UploadJob),
    Failed(StravaError),
}

impl UploadEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadEvent::Succeeded(_) | UploadEvent::Failed(_))
    }
}

/// Drives a single upload from submission to a terminal state.
///
/// `run` and `start` consume the coordinator, so one instance can never
/// handle a second upload. Subscribe before starting to see every event;
/// later subscribers get the latest event replayed.
pub struct UploadCoordinator {
    client: Client,
    compressor: Arc<dyn Compressor>,
    events: Broadcaster<UploadEvent>,
    state: watch::Sender<UploadState>,
}

impl UploadCoordinator {
    pub fn new(client: Client) -> Self {
        let (state, _) = watch::channel(UploadState::Idle);
        Self {
            client,
            compressor: Arc::new(GzipCompressor::default()),
            events: Broadcaster::new(),
            state,
        }
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn subscribe(&self) -> Subscription<UploadEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> UploadState {
        *self.state.borrow()
    }

    /// Spawn the workflow on the current tokio runtime
    pub fn start(self, request: UploadRequest, credential: &Credential) -> UploadHandle {
        let events = self.events.clone();
        let state = self.state.subscribe();
        let credential = credential.clone();
        let task = tokio::spawn(async move { self.run(&request, &credential).await });

        UploadHandle {
            events,
            state,
            task,
        }
    }

    /// Run the workflow to completion in place
    pub async fn run(
        self,
        request: &UploadRequest,
        credential: &Credential,
    ) -> Result<UploadJob, StravaError> {
        let result = self.drive(request, &credential.access_token).await;

        match &result {
            Ok(job) => {
                tracing::info!(
                    upload_id = job.id,
                    activity_id = ?job.activity_id,
                    "Upload processed"
                );
                self.state.send_replace(UploadState::Succeeded);
                self.events.finish(UploadEvent::Succeeded(job.clone()));
            }
            Err(e) => {
                tracing::warn!("Upload failed: {}", e);
                self.state.send_replace(UploadState::Failed);
                self.events.finish(UploadEvent::Failed(e.clone()));
            }
        }

        result
    }

    async fn drive(
        &self,
        request: &UploadRequest,
        access_token: &str,
    ) -> Result<UploadJob, StravaError> {
        self.state.send_replace(UploadState::Submitting);
        let submitted = self.submit(request, access_token).await?;
        tracing::info!(upload_id = submitted.id, status = %submitted.status, "Upload submitted");
        let id = submitted.id;
        self.events.publish(UploadEvent::Submitted(submitted));

        self.state.send_replace(UploadState::Polling);
        let interval = self.client.config().poll_interval;
        loop {
            let job = self.poll(id, access_token).await?;
            match job.outcome() {
                JobOutcome::Failed(message) => {
                    return Err(StravaError::UploadFailed(message.to_string()));
                }
                JobOutcome::Ready => return Ok(job),
                JobOutcome::Pending => {
                    tracing::debug!(
                        upload_id = id,
                        status = %job.status,
                        "Upload still processing"
                    );
                    self.events.publish(UploadEvent::Progress(job));
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }

    /// POST the multipart form; one retry on transport failure.
    /// Gzipped payloads bypass the compressor.
    pub async fn submit(
        &self,
        request: &UploadRequest,
        access_token: &str,
    ) -> Result<UploadJob, StravaError> {
        let file = if request.is_gzipped() {
            UploadFile::new(request.payload().to_vec(), request.kind(), true)
        } else {
            match self.compressor.compress(request.payload()) {
                Some(compressed) => UploadFile::new(compressed, request.kind(), true),
                None => UploadFile::new(request.payload().to_vec(), request.kind(), false),
            }
        };
        tracing::debug!(
            data_type = %file.data_type,
            bytes = file.bytes.len(),
            "Submitting upload"
        );

        let create = CreateUpload::new(request, &file, access_token);
        let response = self.client.execute_with_retry(&create).await?;

        if response.is_success() {
            if let Ok(job) = decode_json::<UploadJob>(&response) {
                return Ok(job);
            }
        }
        Err(failure_from_body(&response))
    }

    /// One status request for job `id`
    pub async fn poll(&self, id: u64, access_token: &str) -> Result<UploadJob, StravaError> {
        let response = self.client.execute(&GetUpload::new(id, access_token)).await?;

        if !response.is_success() {
            return Err(match ErrorResponse::decode(&response.body) {
                Some(payload) => StravaError::UploadFailed(payload.message),
                None => StravaError::InvalidStatus {
                    status: response.status,
                    headers: response.headers,
                },
            });
        }

        decode_json::<UploadJob>(&response).map_err(|e| {
            tracing::debug!("Undecodable upload status: {}", e);
            StravaError::unprocessable()
        })
    }
}

fn failure_from_body(response: &HttpResponse) -> StravaError {
    match ErrorResponse::decode(&response.body) {
        Some(payload) => StravaError::UploadFailed(payload.message),
        None => {
            tracing::debug!(status = %response.status, "Undecodable upload response");
            StravaError::unprocessable()
        }
    }
}

/// A running upload. Dropping the handle does not stop the workflow.
pub struct UploadHandle {
    events: Broadcaster<UploadEvent>,
    state: watch::Receiver<UploadState>,
    task: JoinHandle<Result<UploadJob, StravaError>>,
}

impl UploadHandle {
    pub fn subscribe(&self) -> Subscription<UploadEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> UploadState {
        *self.state.borrow()
    }

    pub async fn wait(self) -> Result<UploadJob, StravaError> {
        self.task
            .await
            .map_err(|e| StravaError::UploadFailed(format!("upload task ended: {}", e)))?
    }
}
