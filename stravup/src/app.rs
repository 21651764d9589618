use anyhow::{Context, Result};
use futures::StreamExt;
use std::path::Path;
use strava_api::{
    Client, ContentKind, Credential, StravaError, UploadCoordinator, UploadEvent, UploadJob,
    UploadRequest,
};
use stravup_auth::{authenticate, TokenLifecycleManager};

use crate::cli::UploadArgs;

pub struct App {
    manager: TokenLifecycleManager,
    client: Client,
}

impl App {
    pub fn new(manager: TokenLifecycleManager, client: Client) -> Self {
        Self { manager, client }
    }

    pub fn manager(&self) -> &TokenLifecycleManager {
        &self.manager
    }

    pub async fn login(&self) -> Result<Credential> {
        let credential = authenticate(&self.manager).await?;
        tracing::info!("Logged in");
        Ok(credential)
    }

    pub async fn logout(&self) -> Result<()> {
        if self.manager.current_credential().is_none() {
            println!("Not logged in.");
            return Ok(());
        }

        match self.manager.deauthorize().await {
            Ok(()) => println!("✓ Logged out"),
            // Local session is gone either way
            Err(e) => println!("✓ Logged out locally (Strava did not confirm: {})", e),
        }
        Ok(())
    }

    pub async fn upload(&self, args: &UploadArgs) -> Result<UploadJob> {
        let request = build_request(args).await?;
        let credential = authenticate(&self.manager).await?;

        tracing::info!(file = %args.file.display(), kind = %request.kind(), "Starting upload");
        let handle =
            UploadCoordinator::new(self.client.clone()).start(request, &credential);

        let mut events = handle.subscribe();
        while let Some(event) = events.next().await {
            println!("{}", describe(&event));
        }

        Ok(handle.wait().await?)
    }
}

pub async fn build_request(args: &UploadArgs) -> Result<UploadRequest> {
    let kind = content_kind(&args.file)?;
    let payload = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let mut request = UploadRequest::new(payload, kind)
        .activity_type(args.activity_type)
        .private(args.private)
        .commute(args.commute)
        .trainer(args.trainer)
        .gzipped(ContentKind::is_gzipped_path(&args.file));

    if let Some(name) = &args.name {
        request = request.name(name.as_str());
    }
    if let Some(description) = &args.description {
        request = request.description(description.as_str());
    }
    if let Some(external_id) = &args.external_id {
        request = request.external_id(external_id.as_str());
    }

    Ok(request)
}

fn content_kind(path: &Path) -> Result<ContentKind> {
    ContentKind::from_path(path).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot tell the format of {}; expected a .fit, .tcx or .gpx file",
            path.display()
        )
    })
}

/// One progress line per upload event
pub fn describe(event: &UploadEvent) -> String {
    match event {
        UploadEvent::Submitted(job) => format!("Uploaded, Strava job {}: {}", job.id, job.status),
        UploadEvent::Progress(job) => format!("… {}", job.status),
        UploadEvent::Succeeded(job) => match job.activity_id {
            Some(id) => format!("✓ Done: https://www.strava.com/activities/{}", id),
            None => format!("✓ {}", job.status),
        },
        UploadEvent::Failed(StravaError::UploadFailed(message)) => {
            format!("✗ Upload failed: {}", message)
        }
        UploadEvent::Failed(e) => format!("✗ {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strava_api::READY_STATUS;

    fn job(status: &str, activity_id: Option<u64>) -> UploadJob {
        UploadJob {
            id: 16,
            external_id: None,
            status: status.to_string(),
            error: None,
            activity_id,
        }
    }

    #[test]
    fn describes_each_event() {
        assert_eq!(
            describe(&UploadEvent::Submitted(job("Your activity is still being processed.", None))),
            "Uploaded, Strava job 16: Your activity is still being processed."
        );
        assert_eq!(
            describe(&UploadEvent::Succeeded(job(READY_STATUS, Some(42)))),
            "✓ Done: https://www.strava.com/activities/42"
        );
        assert_eq!(
            describe(&UploadEvent::Failed(StravaError::UploadFailed(
                "duplicate".to_string()
            ))),
            "✗ Upload failed: duplicate"
        );
    }

    #[test]
    fn format_comes_from_extension() {
        assert_eq!(content_kind(Path::new("a.FIT")).unwrap(), ContentKind::Fit);
        assert_eq!(content_kind(Path::new("a.tcx.gz")).unwrap(), ContentKind::Tcx);
        assert!(content_kind(Path::new("notes.txt")).is_err());
    }
}
