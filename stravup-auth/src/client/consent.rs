use async_trait::async_trait;
use base64::Engine;
use rand::Rng;
use std::sync::Arc;
use strava_api::{AuthStage, StravaError};
use tokio::io::{AsyncBufReadExt, BufReader};
use url::Url;

use super::manager::OAuthConfig;

/// Everything needed to send the user to an authorize endpoint.
/// Lives for a single `authorize()` call.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: String,
    pub web_authorize_url: String,
    pub app_authorize_url: Option<String>,
    pub callback_scheme: String,
}

impl AuthorizationRequest {
    pub fn new(config: &OAuthConfig) -> Self {
        Self {
            client_id: config.credentials.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scope: config.scope.clone(),
            state: generate_state_token(),
            web_authorize_url: config.web_authorize_url.clone(),
            app_authorize_url: config.app_authorize_url.clone(),
            callback_scheme: config.callback_scheme.clone(),
        }
    }

    /// The authorize URL under `base` with the full query attached
    pub fn url_for(&self, base: &str) -> Result<Url, StravaError> {
        let mut url = Url::parse(base).map_err(|e| {
            StravaError::authorization(
                AuthStage::Request,
                format!("invalid authorize URL {}: {}", base, e),
            )
        })?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("approval_prompt", "force")
            .append_pair("scope", &self.scope)
            .append_pair("state", &self.state);

        Ok(url)
    }

    pub fn web_url(&self) -> Result<Url, StravaError> {
        self.url_for(&self.web_authorize_url)
    }

    pub fn app_url(&self) -> Option<Result<Url, StravaError>> {
        self.app_authorize_url.as_deref().map(|base| self.url_for(base))
    }

    /// Pull the authorization code out of a redirect back to us.
    pub fn code_from_callback(&self, callback: &Url) -> Result<String, StravaError> {
        let param = |name: &str| {
            callback
                .query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        };

        if let Some(error) = param("error") {
            return Err(if error == "access_denied" {
                StravaError::AuthorizationCancelled
            } else {
                StravaError::authorization(AuthStage::Callback, error)
            });
        }

        if let Some(state) = param("state") {
            if state != self.state {
                return Err(StravaError::authorization(
                    AuthStage::Callback,
                    "state parameter does not match",
                ));
            }
        }

        param("code").ok_or_else(|| {
            StravaError::authorization(AuthStage::Callback, "callback URL has no code")
        })
    }
}

/// Generate a random CSRF state token
pub fn generate_state_token() -> String {
    let mut rng = rand::rng();
    let random_bytes: Vec<u8> = (0..32).map(|_| rng.random()).collect();
    base64::prelude::BASE64_URL_SAFE_NO_PAD.encode(&random_bytes)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentResult {
    Callback(Url),
    Cancelled,
    Error(String),
}

/// Shows the authorize page and waits for a redirect to `callback_scheme`
#[async_trait]
pub trait ConsentSurface: Send + Sync {
    async fn present(&self, url: &Url, callback_scheme: &str) -> ConsentResult;
}

/// Hands a deep link to a native app. Returns whether the app took it.
pub trait AppLauncher: Send + Sync {
    fn open(&self, url: &Url) -> bool;
}

#[derive(Debug)]
pub enum ConsentOutcome {
    /// This strategy cannot run here; try the next one
    Declined,
    /// Consent is happening elsewhere and will come back through
    /// `process_authorization_code`
    Deferred,
    Callback(Url),
}

/// One way of obtaining the user's consent. The manager tries them in order.
#[async_trait]
pub trait ConsentStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn obtain(&self, request: &AuthorizationRequest) -> Result<ConsentOutcome, StravaError>;
}

pub struct AppHandoff {
    launcher: Arc<dyn AppLauncher>,
}

impl AppHandoff {
    pub fn new(launcher: Arc<dyn AppLauncher>) -> Self {
        Self { launcher }
    }
}

#[async_trait]
impl ConsentStrategy for AppHandoff {
    fn name(&self) -> &'static str {
        "app"
    }

    async fn obtain(&self, request: &AuthorizationRequest) -> Result<ConsentOutcome, StravaError> {
        let Some(url) = request.app_url() else {
            return Ok(ConsentOutcome::Declined);
        };
        let url = url?;

        if self.launcher.open(&url) {
            tracing::info!("Authorization handed off to the Strava app");
            Ok(ConsentOutcome::Deferred)
        } else {
            tracing::debug!("App handoff unavailable");
            Ok(ConsentOutcome::Declined)
        }
    }
}

pub struct WebConsent {
    surface: Arc<dyn ConsentSurface>,
}

impl WebConsent {
    pub fn new(surface: Arc<dyn ConsentSurface>) -> Self {
        Self { surface }
    }
}

#[async_trait]
impl ConsentStrategy for WebConsent {
    fn name(&self) -> &'static str {
        "web"
    }

    async fn obtain(&self, request: &AuthorizationRequest) -> Result<ConsentOutcome, StravaError> {
        let url = request.web_url()?;
        match self.surface.present(&url, &request.callback_scheme).await {
            ConsentResult::Callback(callback) => Ok(ConsentOutcome::Callback(callback)),
            ConsentResult::Cancelled => Err(StravaError::AuthorizationCancelled),
            ConsentResult::Error(detail) => {
                Err(StravaError::authorization(AuthStage::Consent, detail))
            }
        }
    }
}

/// Opens the system browser and asks for the URL the browser was redirected to.
///
/// An empty line cancels.
#[derive(Debug, Default)]
pub struct TerminalConsent;

#[async_trait]
impl ConsentSurface for TerminalConsent {
    async fn present(&self, url: &Url, callback_scheme: &str) -> ConsentResult {
        if let Err(e) = open::that(url.as_str()) {
            eprintln!("Failed to open browser automatically: {}", e);
            eprintln!("\nPlease open this URL in your browser:");
        } else {
            println!("Browser opened. Please authorize the application...");
            println!("\nYou can also open this URL directly in your browser:");
        }
        println!("{}\n", url);
        println!("After approving, paste the address your browser was sent to");
        println!("(it starts with {}://), or press Enter to cancel:", callback_scheme);

        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        if let Err(e) = stdin.read_line(&mut line).await {
            return ConsentResult::Error(format!("failed to read callback URL: {}", e));
        }

        parse_pasted_callback(&line, callback_scheme)
    }
}

fn parse_pasted_callback(line: &str, callback_scheme: &str) -> ConsentResult {
    let line = line.trim();
    if line.is_empty() {
        return ConsentResult::Cancelled;
    }

    match Url::parse(line) {
        Ok(url) if url.scheme() == callback_scheme => ConsentResult::Callback(url),
        Ok(url) => ConsentResult::Error(format!(
            "expected a {}:// URL, got {}://",
            callback_scheme,
            url.scheme()
        )),
        Err(e) => ConsentResult::Error(format!("not a URL: {}", e)),
    }
}
