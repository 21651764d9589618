use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use strava_api::endpoints::oauth::{Deauthorize, ExchangeToken, TokenGrant, TokenResponse};
use strava_api::{
    check_status, decode_json, AuthStage, ClientCredentials, Client, Credential, StravaError,
    DEFAULT_APP_AUTHORIZE_URL, DEFAULT_SCOPE, DEFAULT_WEB_AUTHORIZE_URL,
};
use tokio::sync::{oneshot, watch};
use url::Url;

use super::consent::{
    AppHandoff, AppLauncher, AuthorizationRequest, ConsentOutcome, ConsentStrategy,
    ConsentSurface, WebConsent,
};
use super::token_storage::TokenStore;

/// Application registration and the endpoints used to obtain consent
#[derive(Debug)]
pub struct OAuthConfig {
    pub credentials: ClientCredentials,
    pub redirect_uri: String,
    pub callback_scheme: String,
    pub scope: String,
    pub web_authorize_url: String,
    pub app_authorize_url: Option<String>,
}

impl OAuthConfig {
    pub fn new(credentials: ClientCredentials, redirect_uri: impl Into<String>) -> Self {
        let redirect_uri = redirect_uri.into();
        let callback_scheme = Url::parse(&redirect_uri)
            .map(|u| u.scheme().to_string())
            .unwrap_or_default();

        Self {
            credentials,
            redirect_uri,
            callback_scheme,
            scope: DEFAULT_SCOPE.to_string(),
            web_authorize_url: DEFAULT_WEB_AUTHORIZE_URL.to_string(),
            app_authorize_url: Some(DEFAULT_APP_AUTHORIZE_URL.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NoCredential,
    Authorizing,
    Valid,
    Expired,
    Refreshing,
    Invalidated,
}

struct PendingAuthorization {
    attempt: u64,
    tx: oneshot::Sender<Result<Credential, StravaError>>,
}

/// Owns the session credential: hands out clones, refreshes it when it
/// expires and runs interactive authorization when there is none.
///
/// Exchanges, refreshes and revocations are serialized; readers never wait.
pub struct TokenLifecycleManager {
    client: Client,
    oauth: OAuthConfig,
    strategies: Vec<Arc<dyn ConsentStrategy>>,
    store: Option<Arc<dyn TokenStore>>,
    credential: watch::Sender<Option<Credential>>,
    state: watch::Sender<LifecycleState>,
    pending: Mutex<Option<PendingAuthorization>>,
    exchange_lock: tokio::sync::Mutex<()>,
    attempts: AtomicU64,
}

impl TokenLifecycleManager {
    pub fn new(client: Client, oauth: OAuthConfig) -> Self {
        let (credential, _) = watch::channel(None);
        let (state, _) = watch::channel(LifecycleState::NoCredential);

        Self {
            client,
            oauth,
            strategies: Vec::new(),
            store: None,
            credential,
            state,
            pending: Mutex::new(None),
            exchange_lock: tokio::sync::Mutex::new(()),
            attempts: AtomicU64::new(0),
        }
    }

    /// Try the native app first. Always ordered ahead of web consent.
    pub fn with_app_handoff(mut self, launcher: Arc<dyn AppLauncher>) -> Self {
        self.strategies.insert(0, Arc::new(AppHandoff::new(launcher)));
        self
    }

    pub fn with_web_consent(self, surface: Arc<dyn ConsentSurface>) -> Self {
        self.with_strategy(Arc::new(WebConsent::new(surface)))
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn ConsentStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Attach persistence and adopt whatever credential it holds
    pub fn with_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        match store.load() {
            Ok(Some(credential)) => {
                tracing::info!(expires_at = %credential.expires_at, "Loaded stored credential");
                self.credential.send_replace(Some(credential));
                self.settle_state();
            }
            Ok(None) => tracing::debug!("No stored credential"),
            Err(e) => tracing::warn!("Failed to load stored credential: {}", e),
        }
        self.store = Some(store);
        self
    }

    /// Seed the manager with a known credential without persisting it
    pub fn with_credential(self, credential: Credential) -> Self {
        self.credential.send_replace(Some(credential));
        self.settle_state();
        self
    }

    pub fn current_credential(&self) -> Option<Credential> {
        self.credential.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Credential>> {
        self.credential.subscribe()
    }

    pub fn state(&self) -> LifecycleState {
        let state = *self.state.borrow();
        match (state, self.credential.borrow().as_ref()) {
            (LifecycleState::Valid, Some(credential)) if !credential.is_valid() => {
                LifecycleState::Expired
            }
            _ => state,
        }
    }

    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// A credential that is valid right now, refreshing it if needed.
    ///
    /// `Ok(None)` means there is nothing to refresh and the caller has to
    /// `authorize`. A failed refresh drops the credential.
    pub async fn ensure_valid(&self) -> Result<Option<Credential>, StravaError> {
        let _guard = self.exchange_lock.lock().await;

        let Some(current) = self.current_credential() else {
            if *self.state.borrow() != LifecycleState::Authorizing {
                self.set_state(LifecycleState::NoCredential);
            }
            return Ok(None);
        };

        if current.is_valid() {
            self.set_state(LifecycleState::Valid);
            return Ok(Some(current));
        }

        self.set_state(LifecycleState::Expired);
        self.set_state(LifecycleState::Refreshing);
        tracing::info!(expired_at = %current.expires_at, "Refreshing expired credential");

        let grant = TokenGrant::RefreshToken(current.refresh_token.clone());
        match self.exchange(&grant).await {
            Ok(token) => {
                let refreshed = token.into_refreshed(&current);
                self.publish(refreshed.clone());
                Ok(Some(refreshed))
            }
            Err(e) => {
                tracing::warn!("Token refresh failed, dropping credential: {}", e);
                self.invalidate();
                Err(e)
            }
        }
    }

    /// `ensure_valid`, falling back to interactive authorization
    pub async fn token(&self) -> Result<Credential, StravaError> {
        match self.ensure_valid().await? {
            Some(credential) => Ok(credential),
            None => self.authorize().await,
        }
    }

    /// Run interactive authorization and exchange the resulting code.
    ///
    /// Calling this again while a previous call is waiting fails the
    /// previous call with `AuthStage::Superseded`.
    pub async fn authorize(&self) -> Result<Credential, StravaError> {
        let request = AuthorizationRequest::new(&self.oauth);
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();

        let previous = self.pending().replace(PendingAuthorization { attempt, tx });
        if let Some(previous) = previous {
            tracing::debug!(attempt = previous.attempt, "Superseding pending authorization");
            let _ = previous.tx.send(Err(StravaError::authorization(
                AuthStage::Superseded,
                "a newer authorization replaced this one",
            )));
        }

        self.set_state(LifecycleState::Authorizing);
        tracing::info!(attempt, "Starting authorization");

        match self.obtain_consent(&request).await {
            Ok(Some(callback)) => match request.code_from_callback(&callback) {
                Ok(code) => {
                    // Resolves `rx` either way
                    let _ = self.redeem_code(&code, Some(attempt)).await;
                }
                Err(e) => self.resolve(attempt, Err(e)),
            },
            Ok(None) => tracing::debug!(attempt, "Waiting for an authorization code"),
            Err(e) => self.resolve(attempt, Err(e)),
        }

        rx.await.unwrap_or_else(|_| {
            Err(StravaError::authorization(
                AuthStage::Superseded,
                "authorization was abandoned",
            ))
        })
    }

    /// Exchange a code obtained out of band and resolve the `authorize`
    /// call pending when it arrived, if any.
    pub async fn process_authorization_code(&self, code: &str) -> Result<Credential, StravaError> {
        let attempt = self.pending().as_ref().map(|p| p.attempt);
        self.redeem_code(code, attempt).await
    }

    /// Exchange `code` on behalf of `attempt`. Nothing is exchanged once a
    /// newer `authorize` has replaced that attempt, and only that attempt
    /// is resolved with the result.
    async fn redeem_code(
        &self,
        code: &str,
        attempt: Option<u64>,
    ) -> Result<Credential, StravaError> {
        let result = {
            let _guard = self.exchange_lock.lock().await;
            if let Some(attempt) = attempt.filter(|a| !self.is_pending(*a)) {
                tracing::debug!(attempt, "Dropping code for superseded authorization");
                return Err(StravaError::authorization(
                    AuthStage::Superseded,
                    "a newer authorization replaced this one",
                ));
            }

            let grant = TokenGrant::AuthorizationCode(code.to_string());
            let result = self.exchange(&grant).await.map(TokenResponse::into_credential);
            if let Ok(credential) = &result {
                self.publish(credential.clone());
            }
            result
        };

        match &result {
            Ok(credential) => tracing::info!(
                athlete = ?credential.subject.as_ref().map(|s| s.id),
                "Authorization complete"
            ),
            Err(e) => tracing::warn!("Authorization code exchange failed: {}", e),
        }

        match attempt {
            Some(attempt) => self.resolve(attempt, result.clone()),
            None if result.is_err() && self.pending().is_none() => self.settle_state(),
            None => {}
        }

        result
    }

    /// Revoke the session remotely and forget it locally.
    ///
    /// The local credential is cleared whatever the server says; the
    /// returned result only reports the remote outcome.
    pub async fn deauthorize(&self) -> Result<(), StravaError> {
        let _guard = self.exchange_lock.lock().await;

        let Some(current) = self.current_credential() else {
            return Ok(());
        };

        let result = match self
            .client
            .execute(&Deauthorize::new(current.access_token.as_str()))
            .await
        {
            Ok(response) => check_status(response).map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            tracing::warn!("Remote deauthorization failed: {}", e);
        }

        self.credential.send_replace(None);
        self.set_state(LifecycleState::NoCredential);
        self.forget_stored();
        tracing::info!("Credential cleared");

        result
    }

    async fn obtain_consent(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<Option<Url>, StravaError> {
        for strategy in &self.strategies {
            match strategy.obtain(request).await? {
                ConsentOutcome::Declined => {
                    tracing::debug!(strategy = strategy.name(), "Consent strategy declined")
                }
                ConsentOutcome::Deferred => return Ok(None),
                ConsentOutcome::Callback(url) => return Ok(Some(url)),
            }
        }

        Err(StravaError::authorization(
            AuthStage::Consent,
            "no consent strategy could run",
        ))
    }

    /// Shared by the code and refresh grants; one retry on transport failure
    async fn exchange(&self, grant: &TokenGrant) -> Result<TokenResponse, StravaError> {
        let request = ExchangeToken::new(&self.oauth.credentials, grant);
        let response = check_status(self.client.execute_with_retry(&request).await?)?;

        decode_json(&response).map_err(|e| {
            StravaError::authorization(
                AuthStage::TokenExchange,
                format!("undecodable token response: {}", e),
            )
        })
    }

    fn publish(&self, credential: Credential) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&credential) {
                tracing::warn!("Failed to persist credential: {}", e);
            }
        }
        self.credential.send_replace(Some(credential));
        self.set_state(LifecycleState::Valid);
    }

    fn invalidate(&self) {
        self.credential.send_replace(None);
        self.set_state(LifecycleState::Invalidated);
        self.forget_stored();
    }

    fn forget_stored(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.delete() {
                tracing::warn!("Failed to delete stored credential: {}", e);
            }
        }
    }

    /// Derive the state from the credential after an aborted transition
    fn settle_state(&self) {
        let state = match self.credential.borrow().as_ref() {
            None => LifecycleState::NoCredential,
            Some(credential) if credential.is_valid() => LifecycleState::Valid,
            Some(_) => LifecycleState::Expired,
        };
        self.set_state(state);
    }

    fn set_state(&self, next: LifecycleState) {
        self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            tracing::debug!(from = ?*state, to = ?next, "Credential state changed");
            *state = next;
            true
        });
    }

    fn pending(&self) -> MutexGuard<'_, Option<PendingAuthorization>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_pending(&self, attempt: u64) -> bool {
        self.pending().as_ref().is_some_and(|p| p.attempt == attempt)
    }

    fn resolve(&self, attempt: u64, result: Result<Credential, StravaError>) {
        let pending = {
            let mut guard = self.pending();
            match guard.as_ref() {
                Some(p) if p.attempt == attempt => guard.take(),
                _ => None,
            }
        };

        if let Err(e) = &result {
            tracing::warn!(attempt, "Authorization failed: {}", e);
            if pending.is_some() {
                self.settle_state();
            }
        }
        if let Some(pending) = pending {
            let _ = pending.tx.send(result);
        }
    }
}
