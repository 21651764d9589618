//! Scripted collaborators for exercising the token lifecycle without a user
use crate::client::{AppLauncher, ConsentResult, ConsentSurface, TokenStore};
use crate::error::AuthError;
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use strava_api::Credential;
use url::Url;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
pub enum ConsentScript {
    /// Redirect back with this code and the state from the presented URL
    Approve(String),
    /// Redirect back to exactly this URL
    Callback(Url),
    Cancel,
    Fail(String),
}

/// Consent surface that answers like a user would, without a browser
pub struct ScriptedConsent {
    script: ConsentScript,
    presented: Mutex<Vec<Url>>,
}

impl ScriptedConsent {
    pub fn new(script: ConsentScript) -> Self {
        Self {
            script,
            presented: Mutex::new(Vec::new()),
        }
    }

    pub fn approve(code: impl Into<String>) -> Self {
        Self::new(ConsentScript::Approve(code.into()))
    }

    /// Every URL the surface was asked to show
    pub fn presented(&self) -> Vec<Url> {
        lock(&self.presented).clone()
    }
}

#[async_trait]
impl ConsentSurface for ScriptedConsent {
    async fn present(&self, url: &Url, _callback_scheme: &str) -> ConsentResult {
        lock(&self.presented).push(url.clone());

        match &self.script {
            ConsentScript::Approve(code) => {
                let param = |name: &str| {
                    url.query_pairs()
                        .find(|(key, _)| key == name)
                        .map(|(_, value)| value.into_owned())
                };
                let Some(redirect) = param("redirect_uri").and_then(|r| Url::parse(&r).ok())
                else {
                    return ConsentResult::Error("no redirect_uri".to_string());
                };

                let mut callback = redirect;
                callback
                    .query_pairs_mut()
                    .append_pair("state", &param("state").unwrap_or_default())
                    .append_pair("code", code)
                    .append_pair("scope", &param("scope").unwrap_or_default());
                ConsentResult::Callback(callback)
            }
            ConsentScript::Callback(callback) => ConsentResult::Callback(callback.clone()),
            ConsentScript::Cancel => ConsentResult::Cancelled,
            ConsentScript::Fail(detail) => ConsentResult::Error(detail.clone()),
        }
    }
}

/// Launcher that either accepts every deep link or none
pub struct ScriptedLauncher {
    accept: bool,
    opened: Mutex<Vec<Url>>,
}

impl ScriptedLauncher {
    pub fn new(accept: bool) -> Self {
        Self {
            accept,
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Deep links offered to the launcher, accepted or not
    pub fn opened(&self) -> Vec<Url> {
        lock(&self.opened).clone()
    }
}

impl AppLauncher for ScriptedLauncher {
    fn open(&self, url: &Url) -> bool {
        lock(&self.opened).push(url.clone());
        self.accept
    }
}

/// In-memory token store
#[derive(Default)]
pub struct MemoryTokenStore {
    credential: Mutex<Option<Credential>>,
    saves: Mutex<usize>,
    fail: bool,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: Mutex::new(Some(credential)),
            ..Self::default()
        }
    }

    /// A store whose every operation fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn stored(&self) -> Option<Credential> {
        lock(&self.credential).clone()
    }

    pub fn save_count(&self) -> usize {
        *lock(&self.saves)
    }

    fn check(&self) -> Result<(), AuthError> {
        if self.fail {
            Err(AuthError::TokenStorage("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<Credential>, AuthError> {
        self.check()?;
        Ok(self.stored())
    }

    fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        self.check()?;
        *lock(&self.credential) = Some(credential.clone());
        *lock(&self.saves) += 1;
        Ok(())
    }

    fn delete(&self) -> Result<(), AuthError> {
        self.check()?;
        *lock(&self.credential) = None;
        Ok(())
    }
}

/// Body of a successful `/oauth/token` response
pub fn token_json(
    access_token: &str,
    refresh_token: &str,
    expires_at: i64,
    athlete_id: Option<i64>,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "token_type": "Bearer",
        "access_token": access_token,
        "refresh_token": refresh_token,
        "expires_at": expires_at,
        "expires_in": 21600,
    });
    if let Some(id) = athlete_id {
        body["athlete"] = serde_json::json!({
            "id": id,
            "username": "rider",
            "firstname": "Marianne",
            "lastname": "Vos",
        });
    }
    body
}
