use super::{Request, RequestBody};
use chrono::{DateTime, Utc, serde::ts_seconds};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

// Common

/// An authenticated session: access/refresh token pair, expiry and profile.
///
/// Never mutated in place; a refresh produces a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(with = "ts_seconds")]
    pub expires_at: DateTime<Utc>,
    pub refresh_token: String,
    #[serde(default, alias = "athlete", skip_serializing_if = "Option::is_none")]
    pub subject: Option<ProfileSummary>,
}

impl Credential {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

/// The authenticated athlete, as far as the token endpoint tells us
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub profile_medium: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
}

impl ProfileSummary {
    pub fn display_name(&self) -> String {
        match (&self.firstname, &self.lastname, &self.username) {
            (Some(first), Some(last), _) => format!("{} {}", first, last),
            (Some(first), None, _) => first.clone(),
            (None, _, Some(username)) => username.clone(),
            _ => format!("athlete {}", self.id),
        }
    }
}

/// Application identity sent to the token endpoint
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::from(client_secret.into()),
        }
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGrant {
    AuthorizationCode(String),
    RefreshToken(String),
}

impl TokenGrant {
    pub fn grant_type(&self) -> &'static str {
        match self {
            TokenGrant::AuthorizationCode(_) => "authorization_code",
            TokenGrant::RefreshToken(_) => "refresh_token",
        }
    }
}

// Requests

/// `POST /oauth/token` for both the authorization-code and refresh grants
#[derive(Debug, Clone)]
pub struct ExchangeToken {
    payload: serde_json::Value,
}

impl ExchangeToken {
    pub fn new(credentials: &ClientCredentials, grant: &TokenGrant) -> Self {
        let mut payload = serde_json::json!({
            "client_id": credentials.client_id,
            "client_secret": credentials.client_secret.expose_secret(),
            "grant_type": grant.grant_type(),
        });
        match grant {
            TokenGrant::AuthorizationCode(code) => payload["code"] = code.as_str().into(),
            TokenGrant::RefreshToken(token) => payload["refresh_token"] = token.as_str().into(),
        }
        Self { payload }
    }
}

impl Request for ExchangeToken {
    fn method(&self) -> Method {
        Method::POST
    }

    fn endpoint(&self) -> Cow<'_, str> {
        "/oauth/token".into()
    }

    fn body(&self) -> RequestBody {
        RequestBody::Json(serde_json::to_vec(&self.payload).unwrap_or_default())
    }
}

/// `POST /oauth/deauthorize`, revoking every token of the session
#[derive(Debug, Clone)]
pub struct Deauthorize {
    access_token: String,
}

impl Deauthorize {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }
}

impl Request for Deauthorize {
    fn method(&self) -> Method {
        Method::POST
    }

    fn endpoint(&self) -> Cow<'_, str> {
        "/oauth/deauthorize".into()
    }

    fn access_token(&self) -> Option<&str> {
        Some(&self.access_token)
    }
}

// Responses

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(with = "ts_seconds")]
    pub expires_at: DateTime<Utc>,
    pub refresh_token: String,
    #[serde(default)]
    pub athlete: Option<ProfileSummary>,
}

impl TokenResponse {
    /// Credential from an authorization-code exchange, carrying the athlete
    pub fn into_credential(self) -> Credential {
        Credential {
            access_token: self.access_token,
            expires_at: self.expires_at,
            refresh_token: self.refresh_token,
            subject: self.athlete,
        }
    }

    /// Credential from a refresh. The profile of `prior` is kept as is,
    /// even if the response repeats an athlete.
    pub fn into_refreshed(self, prior: &Credential) -> Credential {
        Credential {
            access_token: self.access_token,
            expires_at: self.expires_at,
            refresh_token: self.refresh_token,
            subject: prior.subject.clone(),
        }
    }
}
