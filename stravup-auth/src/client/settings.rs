use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use strava_api::{
    ApiConfig, ClientCredentials, DEFAULT_API_BASE, DEFAULT_APP_AUTHORIZE_URL, DEFAULT_SCOPE,
    DEFAULT_WEB_AUTHORIZE_URL,
};
use url::Url;

use super::manager::OAuthConfig;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub client_id: String,
    pub client_secret: SecretString,

    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Scheme the consent surface watches for; defaults to the redirect URI's
    #[serde(default)]
    pub callback_scheme: Option<String>,

    #[serde(default = "default_scope")]
    pub scope: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_web_authorize_url")]
    pub web_authorize_url: String,

    #[serde(default = "default_app_authorize_url")]
    pub app_authorize_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_redirect_uri() -> String {
    "http://localhost/exchange_token".to_string()
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_web_authorize_url() -> String {
    DEFAULT_WEB_AUTHORIZE_URL.to_string()
}

fn default_app_authorize_url() -> String {
    DEFAULT_APP_AUTHORIZE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    1000
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("STRAVUP_CONFIG").unwrap_or_else(|_| "config.toml".to_string());

        Self::from_sources(
            Config::builder()
                .add_source(File::with_name(&config_path).required(false))
                .add_source(config::Environment::with_prefix("STRAVUP").separator("__")),
        )
    }

    pub fn from_sources(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.client_id.trim().is_empty() {
            return Err("client_id is required".to_string());
        }
        if self.client_secret.expose_secret().trim().is_empty() {
            return Err("client_secret is required".to_string());
        }
        if Url::parse(&self.redirect_uri).is_err() {
            return Err("redirect_uri must be an absolute URL".to_string());
        }
        if !self.api_base.starts_with("http") {
            return Err("api_base must be a valid HTTP(S) URL".to_string());
        }
        if Url::parse(&self.web_authorize_url).is_err() {
            return Err("web_authorize_url must be an absolute URL".to_string());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be positive".to_string());
        }
        Ok(())
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig::new(self.api_base.clone())
            .request_timeout(Duration::from_secs(self.request_timeout_secs))
            .poll_interval(Duration::from_millis(self.poll_interval_ms))
    }

    pub fn oauth_config(&self) -> OAuthConfig {
        let callback_scheme = self.callback_scheme.clone().unwrap_or_else(|| {
            Url::parse(&self.redirect_uri)
                .map(|u| u.scheme().to_string())
                .unwrap_or_default()
        });

        OAuthConfig {
            credentials: ClientCredentials {
                client_id: self.client_id.clone(),
                client_secret: SecretString::from(self.client_secret.expose_secret().to_string()),
            },
            redirect_uri: self.redirect_uri.clone(),
            callback_scheme,
            scope: self.scope.clone(),
            web_authorize_url: self.web_authorize_url.clone(),
            app_authorize_url: Some(self.app_authorize_url.clone()),
        }
    }
}
