use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://www.strava.com/api/v3";
pub const DEFAULT_WEB_AUTHORIZE_URL: &str = "https://www.strava.com/oauth/mobile/authorize";
pub const DEFAULT_APP_AUTHORIZE_URL: &str = "strava://oauth/mobile/authorize";
pub const DEFAULT_SCOPE: &str = "read_all,activity:write";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Where the API lives and how patiently to talk to it
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_base: String,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ApiConfig {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            ..Self::default()
        }
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Join an endpoint path onto the API base
    pub fn url(&self, endpoint: &str) -> String {
        let base = self.api_base.trim_end_matches('/');
        if endpoint.is_empty() {
            return base.to_string();
        }
        if endpoint.starts_with('/') {
            format!("{}{}", base, endpoint)
        } else {
            format!("{}/{}", base, endpoint)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_endpoints_with_single_slash() {
        let config = ApiConfig::new("https://example.test/api/v3/");
        assert_eq!(config.url("/uploads"), "https://example.test/api/v3/uploads");
        assert_eq!(config.url("uploads/7"), "https://example.test/api/v3/uploads/7");
        assert_eq!(config.url(""), "https://example.test/api/v3");
    }

    #[test]
    fn defaults_poll_once_per_second() {
        let config = ApiConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.api_base, DEFAULT_API_BASE);
    }
}
