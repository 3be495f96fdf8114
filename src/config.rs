use std::env;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.crossref.org";
pub const DEFAULT_MAILTO: &str = "crossworks@example.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_BASE_URL: &str = "CROSSREF_BASE_URL";
pub const ENV_MAILTO: &str = "CROSSREF_MAILTO";
pub const ENV_TIMEOUT_SECS: &str = "CROSSREF_TIMEOUT_SECS";

/// Settings for talking to the Crossref REST API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API root, without trailing slash
    pub base_url: String,
    /// Contact address sent with every request (Crossref "polite pool")
    pub mailto: String,
    pub user_agent: Option<String>,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            mailto: DEFAULT_MAILTO.to_string(),
            user_agent: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with `CROSSREF_*` environment variables
    pub fn from_env() -> Self {
        Self::default().overlay(|key| env::var(key).ok())
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = base_url;
        }
        if let Some(mailto) = lookup(ENV_MAILTO).filter(|v| !v.trim().is_empty()) {
            self.mailto = mailto;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.timeout = Duration::from_secs(secs),
                _ => tracing::warn!("ignoring invalid {}={:?}", ENV_TIMEOUT_SECS, raw),
            }
        }
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_mailto(mut self, mailto: impl Into<String>) -> Self {
        self.mailto = mailto.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base URL with any trailing slashes removed
    pub fn api_root(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// User agent in the form Crossref asks for: `name/version (mailto:...)`
    pub fn user_agent(&self) -> String {
        self.user_agent.clone().unwrap_or_else(|| {
            format!(
                "{}/{} (mailto:{})",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                self.mailto
            )
        })
    }
}
