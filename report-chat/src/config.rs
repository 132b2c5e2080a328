use tracing::debug;

pub const API_URL_ENV: &str = "REPORT_CHAT_API_URL";
pub const TITLE_ENV: &str = "REPORT_CHAT_TITLE";

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_TITLE: &str = "Medical Report Chat";

/// Connection settings for the analysis service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the service, without a trailing slash
    pub api_url: String,
    /// Title sent when a conversation is created
    pub title: String,
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            title: title.into(),
        }
    }

    /// Read `REPORT_CHAT_API_URL` and `REPORT_CHAT_TITLE`, falling back to defaults
    pub fn from_env() -> Self {
        let api_url = non_empty_var(API_URL_ENV).unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let title = non_empty_var(TITLE_ENV).unwrap_or_else(|| DEFAULT_TITLE.to_string());
        debug!("Client configuration: api_url={}, title={}", api_url, title);
        Self::new(api_url, title)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL, DEFAULT_TITLE)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
