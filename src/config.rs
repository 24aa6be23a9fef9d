use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Carnet";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable naming the hosted backend's base URL.
pub const BACKEND_URL_VAR: &str = "CARNET_BACKEND_URL";
/// Environment variable holding the backend's publishable API key.
pub const BACKEND_KEY_VAR: &str = "CARNET_BACKEND_KEY";

/// Default `tracing` filter when RUST_LOG is not set.
pub fn default_log_filter() -> &'static str {
    "carnet=info"
}

/// Get the application data directory
/// ~/Carnet/ on all platforms (user-visible, per design requirement)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Carnet")
}

/// Path of the on-device notification history database.
pub fn history_db_path() -> PathBuf {
    app_data_dir().join("notifications.db")
}

/// Connection settings for the hosted backend, resolved from the environment.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_key: String,
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: trim_trailing_slash(base_url.into()),
            api_key: api_key.into(),
        }
    }

    /// Read `CARNET_BACKEND_URL` / `CARNET_BACKEND_KEY`. None if either is unset.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var(BACKEND_URL_VAR).ok()?;
        let api_key = std::env::var(BACKEND_KEY_VAR).ok()?;
        Some(Self::new(base_url, api_key))
    }

    /// The realtime websocket endpoint derived from the base URL.
    pub fn realtime_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!("{ws_base}/realtime/v1/websocket?apikey={}&vsn=1.0.0", self.api_key)
    }
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}
