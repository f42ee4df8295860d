//! Loader Configuration

use std::time::Duration;

use crate::error::{Result, ScriptError};

/// Default SDK entry point
pub const DEFAULT_SDK_BASE_URL: &str = "https://www.paypal.com/sdk/js";

/// Loader configuration
#[derive(Clone, Debug)]
pub struct LoaderConfig {
    /// Base URL the query string is appended to
    pub sdk_base_url: String,

    /// Option that must be present for a load to start
    pub identity_key: String,

    /// Namespace global used when `data-namespace` is not set
    pub default_namespace: String,

    /// Attribute carrying the load entry's marker
    pub marker_attribute: String,

    /// Give up on a script that has not settled after this long
    pub load_timeout: Option<Duration>,

    /// Start in `Initial` and wait for the first dispatch
    pub defer_loading: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            sdk_base_url: DEFAULT_SDK_BASE_URL.into(),
            identity_key: "client-id".into(),
            default_namespace: "paypal".into(),
            marker_attribute: "data-sdk-script-id".into(),
            load_timeout: None,
            defer_loading: false,
        }
    }
}

impl LoaderConfig {
    /// Read overrides from `SDK_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("SDK_BASE_URL") {
            url::Url::parse(&url)
                .map_err(|e| ScriptError::Config(format!("SDK_BASE_URL: {}", e)))?;
            config.sdk_base_url = url;
        }
        if let Ok(key) = std::env::var("SDK_IDENTITY_KEY") {
            config.identity_key = key;
        }
        if let Ok(namespace) = std::env::var("SDK_NAMESPACE") {
            config.default_namespace = namespace;
        }
        config.load_timeout = std::env::var("SDK_LOAD_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs);
        config.defer_loading = std::env::var("SDK_DEFER_LOADING")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(config)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.sdk_base_url = url.into();
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = Some(timeout);
        self
    }

    pub fn deferred(mut self) -> Self {
        self.defer_loading = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = LoaderConfig::default();
        assert_eq!(config.sdk_base_url, "https://www.paypal.com/sdk/js");
        assert_eq!(config.identity_key, "client-id");
        assert_eq!(config.default_namespace, "paypal");
        assert!(config.load_timeout.is_none());
        assert!(!config.defer_loading);
    }
}
