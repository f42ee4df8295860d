//! Error Types

use thiserror::Error;

use crate::status::LoadStatus;

/// Result type alias for loader operations
pub type Result<T> = std::result::Result<T, ScriptError>;

/// Load options rejected before any network activity
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidOptionError {
    /// Required identity option missing or empty
    #[error("Missing required option: {0}")]
    Missing(String),

    /// Value kind that cannot be expressed in a script locator
    #[error("Unsupported value for option '{key}': {kind}")]
    UnsupportedValue { key: String, kind: String },

    /// SDK base URL could not be parsed
    #[error("Invalid SDK base URL '{url}': {reason}")]
    BaseUrl { url: String, reason: String },
}

/// Script load failure, shared by every consumer awaiting the same load
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptLoadError {
    /// Request never produced a response
    #[error("Network error loading {url}: {reason}")]
    Network { url: String, reason: String },

    /// Non-success response
    #[error("Script {url} responded with status {status}")]
    Status { url: String, status: u16 },

    /// Error reported by the SDK payload itself, surfaced verbatim
    #[error("{0}")]
    Sdk(String),

    /// Script loaded but the namespace global never appeared
    #[error("The window.{0} global variable is not available.")]
    NamespaceMissing(String),

    /// Script did not settle within the configured timeout
    #[error("The script \"{url}\" did not load within {millis}ms.")]
    Timeout { url: String, millis: u64 },

    /// Script was removed, or another script took over the namespace, before it finished
    #[error("The script \"{url}\" was replaced before it finished loading.")]
    Superseded { url: String },

    /// Host reported a failure without any detail
    #[error("The script \"{0}\" failed to load.")]
    Failed(String),
}

impl ScriptLoadError {
    /// Check if a forced reload could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScriptLoadError::Network { .. }
                | ScriptLoadError::Timeout { .. }
                | ScriptLoadError::Superseded { .. }
                | ScriptLoadError::Status { status: 500..=599, .. }
        )
    }
}

/// Consumer API misuse
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    /// Context lookup outside `ScriptProvider::scope`
    #[error("use_script_reducer must be used within a ScriptProvider scope")]
    OutsideProvider,

    /// SDK handle requested before the load resolved
    #[error("SDK is not available while status is {0}")]
    NotResolved(LoadStatus),

    /// Namespace does not expose the requested factory
    #[error("window.{namespace}.{name} is not available")]
    MissingCapability { namespace: String, name: String },
}

/// Crate-level error
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Invalid options: {0}")]
    InvalidOption(#[from] InvalidOptionError),

    #[error("Script load failed: {0}")]
    Load(#[from] ScriptLoadError),

    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),

    /// Failure raised by an SDK component (render/close)
    #[error("Component error: {0}")]
    Component(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScriptError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            ScriptError::Load(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            ScriptError::InvalidOption(err) => format!("The payment SDK is misconfigured: {}", err),
            ScriptError::Load(ScriptLoadError::Sdk(msg)) => msg.clone(),
            ScriptError::Load(_) => "The payment SDK could not be loaded. Please try again.".into(),
            ScriptError::Usage(_) => "The payment SDK is not ready yet.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdk_message_is_verbatim() {
        let err = ScriptLoadError::Sdk("Expected client-id to be passed".into());
        assert_eq!(err.to_string(), "Expected client-id to be passed");
        assert_eq!(ScriptError::from(err).user_message(), "Expected client-id to be passed");
    }

    #[test]
    fn test_retryable() {
        let server = ScriptLoadError::Status { url: "u".into(), status: 503 };
        let client = ScriptLoadError::Status { url: "u".into(), status: 400 };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(!ScriptError::Usage(UsageError::OutsideProvider).is_retryable());
    }
}
