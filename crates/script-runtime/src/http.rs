//! HTTP Script Host
//!
//! Implementation of `ScriptHost` that fetches each inserted script over
//! HTTP. Elements and namespace globals live in memory, the same way a
//! document head would hold them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use script_core::{
    Marker, ScriptElement, ScriptError, ScriptHost, ScriptLoadError, SdkNamespace, parse_sdk_error,
};

use crate::evaluate::{ExportScanner, ScriptEvaluator};

/// HTTP host configuration
#[derive(Clone, Debug)]
pub struct HttpHostConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// User agent sent with every script request
    pub user_agent: String,
}

impl Default for HttpHostConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("script-runtime/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl HttpHostConfig {
    pub fn from_env() -> Self {
        let timeout_secs = std::env::var("SDK_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(30);

        Self {
            timeout_secs,
            ..Default::default()
        }
    }
}

/// Headless document that loads scripts with `reqwest`
pub struct HttpScriptHost {
    client: reqwest::Client,
    evaluator: Arc<dyn ScriptEvaluator>,
    scripts: Mutex<Vec<ScriptElement>>,
    namespaces: Mutex<HashMap<String, (Marker, Arc<dyn SdkNamespace>)>>,
}

impl HttpScriptHost {
    /// Create from configuration
    pub fn from_config(config: HttpHostConfig) -> Result<Self, ScriptError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| ScriptError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            evaluator: Arc::new(ExportScanner::default()),
            scripts: Mutex::new(Vec::new()),
            namespaces: Mutex::new(HashMap::new()),
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self, ScriptError> {
        Self::from_config(HttpHostConfig::from_env())
    }

    /// Replace the evaluator that turns script bodies into namespaces
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Fetch a script body, turning error responses into the SDK's message
    async fn fetch(&self, src: &str) -> Result<String, ScriptLoadError> {
        let network = |e: reqwest::Error| ScriptLoadError::Network {
            url: src.to_string(),
            reason: e.to_string(),
        };

        let response = self.client.get(src).send().await.map_err(network)?;
        let status = response.status();
        let body = response.text().await.map_err(network)?;

        if status.is_success() {
            return Ok(body);
        }

        tracing::warn!(url = %src, status = status.as_u16(), "SDK script request failed");
        if body.trim().is_empty() {
            Err(ScriptLoadError::Status {
                url: src.to_string(),
                status: status.as_u16(),
            })
        } else {
            Err(ScriptLoadError::Sdk(parse_sdk_error(&body)))
        }
    }

    fn is_attached(&self, marker: Marker) -> bool {
        lock(&self.scripts).iter().any(|s| s.marker == marker)
    }
}

#[async_trait]
impl ScriptHost for HttpScriptHost {
    fn scripts(&self) -> Vec<ScriptElement> {
        lock(&self.scripts).clone()
    }

    async fn insert_script(&self, element: ScriptElement) -> Result<(), ScriptLoadError> {
        lock(&self.scripts).insert(0, element.clone());

        let body = self.fetch(&element.src).await?;
        let namespace = self.evaluator.evaluate(&element, &body)?;

        if self.is_attached(element.marker) {
            lock(&self.namespaces).insert(element.namespace.clone(), (element.marker, namespace));
        } else {
            tracing::debug!(marker = %element.marker, "Script removed before it finished loading");
        }
        Ok(())
    }

    fn remove_script(&self, marker: Marker) -> bool {
        let mut scripts = lock(&self.scripts);
        let before = scripts.len();
        scripts.retain(|s| s.marker != marker);
        scripts.len() != before
    }

    fn namespace(&self, name: &str) -> Option<Arc<dyn SdkNamespace>> {
        lock(&self.namespaces).get(name).map(|(_, ns)| Arc::clone(ns))
    }

    fn namespace_owner(&self, name: &str) -> Option<Marker> {
        lock(&self.namespaces).get(name).map(|(owner, _)| *owner)
    }

    fn clear_namespace(&self, name: &str) {
        lock(&self.namespaces).remove(name);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::{Router, extract::Query, http::StatusCode, routing::get};
    use script_core::{Action, LoadOptions, LoaderConfig, ScriptLoader, ScriptProvider};

    use super::*;

    const SDK_BODY: &str = "window.paypal = { Buttons: function() {}, Marks: function() {} };";
    const SDK_ERROR: &str = "throw new Error(\"SDK Validation error: 'Invalid query value for client-id: bad'\");\n\n/* Original Error:\n\nInvalid query value for client-id: bad\n\n*/";

    async fn sdk(Query(params): Query<HashMap<String, String>>) -> (StatusCode, String) {
        match params.get("client-id").map(String::as_str) {
            Some("bad") => (StatusCode::BAD_REQUEST, SDK_ERROR.to_string()),
            Some("down") => (StatusCode::SERVICE_UNAVAILABLE, String::new()),
            Some("empty") => (StatusCode::OK, String::new()),
            _ => (StatusCode::OK, SDK_BODY.to_string()),
        }
    }

    async fn serve() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/sdk/js", get(sdk));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/sdk/js", addr)
    }

    fn provider(base_url: &str, client_id: &str) -> ScriptProvider {
        let host = Arc::new(HttpScriptHost::from_config(HttpHostConfig::default()).unwrap());
        let options = LoadOptions::new().with("client-id", client_id).with("currency", "USD");
        let loader = ScriptLoader::new(host, LoaderConfig::default().with_base_url(base_url));
        ScriptProvider::new(options, Arc::new(loader)).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = HttpHostConfig::default();
        assert_eq!(config.timeout_secs, 30);
        assert!(config.user_agent.starts_with("script-runtime/"));
    }

    #[tokio::test]
    async fn test_successful_load() {
        let base = serve().await;
        let provider = provider(&base, "abc");

        let status = provider.settled().await;
        assert!(status.is_resolved, "{:?}", status.error);

        let sdk = provider.sdk().unwrap();
        assert_eq!(sdk.inner().factory_names(), vec!["Buttons", "Marks"]);
        assert!(!sdk.has_component("Messages"));

        let scripts = provider.loader().host().scripts();
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].src, format!("{}?client-id=abc&currency=USD", base));
    }

    #[tokio::test]
    async fn test_sdk_error_surfaced_verbatim() {
        let base = serve().await;
        let provider = provider(&base, "bad");

        let status = provider.settled().await;
        assert!(status.is_rejected);
        assert_eq!(status.error.as_deref(), Some("Invalid query value for client-id: bad"));
    }

    #[tokio::test]
    async fn test_status_without_payload() {
        let base = serve().await;
        let provider = provider(&base, "down");

        provider.settled().await;
        assert!(matches!(
            provider.error(),
            Some(ScriptLoadError::Status { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_success_uses_default_message() {
        let base = serve().await;
        let provider = provider(&base, "empty");

        let status = provider.settled().await;
        let url = format!("{}?client-id=empty&currency=USD", base);
        assert_eq!(status.error, Some(format!("The script \"{}\" failed to load.", url)));
    }

    #[tokio::test]
    async fn test_reset_after_rejection() {
        let base = serve().await;
        let provider = provider(&base, "bad");
        assert!(provider.settled().await.is_rejected);

        let fixed = LoadOptions::new().with("client-id", "abc").with("currency", "USD");
        assert!(provider.dispatch(Action::ResetOptions(fixed)).unwrap());
        assert!(provider.settled().await.is_resolved);

        let scripts = provider.loader().host().scripts();
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].src.contains("client-id=abc"));
    }

    #[tokio::test]
    async fn test_network_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider = provider(&format!("http://{}/sdk/js", addr), "abc");
        provider.settled().await;
        assert!(matches!(provider.error(), Some(ScriptLoadError::Network { .. })));
    }
}
