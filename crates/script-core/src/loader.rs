//! Script Loader
//!
//! Inserts (or reuses) the SDK script for a request and resolves once the
//! namespace global defined by that script is available.
//!
//! One loader serves one document. It owns the document's `ScriptCache` and
//! tracks the scripts it is still waiting on, so a second request for a
//! script that is mid-load waits for it instead of inserting a copy.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::cache::{LoadOutcome, Marker, ScriptCache};
use crate::config::LoaderConfig;
use crate::error::ScriptLoadError;
use crate::host::ScriptHost;
use crate::locator::{ScriptElement, ScriptRequest};
use crate::sdk::SdkHandle;

const ORIGINAL_ERROR_TAG: &str = "/* Original Error:";

type InsertFuture = Shared<BoxFuture<'static, Result<(), ScriptLoadError>>>;

/// Loads SDK scripts into a `ScriptHost`
///
/// Share one loader (behind an `Arc`) between every provider of a document.
pub struct ScriptLoader {
    host: Arc<dyn ScriptHost>,
    config: LoaderConfig,
    cache: Arc<ScriptCache>,
    inflight: Mutex<HashMap<Marker, InsertFuture>>,
}

impl ScriptLoader {
    pub fn new(host: Arc<dyn ScriptHost>, config: LoaderConfig) -> Self {
        Self {
            host,
            config,
            cache: Arc::new(ScriptCache::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn host(&self) -> &Arc<dyn ScriptHost> {
        &self.host
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Page-wide load cache
    pub fn cache(&self) -> &Arc<ScriptCache> {
        &self.cache
    }

    /// Script already in the document for this exact request
    pub fn find_script(&self, request: &ScriptRequest) -> Option<ScriptElement> {
        self.host.scripts().into_iter().find(|s| s.matches(request))
    }

    /// Load `request`, tagging a newly inserted script with `marker`
    ///
    /// A matching script that already defined its namespace is reused, and a
    /// matching script still loading is awaited; either way the returned
    /// handle carries that script's marker.
    pub async fn load(&self, request: ScriptRequest, marker: Marker) -> LoadOutcome {
        if let Some(existing) = self.find_script(&request) {
            if self.host.namespace_owner(&request.namespace) == Some(existing.marker) {
                if let Some(namespace) = self.host.namespace(&request.namespace) {
                    tracing::debug!(
                        url = %request.url,
                        marker = %existing.marker,
                        "Reusing script already in document"
                    );
                    return Ok(SdkHandle::new(request.namespace, existing.marker, namespace));
                }
            }

            let inflight = lock(&self.inflight).get(&existing.marker).cloned();
            if let Some(insert) = inflight {
                tracing::debug!(url = %request.url, marker = %existing.marker, "Awaiting script already loading");
                self.wait(&request, insert).await?;
                return self.resolve(request, existing.marker);
            }
        }

        let removed = self.remove_stale(&request.namespace, marker);
        self.host.clear_namespace(&request.namespace);

        let element = request.element(marker);
        tracing::info!(url = %request.url, marker = %marker, removed, "Inserting SDK script");
        tracing::debug!(attributes = ?element.rendered_attributes(&self.config.marker_attribute));

        let host = Arc::clone(&self.host);
        let insert = async move { host.insert_script(element).await }.boxed().shared();
        lock(&self.inflight).insert(marker, insert.clone());

        let inserted = self.wait(&request, insert).await;
        lock(&self.inflight).remove(&marker);

        if let Err(err) = inserted {
            tracing::warn!(url = %request.url, marker = %marker, error = %err, "SDK script failed to load");
            return Err(err);
        }

        self.resolve(request, marker)
    }

    /// Await an insert, bounded by the configured timeout
    async fn wait(&self, request: &ScriptRequest, insert: InsertFuture) -> Result<(), ScriptLoadError> {
        match self.config.load_timeout {
            Some(timeout) => tokio::time::timeout(timeout, insert).await.unwrap_or_else(|_| {
                Err(ScriptLoadError::Timeout {
                    url: request.url.clone(),
                    millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }),
            None => insert.await,
        }
    }

    /// Handle for the namespace defined by the script tagged `marker`
    fn resolve(&self, request: ScriptRequest, marker: Marker) -> LoadOutcome {
        let attached = self.host.scripts().iter().any(|s| s.marker == marker);
        let owner = self.host.namespace_owner(&request.namespace);

        if !attached || owner.is_some_and(|owner| owner != marker) {
            tracing::debug!(url = %request.url, marker = %marker, owner = ?owner, "Script superseded while loading");
            return Err(ScriptLoadError::Superseded { url: request.url });
        }

        match self.host.namespace(&request.namespace) {
            Some(namespace) => {
                tracing::info!(namespace = %request.namespace, marker = %marker, "SDK namespace available");
                Ok(SdkHandle::new(request.namespace, marker, namespace))
            }
            None => Err(ScriptLoadError::NamespaceMissing(request.namespace)),
        }
    }

    /// Remove every script of `namespace` not tagged with `keep`
    fn remove_stale(&self, namespace: &str, keep: Marker) -> usize {
        self.host
            .scripts()
            .into_iter()
            .filter(|s| s.namespace == namespace && s.marker != keep)
            .filter(|s| self.host.remove_script(s.marker))
            .count()
    }

    /// Remove all scripts of `namespace` and its global
    pub fn destroy(&self, namespace: &str) -> usize {
        let removed = self
            .host
            .scripts()
            .into_iter()
            .filter(|s| s.namespace == namespace)
            .filter(|s| self.host.remove_script(s.marker))
            .count();
        self.host.clear_namespace(namespace);
        tracing::debug!(namespace = %namespace, removed, "Destroyed SDK script");
        removed
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Extract the SDK's own message from an error payload
///
/// The SDK answers a bad request with a script whose body embeds the
/// validation error as `/* Original Error: ... */`; anything else is
/// returned as is.
pub fn parse_sdk_error(body: &str) -> String {
    match body.split_once(ORIGINAL_ERROR_TAG) {
        Some((_, rest)) => rest.replace('\n', "").replacen("*/", "", 1).trim().to_string(),
        None => body.to_string(),
    }
}
