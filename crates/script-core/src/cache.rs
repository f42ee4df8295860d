//! Script Cache
//!
//! Page-wide registry of script loads keyed by `OptionIdentity`. A load is
//! created once per identity and every caller shares its outcome until the
//! identity is invalidated.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ScriptLoadError;
use crate::options::OptionIdentity;
use crate::sdk::SdkHandle;

/// Outcome every awaiter of a load observes
pub type LoadOutcome = std::result::Result<SdkHandle, ScriptLoadError>;

/// Lazy load produced by a loader function
pub type LoadFuture = BoxFuture<'static, LoadOutcome>;

/// Unique token attached to an inserted script
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Marker(Uuid);

impl Marker {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for Marker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// One in-flight or settled load
#[derive(Clone)]
pub struct LoadEntry {
    identity: OptionIdentity,
    marker: Marker,
    created_at: DateTime<Utc>,
    load: Shared<LoadFuture>,
}

impl LoadEntry {
    pub fn identity(&self) -> &OptionIdentity {
        &self.identity
    }

    /// Marker given to the script this entry inserts
    pub fn marker(&self) -> Marker {
        self.marker
    }

    /// Wait for the shared outcome
    pub async fn settled(&self) -> LoadOutcome {
        self.load.clone().await
    }

    /// Outcome if the load already settled
    pub fn peek(&self) -> Option<&LoadOutcome> {
        self.load.peek()
    }

    pub fn is_settled(&self) -> bool {
        self.peek().is_some()
    }

    /// Two handles to the same underlying load
    pub fn same_load(&self, other: &LoadEntry) -> bool {
        self.marker == other.marker
    }
}

impl fmt::Debug for LoadEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadEntry")
            .field("identity", &self.identity.short())
            .field("marker", &self.marker)
            .field("created_at", &self.created_at)
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Registry of loads, one per identity
///
/// Create one per page session and share it behind an `Arc`.
#[derive(Default)]
pub struct ScriptCache {
    entries: Mutex<HashMap<OptionIdentity, LoadEntry>>,
}

impl ScriptCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<OptionIdentity, LoadEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the entry for `identity`, creating it with `loader_fn` if absent
    ///
    /// `loader_fn` only builds the future; it must not touch the cache.
    pub fn get_or_create<F>(&self, identity: &OptionIdentity, loader_fn: F) -> LoadEntry
    where
        F: FnOnce(Marker) -> LoadFuture,
    {
        let mut entries = self.entries();

        if let Some(entry) = entries.get(identity) {
            tracing::debug!(identity = %identity, marker = %entry.marker, "Reusing cached script load");
            return entry.clone();
        }

        let marker = Marker::new();
        let entry = LoadEntry {
            identity: identity.clone(),
            marker,
            created_at: Utc::now(),
            load: loader_fn(marker).shared(),
        };
        entries.insert(identity.clone(), entry.clone());

        tracing::debug!(identity = %identity, marker = %marker, "Created script load");
        entry
    }

    pub fn get(&self, identity: &OptionIdentity) -> Option<LoadEntry> {
        self.entries().get(identity).cloned()
    }

    /// Drop the entry so the next request starts a fresh load
    pub fn invalidate(&self, identity: &OptionIdentity) -> bool {
        let removed = self.entries().remove(identity).is_some();
        if removed {
            tracing::debug!(identity = %identity, "Invalidated script load");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Forget every entry
    pub fn clear(&self) {
        self.entries().clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::options::LoadOptions;
    use crate::sdk::{SdkHandle, StaticNamespace};

    fn identity(client: &str) -> OptionIdentity {
        OptionIdentity::derive(&LoadOptions::new().with("client-id", client), "client-id").unwrap()
    }

    fn ready(marker: Marker) -> LoadFuture {
        async move { Ok(SdkHandle::new("paypal", marker, Arc::new(StaticNamespace::new()))) }.boxed()
    }

    #[tokio::test]
    async fn test_loader_called_once_per_identity() {
        let cache = ScriptCache::new();
        let calls = AtomicUsize::new(0);
        let id = identity("abc");

        let first = cache.get_or_create(&id, |m| {
            calls.fetch_add(1, Ordering::SeqCst);
            ready(m)
        });
        let second = cache.get_or_create(&id, |m| {
            calls.fetch_add(1, Ordering::SeqCst);
            ready(m)
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(first.same_load(&second));
        assert_eq!(second.identity(), &id);
        assert!(cache.get(&id).unwrap().same_load(&first));

        let (a, b) = tokio::join!(first.settled(), second.settled());
        assert_eq!(a.unwrap().marker(), b.unwrap().marker());
        assert!(first.is_settled());
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_cached() {
        let cache = ScriptCache::new();
        let id = identity("abc");
        let entry = cache.get_or_create(&id, |_| {
            async { Err(ScriptLoadError::Sdk("bad client-id".into())) }.boxed()
        });

        assert_eq!(entry.settled().await.unwrap_err(), ScriptLoadError::Sdk("bad client-id".into()));
        let again = cache.get_or_create(&id, ready);
        assert!(again.same_load(&entry));
        assert!(again.settled().await.is_err());
    }

    #[tokio::test]
    async fn test_invalidate_creates_fresh_load() {
        let cache = ScriptCache::new();
        let id = identity("abc");

        let first = cache.get_or_create(&id, ready);
        assert!(cache.invalidate(&id));
        assert!(!cache.invalidate(&id));
        let second = cache.get_or_create(&id, ready);

        assert!(!first.same_load(&second));
        assert_eq!(cache.len(), 1);

        cache.get_or_create(&identity("other"), ready);
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
