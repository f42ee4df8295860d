//! SDK Capability Interface
//!
//! The loaded SDK is reached through its namespace global. It is modelled as
//! a set of named component factories (`Buttons`, `Marks`, `Messages`, ...)
//! whose presence is checked before use.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::cache::Marker;
use crate::error::{Result, UsageError};

/// A rendered or renderable SDK component
#[async_trait]
pub trait SdkComponent: Send + Sync {
    /// Render into the container selector
    async fn render(&self, container: &str) -> Result<()>;

    /// Tear the component down
    async fn close(&self) -> Result<()>;

    /// Whether the component can be shown for the current options
    fn is_eligible(&self) -> bool;
}

/// Factory exposed on the namespace global (`paypal.Buttons`, ...)
pub trait ComponentFactory: Send + Sync {
    fn create(&self, props: &serde_json::Value) -> Result<Box<dyn SdkComponent>>;
}

/// The namespace global populated by the SDK script
pub trait SdkNamespace: Send + Sync {
    fn factory(&self, name: &str) -> Option<Arc<dyn ComponentFactory>>;

    fn factory_names(&self) -> Vec<String>;
}

/// Handle to a resolved SDK namespace
#[derive(Clone)]
pub struct SdkHandle {
    namespace: String,
    marker: Marker,
    inner: Arc<dyn SdkNamespace>,
}

impl SdkHandle {
    pub fn new(namespace: impl Into<String>, marker: Marker, inner: Arc<dyn SdkNamespace>) -> Self {
        Self {
            namespace: namespace.into(),
            marker,
            inner,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Marker of the script that produced this namespace
    pub fn marker(&self) -> Marker {
        self.marker
    }

    pub fn inner(&self) -> &Arc<dyn SdkNamespace> {
        &self.inner
    }

    pub fn has_component(&self, name: &str) -> bool {
        self.inner.factory(name).is_some()
    }

    /// Look up a factory, failing if the namespace does not offer it
    pub fn component(&self, name: &str) -> std::result::Result<Arc<dyn ComponentFactory>, UsageError> {
        self.inner.factory(name).ok_or_else(|| UsageError::MissingCapability {
            namespace: self.namespace.clone(),
            name: name.to_string(),
        })
    }

    pub fn create(&self, name: &str, props: &serde_json::Value) -> Result<Box<dyn SdkComponent>> {
        self.component(name)?.create(props)
    }
}

impl fmt::Debug for SdkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkHandle")
            .field("namespace", &self.namespace)
            .field("marker", &self.marker)
            .field("factories", &self.inner.factory_names())
            .finish()
    }
}

/// Namespace with a fixed set of factories (for development/testing)
#[derive(Default)]
pub struct StaticNamespace {
    factories: BTreeMap<String, Arc<dyn ComponentFactory>>,
}

impl StaticNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_factory(mut self, name: impl Into<String>, factory: Arc<dyn ComponentFactory>) -> Self {
        self.factories.insert(name.into(), factory);
        self
    }
}

impl SdkNamespace for StaticNamespace {
    fn factory(&self, name: &str) -> Option<Arc<dyn ComponentFactory>> {
        self.factories.get(name).cloned()
    }

    fn factory_names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

/// Factory whose components record every call
#[derive(Clone)]
pub struct RecordingFactory {
    name: String,
    eligible: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingFactory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            eligible: true,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn ineligible(mut self) -> Self {
        self.eligible = false;
        self
    }

    /// Calls seen so far, e.g. `"Buttons.render(#container)"`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl ComponentFactory for RecordingFactory {
    fn create(&self, _props: &serde_json::Value) -> Result<Box<dyn SdkComponent>> {
        Ok(Box::new(RecordingComponent {
            factory: self.clone(),
        }))
    }
}

struct RecordingComponent {
    factory: RecordingFactory,
}

impl RecordingComponent {
    fn record(&self, call: String) {
        self.factory
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

#[async_trait]
impl SdkComponent for RecordingComponent {
    async fn render(&self, container: &str) -> Result<()> {
        self.record(format!("{}.render({})", self.factory.name, container));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(format!("{}.close()", self.factory.name));
        Ok(())
    }

    fn is_eligible(&self) -> bool {
        self.factory.eligible
    }
}
