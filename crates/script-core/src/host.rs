//! Document Host
//!
//! The injection point shared by every load: the list of script elements in
//! the document head and the namespace globals those scripts populate. Only
//! the loader mutates it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::cache::Marker;
use crate::error::ScriptLoadError;
use crate::locator::ScriptElement;
use crate::sdk::{RecordingFactory, SdkNamespace, StaticNamespace};

/// Document operations the loader needs
#[async_trait]
pub trait ScriptHost: Send + Sync {
    /// Script elements in document order
    fn scripts(&self) -> Vec<ScriptElement>;

    /// Insert at the top of the head and wait for its load or error event
    async fn insert_script(&self, element: ScriptElement) -> Result<(), ScriptLoadError>;

    /// Remove the element carrying `marker`
    fn remove_script(&self, marker: Marker) -> bool;

    /// Namespace global, if a script populated it
    fn namespace(&self, name: &str) -> Option<Arc<dyn SdkNamespace>>;

    /// Marker of the script that populated the namespace global
    fn namespace_owner(&self, name: &str) -> Option<Marker>;

    fn clear_namespace(&self, name: &str);
}

type NamespaceFactory = Arc<dyn Fn(&ScriptElement) -> Arc<dyn SdkNamespace> + Send + Sync>;
type Global = (Marker, Arc<dyn SdkNamespace>);
type Pending = (String, oneshot::Sender<Result<(), ScriptLoadError>>);

/// How inserted scripts settle
#[derive(Clone, Debug)]
enum Completion {
    /// Settle immediately with this outcome
    Auto(Result<(), ScriptLoadError>),
    /// Wait for `MemoryScriptHost::complete`
    Manual,
}

/// In-memory document (for development/testing)
///
/// A successful load populates the script's namespace, but only while the
/// element is still attached.
pub struct MemoryScriptHost {
    scripts: Mutex<Vec<ScriptElement>>,
    namespaces: Mutex<HashMap<String, Global>>,
    pending: Mutex<Vec<Pending>>,
    completion: Mutex<Completion>,
    namespace_factory: Mutex<Option<NamespaceFactory>>,
    inserts: AtomicUsize,
}

impl Default for MemoryScriptHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryScriptHost {
    /// Host whose scripts load successfully right away
    pub fn new() -> Self {
        let factory: NamespaceFactory = Arc::new(|_: &ScriptElement| {
            Arc::new(
                StaticNamespace::new()
                    .with_factory("Buttons", Arc::new(RecordingFactory::new("Buttons")))
                    .with_factory("Marks", Arc::new(RecordingFactory::new("Marks")))
                    .with_factory("Messages", Arc::new(RecordingFactory::new("Messages"))),
            ) as Arc<dyn SdkNamespace>
        });

        Self {
            scripts: Mutex::new(Vec::new()),
            namespaces: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
            completion: Mutex::new(Completion::Auto(Ok(()))),
            namespace_factory: Mutex::new(Some(factory)),
            inserts: AtomicUsize::new(0),
        }
    }

    /// Host whose scripts stay pending until completed by hand
    pub fn manual() -> Self {
        let host = Self::new();
        *lock(&host.completion) = Completion::Manual;
        host
    }

    /// Make subsequent inserts fail with `err`
    pub fn fail_with(&self, err: ScriptLoadError) {
        *lock(&self.completion) = Completion::Auto(Err(err));
    }

    /// Make subsequent inserts succeed immediately
    pub fn succeed(&self) {
        *lock(&self.completion) = Completion::Auto(Ok(()));
    }

    /// Scripts load but never define their namespace
    pub fn without_namespace(self) -> Self {
        *lock(&self.namespace_factory) = None;
        self
    }

    /// Namespace built for each successful script
    pub fn with_namespace<F>(self, factory: F) -> Self
    where
        F: Fn(&ScriptElement) -> Arc<dyn SdkNamespace> + Send + Sync + 'static,
    {
        *lock(&self.namespace_factory) = Some(Arc::new(factory));
        self
    }

    /// Define a namespace global as if the script tagged `owner` had run
    pub fn install_namespace(&self, name: impl Into<String>, owner: Marker, namespace: Arc<dyn SdkNamespace>) {
        lock(&self.namespaces).insert(name.into(), (owner, namespace));
    }

    /// Attach an element without loading it (pre-existing markup)
    pub fn attach(&self, element: ScriptElement) {
        lock(&self.scripts).insert(0, element);
    }

    /// Settle the oldest pending script whose src contains `src_fragment`
    pub fn complete(&self, src_fragment: &str, outcome: Result<(), ScriptLoadError>) -> bool {
        let sender = {
            let mut pending = lock(&self.pending);
            match pending.iter().position(|(src, _)| src.contains(src_fragment)) {
                Some(idx) => pending.remove(idx).1,
                None => return false,
            }
        };
        sender.send(outcome).is_ok()
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Total number of script insertions
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    fn is_attached(&self, marker: Marker) -> bool {
        lock(&self.scripts).iter().any(|s| s.marker == marker)
    }
}

#[async_trait]
impl ScriptHost for MemoryScriptHost {
    fn scripts(&self) -> Vec<ScriptElement> {
        lock(&self.scripts).clone()
    }

    async fn insert_script(&self, element: ScriptElement) -> Result<(), ScriptLoadError> {
        lock(&self.scripts).insert(0, element.clone());
        self.inserts.fetch_add(1, Ordering::SeqCst);

        let completion = lock(&self.completion).clone();
        let outcome = match completion {
            Completion::Auto(outcome) => outcome,
            Completion::Manual => {
                let (tx, rx) = oneshot::channel();
                lock(&self.pending).push((element.src.clone(), tx));
                rx.await
                    .unwrap_or_else(|_| Err(ScriptLoadError::Failed(element.src.clone())))
            }
        };
        outcome?;

        if self.is_attached(element.marker) {
            let factory = lock(&self.namespace_factory).clone();
            if let Some(factory) = factory {
                let namespace = factory(&element);
                lock(&self.namespaces).insert(element.namespace.clone(), (element.marker, namespace));
            }
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
    use super::*;
    use crate::config::LoaderConfig;
    use crate::locator::ScriptRequest;
    use crate::options::LoadOptions;

    fn element() -> ScriptElement {
        let options = LoadOptions::new().with("client-id", "abc");
        ScriptRequest::from_options(&options, &LoaderConfig::default())
            .unwrap()
            .element(Marker::new())
    }

    #[tokio::test]
    async fn test_auto_success_populates_namespace() {
        let host = MemoryScriptHost::new();
        host.insert_script(element()).await.unwrap();

        assert_eq!(host.insert_count(), 1);
        assert_eq!(host.scripts().len(), 1);
        let namespace = host.namespace("paypal").unwrap();
        assert_eq!(namespace.factory_names(), vec!["Buttons", "Marks", "Messages"]);
        assert_eq!(host.namespace_owner("paypal"), Some(host.scripts()[0].marker));
    }

    #[tokio::test]
    async fn test_manual_completion() {
        let host = Arc::new(MemoryScriptHost::manual());
        let task = {
            let host = host.clone();
            tokio::spawn(async move { host.insert_script(element()).await })
        };

        while host.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(host.complete("client-id=abc", Err(ScriptLoadError::Sdk("nope".into()))));
        assert_eq!(task.await.unwrap(), Err(ScriptLoadError::Sdk("nope".into())));
        assert!(host.namespace("paypal").is_none());
    }

    #[tokio::test]
    async fn test_detached_script_does_not_define_namespace() {
        let host = Arc::new(MemoryScriptHost::manual());
        let el = element();
        let marker = el.marker;
        let task = {
            let host = host.clone();
            tokio::spawn(async move { host.insert_script(el).await })
        };

        while host.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(host.remove_script(marker));
        host.complete("client-id=abc", Ok(()));
        task.await.unwrap().unwrap();
        assert!(host.namespace("paypal").is_none());
    }
}
