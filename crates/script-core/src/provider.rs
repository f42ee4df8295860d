//! Script Provider
//!
//! Owns the load status for one consumer tree. Consumers read snapshots,
//! subscribe to changes, and dispatch actions; the provider turns actions
//! into cache lookups and loads.
//!
//! ```text
//!   dispatch(ResetOptions) ──▶ identity ──▶ ScriptCache ──▶ ScriptLoader ──▶ ScriptHost
//!                                 │               │
//!                                 ▼               ▼ settled(generation)
//!                           no-op if equal   watch::Sender<ScriptState> ──▶ subscribers
//! ```

use std::future::Future;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use tokio::sync::watch;

use crate::cache::{LoadOutcome, ScriptCache};
use crate::error::{Result, ScriptLoadError, UsageError};
use crate::loader::ScriptLoader;
use crate::locator::ScriptRequest;
use crate::options::{LoadOptions, OptionIdentity};
use crate::sdk::{SdkComponent, SdkHandle};
use crate::status::{LoadStatus, ScriptState, ScriptStatus};

tokio::task_local! {
    static SCRIPT_CONTEXT: ScriptProvider;
}

/// Actions accepted by `ScriptProvider::dispatch`
#[derive(Clone, Debug)]
pub enum Action {
    /// Switch to a new option set; a no-op when the identity is unchanged
    ResetOptions(LoadOptions),

    /// Discard the current load and load the same options again
    Reload,
}

struct Inner {
    loader: Arc<ScriptLoader>,
    state: watch::Sender<ScriptState>,
}

impl Inner {
    fn settle(&self, generation: u64, outcome: LoadOutcome) {
        let applied = self.state.send_if_modified(|state| state.settle(generation, outcome));
        let state = self.state.borrow();

        if !applied {
            tracing::debug!(
                generation,
                current = state.generation,
                "Ignoring settlement from superseded load"
            );
            return;
        }

        match &state.error {
            None => tracing::info!(identity = %state.identity, generation, "SDK script resolved"),
            Some(err) => tracing::warn!(
                identity = %state.identity,
                generation,
                error = %err,
                "SDK script rejected"
            ),
        }
    }
}

/// Status state machine for one option set at a time
///
/// Cloning yields another handle to the same provider. Providers built on
/// the same `ScriptLoader` share its cache, so equal options load once per
/// document. Construction and dispatch spawn load tasks, so they must run
/// inside a Tokio runtime.
#[derive(Clone)]
pub struct ScriptProvider {
    inner: Arc<Inner>,
}

impl ScriptProvider {
    /// Provider for `options` on the document served by `loader`
    pub fn new(options: LoadOptions, loader: Arc<ScriptLoader>) -> Result<Self> {
        let config = loader.config();
        let identity = OptionIdentity::derive(&options, &config.identity_key)?;
        let request = ScriptRequest::from_options(&options, config)?;
        let deferred = config.defer_loading;

        let (state, _) = watch::channel(ScriptState::new(options, identity.clone(), deferred));
        let provider = Self {
            inner: Arc::new(Inner { loader, state }),
        };

        if deferred {
            tracing::debug!(identity = %identity, "Deferring SDK script load");
        } else {
            provider.start_load(1, identity, request);
        }

        Ok(provider)
    }

    /// Current status snapshot
    pub fn get_status(&self) -> ScriptStatus {
        self.inner.state.borrow().snapshot()
    }

    pub fn options(&self) -> LoadOptions {
        self.inner.state.borrow().options.clone()
    }

    pub fn identity(&self) -> OptionIdentity {
        self.inner.state.borrow().identity.clone()
    }

    /// Generation of the load currently reflected in the status
    pub fn generation(&self) -> u64 {
        self.inner.state.borrow().generation
    }

    /// Failure of the current load, if it was rejected
    pub fn error(&self) -> Option<ScriptLoadError> {
        self.inner.state.borrow().error.clone()
    }

    pub fn cache(&self) -> &Arc<ScriptCache> {
        self.inner.loader.cache()
    }

    pub fn loader(&self) -> &Arc<ScriptLoader> {
        &self.inner.loader
    }

    /// Apply an action; returns whether a load was started
    ///
    /// Invalid options fail before the status changes.
    pub fn dispatch(&self, action: Action) -> Result<bool> {
        match action {
            Action::ResetOptions(options) => self.reset_options(options),
            Action::Reload => self.reload(),
        }
    }

    fn reset_options(&self, options: LoadOptions) -> Result<bool> {
        let config = self.inner.loader.config();
        let identity = OptionIdentity::derive(&options, &config.identity_key)?;
        let request = ScriptRequest::from_options(&options, config)?;

        let mut started = None;
        self.inner.state.send_if_modified(|state| {
            if state.identity == identity && state.status != LoadStatus::Initial {
                return false;
            }
            let previous = state.identity.clone();
            let generation = state.reset(options, identity.clone());
            started = Some((generation, previous));
            true
        });

        let Some((generation, previous)) = started else {
            tracing::debug!(identity = %identity, "Options unchanged, skipping reload");
            return Ok(false);
        };

        if previous != identity {
            self.cache().invalidate(&previous);
        }
        tracing::info!(from = %previous, to = %identity, generation, "Resetting SDK options");

        self.start_load(generation, identity, request);
        Ok(true)
    }

    fn reload(&self) -> Result<bool> {
        let (options, identity) = {
            let state = self.inner.state.borrow();
            (state.options.clone(), state.identity.clone())
        };
        let request = ScriptRequest::from_options(&options, self.inner.loader.config())?;

        let mut generation = 0;
        self.inner.state.send_modify(|state| {
            generation = state.reset(options, identity.clone());
        });

        self.cache().invalidate(&identity);
        self.inner.loader.destroy(&request.namespace);
        tracing::info!(identity = %identity, generation, "Forcing SDK reload");

        self.start_load(generation, identity, request);
        Ok(true)
    }

    fn start_load(&self, generation: u64, identity: OptionIdentity, request: ScriptRequest) {
        let loader = Arc::clone(&self.inner.loader);
        let entry = self.cache().get_or_create(&identity, move |marker| {
            async move { loader.load(request, marker).await }.boxed()
        });

        tracing::debug!(identity = %identity, generation, marker = %entry.marker(), "Awaiting SDK script");

        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let outcome = entry.settled().await;
            if let Some(inner) = inner.upgrade() {
                inner.settle(generation, outcome);
            }
        });
    }

    /// Receive status changes until the subscription is dropped
    pub fn subscribe(&self) -> StatusSubscription {
        StatusSubscription {
            rx: self.inner.state.subscribe(),
        }
    }

    /// Wait until the current load resolves or rejects
    pub async fn settled(&self) -> ScriptStatus {
        let mut subscription = self.subscribe();
        match subscription.settled().await {
            Some(status) => status,
            None => self.get_status(),
        }
    }

    /// SDK handle, only while resolved
    pub fn sdk(&self) -> std::result::Result<SdkHandle, UsageError> {
        let state = self.inner.state.borrow();
        match &state.sdk {
            Some(sdk) if state.status == LoadStatus::Resolved => Ok(sdk.clone()),
            _ => Err(UsageError::NotResolved(state.status)),
        }
    }

    /// Wait for the SDK, then create and render `component` into `container`
    ///
    /// Returns `None` without rendering when the component is not eligible.
    pub async fn mount(
        &self,
        component: &str,
        props: &serde_json::Value,
        container: &str,
    ) -> Result<Option<Box<dyn SdkComponent>>> {
        self.settled().await;
        if let Some(err) = self.error() {
            return Err(err.into());
        }

        let instance = self.sdk()?.create(component, props)?;
        if !instance.is_eligible() {
            tracing::debug!(component, "Component not eligible, skipping render");
            return Ok(None);
        }

        instance.render(container).await?;
        Ok(Some(instance))
    }

    /// Run `fut` with this provider as the task's script context
    pub async fn scope<F: Future>(&self, fut: F) -> F::Output {
        SCRIPT_CONTEXT.scope(self.clone(), fut).await
    }
}

/// Provider of the enclosing `ScriptProvider::scope`
pub fn use_script_reducer() -> std::result::Result<ScriptProvider, UsageError> {
    SCRIPT_CONTEXT
        .try_with(ScriptProvider::clone)
        .map_err(|_| UsageError::OutsideProvider)
}

/// Consumer subscription; dropping it unsubscribes without cancelling loads
pub struct StatusSubscription {
    rx: watch::Receiver<ScriptState>,
}

impl StatusSubscription {
    pub fn current(&self) -> ScriptStatus {
        self.rx.borrow().snapshot()
    }

    /// Next status change, or `None` once the provider is gone
    pub async fn changed(&mut self) -> Option<ScriptStatus> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().snapshot())
    }

    /// First resolved or rejected status
    pub async fn settled(&mut self) -> Option<ScriptStatus> {
        self.rx
            .wait_for(|state| state.status.is_settled())
            .await
            .ok()
            .map(|state| state.snapshot())
    }
}
