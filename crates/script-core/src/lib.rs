//! # script-core
//!
//! Loading and caching of externally hosted SDK scripts.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        ScriptProvider                            │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐    │
//! │  │ LoadOptions  │  │ ScriptCache  │  │    ScriptLoader      │    │
//! │  │  → Identity  │──│ (one load    │──│  ┌────────────────┐  │    │
//! │  └──────────────┘  │ per identity)│  │  │  ScriptHost    │  │    │
//! │                    └──────────────┘  │  │  (Strategy)    │  │    │
//! │  LoadStatus: Pending → Resolved      │  └────────────────┘  │    │
//! │                     ↘ Rejected       └──────────────────────┘    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `ScriptHost` trait is the document the script is injected into. Use
//! `MemoryScriptHost` in tests, or the HTTP host from `script-runtime`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use script_core::{Action, LoadOptions, LoaderConfig, MemoryScriptHost, ScriptLoader, ScriptProvider};
//!
//! // one loader per document; its cache is shared by every provider built on it
//! let loader = Arc::new(ScriptLoader::new(Arc::new(MemoryScriptHost::new()), LoaderConfig::default()));
//! let options = LoadOptions::new().with("clientId", "test").with("currency", "USD");
//! let provider = ScriptProvider::new(options, loader.clone())?;
//!
//! if provider.settled().await.is_resolved {
//!     provider.mount("Buttons", &serde_json::json!({}), "#paypal-buttons").await?;
//! }
//!
//! // Different identity: back to pending and a fresh load
//! provider.dispatch(Action::ResetOptions(
//!     LoadOptions::new().with("clientId", "test").with("currency", "EUR"),
//! ))?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod host;
pub mod loader;
pub mod locator;
pub mod options;
pub mod provider;
pub mod sdk;
pub mod status;

pub use cache::{LoadEntry, LoadOutcome, Marker, ScriptCache};
pub use config::LoaderConfig;
pub use error::{InvalidOptionError, Result, ScriptError, ScriptLoadError, UsageError};
pub use host::{MemoryScriptHost, ScriptHost};
pub use loader::{ScriptLoader, parse_sdk_error};
pub use locator::{ScriptElement, ScriptRequest};
pub use options::{LoadOptions, OptionIdentity, OptionValue};
pub use provider::{Action, ScriptProvider, StatusSubscription, use_script_reducer};
pub use sdk::{ComponentFactory, SdkComponent, SdkHandle, SdkNamespace, StaticNamespace};
pub use status::{LoadStatus, ScriptStatus};
