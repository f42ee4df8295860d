//! # script-runtime
//!
//! Document hosts for running the script loader outside a browser.
//!
//! ## Hosts
//!
//! - **HTTP** (default): fetches each script with `reqwest` and scans the
//!   body for the components it exports
//! - **Memory**: `script_core::MemoryScriptHost`, for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use script_runtime::HttpScriptHost;
//!
//! let host = Arc::new(HttpScriptHost::from_env()?);
//! let loader = Arc::new(ScriptLoader::new(host, LoaderConfig::from_env()?));
//! let provider = ScriptProvider::new(options, loader)?;
//! let status = provider.settled().await;
//! ```

pub mod evaluate;

#[cfg(feature = "http")]
pub mod http;

pub use evaluate::{ExportScanner, HeadlessNamespace, KNOWN_COMPONENTS, ScriptEvaluator};

#[cfg(feature = "http")]
pub use http::{HttpHostConfig, HttpScriptHost};

// Re-export core types for convenience
pub use script_core::{
    Action, LoadOptions, LoadStatus, LoaderConfig, Result, ScriptError, ScriptHost, ScriptLoader, ScriptProvider,
    ScriptStatus,
};
