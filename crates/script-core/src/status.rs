//! Load Status
//!
//! The state a provider exposes to its consumers. Every load carries the
//! generation it was started under; settlements from any other generation
//! are discarded.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::LoadOutcome;
use crate::error::ScriptLoadError;
use crate::options::{LoadOptions, OptionIdentity};
use crate::sdk::SdkHandle;

/// Loading status of the SDK script
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    /// Deferred; nothing requested yet
    Initial,
    Pending,
    Resolved,
    Rejected,
}

impl LoadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStatus::Initial => "initial",
            LoadStatus::Pending => "pending",
            LoadStatus::Resolved => "resolved",
            LoadStatus::Rejected => "rejected",
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, LoadStatus::Resolved | LoadStatus::Rejected)
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consumer-facing snapshot
#[derive(Clone, Debug, Serialize)]
pub struct ScriptStatus {
    pub options: LoadOptions,
    pub load_status: LoadStatus,
    pub is_initial: bool,
    pub is_pending: bool,
    pub is_resolved: bool,
    pub is_rejected: bool,
    /// Failure message while rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Provider-owned state
#[derive(Clone, Debug)]
pub(crate) struct ScriptState {
    pub options: LoadOptions,
    pub identity: OptionIdentity,
    pub status: LoadStatus,
    pub generation: u64,
    pub sdk: Option<SdkHandle>,
    pub error: Option<ScriptLoadError>,
    pub updated_at: DateTime<Utc>,
}

impl ScriptState {
    pub fn new(options: LoadOptions, identity: OptionIdentity, deferred: bool) -> Self {
        Self {
            options,
            identity,
            status: if deferred { LoadStatus::Initial } else { LoadStatus::Pending },
            generation: if deferred { 0 } else { 1 },
            sdk: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn snapshot(&self) -> ScriptStatus {
        ScriptStatus {
            options: self.options.clone(),
            load_status: self.status,
            is_initial: self.status == LoadStatus::Initial,
            is_pending: self.status == LoadStatus::Pending,
            is_resolved: self.status == LoadStatus::Resolved,
            is_rejected: self.status == LoadStatus::Rejected,
            error: self.error.as_ref().map(ToString::to_string),
        }
    }

    /// Start a new generation for `options`; returns its number
    pub fn reset(&mut self, options: LoadOptions, identity: OptionIdentity) -> u64 {
        self.options = options;
        self.identity = identity;
        self.status = LoadStatus::Pending;
        self.generation += 1;
        self.sdk = None;
        self.error = None;
        self.updated_at = Utc::now();
        self.generation
    }

    /// Apply a settlement; false if it belongs to a superseded load
    pub fn settle(&mut self, generation: u64, outcome: LoadOutcome) -> bool {
        if generation != self.generation || self.status != LoadStatus::Pending {
            return false;
        }

        match outcome {
            Ok(sdk) => {
                self.status = LoadStatus::Resolved;
                self.sdk = Some(sdk);
            }
            Err(err) => {
                self.status = LoadStatus::Rejected;
                self.error = Some(err);
            }
        }
        self.updated_at = Utc::now();
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::Marker;
    use crate::sdk::StaticNamespace;

    fn state(currency: &str) -> ScriptState {
        let options = LoadOptions::new().with("client-id", "abc").with("currency", currency);
        let identity = OptionIdentity::derive(&options, "client-id").unwrap();
        ScriptState::new(options, identity, false)
    }

    fn handle() -> SdkHandle {
        SdkHandle::new("paypal", Marker::new(), Arc::new(StaticNamespace::new()))
    }

    #[test]
    fn test_initial_snapshot_is_pending() {
        let status = state("USD").snapshot();
        assert!(status.is_pending);
        assert!(!status.is_resolved && !status.is_rejected && !status.is_initial);
    }

    #[test]
    fn test_settle_transitions() {
        let mut ok = state("USD");
        assert!(ok.settle(1, Ok(handle())));
        assert_eq!(ok.status, LoadStatus::Resolved);
        // settled states do not move on a second settlement
        assert!(!ok.settle(1, Err(ScriptLoadError::Failed("u".into()))));
        assert_eq!(ok.status, LoadStatus::Resolved);

        let mut failed = state("USD");
        assert!(failed.settle(1, Err(ScriptLoadError::Sdk("bad".into()))));
        let status = failed.snapshot();
        assert!(status.is_rejected);
        assert_eq!(status.error.as_deref(), Some("bad"));
    }

    #[test]
    fn test_superseded_generation_ignored() {
        let mut s = state("USD");
        let eur = state("EUR");
        let generation = s.reset(eur.options.clone(), eur.identity.clone());
        assert_eq!(generation, 2);

        assert!(!s.settle(1, Ok(handle())));
        assert_eq!(s.status, LoadStatus::Pending);
        assert!(s.settle(2, Err(ScriptLoadError::Failed("u".into()))));
        assert_eq!(s.status, LoadStatus::Rejected);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&LoadStatus::Resolved).unwrap(), "\"resolved\"");
    }
}
