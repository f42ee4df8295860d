//! Script Evaluation
//!
//! Outside a browser nothing executes the fetched SDK. An evaluator stands
//! in for that step and decides which namespace a script body defines.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use script_core::{
    ComponentFactory, Result, ScriptElement, ScriptError, ScriptLoadError, SdkComponent, SdkNamespace,
};

/// Component factories the SDK is known to export
pub const KNOWN_COMPONENTS: &[&str] = &[
    "Buttons",
    "Marks",
    "Messages",
    "HostedFields",
    "CardFields",
    "PaymentFields",
];

/// Turns a fetched script body into the namespace it defines
pub trait ScriptEvaluator: Send + Sync {
    fn evaluate(&self, element: &ScriptElement, body: &str) -> std::result::Result<Arc<dyn SdkNamespace>, ScriptLoadError>;
}

/// Evaluator that looks for exported component names in the body
pub struct ExportScanner {
    known: Vec<String>,
}

impl Default for ExportScanner {
    fn default() -> Self {
        Self::new(KNOWN_COMPONENTS.iter().map(|s| s.to_string()).collect())
    }
}

impl ExportScanner {
    pub fn new(known: Vec<String>) -> Self {
        Self { known }
    }
}

impl ScriptEvaluator for ExportScanner {
    fn evaluate(&self, element: &ScriptElement, body: &str) -> std::result::Result<Arc<dyn SdkNamespace>, ScriptLoadError> {
        if body.trim().is_empty() {
            return Err(ScriptLoadError::Failed(element.src.clone()));
        }

        let exports: BTreeSet<String> = self
            .known
            .iter()
            .filter(|name| body.contains(name.as_str()))
            .cloned()
            .collect();

        tracing::debug!(namespace = %element.namespace, exports = ?exports, "Scanned SDK exports");
        Ok(Arc::new(HeadlessNamespace { exports }))
    }
}

/// Namespace whose components exist but cannot draw anything
pub struct HeadlessNamespace {
    exports: BTreeSet<String>,
}

impl SdkNamespace for HeadlessNamespace {
    fn factory(&self, name: &str) -> Option<Arc<dyn ComponentFactory>> {
        self.exports.contains(name).then(|| {
            Arc::new(HeadlessFactory {
                name: name.to_string(),
            }) as Arc<dyn ComponentFactory>
        })
    }

    fn factory_names(&self) -> Vec<String> {
        self.exports.iter().cloned().collect()
    }
}

struct HeadlessFactory {
    name: String,
}

impl ComponentFactory for HeadlessFactory {
    fn create(&self, _props: &serde_json::Value) -> Result<Box<dyn SdkComponent>> {
        Ok(Box::new(HeadlessComponent {
            name: self.name.clone(),
        }))
    }
}

struct HeadlessComponent {
    name: String,
}

#[async_trait]
impl SdkComponent for HeadlessComponent {
    async fn render(&self, container: &str) -> Result<()> {
        Err(ScriptError::Component(format!(
            "{} cannot render into {} without a browser",
            self.name, container
        )))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn is_eligible(&self) -> bool {
        true
    }
}
