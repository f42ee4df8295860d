//! script-probe
//!
//! Loads the SDK script for the configured options over HTTP and reports
//! how the load settled. Exits non-zero when the SDK rejects the options.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use script_core::{LoadOptions, LoaderConfig, ScriptLoader, ScriptProvider};
use script_runtime::HttpScriptHost;

/// Options from `SDK_OPTIONS` (a JSON object) or the individual variables
fn load_options() -> anyhow::Result<LoadOptions> {
    if let Ok(raw) = std::env::var("SDK_OPTIONS") {
        let value: serde_json::Value = serde_json::from_str(&raw).context("SDK_OPTIONS is not valid JSON")?;
        return Ok(LoadOptions::from_json(&value)?);
    }

    let client_id = std::env::var("SDK_CLIENT_ID").context("Set SDK_OPTIONS or SDK_CLIENT_ID")?;
    let mut options = LoadOptions::new().with("client-id", client_id);
    if let Ok(currency) = std::env::var("SDK_CURRENCY") {
        options.insert("currency", currency);
    }
    Ok(options)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let options = load_options()?;
    let config = LoaderConfig::from_env()?;
    let host = Arc::new(HttpScriptHost::from_env()?);

    tracing::info!(base_url = %config.sdk_base_url, namespace = %config.default_namespace, "Probing SDK");

    let loader = Arc::new(ScriptLoader::new(host, config));
    let provider = ScriptProvider::new(options, loader)?;
    tracing::info!(identity = %provider.identity(), status = %provider.get_status().load_status, "Provider created");

    let mut subscription = provider.subscribe();
    tokio::spawn(async move {
        while let Some(status) = subscription.changed().await {
            tracing::info!(status = %status.load_status, "Status changed");
        }
    });

    let status = provider.settled().await;
    if let Some(error) = status.error {
        anyhow::bail!("SDK script rejected: {}", error);
    }

    let sdk = provider.sdk()?;
    tracing::info!(namespace = %sdk.namespace(), marker = %sdk.marker(), "✓ SDK loaded");
    for name in sdk.inner().factory_names() {
        tracing::info!("  • {}", name);
    }
    for script in provider.loader().host().scripts() {
        tracing::info!(src = %script.src, "Script in document");
    }

    Ok(())
}
