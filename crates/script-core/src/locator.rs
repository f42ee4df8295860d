//! Script Locator
//!
//! Turns `LoadOptions` into the script `src` URL plus the element attributes
//! the SDK reads at boot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::Marker;
use crate::config::LoaderConfig;
use crate::error::InvalidOptionError;
use crate::options::LoadOptions;

/// Query parameters the SDK documents
pub const QUERY_PARAMS: &[&str] = &[
    "client-id",
    "merchant-id",
    "currency",
    "intent",
    "commit",
    "vault",
    "components",
    "disable-funding",
    "enable-funding",
    "disable-card",
    "integration-date",
    "debug",
    "buyer-country",
    "locale",
];

/// Options emitted as `<script>` attributes instead of query parameters
pub const DATA_ATTRIBUTES: &[&str] = &[
    "data-csp-nonce",
    "data-client-token",
    "data-user-id-token",
    "data-page-type",
    "data-partner-attribution-id",
    "data-namespace",
    "data-merchant-id",
    "data-sdk-integration-source",
    "data-client-metadata-id",
];

/// Option that overrides the base URL; never part of the query string
pub const SDK_BASE_URL_OPTION: &str = "sdk-base-url";

/// What to insert: URL, boot attributes and the namespace global it creates
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRequest {
    pub url: String,
    pub namespace: String,
    pub attributes: BTreeMap<String, String>,
}

impl ScriptRequest {
    /// Build the request for an option set
    pub fn from_options(options: &LoadOptions, config: &LoaderConfig) -> Result<Self, InvalidOptionError> {
        let base = options
            .get(SDK_BASE_URL_OPTION)
            .map(|v| v.as_param())
            .unwrap_or_else(|| config.sdk_base_url.clone());

        let mut url = Url::parse(&base).map_err(|e| InvalidOptionError::BaseUrl {
            url: base.clone(),
            reason: e.to_string(),
        })?;

        let mut attributes = BTreeMap::new();
        let mut query: Vec<(&str, String)> = Vec::new();

        for (key, value) in options.iter() {
            if key == SDK_BASE_URL_OPTION {
                continue;
            }
            let value = value.as_param();

            if DATA_ATTRIBUTES.contains(&key) {
                attributes.insert(key.to_string(), value);
                continue;
            }

            if key == "merchant-id" && value.contains(',') {
                attributes.insert("data-merchant-id".to_string(), value);
                query.push((key, "*".to_string()));
                continue;
            }

            if !QUERY_PARAMS.contains(&key) {
                if key.starts_with("data-") {
                    tracing::warn!(option = %key, "Unrecognized data attribute passed as query parameter");
                } else {
                    tracing::debug!(option = %key, "Passing through unrecognized option");
                }
            }
            query.push((key, value));
        }

        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &query {
                pairs.append_pair(key, value);
            }
        }

        let namespace = attributes
            .get("data-namespace")
            .cloned()
            .unwrap_or_else(|| config.default_namespace.clone());

        Ok(Self {
            url: url.to_string(),
            namespace,
            attributes,
        })
    }

    /// Element to insert for this request, tagged with `marker`
    pub fn element(&self, marker: Marker) -> ScriptElement {
        ScriptElement {
            src: self.url.clone(),
            namespace: self.namespace.clone(),
            attributes: self.attributes.clone(),
            marker,
        }
    }
}

/// A script element as held by the document host
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptElement {
    pub src: String,
    pub namespace: String,
    /// Boot attributes, marker excluded
    pub attributes: BTreeMap<String, String>,
    pub marker: Marker,
}

impl ScriptElement {
    /// Same resource as `request`, ignoring which load produced it
    pub fn matches(&self, request: &ScriptRequest) -> bool {
        self.src == request.url && self.attributes == request.attributes
    }

    /// All attributes as they appear on the element
    pub fn rendered_attributes(&self, marker_attribute: &str) -> BTreeMap<String, String> {
        let mut attributes = self.attributes.clone();
        attributes.insert("src".into(), self.src.clone());
        attributes.insert(marker_attribute.to_string(), self.marker.to_string());
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(options: &LoadOptions) -> ScriptRequest {
        ScriptRequest::from_options(options, &LoaderConfig::default()).unwrap()
    }

    #[test]
    fn test_query_and_attributes_split() {
        let options = LoadOptions::new()
            .with("clientId", "abc")
            .with("currency", "EUR")
            .with("dataNamespace", "sdk")
            .with("data-csp-nonce", "n0nce");
        let req = request(&options);

        assert_eq!(req.url, "https://www.paypal.com/sdk/js?client-id=abc&currency=EUR");
        assert_eq!(req.namespace, "sdk");
        assert_eq!(req.attributes.get("data-namespace").map(String::as_str), Some("sdk"));
        assert_eq!(req.attributes.get("data-csp-nonce").map(String::as_str), Some("n0nce"));
    }

    #[test]
    fn test_unrecognized_options_pass_through() {
        let options = LoadOptions::new()
            .with("client-id", "abc")
            .with("future-flag", true)
            .with("data-custom", "x");
        let req = request(&options);

        assert!(req.url.contains("future-flag=true"));
        assert!(req.url.contains("data-custom=x"));
        assert!(req.attributes.is_empty());
        assert_eq!(req.namespace, "paypal");
    }

    #[test]
    fn test_multiple_merchant_ids() {
        let options = LoadOptions::new()
            .with("client-id", "abc")
            .with("merchantId", vec!["M1", "M2"]);
        let req = request(&options);

        assert!(req.url.contains("merchant-id=*"));
        assert_eq!(req.attributes.get("data-merchant-id").map(String::as_str), Some("M1,M2"));
    }

    #[test]
    fn test_base_url_override() {
        let options = LoadOptions::new()
            .with("client-id", "abc")
            .with("sdkBaseUrl", "http://localhost:8080/sdk/js");
        let req = request(&options);
        assert_eq!(req.url, "http://localhost:8080/sdk/js?client-id=abc");

        let bad = LoadOptions::new().with("client-id", "abc").with("sdk-base-url", "not a url");
        let err = ScriptRequest::from_options(&bad, &LoaderConfig::default()).unwrap_err();
        assert!(matches!(err, InvalidOptionError::BaseUrl { .. }));
    }

    #[test]
    fn test_element_matching_ignores_marker() {
        let req = request(&LoadOptions::new().with("client-id", "abc"));
        let a = req.element(Marker::new());
        let b = req.element(Marker::new());
        assert_ne!(a.marker, b.marker);
        assert!(a.matches(&req) && b.matches(&req));

        let rendered = a.rendered_attributes("data-sdk-script-id");
        assert_eq!(rendered.get("data-sdk-script-id"), Some(&a.marker.to_string()));
    }
}
