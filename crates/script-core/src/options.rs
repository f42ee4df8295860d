//! Load Options and Identity
//!
//! `LoadOptions` is the caller-facing description of which SDK variant to
//! load. `OptionIdentity` is its canonical form, used as the cache key and to
//! decide whether a reset actually changes anything.

use std::fmt;

use heck::ToKebabCase;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use url::form_urlencoded;

use crate::error::InvalidOptionError;

/// A single option value
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OptionValue {
    Text(String),
    Bool(bool),
    Number(serde_json::Number),
    /// Serialized comma-joined (`merchant-id`, `components`, ...)
    List(Vec<String>),
}

impl OptionValue {
    /// String form used in both the identity and the script locator
    pub fn as_param(&self) -> String {
        match self {
            OptionValue::Text(s) => s.clone(),
            OptionValue::Bool(b) => b.to_string(),
            OptionValue::Number(n) => n.to_string(),
            OptionValue::List(items) => items.join(","),
        }
    }

    /// Empty values are treated as if the key were omitted
    pub fn is_empty(&self) -> bool {
        match self {
            OptionValue::Text(s) => s.is_empty(),
            OptionValue::List(items) => items.is_empty(),
            OptionValue::Bool(_) | OptionValue::Number(_) => false,
        }
    }

    fn from_json(key: &str, value: &serde_json::Value) -> Result<Option<Self>, InvalidOptionError> {
        use serde_json::Value;

        let unsupported = |kind: &str| InvalidOptionError::UnsupportedValue {
            key: key.to_string(),
            kind: kind.to_string(),
        };

        match value {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(OptionValue::Bool(*b))),
            Value::Number(n) => Ok(Some(OptionValue::Number(n.clone()))),
            Value::String(s) => Ok(Some(OptionValue::Text(s.clone()))),
            Value::Array(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => list.push(s.clone()),
                        Value::Number(n) => list.push(n.to_string()),
                        Value::Bool(b) => list.push(b.to_string()),
                        Value::Null => {}
                        _ => return Err(unsupported("nested collection")),
                    }
                }
                Ok(Some(OptionValue::from(list)))
            }
            Value::Object(_) => Err(unsupported("object")),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            OptionValue::Text(s) => serde_json::Value::String(s.clone()),
            OptionValue::Bool(b) => serde_json::Value::Bool(*b),
            OptionValue::Number(n) => serde_json::Value::Number(n.clone()),
            OptionValue::List(items) => serde_json::Value::from(items.clone()),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Text(s.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(s: String) -> Self {
        OptionValue::Text(s)
    }
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        OptionValue::Bool(b)
    }
}

impl From<i64> for OptionValue {
    fn from(n: i64) -> Self {
        OptionValue::Number(n.into())
    }
}

impl From<u64> for OptionValue {
    fn from(n: u64) -> Self {
        OptionValue::Number(n.into())
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(items: Vec<String>) -> Self {
        OptionValue::List(items.into_iter().filter(|s| !s.is_empty()).collect())
    }
}

impl From<Vec<&str>> for OptionValue {
    fn from(items: Vec<&str>) -> Self {
        items.into_iter().map(str::to_string).collect::<Vec<_>>().into()
    }
}

/// Ordered option mapping
///
/// Keys are case-sensitive. Lower camelCase keys are normalized to
/// kebab-case on insertion (`clientId` becomes `client-id`). Empty values remove the key, so `{currency: ""}` and `{}`
/// are the same option set. Equality ignores insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadOptions {
    entries: IndexMap<String, OptionValue>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl Into<OptionValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a value; an empty value removes the key
    pub fn insert(&mut self, key: &str, value: impl Into<OptionValue>) {
        let key = normalize_key(key);
        let value = value.into();
        if value.is_empty() {
            self.entries.shift_remove(&key);
        } else {
            self.entries.insert(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<OptionValue> {
        self.entries.shift_remove(&normalize_key(key))
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.entries.get(&normalize_key(key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build from a JSON object, rejecting nested objects
    pub fn from_json(value: &serde_json::Value) -> Result<Self, InvalidOptionError> {
        let object = value.as_object().ok_or_else(|| InvalidOptionError::UnsupportedValue {
            key: "<root>".into(),
            kind: "options must be a JSON object".into(),
        })?;

        let mut options = Self::new();
        for (key, raw) in object {
            if let Some(value) = OptionValue::from_json(key, raw)? {
                options.insert(key, value);
            }
        }
        Ok(options)
    }
}

impl Serialize for LoadOptions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let map: IndexMap<&str, serde_json::Value> =
            self.entries.iter().map(|(k, v)| (k.as_str(), v.to_json())).collect();
        map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for LoadOptions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = IndexMap::<String, serde_json::Value>::deserialize(deserializer)?;
        let mut options = Self::new();
        for (key, value) in &raw {
            if let Some(value) = OptionValue::from_json(key, value).map_err(serde::de::Error::custom)? {
                options.insert(key, value);
            }
        }
        Ok(options)
    }
}

/// Canonical identity of a `LoadOptions` set
///
/// Keys are sorted and each `key=value` component is form-encoded, so two
/// option sets share an identity exactly when they hold the same pairs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OptionIdentity {
    canonical: String,
    digest: String,
}

impl OptionIdentity {
    /// Derive the identity, requiring `identity_key` to be present
    pub fn derive(options: &LoadOptions, identity_key: &str) -> Result<Self, InvalidOptionError> {
        let identity_key = normalize_key(identity_key);
        if !options.contains_key(&identity_key) {
            return Err(InvalidOptionError::Missing(identity_key));
        }

        let mut pairs: Vec<(&str, String)> =
            options.iter().map(|(k, v)| (k, v.as_param())).collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));

        let canonical = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let digest = hex::encode(Sha256::digest(canonical.as_bytes()));

        Ok(Self { canonical, digest })
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Hex SHA-256 of the canonical form
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Short digest prefix for log fields
    pub fn short(&self) -> &str {
        &self.digest[..12]
    }
}

impl fmt::Display for OptionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

fn encode(s: &str) -> String {
    form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

/// `clientId` → `client-id`, `dataCSPNonce` → `data-csp-nonce`
///
/// Only lower camelCase keys are converted. Any other spelling is kept as
/// given, so `Currency` and `currency` stay distinct keys.
pub fn normalize_key(key: &str) -> String {
    let camel = key.starts_with(|c: char| c.is_ascii_lowercase()) && key.chars().any(|c| c.is_ascii_uppercase());
    if camel { key.to_kebab_case() } else { key.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_normalization() {
        assert_eq!(normalize_key("clientId"), "client-id");
        assert_eq!(normalize_key("client-id"), "client-id");
        assert_eq!(normalize_key("dataCSPNonce"), "data-csp-nonce");
        assert_eq!(normalize_key("sdkBaseURL"), "sdk-base-url");
        assert_eq!(normalize_key("currency"), "currency");
        assert_eq!(normalize_key("Currency"), "Currency");
        assert_eq!(normalize_key("client_id"), "client_id");
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let lower = LoadOptions::new().with("client-id", "abc").with("currency", "USD");
        let upper = LoadOptions::new().with("client-id", "abc").with("Currency", "USD");

        assert_ne!(lower, upper);
        assert!(!upper.contains_key("currency"));
        assert_ne!(
            OptionIdentity::derive(&lower, "client-id").unwrap(),
            OptionIdentity::derive(&upper, "client-id").unwrap()
        );
    }

    #[test]
    fn test_camel_and_kebab_spellings_are_one_key() {
        let options = LoadOptions::new().with("clientId", "a").with("client-id", "b");
        assert_eq!(options.len(), 1);
        assert_eq!(options.get("clientId"), Some(&OptionValue::Text("b".into())));
    }

    #[test]
    fn test_identity_ignores_insertion_order() {
        let a = LoadOptions::new()
            .with("client-id", "abc")
            .with("currency", "USD")
            .with("components", vec!["buttons", "marks"]);
        let b = LoadOptions::new()
            .with("components", vec!["buttons", "marks"])
            .with("currency", "USD")
            .with("clientId", "abc");

        let ia = OptionIdentity::derive(&a, "client-id").unwrap();
        let ib = OptionIdentity::derive(&b, "client-id").unwrap();
        assert_eq!(ia, ib);
        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_differs_on_any_pair() {
        let usd = LoadOptions::new().with("client-id", "abc").with("currency", "USD");
        let eur = LoadOptions::new().with("client-id", "abc").with("currency", "EUR");
        let extra = usd.clone().with("debug", true);

        let i_usd = OptionIdentity::derive(&usd, "client-id").unwrap();
        assert_ne!(i_usd, OptionIdentity::derive(&eur, "client-id").unwrap());
        assert_ne!(i_usd, OptionIdentity::derive(&extra, "client-id").unwrap());
    }

    #[test]
    fn test_empty_values_equal_omitted() {
        let plain = LoadOptions::new().with("client-id", "abc");
        let with_empty = LoadOptions::new()
            .with("client-id", "abc")
            .with("currency", "")
            .with("components", Vec::<String>::new());

        assert_eq!(
            OptionIdentity::derive(&plain, "client-id").unwrap(),
            OptionIdentity::derive(&with_empty, "client-id").unwrap()
        );
    }

    #[test]
    fn test_separators_do_not_collide() {
        let a = LoadOptions::new().with("client-id", "a&b=c");
        let b = LoadOptions::new().with("client-id", "a").with("b", "c");
        let ia = OptionIdentity::derive(&a, "client-id").unwrap();
        assert_eq!(ia.canonical(), "client-id=a%26b%3Dc");
        assert_eq!(ia.digest().len(), 64);
        assert!(ia.digest().starts_with(ia.short()));
        assert_ne!(
            OptionIdentity::derive(&a, "client-id").unwrap(),
            OptionIdentity::derive(&b, "client-id").unwrap()
        );
    }

    #[test]
    fn test_missing_identity_key() {
        let options = LoadOptions::new().with("currency", "USD").with("client-id", "");
        assert_eq!(
            OptionIdentity::derive(&options, "clientId"),
            Err(InvalidOptionError::Missing("client-id".into()))
        );
    }

    #[test]
    fn test_json_round_trip_and_rejection() {
        let json = serde_json::json!({
            "clientId": "abc",
            "currency": "USD",
            "vault": true,
            "integration-date": null,
            "merchantId": ["M1", "M2"]
        });
        let options: LoadOptions = serde_json::from_value(json).unwrap();
        assert_eq!(options.len(), 4);
        assert_eq!(options.get("merchant-id").unwrap().as_param(), "M1,M2");
        assert_eq!(options.get("vault").unwrap().as_param(), "true");
        assert!(!options.contains_key("integration-date"));

        let nested = serde_json::json!({ "client-id": "abc", "style": { "color": "gold" } });
        let err = LoadOptions::from_json(&nested).unwrap_err();
        assert!(matches!(err, InvalidOptionError::UnsupportedValue { ref key, .. } if key == "style"));
        assert!(serde_json::from_value::<LoadOptions>(nested).is_err());
    }
}
