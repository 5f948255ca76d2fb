//! Key Derivation Module
//!
//! Builds cache keys from a base key and a parameter bag.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// == Params ==
/// Named values disambiguating instances of one resource class.
///
/// Backed by a `BTreeMap`, so iteration is always name-sorted regardless of
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical text form: a JSON object with keys sorted at every depth.
    pub fn canonical(&self) -> String {
        // serde_json's Map is a BTreeMap without `preserve_order`, so nested
        // objects come out sorted too.
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// == Derive Key ==
/// Derives the full cache key for `base_key` and `params`.
///
/// Empty params yield the bare base key; otherwise the canonical params are
/// appended as `base:{...}`. Values are JSON-encoded, so `"1"` and `1` map to
/// different keys.
pub fn derive_key(base_key: &str, params: &Params) -> String {
    if params.is_empty() {
        base_key.to_string()
    } else {
        format!("{}:{}", base_key, params.canonical())
    }
}
