//! Description of one connector query.

use std::collections::BTreeMap;

use crate::cache::cache_key;
use crate::resilience::circuit_breaker::DEFAULT_METHOD;

/// A query against one upstream source.
///
/// Parameters feed the cache key; the method only labels metric records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest {
    source: String,
    method: String,
    params: BTreeMap<String, String>,
}

impl SourceRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            method: DEFAULT_METHOD.to_string(),
            params: BTreeMap::new(),
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn method_name(&self) -> &str {
        &self.method
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn cache_key(&self) -> String {
        cache_key(&self.source, &self.params)
    }
}
