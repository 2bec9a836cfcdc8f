//! Per-request invocation context
//!
//! A [`RequestDelegate`] is created for every inbound request and passed
//! explicitly to every RPC invocation made on its behalf. It carries the raw
//! transport request and a fresh transaction id.

use std::sync::Arc;

use http::{HeaderMap, Method};
use rand::seq::SliceRandom;
use serde_json::{json, Map, Value as JsonValue};
use uuid::Uuid;

use crate::config::{TransactionId, TxAlgorithm};

/// Transport-level request data, as handed over by the embedding server.
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    pub method: Method,
    pub path: String,
    /// Parameters extracted from the route pattern
    pub params: Map<String, JsonValue>,
    pub query: Map<String, JsonValue>,
    pub payload: JsonValue,
    /// Results of pre-handlers run by the server before this request
    pub pre: Map<String, JsonValue>,
    pub headers: HeaderMap,
}

impl RawRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_pre(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.pre.insert(key.into(), value.into());
        self
    }

    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload = payload;
        self
    }

    /// Variables visible to template-string action handlers
    pub fn template_vars(&self) -> JsonValue {
        json!({
            "params": self.params,
            "query": self.query,
            "payload": self.payload,
        })
    }

    /// Base context for compose handlers, before route-configured keys
    pub fn compose_vars(&self) -> Map<String, JsonValue> {
        let mut vars = Map::new();
        vars.insert("params".to_string(), JsonValue::Object(self.params.clone()));
        vars.insert("payload".to_string(), self.payload.clone());
        vars.insert("query".to_string(), JsonValue::Object(self.query.clone()));
        vars.insert("pre".to_string(), JsonValue::Object(self.pre.clone()));
        vars
    }

    /// JSON view of the request handed to RPC handlers
    pub fn to_value(&self) -> JsonValue {
        let headers: Map<String, JsonValue> = self
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), JsonValue::from(v)))
            })
            .collect();

        json!({
            "method": self.method.as_str(),
            "path": self.path,
            "url": self.path,
            "params": self.params,
            "query": self.query,
            "payload": self.payload,
            "pre": self.pre,
            "headers": headers,
        })
    }
}

const DEFAULT_CHAR_SET: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Produces transaction ids for delegates.
#[derive(Debug, Clone, Default)]
pub struct TxIdGenerator {
    config: TransactionId,
}

impl TxIdGenerator {
    pub fn new(config: TransactionId) -> Self {
        Self { config }
    }

    pub fn next_id(&self) -> String {
        match self.config.algorithm {
            TxAlgorithm::Uuid => Uuid::new_v4().to_string(),
            TxAlgorithm::RangeId => self.range_id(),
        }
    }

    fn range_id(&self) -> String {
        let char_set = if self.config.range_id.char_set.is_empty() {
            DEFAULT_CHAR_SET
        } else {
            &self.config.range_id.char_set
        };
        let chars: Vec<char> = char_set.chars().collect();
        let mut rng = rand::thread_rng();
        (0..self.config.range_id.length)
            .filter_map(|_| chars.choose(&mut rng).copied())
            .collect()
    }
}

/// Invocation context for one inbound request.
///
/// Cheap to clone: a transaction id and a shared handle to the request.
#[derive(Debug, Clone)]
pub struct RequestDelegate {
    tx: String,
    request: Option<Arc<RawRequest>>,
}

impl RequestDelegate {
    /// Delegate for an inbound request, with a fresh transaction id
    pub fn for_request(request: Arc<RawRequest>, ids: &TxIdGenerator) -> Self {
        Self {
            tx: ids.next_id(),
            request: Some(request),
        }
    }

    /// Delegate for calls made outside of any inbound request
    pub fn detached(ids: &TxIdGenerator) -> Self {
        Self {
            tx: ids.next_id(),
            request: None,
        }
    }

    pub fn tx(&self) -> &str {
        &self.tx
    }

    pub fn request(&self) -> Option<&RawRequest> {
        self.request.as_deref()
    }

    /// Arguments an RPC layer attaches to every message sent through this
    /// delegate: `tx$` and `req$` (null when detached).
    pub fn fixed_args(&self) -> Map<String, JsonValue> {
        let mut args = Map::new();
        args.insert("tx$".to_string(), JsonValue::from(self.tx.as_str()));
        args.insert(
            "req$".to_string(),
            self.request
                .as_deref()
                .map(RawRequest::to_value)
                .unwrap_or(JsonValue::Null),
        );
        args
    }
}
