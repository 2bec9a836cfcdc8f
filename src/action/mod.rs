//! Binding of named actions to RPC patterns
//!
//! An [`ActionMethod`] is a reusable, callable wrapper around one pattern
//! template. Callers pass optional additions that are merged on top of the
//! template before the RPC layer is invoked. When bound with cache options,
//! results are memoized per cache key through the [`MemoCache`] collaborator.

pub mod key;

use std::{fmt, sync::Arc, time::Duration};

use futures::FutureExt;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use validator::Validate;

use crate::config_error;
use crate::core::{
    ActResult, Additions, CachePolicy, MemoCache, Pattern, PatternSource,
    RequestDelegate, RpcLayer, TxIdGenerator,
};

pub use key::{generate_key, CacheKey};

/// Custom cache key derivation for one binding
pub type KeyFn = Arc<dyn Fn(Option<&Additions>) -> CacheKey + Send + Sync>;

/// Memoization settings of a bound action, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CacheOptions {
    #[serde(rename = "expiresIn")]
    #[validate(range(min = 1))]
    pub expires_in: u64,

    #[serde(rename = "generateTimeout")]
    #[validate(range(min = 1))]
    pub generate_timeout: u64,
}

impl CacheOptions {
    pub fn policy(&self) -> CachePolicy {
        CachePolicy {
            expires_in: Duration::from_millis(self.expires_in),
            generate_timeout: Duration::from_millis(self.generate_timeout),
        }
    }
}

/// Options accepted when binding an action
#[derive(Clone, Default)]
pub struct ActionOptions {
    pub cache: Option<CacheOptions>,
    /// Replaces [`generate_key`] for this binding. Only used with `cache`.
    pub generate_key: Option<KeyFn>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ActionOptionsDoc {
    #[serde(default)]
    cache: Option<CacheOptions>,
}

impl ActionOptions {
    pub fn cached(expires_in_ms: u64, generate_timeout_ms: u64) -> Self {
        Self {
            cache: Some(CacheOptions {
                expires_in: expires_in_ms,
                generate_timeout: generate_timeout_ms,
            }),
            generate_key: None,
        }
    }

    pub fn with_generate_key<F>(mut self, generate_key: F) -> Self
    where
        F: Fn(Option<&Additions>) -> CacheKey + Send + Sync + 'static,
    {
        self.generate_key = Some(Arc::new(generate_key));
        self
    }

    /// Decode options from a document such as
    /// `{"cache": {"expiresIn": 1000, "generateTimeout": 3000}}`.
    ///
    /// Only `cache` is recognized; anything else is a configuration error.
    pub fn from_value(value: JsonValue) -> ActResult<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let doc: ActionOptionsDoc = serde_json::from_value(value)
            .map_err(|e| config_error!("Invalid action options: {e}"))?;
        let options = Self {
            cache: doc.cache,
            generate_key: None,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> ActResult<()> {
        if let Some(cache) = &self.cache {
            cache
                .validate()
                .map_err(|e| config_error!("Invalid cache options: {e}"))?;
        }
        Ok(())
    }
}

impl fmt::Debug for ActionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionOptions")
            .field("cache", &self.cache)
            .field("generate_key", &self.generate_key.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

fn default_key_fn() -> KeyFn {
    Arc::new(generate_key)
}

struct Memoization {
    cache: Arc<dyn MemoCache>,
    policy: CachePolicy,
    generate_key: KeyFn,
    segment: String,
}

/// A named action bound to a pattern template.
pub struct ActionMethod {
    name: String,
    pattern: Pattern,
    rpc: Arc<dyn RpcLayer>,
    ids: Arc<TxIdGenerator>,
    memo: Option<Memoization>,
}

impl ActionMethod {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn is_cached(&self) -> bool {
        self.memo.is_some()
    }

    /// Call the action outside of any inbound request
    pub async fn call(&self, additions: Option<Additions>) -> ActResult<JsonValue> {
        let delegate = RequestDelegate::detached(&self.ids);
        self.call_with(&delegate, additions).await
    }

    /// Call the action on behalf of `delegate`
    pub async fn call_with(
        &self,
        delegate: &RequestDelegate,
        additions: Option<Additions>,
    ) -> ActResult<JsonValue> {
        let additions = additions.filter(|a| !a.is_blank());
        let pattern = match &additions {
            Some(extra) => self.pattern.merged(&extra.to_pattern()?),
            None => self.pattern.clone(),
        };

        let Some(memo) = &self.memo else {
            return self.rpc.invoke(pattern, delegate).await;
        };

        match (memo.generate_key)(additions.as_ref()) {
            CacheKey::NotCacheable => {
                debug!("Action '{}' called with non-cacheable additions", self.name);
                self.rpc.invoke(pattern, delegate).await
            }
            CacheKey::Key(key) => {
                trace!("Action '{}' cache key '{key}'", self.name);
                let rpc = self.rpc.clone();
                let delegate = delegate.clone();
                let generator = async move { rpc.invoke(pattern, &delegate).await }.boxed();
                memo.cache
                    .get_or_generate(&memo.segment, &key, memo.policy, generator)
                    .await
            }
        }
    }
}

impl fmt::Debug for ActionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionMethod")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .field("cached", &self.is_cached())
            .finish()
    }
}

/// Produces [`ActionMethod`]s sharing one RPC layer and one cache.
#[derive(Clone)]
pub struct ActionBinder {
    rpc: Arc<dyn RpcLayer>,
    cache: Arc<dyn MemoCache>,
    ids: Arc<TxIdGenerator>,
}

impl ActionBinder {
    pub fn new(rpc: Arc<dyn RpcLayer>, cache: Arc<dyn MemoCache>, ids: Arc<TxIdGenerator>) -> Self {
        Self { rpc, cache, ids }
    }

    /// Bind `name` to `template`.
    ///
    /// Fails with a configuration error when the template does not parse or
    /// the options are invalid.
    pub fn bind(
        &self,
        name: &str,
        template: impl Into<PatternSource>,
        options: ActionOptions,
    ) -> ActResult<ActionMethod> {
        if name.is_empty() {
            return Err(config_error!("Action name must not be empty"));
        }
        options.validate()?;

        let pattern = template.into().to_pattern().map_err(|e| {
            config_error!("Invalid pattern for action '{name}': {e}")
        })?;

        let memo = options.cache.map(|cache| Memoization {
            cache: self.cache.clone(),
            policy: cache.policy(),
            generate_key: options.generate_key.clone().unwrap_or_else(default_key_fn),
            segment: format!("#{name}"),
        });

        debug!(
            "Bound action '{name}' to {pattern}{}",
            if memo.is_some() { " (cached)" } else { "" }
        );

        Ok(ActionMethod {
            name: name.to_string(),
            pattern,
            rpc: self.rpc.clone(),
            ids: self.ids.clone(),
            memo,
        })
    }
}
