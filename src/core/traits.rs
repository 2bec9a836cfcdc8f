//! Core traits for actgate components
//!
//! These are the seams to the collaborators the engine drives but does not
//! implement: the RPC layer, the memoization cache and the view renderer.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value as JsonValue;

use super::{context::RequestDelegate, error::ActResult, pattern::Pattern};

/// The RPC layer that matches patterns against business handlers.
#[async_trait]
pub trait RpcLayer: Send + Sync {
    /// Run the action identified by `pattern` on behalf of `delegate`
    async fn invoke(&self, pattern: Pattern, delegate: &RequestDelegate) -> ActResult<JsonValue>;

    /// Release transport resources. Called when the owning gateway stops.
    async fn close(&self) -> ActResult<()> {
        Ok(())
    }
}

/// Lifetime and regeneration bound of memoized results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub expires_in: Duration,
    pub generate_timeout: Duration,
}

/// Deferred computation of a value missing from the cache
pub type Generator = BoxFuture<'static, ActResult<JsonValue>>;

/// Memoization store with single-flight regeneration.
#[async_trait]
pub trait MemoCache: Send + Sync {
    /// Return the live value stored under `segment`/`key`, or run `generator`
    /// and store its successful result for `policy.expires_in`.
    ///
    /// Concurrent callers asking for the same key while a generation is in
    /// flight must share it. Failures are returned to every waiter and never
    /// stored.
    async fn get_or_generate(
        &self,
        segment: &str,
        key: &str,
        policy: CachePolicy,
        generator: Generator,
    ) -> ActResult<JsonValue>;
}

/// View engine that turns a resolved context into output.
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        template: &str,
        context: &JsonValue,
        options: Option<&JsonValue>,
    ) -> ActResult<String>;
}
