//! Composition of several concurrent actions into one context
//!
//! A context may embed action patterns in two ways:
//!
//! - a resolve map under the reserved key (default `$resolve`) mapping
//!   dot-paths to patterns; results are written at those paths relative to
//!   the object holding the map, and the map itself is removed;
//! - inline markers: keys ending in the marker suffix (default `$`), whose
//!   value is replaced in place by the result of its pattern.
//!
//! All discovered patterns run concurrently in a single pass. The first
//! failure fails the whole composition and drops, thereby cancelling, the
//! invocations still in flight.

pub mod tree;

use std::sync::Arc;

use futures::future::try_join_all;
use log::{debug, warn};
use serde_json::Value as JsonValue;

use crate::{
    config::Compose,
    core::{ActError, ActResult, RequestDelegate, RpcLayer},
};

pub use tree::{ContextNode, Location, ResolutionTask, Segment};

pub struct Composer {
    rpc: Arc<dyn RpcLayer>,
    settings: Compose,
}

impl Composer {
    pub fn new(rpc: Arc<dyn RpcLayer>, settings: Compose) -> Self {
        Self { rpc, settings }
    }

    pub fn settings(&self) -> &Compose {
        &self.settings
    }

    /// Resolve every action embedded in `context`.
    ///
    /// `context` is only read; the resolved tree is a new value.
    pub async fn compose(
        &self,
        context: &JsonValue,
        delegate: &RequestDelegate,
    ) -> ActResult<JsonValue> {
        let tree = ContextNode::decode(context, &self.settings)?;
        let tasks = tree.tasks()?;
        let mut resolved = tree.into_value();

        if tasks.is_empty() {
            return Ok(resolved);
        }
        debug!(
            "Composing {} actions for transaction {}",
            tasks.len(),
            delegate.tx()
        );

        let invocations = tasks.into_iter().map(|task| async move {
            let ResolutionTask { location, pattern } = task;
            match self.rpc.invoke(pattern, delegate).await {
                Ok(result) => Ok((location, result)),
                Err(e) => {
                    warn!("Composition action at '{location}' failed: {e}");
                    Err(ActError::composition(location.to_string(), e))
                }
            }
        });

        for (location, result) in try_join_all(invocations).await? {
            location.assign(&mut resolved, result);
        }
        Ok(resolved)
    }
}
