//! In-process RPC layer used by the unit tests.
//!
//! Routes match when every key of the route pattern is present with an equal
//! value in the invoked pattern; the most specific route wins.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::core::{ActError, ActResult, Pattern, RequestDelegate, RpcLayer};

type HandlerFn = Box<dyn Fn(&Pattern, &RequestDelegate) -> ActResult<JsonValue> + Send + Sync>;

pub(crate) struct MockRpc {
    routes: Vec<(Pattern, HandlerFn)>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Pattern>>,
    closed: AtomicBool,
}

impl MockRpc {
    pub(crate) fn new() -> Self {
        Self {
            routes: Vec::new(),
            delay: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn add<F>(mut self, route: &str, handler: F) -> Self
    where
        F: Fn(&Pattern, &RequestDelegate) -> ActResult<JsonValue> + Send + Sync + 'static,
    {
        let route = Pattern::parse(route).expect("valid route pattern");
        self.routes.push((route, Box::new(handler)));
        self
    }

    /// Every invocation sleeps this long before answering
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn seen(&self) -> Vec<Pattern> {
        self.seen.lock().unwrap().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn route(&self, pattern: &Pattern) -> Option<&HandlerFn> {
        self.routes
            .iter()
            .filter(|(route, _)| route.iter().all(|(k, v)| pattern.get(k) == Some(v)))
            .max_by_key(|(route, _)| route.len())
            .map(|(_, handler)| handler)
    }
}

#[async_trait]
impl RpcLayer for MockRpc {
    async fn invoke(&self, pattern: Pattern, delegate: &RequestDelegate) -> ActResult<JsonValue> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(pattern.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.route(&pattern) {
            Some(handler) => handler(&pattern, delegate),
            None => Err(ActError::Invocation(format!("No matching action for {pattern}"))),
        }
    }

    async fn close(&self) -> ActResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
