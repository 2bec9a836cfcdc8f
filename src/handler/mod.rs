pub mod act;
pub mod compose;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::Value as JsonValue;

use crate::{
    config_error,
    core::{ActResult, RawRequest},
    gateway::Gateway,
};

/// What a route handler hands back to the embedding server
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Raw action result, to be serialized by the server
    Json(JsonValue),
    /// Rendered view
    View(String),
}

/// A configured handler the embedding server attaches to a route.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, gateway: &Gateway, request: Arc<RawRequest>) -> ActResult<Reply>;
}

/// Builds a handler from its route path and options
pub type HandlerCreateFn = fn(&str, JsonValue) -> ActResult<Arc<dyn RouteHandler>>;

/// Global registry mapping handler kinds to their factory functions.
static HANDLER_BUILDER_REGISTRY: Lazy<HashMap<&'static str, HandlerCreateFn>> = Lazy::new(|| {
    let arr: Vec<(&str, HandlerCreateFn)> = vec![
        (act::HANDLER_NAME, act::create_act_handler),
        (compose::HANDLER_NAME, compose::create_compose_handler),
    ];
    arr.into_iter().collect()
});

/// Creates a route handler from configuration using a factory pattern.
///
/// Looks up the handler builder in the global registry and invokes it with
/// the route path and options. Options are validated here, so a bad route
/// fails when it is declared rather than when it is first hit.
///
/// # Errors
/// Returns `Configuration` for unknown handler kinds or invalid options
pub fn build_handler(
    name: &str,
    route_path: &str,
    cfg: JsonValue,
) -> ActResult<Arc<dyn RouteHandler>> {
    let builder = HANDLER_BUILDER_REGISTRY.get(name).ok_or_else(|| {
        config_error!("Unknown handler type '{name}' ({route_path})")
    })?;
    builder(route_path, cfg)
}
