use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use validator::Validate;

use super::{Reply, RouteHandler};
use crate::{
    config_error,
    core::{ActError, ActResult, RawRequest},
    gateway::Gateway,
};

pub const HANDLER_NAME: &str = "compose";

/// Creates a compose handler.
///
/// Each request builds a context from its `params`, `payload`, `query` and
/// `pre` values, overlays the configured `context`, resolves the actions it
/// embeds and renders `template` with the result.
pub fn create_compose_handler(
    route_path: &str,
    cfg: JsonValue,
) -> ActResult<Arc<dyn RouteHandler>> {
    let config = HandlerConfig::parse(route_path, cfg)?;
    Ok(Arc::new(ComposeHandler { config }))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
struct HandlerConfig {
    #[validate(length(min = 1))]
    template: String,

    context: Map<String, JsonValue>,

    #[serde(default)]
    options: Option<Map<String, JsonValue>>,
}

impl HandlerConfig {
    fn parse(route_path: &str, cfg: JsonValue) -> ActResult<Self> {
        let config: HandlerConfig =
            serde_json::from_value(cfg).map_err(|e| invalid(route_path, e))?;
        config.validate().map_err(|e| invalid(route_path, e))?;
        Ok(config)
    }
}

fn invalid(route_path: &str, e: impl std::fmt::Display) -> ActError {
    config_error!("Invalid compose handler options ({route_path}): {e}")
}

pub struct ComposeHandler {
    config: HandlerConfig,
}

impl ComposeHandler {
    fn context_for(&self, request: &RawRequest) -> JsonValue {
        let mut context = request.compose_vars();
        for (key, value) in &self.config.context {
            context.insert(key.clone(), value.clone());
        }
        JsonValue::Object(context)
    }
}

#[async_trait]
impl RouteHandler for ComposeHandler {
    fn name(&self) -> &str {
        HANDLER_NAME
    }

    async fn handle(&self, gateway: &Gateway, request: Arc<RawRequest>) -> ActResult<Reply> {
        let context = self.context_for(&request);
        let options = self.config.options.clone().map(JsonValue::Object);
        let delegate = gateway.delegate(request);

        gateway
            .view(&delegate, &self.config.template, &context, options.as_ref())
            .await
            .map(Reply::View)
    }
}
