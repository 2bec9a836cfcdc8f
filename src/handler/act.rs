use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde_json::Value as JsonValue;

use super::{Reply, RouteHandler};
use crate::{
    config_error,
    core::{ActResult, Pattern, RawRequest},
    gateway::Gateway,
    utils::template::reach_template,
};

pub const HANDLER_NAME: &str = "act";

/// Creates an act handler.
///
/// The options are either a pattern object, or a compact pattern string whose
/// `{path}` placeholders are filled from the request's `params`, `query` and
/// `payload` on every call, e.g. `"generate:{params.type}"`.
pub fn create_act_handler(route_path: &str, cfg: JsonValue) -> ActResult<Arc<dyn RouteHandler>> {
    let target = match cfg {
        JsonValue::Object(map) => ActTarget::Pattern(Pattern::from(map)),
        JsonValue::String(template) if template.contains('{') => ActTarget::Template(template),
        JsonValue::String(text) => ActTarget::Pattern(Pattern::parse(&text).map_err(|e| {
            config_error!("Invalid act handler options ({route_path}): {e}")
        })?),
        other => {
            return Err(config_error!(
                "Invalid act handler options ({route_path}): expected pattern, got {other}"
            ))
        }
    };
    Ok(Arc::new(ActHandler { target }))
}

enum ActTarget {
    Pattern(Pattern),
    Template(String),
}

pub struct ActHandler {
    target: ActTarget,
}

impl ActHandler {
    fn pattern_for(&self, request: &RawRequest) -> ActResult<Pattern> {
        match &self.target {
            ActTarget::Pattern(pattern) => Ok(pattern.clone()),
            ActTarget::Template(template) => {
                let text = reach_template(&request.template_vars(), template);
                debug!("Act template '{template}' expanded to '{text}'");
                Pattern::parse(&text)
            }
        }
    }
}

#[async_trait]
impl RouteHandler for ActHandler {
    fn name(&self) -> &str {
        HANDLER_NAME
    }

    async fn handle(&self, gateway: &Gateway, request: Arc<RawRequest>) -> ActResult<Reply> {
        let pattern = self.pattern_for(&request)?;
        let delegate = gateway.delegate(request);
        gateway.act(&delegate, pattern).await.map(Reply::Json)
    }
}

#[cfg(test)]
mod tests {
    use http::Method;
    use serde_json::json;

    use super::*;
    use crate::{config::Config, core::ActError, testing::MockRpc};

    fn gateway() -> Gateway {
        let rpc = MockRpc::new()
            .add("generate:id", |_, _| Ok(json!({ "id": 1 })))
            .add("get:request", |_, delegate| {
                let request = delegate.request().expect("request attached");
                Ok(json!({ "payload": request.payload, "query": request.query }))
            });
        Gateway::new(&Config::default(), Arc::new(rpc))
    }

    #[tokio::test]
    async fn test_replies_with_act_result() {
        let handler = create_act_handler("/", json!({ "generate": "id" })).unwrap();
        let reply = handler
            .handle(&gateway(), Arc::new(RawRequest::new(Method::GET, "/")))
            .await
            .unwrap();
        assert_eq!(reply, Reply::Json(json!({ "id": 1 })));
    }

    #[tokio::test]
    async fn test_template_string_uses_route_params() {
        let handler = create_act_handler("/{type}", json!("generate:{params.type}")).unwrap();
        let request = RawRequest::new(Method::GET, "/id").with_param("type", "id");

        let reply = handler.handle(&gateway(), Arc::new(request)).await.unwrap();
        assert_eq!(reply, Reply::Json(json!({ "id": 1 })));
    }

    #[tokio::test]
    async fn test_handler_sees_request_data() {
        let handler = create_act_handler("/route", json!("get:request")).unwrap();
        let request = RawRequest::new(Method::POST, "/route")
            .with_query("some", "action")
            .with_payload(json!({ "some": "data", "another": "data" }));

        let reply = handler.handle(&gateway(), Arc::new(request)).await.unwrap();
        assert_eq!(
            reply,
            Reply::Json(json!({
                "payload": { "some": "data", "another": "data" },
                "query": { "some": "action" },
            }))
        );
    }

    #[tokio::test]
    async fn test_failed_action_is_an_error() {
        let handler = create_act_handler("/", json!("record:none")).unwrap();
        let result = handler
            .handle(&gateway(), Arc::new(RawRequest::new(Method::GET, "/")))
            .await;
        assert!(matches!(result, Err(ActError::Invocation(_))));
    }

    #[test]
    fn test_invalid_options() {
        assert!(create_act_handler("/", json!(12)).is_err());
        assert!(create_act_handler("/", json!("broken")).is_err());
    }
}
