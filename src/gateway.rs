//! Entry point tying the engine together
//!
//! A [`Gateway`] owns the collaborators (RPC layer, cache, renderer), the
//! registry of bound action methods and the composer, and hands route
//! handlers what they need to serve one request.

use std::sync::Arc;

use log::{debug, info, warn};
use serde_json::Value as JsonValue;

use crate::{
    action::{ActionBinder, ActionMethod, ActionOptions},
    cache::MemoryCache,
    compose::Composer,
    config::Config,
    core::{
        ActError, ActResult, MemoCache, MethodRegistry, PatternSource, RawRequest, Renderer,
        RequestDelegate, RpcLayer, TxIdGenerator,
    },
    config_error,
    handler::{Reply, RouteHandler},
};

pub struct Gateway {
    rpc: Arc<dyn RpcLayer>,
    cache: Arc<dyn MemoCache>,
    renderer: Option<Arc<dyn Renderer>>,
    ids: Arc<TxIdGenerator>,
    methods: MethodRegistry,
    composer: Composer,
}

impl Gateway {
    /// Create a gateway over `rpc` with an in-memory cache and no renderer.
    pub fn new(config: &Config, rpc: Arc<dyn RpcLayer>) -> Self {
        Self {
            cache: Arc::new(MemoryCache::new()),
            renderer: None,
            ids: Arc::new(TxIdGenerator::new(config.transaction_id.clone())),
            methods: MethodRegistry::new(),
            composer: Composer::new(rpc.clone(), config.compose.clone()),
            rpc,
        }
    }

    /// Create a gateway and bind every action declared in `config`.
    pub fn from_config(config: &Config, rpc: Arc<dyn RpcLayer>) -> ActResult<Self> {
        let gateway = Self::new(config, rpc);
        for action in &config.actions {
            let template = PatternSource::try_from(action.pattern.clone())
                .map_err(|e| config_error!("Invalid pattern for action '{}': {e}", action.name))?;
            let options = ActionOptions {
                cache: action.cache,
                generate_key: None,
            };
            gateway.action(&action.name, template, options)?;
        }
        let stats = gateway.methods.get_stats();
        info!(
            "Gateway bound {} configured actions ({} cached)",
            stats.method_count, stats.cached_count
        );
        Ok(gateway)
    }

    /// Replace the memoization store. Affects actions bound afterwards.
    pub fn with_cache(mut self, cache: Arc<dyn MemoCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    fn binder(&self) -> ActionBinder {
        ActionBinder::new(self.rpc.clone(), self.cache.clone(), self.ids.clone())
    }

    /// Bind `name` to `template` and register it.
    ///
    /// # Errors
    /// `Configuration` for an unparsable template, invalid options or a name
    /// that is already bound
    pub fn action(
        &self,
        name: &str,
        template: impl Into<PatternSource>,
        options: ActionOptions,
    ) -> ActResult<Arc<ActionMethod>> {
        let method = self.binder().bind(name, template, options)?;
        self.methods.insert(method)
    }

    /// Look up a bound action by name.
    ///
    /// # Errors
    /// `NotFound` when no action is bound under `name`
    pub fn method(&self, name: &str) -> ActResult<Arc<ActionMethod>> {
        self.methods
            .get(name)
            .ok_or_else(|| ActError::NotFound(format!("No action bound as '{name}'")))
    }

    pub fn methods(&self) -> &MethodRegistry {
        &self.methods
    }

    /// Delegate for one inbound request, carrying a fresh transaction id
    pub fn delegate(&self, request: Arc<RawRequest>) -> RequestDelegate {
        RequestDelegate::for_request(request, &self.ids)
    }

    pub fn detached(&self) -> RequestDelegate {
        RequestDelegate::detached(&self.ids)
    }

    /// Run a single, unbound pattern on behalf of `delegate`.
    pub async fn act(
        &self,
        delegate: &RequestDelegate,
        pattern: impl Into<PatternSource>,
    ) -> ActResult<JsonValue> {
        let pattern = pattern.into().to_pattern()?;
        debug!("Act {pattern} for transaction {}", delegate.tx());
        self.rpc.invoke(pattern, delegate).await
    }

    /// Resolve every action embedded in `context`.
    pub async fn compose(
        &self,
        delegate: &RequestDelegate,
        context: &JsonValue,
    ) -> ActResult<JsonValue> {
        self.composer.compose(context, delegate).await
    }

    /// Compose `context` and render `template` with the result.
    pub async fn view(
        &self,
        delegate: &RequestDelegate,
        template: &str,
        context: &JsonValue,
        options: Option<&JsonValue>,
    ) -> ActResult<String> {
        let renderer = self
            .renderer
            .as_ref()
            .ok_or_else(|| config_error!("No renderer configured for view '{template}'"))?;
        let resolved = self.compose(delegate, context).await?;
        renderer.render(template, &resolved, options)
    }

    /// Dispatch `request` to a route handler.
    pub async fn handle(
        &self,
        handler: &dyn RouteHandler,
        request: Arc<RawRequest>,
    ) -> ActResult<Reply> {
        let (method, path) = (request.method.clone(), request.path.clone());
        let reply = handler.handle(self, request).await;
        if let Err(e) = &reply {
            warn!("{} handler failed for {method} {path}: {e}", handler.name());
        }
        reply
    }

    /// Unregister every method and close the RPC layer.
    pub async fn stop(&self) -> ActResult<()> {
        let stats = self.methods.get_stats();
        debug!("Unbinding {} actions", stats.method_count);
        self.methods.clear();
        self.rpc.close().await?;
        info!("Gateway stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::atomic::{AtomicUsize, Ordering}, time::Duration};

    use http::Method;
    use serde_json::json;

    use super::*;
    use crate::{
        core::Pattern,
        handler::build_handler,
        testing::MockRpc,
    };

    struct ContextRenderer;

    impl Renderer for ContextRenderer {
        fn render(
            &self,
            template: &str,
            context: &JsonValue,
            _options: Option<&JsonValue>,
        ) -> ActResult<String> {
            Ok(format!("{template}:{context}"))
        }
    }

    fn counting_rpc() -> (Arc<MockRpc>, Arc<AtomicUsize>) {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let rpc = MockRpc::new()
            .add("generate:id", move |_, _| {
                Ok(json!({ "id": seen.fetch_add(1, Ordering::SeqCst) + 1 }))
            })
            .add("record:user", |pattern, _| {
                Ok(json!({ "id": pattern.get("id").cloned().unwrap_or(JsonValue::Null) }))
            });
        (Arc::new(rpc), counter)
    }

    #[tokio::test]
    async fn test_from_config_binds_actions() {
        let config = Config::from_yaml(
            r#"
actions:
  - name: generate
    pattern: "generate:id"
    cache:
      expiresIn: 60000
      generateTimeout: 1000
  - name: user
    pattern:
      record: user
"#,
        )
        .unwrap();
        let (rpc, _) = counting_rpc();
        let gateway = Gateway::from_config(&config, rpc).unwrap();

        let generate = gateway.method("generate").unwrap();
        assert!(generate.is_cached());
        assert!(!gateway.method("user").unwrap().is_cached());
        assert!(matches!(gateway.method("other"), Err(ActError::NotFound(_))));

        let stats = gateway.methods().get_stats();
        assert_eq!(stats.method_count, 2);
        assert_eq!(stats.cached_count, 1);

        // cache hit stability
        assert_eq!(generate.call(None).await.unwrap(), json!({ "id": 1 }));
        assert_eq!(generate.call(None).await.unwrap(), json!({ "id": 1 }));
    }

    #[test]
    fn test_from_config_rejects_bad_pattern() {
        let config = Config::from_yaml(
            r#"
actions:
  - name: broken
    pattern: "not a pattern"
"#,
        )
        .unwrap();
        let (rpc, _) = counting_rpc();
        let result = Gateway::from_config(&config, rpc);
        assert!(matches!(result, Err(ActError::Configuration(msg)) if msg.contains("broken")));
    }

    #[tokio::test]
    async fn test_uncached_action_always_invokes() {
        let (rpc, counter) = counting_rpc();
        let gateway = Gateway::new(&Config::default(), rpc);
        let method = gateway
            .action("generate", "generate:id", ActionOptions::default())
            .unwrap();

        method.call(None).await.unwrap();
        method.call(None).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_additions_override_template() {
        let (rpc, _) = counting_rpc();
        let gateway = Gateway::new(&Config::default(), rpc.clone());
        let method = gateway
            .action("user", "record:user,id:1", ActionOptions::default())
            .unwrap();

        let result = method.call(Some("id:2".into())).await.unwrap();
        assert_eq!(result, json!({ "id": 2 }));
        assert_eq!(rpc.seen()[0], Pattern::parse("record:user,id:2").unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_action_is_rejected() {
        let (rpc, _) = counting_rpc();
        let gateway = Gateway::new(&Config::default(), rpc);
        gateway
            .action("generate", "generate:id", ActionOptions::default())
            .unwrap();
        assert!(gateway
            .action("generate", "generate:id", ActionOptions::default())
            .is_err());
    }

    #[tokio::test]
    async fn test_act_with_request_delegate() {
        let rpc = MockRpc::new().add("get:tx", |_, delegate| {
            Ok(JsonValue::Object(delegate.fixed_args()))
        });
        let gateway = Gateway::new(&Config::default(), Arc::new(rpc));
        let request = Arc::new(RawRequest::new(Method::GET, "/tx"));
        let delegate = gateway.delegate(request);

        let result = gateway.act(&delegate, "get:tx").await.unwrap();
        assert_eq!(result["tx$"], json!(delegate.tx()));
        assert_eq!(result["req$"]["url"], "/tx");
    }

    #[tokio::test]
    async fn test_compose_leaves_context_untouched() {
        let (rpc, _) = counting_rpc();
        let gateway = Gateway::new(&Config::default(), rpc);
        let context = json!({
            "$resolve": { "user": "record:user,id:7", "meta.id": "generate:id" },
            "title": "profile",
        });
        let before = context.clone();

        let resolved = gateway.compose(&gateway.detached(), &context).await.unwrap();
        assert_eq!(context, before);
        assert_eq!(
            resolved,
            json!({ "title": "profile", "user": { "id": 7 }, "meta": { "id": { "id": 1 } } })
        );
    }

    #[tokio::test]
    async fn test_view_requires_renderer() {
        let (rpc, _) = counting_rpc();
        let gateway = Gateway::new(&Config::default(), rpc);
        let result = gateway
            .view(&gateway.detached(), "page", &json!({}), None)
            .await;
        assert!(matches!(result, Err(ActError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_handle_dispatches_to_handler() {
        let (rpc, _) = counting_rpc();
        let gateway =
            Gateway::new(&Config::default(), rpc).with_renderer(Arc::new(ContextRenderer));
        let handler = build_handler(
            "compose",
            "/page",
            json!({ "template": "page", "context": { "user$": "record:user,id:3" } }),
        )
        .unwrap();

        let reply = gateway
            .handle(handler.as_ref(), Arc::new(RawRequest::new(Method::GET, "/page")))
            .await
            .unwrap();
        match reply {
            Reply::View(text) => {
                assert!(text.starts_with("page:"));
                assert!(text.contains(r#""user$":{"id":3}"#));
            }
            other => panic!("expected a view, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_custom_cache_is_used() {
        let (rpc, counter) = counting_rpc();
        let cache = Arc::new(MemoryCache::new());
        let gateway = Gateway::new(&Config::default(), rpc).with_cache(cache.clone());
        let method = gateway
            .action("generate", "generate:id", ActionOptions::cached(60_000, 1000))
            .unwrap();

        method.call(None).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.drop_key("#generate", "{}"));

        method.call(None).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_regeneration_times_out() {
        let rpc = MockRpc::new()
            .add("generate:id", |_, _| Ok(json!({ "id": 1 })))
            .with_delay(Duration::from_millis(200));
        let gateway = Gateway::new(&Config::default(), Arc::new(rpc));
        let method = gateway
            .action("generate", "generate:id", ActionOptions::cached(60_000, 20))
            .unwrap();

        let result = method.call(None).await;
        assert!(matches!(result, Err(ActError::RegenerationTimeout { .. })));
    }

    #[tokio::test]
    async fn test_stop_closes_rpc() {
        let (rpc, _) = counting_rpc();
        let gateway = Gateway::new(&Config::default(), rpc.clone());
        gateway
            .action("generate", "generate:id", ActionOptions::default())
            .unwrap();

        gateway.stop().await.unwrap();
        assert!(rpc.is_closed());
        assert!(matches!(gateway.method("generate"), Err(ActError::NotFound(_))));
    }
}
