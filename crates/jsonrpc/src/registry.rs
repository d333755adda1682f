//! Contract resolver: builds an immutable `MethodRegistry` from explicit
//! service registrations (spec.md §4.3). Rust has no runtime reflection, so
//! "annotated methods" are realized as typed closures registered through a
//! `ServiceBuilder`, per SPEC_FULL.md's REDESIGN FLAGS.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::{ContractError, JsonRpcError};
use crate::naming::NamingStrategy;
use crate::param::{Args, ParamSpec};

type Invoker = Arc<dyn Fn(RequestContext, Args) -> BoxFuture<'static, Result<Value, JsonRpcError>> + Send + Sync>;

/// A build-once, immutable registry entry: one candidate signature for a
/// wire method name (spec.md's `JsonRpcMethod`).
#[derive(Clone)]
pub struct JsonRpcMethod {
    pub name: String,
    pub is_notification: bool,
    pub allow_extension_data: bool,
    pub params: Vec<ParamSpec>,
    invoke: Invoker,
}

impl JsonRpcMethod {
    pub async fn invoke(&self, ctx: RequestContext, args: Args) -> Result<Value, JsonRpcError> {
        (self.invoke)(ctx, args).await
    }
}

impl std::fmt::Debug for JsonRpcMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcMethod")
            .field("name", &self.name)
            .field("is_notification", &self.is_notification)
            .field("allow_extension_data", &self.allow_extension_data)
            .field("params", &self.params.iter().map(|p| &p.name).collect::<Vec<_>>())
            .finish()
    }
}

/// Creates a fresh service instance per request and releases it on completion
/// (spec.md §3, "Lifecycle and ownership"). The dispatcher pairs `create`
/// and `release` even when the handler returns an error.
pub trait ServiceFactory<S>: Send + Sync {
    fn create(&self, ctx: &RequestContext) -> S;

    fn release(&self, _service: S) {}
}

impl<S, F> ServiceFactory<S> for F
where
    F: Fn(&RequestContext) -> S + Send + Sync,
{
    fn create(&self, ctx: &RequestContext) -> S {
        self(ctx)
    }
}

/// Wraps any `Clone` service state in a no-release factory. The common case:
/// a server holds one `Arc<AppState>` and hands a clone to every request.
pub struct SharedServiceFactory<S: Clone + Send + Sync>(pub S);

impl<S: Clone + Send + Sync> ServiceFactory<S> for SharedServiceFactory<S> {
    fn create(&self, _ctx: &RequestContext) -> S {
        self.0.clone()
    }
}

struct ServiceGuard<S: Send + Sync + 'static> {
    factory: Arc<dyn ServiceFactory<S>>,
    service: Option<S>,
}

impl<S: Send + Sync + 'static> Drop for ServiceGuard<S> {
    fn drop(&mut self) {
        if let Some(service) = self.service.take() {
            self.factory.release(service);
        }
    }
}

/// Declarative description of one method candidate, independent of its
/// handler. Mirrors spec.md's `Parameter` list plus the naming override.
#[derive(Debug, Clone, Default)]
pub struct MethodDef {
    declared_name: String,
    explicit_name: Option<String>,
    params: Vec<ParamSpec>,
    allow_extension_data: bool,
}

impl MethodDef {
    pub fn new(declared_name: impl Into<String>) -> Self {
        Self {
            declared_name: declared_name.into(),
            ..Default::default()
        }
    }

    pub fn named(mut self, wire_name: impl Into<String>) -> Self {
        self.explicit_name = Some(wire_name.into());
        self
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn allow_extension_data(mut self) -> Self {
        self.allow_extension_data = true;
        self
    }
}

/// Builds the candidate list for one service: a name, a `ServiceFactory`,
/// and a batch of typed method/notification registrations.
pub struct ServiceBuilder<S: Clone + Send + Sync + 'static> {
    naming: NamingStrategy,
    factory: Arc<dyn ServiceFactory<S>>,
    methods: Vec<JsonRpcMethod>,
    seen_params: HashMap<String, ()>,
}

impl<S: Clone + Send + Sync + 'static> ServiceBuilder<S> {
    pub fn new(factory: impl ServiceFactory<S> + 'static) -> Self {
        Self {
            naming: NamingStrategy::default(),
            factory: Arc::new(factory),
            methods: Vec::new(),
            seen_params: HashMap::new(),
        }
    }

    pub fn naming_strategy(mut self, strategy: NamingStrategy) -> Self {
        self.naming = strategy;
        self
    }

    fn wire_name(&self, def: &MethodDef) -> String {
        def.explicit_name
            .clone()
            .unwrap_or_else(|| self.naming.apply(&def.declared_name))
    }

    /// Resolves every param's wire name (naming strategy, unless `named`
    /// overrides it), matching spec.md §4.3's "parameter names similarly
    /// transformed; explicit name overrides."
    fn resolve_params(&self, params: Vec<ParamSpec>) -> Vec<ParamSpec> {
        params
            .into_iter()
            .map(|param| param.resolve(self.naming))
            .collect()
    }

    fn check_params(params: &[ParamSpec], method_name: &str) -> Result<(), ContractError> {
        let mut seen = std::collections::HashSet::new();
        for param in params {
            if !seen.insert(param.name.clone()) {
                return Err(ContractError::DuplicateParameter {
                    method: method_name.to_owned(),
                    param: param.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Register a request-returning candidate. `R` is serialized into the
    /// response's `result` via `serde_json::to_value`.
    pub fn method<F, Fut, R>(
        mut self,
        def: MethodDef,
        handler: F,
    ) -> Result<Self, ContractError>
    where
        F: Fn(S, RequestContext, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, JsonRpcError>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        let name = self.wire_name(&def);
        let params = self.resolve_params(def.params);
        Self::check_params(&params, &name)?;
        let factory = self.factory.clone();
        let handler = Arc::new(handler);
        let invoke: Invoker = Arc::new(move |ctx, args| {
            let factory = factory.clone();
            let handler = handler.clone();
            Box::pin(async move {
                let service = factory.create(&ctx);
                let handler_service = service.clone();
                let _guard = ServiceGuard {
                    factory,
                    service: Some(service),
                };
                let result = handler(handler_service, ctx, args).await?;
                serde_json::to_value(result)
                    .map_err(|err| JsonRpcError::InternalError(err.to_string()))
            })
        });
        self.methods.push(JsonRpcMethod {
            name,
            is_notification: false,
            allow_extension_data: def.allow_extension_data,
            params,
            invoke,
        });
        Ok(self)
    }

    /// Register a notification candidate. The handler's `Output = ()`
    /// statically enforces spec.md's "notification methods must return
    /// void/nothing" invariant; no response is ever produced for it.
    pub fn notification<F, Fut>(
        mut self,
        def: MethodDef,
        handler: F,
    ) -> Result<Self, ContractError>
    where
        F: Fn(S, RequestContext, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), JsonRpcError>> + Send + 'static,
    {
        let name = self.wire_name(&def);
        let params = self.resolve_params(def.params);
        Self::check_params(&params, &name)?;
        let factory = self.factory.clone();
        let handler = Arc::new(handler);
        let invoke: Invoker = Arc::new(move |ctx, args| {
            let factory = factory.clone();
            let handler = handler.clone();
            Box::pin(async move {
                let service = factory.create(&ctx);
                let handler_service = service.clone();
                let _guard = ServiceGuard {
                    factory,
                    service: Some(service),
                };
                handler(handler_service, ctx, args).await?;
                Ok(Value::Null)
            })
        });
        self.methods.push(JsonRpcMethod {
            name,
            is_notification: true,
            allow_extension_data: def.allow_extension_data,
            params,
            invoke,
        });
        Ok(self)
    }

    pub fn finish(self) -> Vec<JsonRpcMethod> {
        self.methods
    }
}

/// Immutable mapping from wire method name to its candidate list, built
/// once at host construction (spec.md §3, "Lifecycle and ownership").
#[derive(Clone, Default)]
pub struct MethodRegistry {
    methods: Arc<HashMap<String, Vec<JsonRpcMethod>>>,
}

#[derive(Default)]
pub struct MethodRegistryBuilder {
    methods: HashMap<String, Vec<JsonRpcMethod>>,
    seen_services: std::collections::HashSet<String>,
}

impl MethodRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_service(
        mut self,
        service_name: impl Into<String>,
        methods: Vec<JsonRpcMethod>,
    ) -> Result<Self, ContractError> {
        let service_name = service_name.into();
        if !self.seen_services.insert(service_name.clone()) {
            return Err(ContractError::DuplicateService(service_name));
        }
        for method in methods {
            self.methods.entry(method.name.clone()).or_default().push(method);
        }
        Ok(self)
    }

    pub fn build(self) -> MethodRegistry {
        MethodRegistry {
            methods: Arc::new(self.methods),
        }
    }
}

impl MethodRegistry {
    pub fn candidates(&self, method: &str) -> Option<&[JsonRpcMethod]> {
        self.methods.get(method).map(|v| v.as_slice())
    }
}
