//! Server dispatch pipeline: validation, resolution, binding, invocation,
//! middleware, and error mapping (spec.md §4.5).

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::binder;
use crate::context::RequestContext;
use crate::error::{ExceptionData, JsonRpcError};
use crate::registry::MethodRegistry;

/// A middleware stage: inspects/mutates the request, calls `next`, then
/// inspects/mutates the response, or short-circuits without calling `next`.
pub type Next = Arc<dyn Fn(RequestContext) -> BoxFuture<'static, RequestContext> + Send + Sync>;
pub type Middleware =
    Arc<dyn Fn(RequestContext, Next) -> BoxFuture<'static, RequestContext> + Send + Sync>;

/// The innermost stage plus whatever middleware chain was layered on top of
/// it in host-configuration order (first added = outermost, onion-style).
#[derive(Clone)]
pub struct Dispatcher {
    registry: MethodRegistry,
}

impl Dispatcher {
    pub fn new(registry: MethodRegistry) -> Self {
        Self { registry }
    }

    /// Build the full pipeline `Next`: outer-most middleware first, the
    /// dispatcher itself last.
    pub fn build_pipeline(self, middlewares: Vec<Middleware>) -> Next {
        let dispatcher = Arc::new(self);
        let mut chain: Next = {
            let dispatcher = dispatcher.clone();
            Arc::new(move |ctx| {
                let dispatcher = dispatcher.clone();
                Box::pin(async move { dispatcher.dispatch(ctx).await })
            })
        };
        for middleware in middlewares.into_iter().rev() {
            let inner = chain.clone();
            chain = Arc::new(move |ctx| {
                let middleware = middleware.clone();
                let inner = inner.clone();
                middleware(ctx, inner)
            });
        }
        chain
    }

    /// Runs spec.md §4.5 steps 1-7 for a single request/notification.
    pub async fn dispatch(&self, ctx: RequestContext) -> RequestContext {
        if ctx.request.method.trim().is_empty() {
            ctx.set_error(
                JsonRpcError::InvalidRequest("method must be a non-empty string".into())
                    .into_error_object(),
            );
            return ctx;
        }

        let candidates = match self.registry.candidates(&ctx.request.method) {
            Some(candidates) => candidates,
            None => {
                ctx.set_error(
                    JsonRpcError::MethodNotFound(format!(
                        "unknown method \"{}\"",
                        ctx.request.method
                    ))
                    .into_error_object(),
                );
                return ctx;
            }
        };

        let bound = match binder::bind(candidates, &ctx.request.params) {
            Ok(bound) => bound,
            Err(err) => {
                ctx.set_error(err.into_error_object());
                return ctx;
            }
        };

        let invocation =
            AssertUnwindSafe(bound.method.invoke(ctx.clone(), bound.args)).catch_unwind();

        let outcome = match invocation.await {
            Ok(result) => result,
            Err(panic) => Err(panic_to_unhandled(panic)),
        };

        if let Some(error) = ctx.explicit_error() {
            ctx.set_error(error);
        } else if let Some(result) = ctx.explicit_result() {
            ctx.set_result(result);
        } else {
            match outcome {
                Ok(value) => ctx.set_result(value),
                Err(err) => ctx.set_error(err.into_error_object()),
            }
        }

        ctx
    }
}

fn panic_to_unhandled(panic: Box<dyn std::any::Any + Send>) -> JsonRpcError {
    let message = if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    };
    JsonRpcError::UnhandledException {
        data: ExceptionData::new("panic", message),
    }
}
