//! Wires a `MethodRegistry` and middleware chain to a transport: the
//! server-side run loop (spec.md §5).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::{IncomingRequest, RequestContext};
use crate::dispatcher::{Dispatcher, Middleware};
use crate::error::{ContractError, ReaderError};
use crate::features::FeatureCollection;
use crate::message::{ErrorObject, Message};
use crate::registry::MethodRegistryBuilder;
use crate::transport::{Reader, Writer};

/// Assembles a `ServiceHost` from service registrations, middleware, and
/// host-level options. Mirrors the registry/dispatcher split: building the
/// registry can fail (duplicate services/params); everything else cannot.
#[derive(Default)]
pub struct HostBuilder {
    registry: MethodRegistryBuilder,
    middlewares: Vec<Middleware>,
    default_features: FeatureCollection,
    ordered_responses: bool,
}

impl HostBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_service(
        mut self,
        service_name: impl Into<String>,
        methods: Vec<crate::registry::JsonRpcMethod>,
    ) -> Result<Self, ContractError> {
        self.registry = self.registry.add_service(service_name, methods)?;
        Ok(self)
    }

    /// Appends a middleware stage. First added is outermost (onion-style),
    /// matching spec.md §4.5's "runs outer-to-inner, then inner-to-outer".
    pub fn use_middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn default_features(mut self, features: FeatureCollection) -> Self {
        self.default_features = features;
        self
    }

    /// Opt into serializing response writes in request-arrival order, at the
    /// cost of head-of-line blocking a fast request behind a slow one. Off by
    /// default, per SPEC_FULL.md's REDESIGN FLAGS.
    pub fn ordered_responses(mut self, enabled: bool) -> Self {
        self.ordered_responses = enabled;
        self
    }

    pub fn build(self) -> ServiceHost {
        let registry = self.registry.build();
        let pipeline = Dispatcher::new(registry).build_pipeline(self.middlewares);
        ServiceHost {
            pipeline,
            default_features: Arc::new(self.default_features),
            ordered_responses: self.ordered_responses,
        }
    }
}

/// An immutable, reusable dispatch pipeline bound to zero or more concurrent
/// transports via `run`.
#[derive(Clone)]
pub struct ServiceHost {
    pipeline: crate::dispatcher::Next,
    default_features: Arc<FeatureCollection>,
    ordered_responses: bool,
}

impl ServiceHost {
    pub fn builder() -> HostBuilder {
        HostBuilder::new()
    }

    /// Drives one transport until it closes or `cancel` fires. Requests run
    /// with cooperative concurrency (spec.md §5); set `ordered_responses` on
    /// the builder to serialize response writes in arrival order instead.
    pub async fn run(
        &self,
        reader: Arc<dyn Reader>,
        writer: Arc<dyn Writer>,
        cancel: CancellationToken,
    ) -> Result<(), ReaderError> {
        let mut inflight = Vec::new();
        loop {
            let message = match reader.read(&cancel).await {
                Ok(message) => message,
                Err(ReaderError::Closed) => break,
                Err(err) => return Err(err),
            };

            let (id, method, params) = match message {
                Message::Request { id, method, params } => (id, method, params),
                Message::Response { .. } => {
                    warn!("server transport received a response message; ignoring");
                    continue;
                }
            };

            let ctx = RequestContext::new(
                IncomingRequest { id, method, params },
                self.default_features.clone(),
                cancel.child_token(),
            );

            let pipeline = self.pipeline.clone();
            let writer = writer.clone();
            let cancel_for_write = cancel.clone();
            let task = tokio::spawn(async move {
                let ctx = pipeline(ctx).await;
                if ctx.is_notification() {
                    return;
                }
                let id = ctx.request.id.clone().expect("non-notification has an id");
                let response = match (ctx.explicit_result(), ctx.explicit_error()) {
                    (_, Some(error)) => Message::failure(id, error),
                    (Some(result), None) => Message::success(id, result),
                    (None, None) => Message::failure(
                        id,
                        ErrorObject::new(-32603, "handler produced no result"),
                    ),
                };
                if let Err(err) = writer.write(&response, &cancel_for_write).await {
                    debug!("failed to write response: {err}");
                }
            });

            if self.ordered_responses {
                let _ = task.await;
            } else {
                inflight.push(task);
            }
        }

        for task in inflight {
            let _ = task.await;
        }
        Ok(())
    }
}
