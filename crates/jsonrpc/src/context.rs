//! Per-request bundle created on entry to the dispatch pipeline and
//! discarded on exit (spec.md §3, "RequestContext").

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::features::FeatureCollection;
use crate::message::{ErrorObject, MessageId, Params};

/// The inbound request as seen by the dispatch pipeline and middleware.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub id: Option<MessageId>,
    pub method: String,
    pub params: Params,
}

#[derive(Default)]
struct ResponseSlot {
    result: Option<Value>,
    error: Option<ErrorObject>,
}

/// Per-request state threaded through middleware and into the dispatcher.
/// `response` is `None` for notifications; the pipeline must not emit a
/// message in that case, even when a handler set an error.
#[derive(Clone)]
pub struct RequestContext {
    pub request: Arc<IncomingRequest>,
    response: Option<Arc<Mutex<ResponseSlot>>>,
    pub features: Arc<Mutex<FeatureCollection>>,
    pub cancellation: CancellationToken,
}

impl RequestContext {
    pub fn new(
        request: IncomingRequest,
        default_features: Arc<FeatureCollection>,
        cancellation: CancellationToken,
    ) -> Self {
        let is_notification = request.id.is_none();
        Self {
            request: Arc::new(request),
            response: if is_notification {
                None
            } else {
                Some(Arc::new(Mutex::new(ResponseSlot::default())))
            },
            features: Arc::new(Mutex::new(FeatureCollection::scoped(default_features))),
            cancellation,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.response.is_none()
    }

    /// Explicitly set the response result, overriding any value a handler
    /// later returns. No-op for notifications.
    pub fn set_result(&self, value: Value) {
        if let Some(slot) = &self.response {
            let mut guard = slot.lock().expect("response slot poisoned");
            guard.result = Some(value);
            guard.error = None;
        }
    }

    /// Explicitly set the response error; wins over any value a handler
    /// returns (spec.md §4.5 step 6). No-op for notifications.
    pub fn set_error(&self, error: ErrorObject) {
        if let Some(slot) = &self.response {
            let mut guard = slot.lock().expect("response slot poisoned");
            guard.error = Some(error);
            guard.result = None;
        }
    }

    pub fn explicit_result(&self) -> Option<Value> {
        self.response
            .as_ref()
            .and_then(|slot| slot.lock().expect("response slot poisoned").result.clone())
    }

    pub fn explicit_error(&self) -> Option<ErrorObject> {
        self.response
            .as_ref()
            .and_then(|slot| slot.lock().expect("response slot poisoned").error.clone())
    }
}
