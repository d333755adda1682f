//! Client correlation engine: issues requests over a `Writer`, matches
//! responses arriving on a `Reader` back to their waiter, and supports
//! cancellation (spec.md §4.6).

mod pending;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{ClientError, RemoteError};
use crate::message::{Message, MessageId, Params};
use crate::transport::{Reader, Writer};

use pending::{Tombstones, DEFAULT_TOMBSTONE_WINDOW};

type Waiter = oneshot::Sender<Result<serde_json::Value, ClientError>>;

/// Configuration accepted by `Client::connect`.
pub struct ClientOptions {
    /// When set, a cancelled request's id is remembered for
    /// `tombstone_window` so its eventual late response is dropped silently
    /// instead of logged as an unexpected foreign message. Off by default,
    /// per SPEC_FULL.md's REDESIGN FLAGS.
    pub preserve_foreign_responses: bool,
    pub tombstone_window: Duration,
    pub id_prefix: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            preserve_foreign_responses: false,
            tombstone_window: DEFAULT_TOMBSTONE_WINDOW,
            id_prefix: None,
        }
    }
}

/// Issues requests, correlates responses, and exposes notification sends.
/// Owns a background task that pumps response messages off `reader` for as
/// long as the client is alive.
pub struct Client {
    writer: Arc<dyn Writer>,
    pending: Arc<DashMap<MessageId, Waiter>>,
    tombstones: Tombstones,
    next_id: AtomicI64,
    id_prefix: Option<String>,
    preserve_foreign_responses: bool,
    cancel: CancellationToken,
    _correlator: JoinHandle<()>,
    _sweeper: Option<JoinHandle<()>>,
}

impl Client {
    pub fn connect(reader: Arc<dyn Reader>, writer: Arc<dyn Writer>, options: ClientOptions) -> Self {
        let pending: Arc<DashMap<MessageId, Waiter>> = Arc::new(DashMap::new());
        let tombstones = Tombstones::new();
        let cancel = CancellationToken::new();

        let correlator = tokio::spawn(correlate(
            reader,
            pending.clone(),
            tombstones.clone(),
            options.preserve_foreign_responses,
            cancel.clone(),
        ));

        let sweeper = options.preserve_foreign_responses.then(|| {
            tokio::spawn(sweep(
                tombstones.clone(),
                options.tombstone_window,
                cancel.clone(),
            ))
        });

        Self {
            writer,
            pending,
            tombstones,
            next_id: AtomicI64::new(1),
            id_prefix: options.id_prefix,
            preserve_foreign_responses: options.preserve_foreign_responses,
            cancel,
            _correlator: correlator,
            _sweeper: sweeper,
        }
    }

    fn next_id(&self) -> MessageId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        match &self.id_prefix {
            Some(prefix) => MessageId::String(format!("{prefix}-{n}")),
            None => MessageId::Number(n),
        }
    }

    /// Sends a request and awaits its correlated response, or `ClientError`
    /// on transport failure, cancellation, or a malformed/remote error
    /// response.
    pub async fn request(
        &self,
        method: impl Into<String>,
        params: Params,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, ClientError> {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();

        // spec.md §4.6 step 2: fail rather than clobber a still-pending
        // waiter under the same id (only reachable via `next_id`'s i64
        // wraparound in this client, since ids are otherwise self-generated
        // and monotonic, but the check must hold regardless of id source).
        match self.pending.entry(id.clone()) {
            Entry::Occupied(_) => return Err(ClientError::Duplicate(id)),
            Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }

        let message = Message::request(Some(id.clone()), method, params);
        if let Err(err) = self.writer.write(&message, cancel).await {
            self.pending.remove(&id);
            return Err(ClientError::Transport(err.to_string()));
        }

        tokio::select! {
            result = rx => result.map_err(|_| ClientError::Closed)?,
            _ = cancel.cancelled() => {
                self.pending.remove(&id);
                if self.preserve_foreign_responses {
                    self.tombstones.insert(id);
                }
                Err(ClientError::Canceled)
            }
        }
    }

    /// Sends a notification; no response is expected or awaited.
    pub async fn notify(
        &self,
        method: impl Into<String>,
        params: Params,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError> {
        let message = Message::notification(method, params);
        self.writer
            .write(&message, cancel)
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.cancel.cancel();
        for (_, tx) in self.pending.clone().into_iter() {
            let _ = tx.send(Err(ClientError::Closed));
        }
    }
}

/// Thin, transport-agnostic send surface a generated client stub calls
/// through, in place of reflection-driven proxy generation (SPEC_FULL.md's
/// REDESIGN FLAGS: "manual client-stub wrapper").
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(
        &self,
        method: &str,
        params: Params,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, ClientError>;
}

#[async_trait]
impl Handler for Client {
    async fn call(
        &self,
        method: &str,
        params: Params,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, ClientError> {
        self.request(method, params, cancel).await
    }
}

async fn correlate(
    reader: Arc<dyn Reader>,
    pending: Arc<DashMap<MessageId, Waiter>>,
    tombstones: Tombstones,
    preserve_foreign_responses: bool,
    cancel: CancellationToken,
) {
    let is_response = Arc::new(|msg: &Message| matches!(msg, Message::Response { .. }));
    loop {
        let message = match reader.read_matching(is_response.clone(), &cancel).await {
            Ok(message) => message,
            Err(_) => break,
        };
        let Message::Response { id, result } = message else {
            continue;
        };

        let Some((_, tx)) = pending.remove(&id) else {
            if preserve_foreign_responses && tombstones.remove(&id) {
                continue;
            }
            warn!("received response for unknown or already-resolved request id {id}");
            continue;
        };

        let outcome = match result {
            Ok(value) => Ok(value),
            Err(error) => Err(ClientError::Remote(RemoteError::from_error_object(error))),
        };
        let _ = tx.send(outcome);
    }

    for (_, tx) in pending.clone().into_iter() {
        let _ = tx.send(Err(ClientError::Closed));
    }
}

async fn sweep(tombstones: Tombstones, window: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(window / 4);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => tombstones.evict_older_than(window),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReaderError;
    use std::sync::Mutex as StdMutex;

    struct ScriptedReader {
        responses: StdMutex<Vec<Message>>,
        notify: tokio::sync::Notify,
    }

    impl ScriptedReader {
        fn new(responses: Vec<Message>) -> Self {
            Self {
                responses: StdMutex::new(responses),
                notify: tokio::sync::Notify::new(),
            }
        }

        fn push(&self, message: Message) {
            self.responses.lock().unwrap().push(message);
            self.notify.notify_waiters();
        }
    }

    #[async_trait]
    impl Reader for ScriptedReader {
        async fn read(&self, cancel: &CancellationToken) -> Result<Message, ReaderError> {
            self.read_matching(Arc::new(|_| true), cancel).await
        }

        async fn read_matching(
            &self,
            predicate: crate::transport::Predicate,
            cancel: &CancellationToken,
        ) -> Result<Message, ReaderError> {
            loop {
                let notified = self.notify.notified();
                {
                    let mut responses = self.responses.lock().unwrap();
                    if let Some(pos) = responses.iter().position(|m| predicate(m)) {
                        return Ok(responses.remove(pos));
                    }
                }
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ReaderError::Closed),
                    _ = notified => {}
                }
            }
        }
    }

    struct RecordingWriter {
        sent: StdMutex<Vec<Message>>,
    }

    impl RecordingWriter {
        fn new() -> Self {
            Self {
                sent: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Writer for RecordingWriter {
        async fn write(
            &self,
            message: &Message,
            _cancel: &CancellationToken,
        ) -> Result<(), crate::error::WriterError> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn correlates_response_to_request() {
        let reader = Arc::new(ScriptedReader::new(Vec::new()));
        let writer = Arc::new(RecordingWriter::new());
        let client = Client::connect(reader.clone(), writer, ClientOptions::default());

        let cancel = CancellationToken::new();
        let request = tokio::spawn({
            let cancel = cancel.clone();
            async move { client.request("sum", Params::None, &cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        reader.push(Message::success(MessageId::Number(1), serde_json::Value::from(42)));

        let result = request.await.unwrap().unwrap();
        assert_eq!(result, serde_json::Value::from(42));
    }

    #[tokio::test]
    async fn late_response_after_cancel_is_silently_dropped_when_preserving() {
        let reader = Arc::new(ScriptedReader::new(Vec::new()));
        let writer = Arc::new(RecordingWriter::new());
        let options = ClientOptions {
            preserve_foreign_responses: true,
            ..ClientOptions::default()
        };
        let client = Arc::new(Client::connect(reader.clone(), writer, options));

        let request_cancel = CancellationToken::new();
        let client_clone = client.clone();
        let request_cancel_clone = request_cancel.clone();
        let request = tokio::spawn(async move {
            client_clone
                .request("slow", Params::None, &request_cancel_clone)
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        request_cancel.cancel();
        let outcome = request.await.unwrap();
        assert!(matches!(outcome, Err(ClientError::Canceled)));

        // Arrives after cancellation; must not log as "unknown" nor panic.
        reader.push(Message::success(MessageId::Number(1), serde_json::Value::from(1)));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn request_fails_on_id_collision_with_a_still_pending_waiter() {
        let reader = Arc::new(ScriptedReader::new(Vec::new()));
        let writer = Arc::new(RecordingWriter::new());
        let client = Client::connect(reader, writer, ClientOptions::default());

        // `next_id` hands out 1 on its first call; pre-occupy that slot to
        // force the collision `request` is supposed to reject.
        let (_tx, _rx) = oneshot::channel();
        client.pending.insert(MessageId::Number(1), _tx);

        let cancel = CancellationToken::new();
        let outcome = client.request("sum", Params::None, &cancel).await;
        assert!(matches!(outcome, Err(ClientError::Duplicate(MessageId::Number(1)))));
    }
}
